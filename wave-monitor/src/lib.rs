pub mod config;
pub mod http;
pub mod journal;
pub mod lifecycle;
pub mod reassembly;
pub mod serial;
pub mod session;
pub mod state;
pub mod tracker;

pub use config::{Config, LinkConfig, MonitorConfig, SerialConfig, ServerConfig};
pub use journal::{Acknowledgement, AlertJournal, JournalError};
pub use lifecycle::DeviceLifecycle;
pub use reassembly::{Outcome, Reassembler};
pub use serial::mock::{MockConnector, MockFailure, SharedBuffer};
pub use serial::port::SerialPortConnector;
pub use serial::{ConnectionError, Connector, SerialLink};
pub use session::{SendError, Session, SessionHandle, connect};
pub use state::MonitorState;
pub use tracker::{Tracker, TrackerConfig};
