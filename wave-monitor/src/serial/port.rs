use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{ConnectionError, Connector, SerialLink, classify_open_error};

/// The boards reset when the port opens and print nothing useful meanwhile.
const BOOT_DELAY: Duration = Duration::from_secs(2);

/// Connector for a real serial device.
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
    boot_delay: Duration,
}

impl SerialPortConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout,
            boot_delay: BOOT_DELAY,
        }
    }

    pub fn with_boot_delay(mut self, boot_delay: Duration) -> Self {
        self.boot_delay = boot_delay;
        self
    }
}

#[async_trait]
impl Connector for SerialPortConnector {
    fn port_name(&self) -> &str {
        &self.port
    }

    #[instrument(skip(self), fields(port = %self.port, baud_rate = self.baud_rate))]
    async fn open(&self) -> Result<SerialLink, ConnectionError> {
        let port = self.port.clone();
        let baud_rate = self.baud_rate;
        let read_timeout = self.read_timeout;

        let link = tokio::task::spawn_blocking(move || {
            let reader = serialport::new(&port, baud_rate)
                .timeout(read_timeout)
                .open()
                .map_err(|e| classify_open_error(&port, &e))?;
            let writer = reader
                .try_clone()
                .map_err(|e| classify_open_error(&port, &e))?;

            Ok::<_, ConnectionError>(SerialLink {
                reader: Box::new(reader),
                writer: Box::new(writer),
            })
        })
        .await
        .map_err(|e| ConnectionError::Other {
            port: self.port.clone(),
            detail: e.to_string(),
        })??;

        info!("Serial port opened");
        tokio::time::sleep(self.boot_delay).await;
        Ok(link)
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, serialport::Error> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .collect())
}
