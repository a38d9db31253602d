#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid packet code: {0:?}")]
    InvalidCode(Box<str>),
}

/// Rejections raised before any byte of a command is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("message is {length} characters long, the device accepts at most {max}")]
    MessageTooLong { length: usize, max: usize },
    #[error("message contains a line break")]
    LineBreak,
}
