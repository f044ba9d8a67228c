use thiserror::Error;

/// Failures talking to the cloud service.
#[derive(Debug, Clone, Error)]
pub enum CloudError {
    /// The request may succeed if repeated: connection failures, timeouts, 5xx responses and unreadable bodies.
    #[error("Temporary failure talking to the cloud. {0}")]
    Transient(String),
    /// The cloud understood the request and refused it.
    #[error("The cloud rejected the request with status {status}. {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid cloud URL. {0}")]
    InvalidUrl(String),
}

impl CloudError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// True for rejections meaning the session is unknown or no longer accepts cash.
    pub fn means_session_finished(&self) -> bool {
        matches!(self, Self::Rejected { status: 400 | 404 | 409, .. })
    }
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Transient(format!("Unreadable response. {e}"))
        } else if e.is_builder() {
            Self::InvalidUrl(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Could not open {port}. {reason}")]
    OpenFailed { port: String, reason: String },
    #[error("The acceptor link is not connected")]
    NotConnected,
    #[error("The acceptor link closed")]
    LinkClosed,
    #[error("The command queue to the acceptor is full")]
    Busy,
    #[error("Command is too long for the acceptor ({0} characters)")]
    CommandTooLong(usize),
    #[error("The acceptor cannot produce {0}")]
    InvalidAmount(String),
    #[error("I/O error on the acceptor link. {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("The printer is not connected. {0}")]
    NotConnected(String),
    #[error("I/O error while printing. {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not send the receipt to the acceptor. {0}")]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("Invalid configuration. {0}")]
    Configuration(String),
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Printer(#[from] PrinterError),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
}
