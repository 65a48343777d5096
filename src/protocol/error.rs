use thiserror::Error;

pub type WorkhorseResult<T> = Result<T, WorkhorseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkhorseError {
    #[error("Transport: {0}")]
    Transport(String),

    #[error("No response from broker after {0} attempts")]
    NoResponseFromBroker(usize),

    #[error("Interrupted by shutdown signal")]
    Interrupted,

    #[error("Invalid reply due to {0}")]
    InvalidReply(&'static str),

    #[error("Could not reply due to {0}")]
    ConfigurationError(&'static str),

    #[error("Message does not conform to protocol due to {0}")]
    ProtocolError(&'static str),
}

macro_rules! error_from {
    ($err:ty, $variant:ident, $func:expr) => {
        impl From<$err> for WorkhorseError {
            fn from(value: $err) -> Self {
                WorkhorseError::$variant($func(value))
            }
        }
    };
    ($err:ty, $variant:ident) => {
        impl From<$err> for WorkhorseError {
            fn from(value: $err) -> Self {
                WorkhorseError::$variant(value.to_string())
            }
        }
    };
}

error_from!(zmq::Error, Transport);
