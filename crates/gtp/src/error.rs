use std::fmt;

/// Errors surfaced while standing up a GTP session.
#[derive(Debug)]
pub enum GtpError {
    RequiredCapabilityMissing(String),
}

impl fmt::Display for GtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GtpError::RequiredCapabilityMissing(cmd) => {
                write!(f, "peer does not support required command {cmd}")
            }
        }
    }
}

impl std::error::Error for GtpError {}
