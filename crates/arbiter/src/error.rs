use std::fmt;

#[derive(Debug)]
pub enum ArbiterError {
    RefereeSetup(String),
    Gtp(gtp::GtpError),
    Io(std::io::Error),
}

impl fmt::Display for ArbiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArbiterError::RefereeSetup(msg) => write!(f, "referee setup failed: {msg}"),
            ArbiterError::Gtp(e) => write!(f, "referee gtp error: {e}"),
            ArbiterError::Io(e) => write!(f, "referee io error: {e}"),
        }
    }
}

impl std::error::Error for ArbiterError {}

impl From<gtp::GtpError> for ArbiterError {
    fn from(e: gtp::GtpError) -> Self {
        ArbiterError::Gtp(e)
    }
}

impl From<std::io::Error> for ArbiterError {
    fn from(e: std::io::Error) -> Self {
        ArbiterError::Io(e)
    }
}
