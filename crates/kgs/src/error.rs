use std::fmt;

#[derive(Debug)]
pub enum KgsError {
    SignInFailed,
    Http(reqwest::Error),
    InvalidUrl(String),
}

impl fmt::Display for KgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KgsError::SignInFailed => write!(f, "KGS sign-in did not complete"),
            KgsError::Http(e) => write!(f, "KGS HTTP transport error: {e}"),
            KgsError::InvalidUrl(u) => write!(f, "invalid KGS API url: {u}"),
        }
    }
}

impl std::error::Error for KgsError {}

impl From<reqwest::Error> for KgsError {
    fn from(e: reqwest::Error) -> Self {
        KgsError::Http(e)
    }
}
