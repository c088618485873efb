pub mod deadline;
pub mod error;
pub mod session;

pub use deadline::Deadline;
pub use error::GtpError;
pub use session::{GtpSession, DEFAULT_COMMAND_TIMEOUT};
