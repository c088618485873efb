pub mod demo;
pub mod error;
pub mod session;
pub mod sgf;

pub use error::KgsError;
pub use session::{KgsSession, Predicate};
pub use sgf::{gtp_to_loc, loc_to_gtp, SgfGame, SgfNode, SgfProp};
