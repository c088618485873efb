pub mod colour;
pub mod error;
pub mod match_state;
pub mod player;
pub mod referee;
pub mod timer;

pub use colour::Colour;
pub use error::ArbiterError;
pub use match_state::{assign_colours, MatchState};
pub use player::Player;
pub use referee::Referee;
pub use timer::{TimeLeft, Timer};
