pub mod board;
pub mod multiplier;
pub mod random;
pub mod session;
pub mod types;

pub use board::{Board, Cell, MAX_BOARD_SIZE, MIN_BOARD_SIZE};
pub use multiplier::MultiplierPolicy;
pub use random::{SequenceRandom, StdRandom};
pub use session::{GameSession, PlayerContext, SessionRules};
pub use types::*;
