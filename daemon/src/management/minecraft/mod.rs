mod extractor;
mod players;

pub use extractor::*;
pub use players::PlayerStateStore;
