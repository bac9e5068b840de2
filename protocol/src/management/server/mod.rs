mod players;
mod status;

pub use players::*;
pub use status::*;
