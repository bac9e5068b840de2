mod data;
mod events;

pub use data::*;
pub use events::*;
