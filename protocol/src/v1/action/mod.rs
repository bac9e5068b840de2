mod actions;

pub use actions::*;
