pub mod event;
pub mod fifo;
pub mod status;

pub use event::{Event, ListenerId, TListener};
pub use fifo::BoundedFifo;
