pub mod announcements;
pub mod comm;
pub mod config;
pub mod minecraft;
pub mod panel;
pub mod scheduler;
pub mod supervisor;

pub use panel::{Panel, PanelEvent, PanelInput};
pub use scheduler::Scheduler;
