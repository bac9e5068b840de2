mod line_buffer;
mod process;
mod process_helper;

pub use line_buffer::LineBuffer;
pub use process::{OutputStream, ProcessEvent, ProcessHandle, ProcessMessage};
