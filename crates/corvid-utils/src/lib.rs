mod thread;
mod tracing_init;

pub use thread::{ThreadPriority, thread_boot};
pub use tracing_init::init_tracing;
