//! Schedulers that deliver prompts between applications.

mod multi_threaded;
mod single_threaded;

pub use multi_threaded::MultiThreadedRunner;
pub use single_threaded::SingleThreadedRunner;
