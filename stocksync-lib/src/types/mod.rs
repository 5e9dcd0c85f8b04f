#![allow(unreachable_pub)]

mod error;
mod task;

pub use error::ErrorKind;
pub use task::{Endpoint, Task, TaskId};

/// The stocksync `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
