pub mod config;
pub mod error;
pub mod memory;
pub mod splitter;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
