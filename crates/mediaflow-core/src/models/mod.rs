//! Data models for the ingestion pipeline
//!
//! Wire shapes exchanged with the application server sit next to the domain
//! types they are converted into.

mod conversion;
mod file_kind;
mod progress;
mod upload;

pub use conversion::*;
pub use file_kind::*;
pub use progress::*;
pub use upload::*;
