//! Client-side validation
//!
//! Everything here runs before a request leaves the client. The server
//! re-validates independently; these checks only spare a round trip.

pub mod conversion;
pub mod files;

pub use conversion::{validate_conversion_request, TrimLimits};
pub use files::validate_file_specs;
