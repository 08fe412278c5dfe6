//! Built-in capability sets.

mod json;
mod log;

pub use json::json_api;
pub use log::log_api;
