// src/lib.rs

pub mod config;
pub mod logging;
pub mod sessions;
pub mod http;
pub mod tasks;
pub mod plugins;

pub use plugbot_common::Error;
pub use http::{build_client, with_retries, RetryPolicy};
