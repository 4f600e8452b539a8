pub mod api;

pub use api::{ChatBackend, LogControl, ReplyChannel};
