pub mod job;

pub use job::{spawn_job, JobHandle, JobOutcome};
