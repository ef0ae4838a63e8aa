//! Test doubles for the regatta scheduler: a scriptable in-memory task
//! backend, in-memory storage and winner registry, a recording results
//! bus, and canned job fixtures.

pub mod backend;
pub mod job;
pub mod registry;
pub mod results;
pub mod storage;

pub use backend::{InMemoryTaskBackend, SubmitRecord, TaskScript};
pub use job::*;
pub use registry::InMemoryWinnerRegistry;
pub use results::RecordingResultsBus;
pub use storage::{InMemoryStorage, StorageOp};
