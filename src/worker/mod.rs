//! Worker process and in-process stub.
//!
//! Each live session pairs one OS-level worker process with a stub that
//! runs an event loop over the worker's stdout and mirrors the objects the
//! worker holds into a local data registry.

pub mod codec;
pub mod directory;
pub mod process;
pub mod stub;

pub use directory::WorkerDirectory;
pub use process::WorkerProcess;
pub use stub::{DataRegistry, EventLoop, RegisteredObject, WorkerStub};
