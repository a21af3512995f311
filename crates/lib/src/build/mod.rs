//! Build scheduling and execution.
//!
//! A build request passes the dependency gate, claims the package's
//! execution slot, and hands a [`BuildJob`] to a [`BuildExecutor`]. The
//! scheduler alone moves a package through its build states; the executor
//! only produces output.
//!
//! # Submodules
//!
//! - [`executor`] - the executor contract and the shell implementation
//! - [`scheduler`] - slots, state commits and the supervising task

pub mod executor;
pub mod scheduler;

pub use executor::{BuildExecutor, BuildJob, ExecutorError, ShellExecutor};
pub use scheduler::{BuildHandle, BuildOutcome, Scheduler};
