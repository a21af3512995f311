//! pkgrepo-lib: package repository build orchestrator
//!
//! This crate provides the pieces behind the `pkgrepo` CLI:
//! - `Repo`/`Package`: records kept by a [`store::RecordStore`]
//! - dependency gate and cycle checks over same-repo dependencies
//! - `Scheduler`: one build per package at a time, with state commits
//! - `LogSink`: per-attempt build output, streamed to any number of readers
//! - `PackageService`: the facade that ties it together behind a session check

pub mod auth;
pub mod build;
pub mod config;
pub mod error;
pub mod graph;
pub mod lock;
pub mod log;
pub mod package;
pub mod repo;
pub mod service;
pub mod store;
pub mod types;

pub use error::{ErrorKind, ServiceError};
pub use service::{PackageInfo, PackageService};
