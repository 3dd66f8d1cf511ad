//! OSO MySQL Backup Kubernetes Operator
//!
//! This operator manages MySQL backup and restore operations in Kubernetes
//! using Custom Resource Definitions (CRDs). Operations are scheduled on the
//! primary member of the target cluster, driven through forward-only phase
//! state machines and stamped with the operator version that handled them.

pub mod client;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod provenance;
pub mod reconcilers;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod waiter;

pub use error::{Error, Result};
