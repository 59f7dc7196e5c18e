//! # upsched-scheduler
//!
//! Reconciliation driver for time-triggered release upgrades.
//!
//! The decision itself lives in `upsched-schedule`. This crate supplies
//! everything around it:
//!
//! - `store`: where resources come from and where updates go
//! - `adapter`: how a new version gets written
//! - `events` and `metrics`: what operators see
//! - `reconciler` and `worker`: when and how often each resource is evaluated

pub mod adapter;
pub mod clock;
pub mod config;
pub mod events;
pub mod http;
pub mod metrics;
pub mod reconciler;
pub mod store;
pub mod worker;

pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
pub use worker::{SchedulerWorker, WorkerConfig};
