//! Eyes Runtime - server connection, baseline store and rendering-grid runner
//!
//! This crate provides the shared coordination layer that sits between a
//! session façade and the visual testing server:
//!
//! - **Connector**: the [`ServerConnector`] contract for starting sessions,
//!   matching windows, rendering DOM snapshots and stopping sessions
//! - **In-memory server**: [`InMemoryServer`], a process-local baseline store
//!   implementing the connector contract
//! - **Runners**: the [`EyesRunner`] trait and [`VisualGridRunner`], which
//!   funnels asynchronous render work from many sessions and aggregates
//!   their results
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   eyes-rs    │  Session façade + capture backends
//! └──────┬───────┘
//!        │ enqueues render work / calls connector
//! ┌──────▼───────┐
//! │ eyes-runtime │  This crate
//! │  ┌────────┐  │
//! │  │ Runner │  │  Per-session command queues, result aggregation
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Conn   │  │  Server contract
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connector;
pub mod error;
pub mod memory;
pub mod runner;

pub use connector::{RunningSession, ServerConnector, StopOptions};
pub use error::{Error, Result};
pub use memory::InMemoryServer;
pub use runner::{EyesRunner, GridSession, VisualGridRunner};
