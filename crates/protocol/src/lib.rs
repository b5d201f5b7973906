//! Wire types for the Eyes visual testing server.
//!
//! This crate contains the serde-serializable types exchanged between a test
//! session and the server that stores baselines and compares screenshots.
//! These types are the "protocol layer": the shapes of data as they appear on
//! the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small derived queries
//! * Stable: Changes only when the wire format changes
//!
//! The session façade and its capture backends are built on top of these
//! types in `eyes-rs`.

pub mod geometry;
pub mod results;
pub mod session;

pub use geometry::*;
pub use results::*;
pub use session::*;
