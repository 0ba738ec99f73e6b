//! Utility modules
//!
//! This module contains small helpers shared by the execution engine.

pub mod cancel;

pub use cancel::CancelHandle;
