//! Error Handling Module
//!
//! Every call made through a [`Client`](crate::Client) yields either a decoded
//! value or exactly one [`NetworkError`]. Transport-level failures are wrapped
//! into [`FailureCause`] and never escape as raw transport errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use callwire::error::{FailureCause, NetworkError};
//!
//! let error = NetworkError::TransientFailure(FailureCause::Status {
//!     code: 503,
//!     body: Default::default(),
//! });
//! assert!(error.is_retryable());
//! assert_eq!(error.status_code(), Some(503));
//! ```

pub mod types;

pub use types::*;
