//! Execution layer
//!
//! ```text
//! caller -> RetryingExecutor -> RequestExecutor -> adapters -> Transport
//!                 ^                                               |
//!                 |        observers <- classify <----------------+
//!                 +-- refresh coordinator on auth expiry
//! ```

pub mod executor;
pub mod http;
pub mod outcome;
pub mod retrying;

pub use executor::{RequestExecutor, json_decoder, raw_decoder};
pub use outcome::{AuthExpiryPredicate, Outcome, classify_response, unauthorized_predicate};
pub use retrying::RetryingExecutor;
