//! Core Data Type Definitions
//!
//! - **`request`** - `RequestDescriptor`, the immutable description of one logical call
//! - **`http`** - wire-level request/response values exchanged with a transport
//! - **`config`** - `ClientConfig`, `AutoReconnect` and their builders
//!
//! Everything is re-exported from this module:
//!
//! ```rust,ignore
//! use callwire::types::{ClientConfig, RequestDescriptor};
//! ```

pub mod config;
pub mod http;
pub mod request;

pub use config::*;
pub use http::*;
pub use request::*;
