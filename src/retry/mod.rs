//! Retry module (ergonomic namespace)
//! - policy.rs: retry decisions and delay strategies

pub mod policy;

pub use policy::*;
