//! # uplink-core
//!
//! Core crate for the Uplink upload client. Contains configuration schemas,
//! the plugin event bus, semantic-version utilities, and the unified error
//! system shared by the rest of the workspace.
//!
//! This crate has **no** internal dependencies on other Uplink crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod version;

pub use error::AppError;
pub use result::AppResult;
