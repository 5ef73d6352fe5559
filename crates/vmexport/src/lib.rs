//! vmexport command-line front end
//!
//! The binary wires the provider crates into a [`ProviderRegistry`] and maps
//! config profiles onto provider connections. The pieces live here so
//! integration tests can reach them.
//!
//! [`ProviderRegistry`]: vmexport_core::ProviderRegistry

pub mod progress;
pub mod registry;
pub mod target;
pub mod utils;

pub use registry::default_registry;
pub use target::{Target, resolve_target};
