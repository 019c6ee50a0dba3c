// ABOUTME: Library root for siteforge - site provisioning, replacement and update on a container runtime.
// ABOUTME: The CLI binary is in main.rs; integration tests drive the library directly.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod replace;
pub mod runtime;
pub mod site;
pub mod types;
pub mod update;
pub mod version;
