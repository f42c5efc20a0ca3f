//! ignition-rs library
//!
//! First-boot provisioning for immutable-OS hosts: given a declarative
//! config fetched from a platform-specific source, bring block devices,
//! filesystems, files, and systemd units into the described state in a
//! single coordinated run.
//!
//! # Design Principles
//!
//! - **Decide before destroying**: every filesystem reconcile decision is
//!   made from a fresh probe before anything irreversible happens
//! - **Verify what you fetch**: a declared hash is checked over the full
//!   decompressed stream before the caller may use the bytes
//! - **Idempotent on rerun**: running a stage twice against the same
//!   inputs produces the same observable state

pub mod config;
pub mod distro;
pub mod engine;
pub mod fetch;
pub mod providers;
pub mod stages;
pub mod util;

mod error;

pub use config::Config;
pub use engine::Engine;
pub use error::IgnitionError;
pub use fetch::{FetchOptions, Fetcher, DEFAULT_FETCH_TIMEOUT};
