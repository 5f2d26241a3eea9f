//! DNS provider implementations that live in the core crate.
//!
//! Only the file-backed provider is here; the networked providers live in
//! their own crates so their dependencies stay out of the core.

pub mod file;

pub use file::FileProvider;
