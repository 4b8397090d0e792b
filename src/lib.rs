//! apib-mock
//!
//! Assembles an API Blueprint document from an entry file and the fragments
//! it includes, serves it with an external mock server, and regenerates it
//! whenever a fragment changes.
//!
//! This library provides:
//! - Include marker extraction and single-pass substitution
//! - Fragment watching with regeneration
//! - Mock server and openssl command passthrough
//! - Configuration management

pub mod app;
pub mod config;
pub mod include;
pub mod mock;
pub mod output;
pub mod store;
pub mod tls;
pub mod watcher;

pub use config::Config;
pub use include::{IncludeMarker, find_markers};
pub use store::{Fragment, FragmentStore};
