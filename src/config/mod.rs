//! Configuration loading
//!
//! A config directory holds one schema document and any number of plugin
//! manifests:
//!
//! ```text
//! config/
//!   schema.yaml
//!   plugins/
//!     words.yaml
//!     ...
//! ```

pub mod loader;

pub use loader::ConfigLoader;
