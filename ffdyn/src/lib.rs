#![deny(missing_docs)]

//! Dynamically loaded bindings to the FFmpeg libraries.
//!
//! Nothing is linked at build time. A [`Registry`] opens each library the
//! first time one of its functions is needed and resolves every symbol at
//! most once.

/// `#[repr(C)]` mirrors of FFmpeg structs and constants.
pub mod abi;

/// libavfilter wrappers.
pub mod avfilter;

/// libavutil wrappers.
pub mod avutil;

/// FFmpeg components and their version information.
pub mod component;

/// Library search configuration.
pub mod config;

/// Error types used by the bindings.
pub mod error;

/// Dynamic library loading backends.
pub mod loader;

/// String and memory marshalling across the C boundary.
pub mod marshal;

/// Lazy symbol resolution.
pub mod registry;

pub use component::{Component, ComponentInfo, LibVersion};
pub use config::LibraryConfig;
pub use error::{FfError, Result};
pub use registry::{NativeFn, Registry, RegistryStats};
