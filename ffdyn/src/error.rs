use std::os::raw::c_int;
use std::path::PathBuf;

use thiserror::Error;

use crate::component::Component;

/// Boxed error produced by a [`LibraryLoader`](crate::loader::LibraryLoader) backend.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while loading, resolving, marshalling or calling into FFmpeg.
#[derive(Error, Debug)]
pub enum FfError {
    /// The shared library could not be opened (missing file, wrong
    /// architecture, unresolved transitive dependency).
    #[error("failed to load {component} from {}: {source}", .path.display())]
    Load {
        /// Component whose library failed to open.
        component: Component,
        /// Path handed to the dynamic loader.
        path: PathBuf,
        /// Loader error.
        #[source]
        source: SourceError,
    },

    /// The library was opened but does not export the requested symbol.
    #[error("symbol `{symbol}` not found in {component}: {source}")]
    SymbolNotFound {
        /// Component that was searched.
        component: Component,
        /// C name of the symbol.
        symbol: String,
        /// Loader error.
        #[source]
        source: SourceError,
    },

    /// The loaded library reports a major version other than the one the
    /// mirrored layouts were written against.
    #[error("{component} major version {found} does not match the mirrored ABI (expected {expected})")]
    AbiMismatch {
        /// Component that was checked.
        component: Component,
        /// Pinned major version.
        expected: u32,
        /// Major version reported by the library.
        found: u32,
    },

    /// A mirrored struct's size disagrees with the loaded library.
    #[error("layout of {type_name} is {expected} bytes here but {found} bytes in the loaded library")]
    LayoutMismatch {
        /// C name of the struct.
        type_name: &'static str,
        /// `size_of` of the Rust mirror.
        expected: usize,
        /// Size measured from the library.
        found: usize,
    },

    /// A host string contained an interior NUL byte.
    #[error("string contains an interior NUL byte: {0}")]
    InteriorNul(#[from] std::ffi::NulError),

    /// No NUL terminator was found within the scan bound.
    #[error("C string is not NUL-terminated within {max} bytes")]
    Unterminated {
        /// Maximum number of bytes scanned.
        max: usize,
    },

    /// A native function returned NULL where a value was required.
    #[error("{0} returned NULL")]
    NullPointer(&'static str),

    /// A native function reported failure through its return code.
    #[error("{function} failed ({code}): {message}")]
    Native {
        /// C name of the failing function.
        function: &'static str,
        /// Negative FFmpeg error code.
        code: c_int,
        /// Message from `av_strerror`.
        message: String,
    },

    /// Configuration file does not exist.
    #[error("Config file does not exist: {0}")]
    MissingConfig(String),

    /// Configuration parsed but holds an unusable value.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Configuration file is not valid TOML for [`LibraryConfig`](crate::config::LibraryConfig).
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error occurred while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FfError>;
