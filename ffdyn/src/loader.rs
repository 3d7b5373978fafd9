use libloading::{Library, Symbol};
use std::ffi::{CStr, c_void};
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;

use crate::error::SourceError;

/// Address of an exported symbol.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawSymbol(NonNull<c_void>);

// SAFETY: a symbol address is plain data; what may be done through it is
// governed by the typed call sites in `registry`.
unsafe impl Send for RawSymbol {}
unsafe impl Sync for RawSymbol {}

impl RawSymbol {
    /// Returns `None` for a null address.
    pub fn new(addr: *mut c_void) -> Option<Self> {
        NonNull::new(addr).map(Self)
    }

    /// The address.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for RawSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawSymbol({:p})", self.0)
    }
}

/// An opened shared library.
pub trait NativeLibrary: Send + Sync {
    /// Looks up an exported symbol by its C name.
    fn symbol(&self, name: &CStr) -> Result<RawSymbol, SourceError>;
}

/// Opens shared libraries. The registry owns one and never calls the OS
/// loader directly, so tests can substitute their own.
pub trait LibraryLoader: Send + Sync {
    /// Opens the library at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, SourceError>;
}

/// [`LibraryLoader`] backed by `dlopen`/`LoadLibrary` through `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlLoader;

impl LibraryLoader for DlLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, SourceError> {
        // SAFETY:
        // - Opening a library runs its initialisers. The FFmpeg libraries (and
        //   anything a user configures in their place) are trusted to have
        //   initialisers that are sound to run on any thread.
        let lib = unsafe { Library::new(path)? };
        Ok(Box::new(DlLibrary { lib }))
    }
}

struct DlLibrary {
    lib: Library,
}

impl NativeLibrary for DlLibrary {
    fn symbol(&self, name: &CStr) -> Result<RawSymbol, SourceError> {
        // SAFETY:
        // - Asking for `*mut c_void` never reinterprets the symbol; the
        //   dereferenced value is the symbol's address itself.
        // - The address is only turned into a callable by the registry, whose
        //   callers assert the prototype.
        let addr = unsafe {
            let sym: Symbol<*mut c_void> = self.lib.get(name.to_bytes_with_nul())?;
            *sym
        };
        RawSymbol::new(addr)
            .ok_or_else(|| format!("{} resolved to a null address", name.to_string_lossy()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_address_is_rejected() {
        assert!(RawSymbol::new(std::ptr::null_mut()).is_none());
    }

    #[test]
    fn missing_file_fails_to_open() {
        let err = DlLoader
            .open(Path::new("/nonexistent/ffdyn/libavutil.so.56"))
            .err()
            .expect("missing file must not open");
        assert!(!err.to_string().is_empty());
    }
}
