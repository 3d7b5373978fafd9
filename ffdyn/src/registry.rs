//! The lazy symbol resolver.
//!
//! A [`Registry`] is constructed once by the host application and borrowed by
//! every wrapper. It opens each component's shared library on first use,
//! resolves each symbol at most once, and hands out [`NativeFn`]s that keep
//! the library mapped for as long as they are alive.

use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::fmt;
use std::os::raw::c_uint;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::avfilter::AvFilter;
use crate::avutil::AvUtil;
use crate::component::{Component, ComponentInfo, LibVersion};
use crate::config::LibraryConfig;
use crate::error::{FfError, Result};
use crate::loader::{DlLoader, LibraryLoader, NativeLibrary, RawSymbol};
use crate::marshal;

/// `<lib>_version`
pub type VersionFn = unsafe extern "C" fn() -> c_uint;
/// `<lib>_configuration`, `<lib>_license`, `av_version_info`
pub type StaticStringFn = unsafe extern "C" fn() -> *const std::os::raw::c_char;

/// An opened component library.
pub struct LibraryHandle {
    component: Component,
    path: PathBuf,
    lib: Box<dyn NativeLibrary>,
}

impl LibraryHandle {
    /// Component this library provides.
    pub fn component(&self) -> Component {
        self.component
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("component", &self.component)
            .field("path", &self.path)
            .finish()
    }
}

/// A resolved symbol together with the library it lives in.
#[derive(Clone, Debug)]
pub struct ResolvedSymbol {
    addr: RawSymbol,
    library: Arc<LibraryHandle>,
}

impl ResolvedSymbol {
    /// The symbol's address.
    pub fn addr(&self) -> RawSymbol {
        self.addr
    }

    /// Library the address belongs to.
    pub fn library(&self) -> &Arc<LibraryHandle> {
        &self.library
    }
}

/// A typed native function. Holding one keeps its library loaded.
#[derive(Clone)]
pub struct NativeFn<F> {
    f: F,
    library: Arc<LibraryHandle>,
}

impl<F: Copy> NativeFn<F> {
    /// The function pointer. Calling it is `unsafe` per the C contract of
    /// the wrapped function.
    pub fn get(&self) -> F {
        self.f
    }

    /// Library the function belongs to.
    pub fn library(&self) -> &Arc<LibraryHandle> {
        &self.library
    }
}

impl<F> fmt::Debug for NativeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("library", &self.library.component)
            .finish_non_exhaustive()
    }
}

/// Counters of work the registry actually did, excluding cache hits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Successful library opens.
    pub libraries_opened: u64,
    /// Symbol lookups handed to the loader, including failed ones.
    pub symbol_lookups: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct SymbolKey {
    component: Component,
    name: &'static CStr,
}

/// Memoization cell for one symbol. `init` serialises first-time lookups so
/// concurrent callers wait for, and then share, the winner's result.
#[derive(Default)]
struct SymbolCell {
    resolved: OnceLock<ResolvedSymbol>,
    init: Mutex<()>,
}

/// Process-local registry of opened FFmpeg libraries and resolved symbols.
pub struct Registry {
    config: RwLock<LibraryConfig>,
    loader: Box<dyn LibraryLoader>,
    libraries: Mutex<HashMap<Component, Arc<LibraryHandle>>>,
    symbols: Mutex<HashMap<SymbolKey, Arc<SymbolCell>>>,
    libraries_opened: AtomicU64,
    symbol_lookups: AtomicU64,
}

impl Registry {
    /// Registry loading through the OS dynamic loader.
    pub fn new(config: LibraryConfig) -> Self {
        Self::with_loader(config, DlLoader)
    }

    /// Registry loading through `loader`.
    pub fn with_loader(config: LibraryConfig, loader: impl LibraryLoader + 'static) -> Self {
        Self {
            config: RwLock::new(config),
            loader: Box::new(loader),
            libraries: Mutex::new(HashMap::new()),
            symbols: Mutex::new(HashMap::new()),
            libraries_opened: AtomicU64::new(0),
            symbol_lookups: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> LibraryConfig {
        self.config.read().clone()
    }

    /// Bound for strings read back from library memory.
    pub fn max_string_len(&self) -> usize {
        self.config.read().max_string_len
    }

    /// Changes where `component` is loaded from. Takes effect the next time
    /// the library is opened, i.e. immediately if it is not open yet or
    /// after [`close_all`](Self::close_all).
    pub fn set_library_path(&self, component: Component, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.libraries.lock().contains_key(&component) {
            warn!(%component, path = %path.display(), "library already open, new path applies after close_all");
        }
        self.config.write().set_path(component, path);
    }

    /// Work done so far.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            libraries_opened: self.libraries_opened.load(Ordering::Relaxed),
            symbol_lookups: self.symbol_lookups.load(Ordering::Relaxed),
        }
    }

    /// Whether `component`'s library is currently held by the registry.
    pub fn is_open(&self, component: Component) -> bool {
        self.libraries.lock().contains_key(&component)
    }

    /// Opens `component`'s library unless it is already open.
    ///
    /// A failed open is not cached.
    pub fn ensure_library(&self, component: Component) -> Result<Arc<LibraryHandle>> {
        let mut libraries = self.libraries.lock();
        if let Some(handle) = libraries.get(&component) {
            return Ok(Arc::clone(handle));
        }

        let (path, verify) = {
            let config = self.config.read();
            (config.path_for(component), config.verify_version)
        };

        let lib = self.loader.open(&path).map_err(|source| {
            warn!(%component, path = %path.display(), error = %source, "failed to open library");
            FfError::Load {
                component,
                path: path.clone(),
                source,
            }
        })?;
        self.libraries_opened.fetch_add(1, Ordering::Relaxed);

        let handle = Arc::new(LibraryHandle {
            component,
            path,
            lib,
        });

        if verify {
            let version = self.library_version(&handle)?;
            if version.major != component.expected_major() {
                warn!(%component, %version, "library version does not match mirrored ABI");
                return Err(FfError::AbiMismatch {
                    component,
                    expected: component.expected_major(),
                    found: version.major,
                });
            }
        }

        info!(%component, path = %handle.path.display(), "library loaded");
        libraries.insert(component, Arc::clone(&handle));
        Ok(handle)
    }

    fn library_version(&self, handle: &LibraryHandle) -> Result<LibVersion> {
        let addr = self.lookup(handle, handle.component.version_symbol())?;
        // SAFETY:
        // - Every FFmpeg component exports `unsigned <lib>_version(void)`.
        let version = unsafe {
            let f: VersionFn = std::mem::transmute_copy(&addr.as_ptr());
            f()
        };
        Ok(LibVersion::from_packed(version))
    }

    fn lookup(&self, handle: &LibraryHandle, name: &CStr) -> Result<RawSymbol> {
        self.symbol_lookups.fetch_add(1, Ordering::Relaxed);
        handle.lib.symbol(name).map_err(|source| {
            warn!(component = %handle.component, symbol = %name.to_string_lossy(), error = %source, "symbol lookup failed");
            FfError::SymbolNotFound {
                component: handle.component,
                symbol: name.to_string_lossy().into_owned(),
                source,
            }
        })
    }

    /// Resolves `name` in `component`, at most once per registry.
    ///
    /// Concurrent first callers block until the first lookup completes and
    /// then observe the same address. A failed lookup is not memoized.
    pub fn ensure_symbol(&self, component: Component, name: &'static CStr) -> Result<ResolvedSymbol> {
        let cell = {
            let mut symbols = self.symbols.lock();
            Arc::clone(symbols.entry(SymbolKey { component, name }).or_default())
        };
        if let Some(resolved) = cell.resolved.get() {
            return Ok(resolved.clone());
        }

        let _guard = cell.init.lock();
        if let Some(resolved) = cell.resolved.get() {
            return Ok(resolved.clone());
        }

        let library = self.ensure_library(component)?;
        let addr = self.lookup(&library, name)?;
        debug!(%component, symbol = %name.to_string_lossy(), ?addr, "symbol resolved");

        Ok(cell.resolved.get_or_init(|| ResolvedSymbol { addr, library }).clone())
    }

    /// Resolves `name` as a function of type `F`.
    ///
    /// # Safety
    /// `F` must be an `unsafe extern "C" fn` type whose signature matches the
    /// C prototype of `name` in the loaded library. A mismatch is undefined
    /// behaviour when the function is called.
    pub unsafe fn function<F: Copy>(&self, component: Component, name: &'static CStr) -> Result<NativeFn<F>> {
        const { assert!(size_of::<F>() == size_of::<*mut c_void>()) };
        let resolved = self.ensure_symbol(component, name)?;
        // SAFETY: `F` is pointer sized (checked above) and the caller asserts
        // it is the symbol's function type.
        let f = unsafe { std::mem::transmute_copy::<*mut c_void, F>(&resolved.addr.as_ptr()) };
        Ok(NativeFn {
            f,
            library: resolved.library,
        })
    }

    /// Calls `<lib>_version`, `<lib>_configuration` and `<lib>_license`.
    pub fn component_info(&self, component: Component) -> Result<ComponentInfo> {
        Ok(ComponentInfo {
            component,
            version: self.version(component)?,
            configuration: self.static_string(component, component.configuration_symbol())?,
            license: self.static_string(component, component.license_symbol())?,
        })
    }

    /// `<lib>_version` of `component`, unpacked.
    pub fn version(&self, component: Component) -> Result<LibVersion> {
        // SAFETY: `unsigned <lib>_version(void)`.
        let f = unsafe { self.function::<VersionFn>(component, component.version_symbol())? };
        // SAFETY: takes no arguments and has no preconditions.
        Ok(LibVersion::from_packed(unsafe { (f.get())() }))
    }

    /// Calls a `const char *fn(void)` returning a static string.
    pub(crate) fn static_string(&self, component: Component, name: &'static CStr) -> Result<String> {
        // SAFETY: the callers only pass names of `const char *(void)` functions.
        let f = unsafe { self.function::<StaticStringFn>(component, name)? };
        // SAFETY:
        // - The returned string is static data of a library `f` keeps mapped.
        // - The scan is bounded by `max_string_len`.
        unsafe { marshal::from_c_string_bounded((f.get())(), self.max_string_len()) }
    }

    /// libavutil wrappers over this registry.
    pub fn avutil(&self) -> AvUtil<'_> {
        AvUtil::new(self)
    }

    /// libavfilter wrappers over this registry.
    pub fn avfilter(&self) -> AvFilter<'_> {
        AvFilter::new(self)
    }

    /// Forgets every opened library and resolved symbol.
    ///
    /// Libraries are unmapped once the last [`NativeFn`] or owned wrapper
    /// referring to them is dropped, so in-flight calls stay valid.
    pub fn close_all(&self) {
        let closed = {
            let mut libraries = self.libraries.lock();
            let closed = libraries.len();
            libraries.clear();
            closed
        };
        self.symbols.lock().clear();
        info!(closed, "registry closed");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(LibraryConfig::default())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open: Vec<Component> = self.libraries.lock().keys().copied().collect();
        f.debug_struct("Registry")
            .field("open", &open)
            .field("stats", &self.stats())
            .finish()
    }
}
