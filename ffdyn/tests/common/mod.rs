#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ffdyn::error::SourceError;
use ffdyn::loader::{LibraryLoader, NativeLibrary, RawSymbol};
use ffdyn::{Component, LibraryConfig, Registry};
use parking_lot::Mutex;

pub const AVUTIL_PATH: &str = "stub/libavutil.so.56";
pub const AVFILTER_PATH: &str = "stub/libavfilter.so.7";

macro_rules! stub_symbols {
    ($($name:ident),* $(,)?) => {
        HashMap::from([
            $((stringify!($name).to_string(), ffmpeg_stub::$name as *const () as usize),)*
        ])
    };
}

/// Every function the stub library exports, by C name.
pub fn stub_symbols() -> HashMap<String, usize> {
    stub_symbols![
        avutil_version,
        avutil_configuration,
        avutil_license,
        av_version_info,
        av_strerror,
        av_log_get_level,
        av_log_set_level,
        av_get_media_type_string,
        av_malloc,
        av_free,
        av_mul_q,
        av_rescale_q,
        av_pix_fmt_desc_get,
        av_get_pix_fmt_name,
        av_get_pix_fmt,
        av_dict_get,
        av_dict_set,
        av_dict_count,
        av_dict_free,
        avfilter_version,
        avfilter_configuration,
        avfilter_license,
        av_filter_iterate,
        avfilter_get_by_name,
        avfilter_pad_count,
        avfilter_pad_get_name,
        avfilter_pad_get_type,
    ]
}

/// What the fake loader actually did.
#[derive(Default)]
pub struct Counters {
    opens: AtomicUsize,
    lookups: Mutex<HashMap<String, usize>>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn lookups_of(&self, name: &str) -> usize {
        self.lookups.lock().get(name).copied().unwrap_or(0)
    }

    fn record(&self, name: &str) {
        *self.lookups.lock().entry(name.to_string()).or_default() += 1;
    }
}

/// In-process [`LibraryLoader`] serving the stub's functions.
pub struct StubLoader {
    libraries: HashMap<PathBuf, Arc<HashMap<String, usize>>>,
    counters: Arc<Counters>,
    lookup_delay: Duration,
}

impl StubLoader {
    /// Serves the stub at [`AVUTIL_PATH`] and [`AVFILTER_PATH`].
    pub fn new() -> Self {
        let symbols = Arc::new(stub_symbols());
        Self {
            libraries: HashMap::from([
                (PathBuf::from(AVUTIL_PATH), Arc::clone(&symbols)),
                (PathBuf::from(AVFILTER_PATH), symbols),
            ]),
            counters: Arc::new(Counters::default()),
            lookup_delay: Duration::ZERO,
        }
    }

    pub fn with_library(mut self, path: &str, symbols: HashMap<String, usize>) -> Self {
        self.libraries.insert(PathBuf::from(path), Arc::new(symbols));
        self
    }

    /// Slows every lookup down to widen race windows.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl LibraryLoader for StubLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, SourceError> {
        let symbols = self
            .libraries
            .get(path)
            .ok_or_else(|| format!("{}: cannot open shared object file", path.display()))?;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubLibrary {
            symbols: Arc::clone(symbols),
            counters: Arc::clone(&self.counters),
            lookup_delay: self.lookup_delay,
        }))
    }
}

struct StubLibrary {
    symbols: Arc<HashMap<String, usize>>,
    counters: Arc<Counters>,
    lookup_delay: Duration,
}

impl NativeLibrary for StubLibrary {
    fn symbol(&self, name: &CStr) -> Result<RawSymbol, SourceError> {
        let name = name.to_str()?;
        self.counters.record(name);
        if !self.lookup_delay.is_zero() {
            std::thread::sleep(self.lookup_delay);
        }
        self.symbols
            .get(name)
            .and_then(|&addr| RawSymbol::new(addr as *mut c_void))
            .ok_or_else(|| format!("undefined symbol: {name}").into())
    }
}

pub fn stub_config() -> LibraryConfig {
    LibraryConfig::default()
        .with_path(Component::AvUtil, AVUTIL_PATH)
        .with_path(Component::AvFilter, AVFILTER_PATH)
}

/// Registry over the stub, plus the loader's counters.
pub fn stub_registry() -> (Registry, Arc<Counters>) {
    let loader = StubLoader::new();
    let counters = loader.counters();
    (Registry::with_loader(stub_config(), loader), counters)
}
