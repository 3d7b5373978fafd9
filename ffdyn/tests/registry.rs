mod common;

use std::os::raw::{c_int, c_uint};
use std::sync::Barrier;
use std::time::Duration;

use common::{AVUTIL_PATH, StubLoader, stub_config, stub_registry, stub_symbols};
use ffdyn::registry::VersionFn;
use ffdyn::{Component, FfError, LibraryConfig, Registry};

type LogGetLevelFn = unsafe extern "C" fn() -> c_int;

#[test]
fn resolving_twice_yields_the_same_address() {
    let (registry, counters) = stub_registry();

    let first = registry.ensure_symbol(Component::AvUtil, c"av_log_get_level").unwrap();
    let second = registry.ensure_symbol(Component::AvUtil, c"av_log_get_level").unwrap();

    assert_eq!(first.addr(), second.addr());
    assert_eq!(counters.lookups_of("av_log_get_level"), 1);
}

#[test]
fn zero_argument_accessor_looks_up_once() {
    let (registry, counters) = stub_registry();
    let avutil = registry.avutil();

    let a = avutil.log_level().unwrap();
    let b = avutil.log_level().unwrap();

    assert_eq!(a, b);
    assert_eq!(counters.lookups_of("av_log_get_level"), 1);
}

#[test]
fn concurrent_first_resolution_does_one_lookup() {
    const THREADS: usize = 16;
    let loader = StubLoader::new().with_lookup_delay(Duration::from_millis(20));
    let counters = loader.counters();
    let registry = Registry::with_loader(stub_config(), loader);
    let barrier = Barrier::new(THREADS);

    let addrs: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    registry
                        .ensure_symbol(Component::AvUtil, c"av_strerror")
                        .unwrap()
                        .addr()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(counters.lookups_of("av_strerror"), 1);
    assert_eq!(counters.opens(), 1);
}

#[test]
fn library_is_opened_once_for_many_symbols() {
    let (registry, counters) = stub_registry();
    let avutil = registry.avutil();

    avutil.version().unwrap();
    avutil.license().unwrap();
    avutil.strerror(-22).unwrap();

    assert_eq!(counters.opens(), 1);
    assert!(registry.is_open(Component::AvUtil));
    assert!(!registry.is_open(Component::AvFilter));
}

#[test]
fn failed_open_is_not_cached() {
    let loader = StubLoader::new();
    let counters = loader.counters();
    let config = LibraryConfig::default().with_path(Component::AvUtil, "stub/missing.so");
    let registry = Registry::with_loader(config, loader);

    let err = registry.avutil().version().unwrap_err();
    assert!(matches!(err, FfError::Load { component: Component::AvUtil, .. }), "{err}");
    assert!(!registry.is_open(Component::AvUtil));

    registry.set_library_path(Component::AvUtil, AVUTIL_PATH);
    let version = registry.avutil().version().unwrap();
    assert_eq!(version.major, 56);
    assert_eq!(counters.opens(), 1);
}

#[test]
fn missing_symbol_is_an_error_and_is_retried() {
    let (registry, counters) = stub_registry();

    for _ in 0..2 {
        let err = registry
            .ensure_symbol(Component::AvUtil, c"av_frame_alloc")
            .unwrap_err();
        match err {
            FfError::SymbolNotFound { component, symbol, .. } => {
                assert_eq!(component, Component::AvUtil);
                assert_eq!(symbol, "av_frame_alloc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(counters.lookups_of("av_frame_alloc"), 2);
    // The library itself stays usable.
    assert!(registry.avutil().version().is_ok());
}

extern "C" fn avutil_version_57() -> c_uint {
    (57 << 16) | (28 << 8) | 100
}

#[test]
fn version_mismatch_refuses_the_library() {
    let mut symbols = stub_symbols();
    symbols.insert(
        "avutil_version".to_string(),
        avutil_version_57 as *const () as usize,
    );
    let loader = StubLoader::new().with_library("stub/libavutil.so.57", symbols);
    let config = LibraryConfig::default().with_path(Component::AvUtil, "stub/libavutil.so.57");
    let registry = Registry::with_loader(config.clone(), loader);

    let err = registry.avutil().license().unwrap_err();
    assert!(
        matches!(err, FfError::AbiMismatch { expected: 56, found: 57, .. }),
        "{err}"
    );
    assert!(!registry.is_open(Component::AvUtil));

    let mut lenient = config;
    lenient.verify_version = false;
    let mut symbols = stub_symbols();
    symbols.insert(
        "avutil_version".to_string(),
        avutil_version_57 as *const () as usize,
    );
    let loader = StubLoader::new().with_library("stub/libavutil.so.57", symbols);
    let registry = Registry::with_loader(lenient, loader);
    assert_eq!(registry.avutil().version().unwrap().major, 57);
}

#[test]
fn native_fn_outlives_close_all() {
    let (registry, counters) = stub_registry();

    let f = unsafe {
        registry
            .function::<LogGetLevelFn>(Component::AvUtil, c"av_log_get_level")
            .unwrap()
    };
    registry.close_all();
    assert!(!registry.is_open(Component::AvUtil));

    // Still callable: `f` holds the library.
    let level = unsafe { (f.get())() };
    assert_eq!(f.library().component(), Component::AvUtil);
    assert_eq!(registry.avutil().log_level().unwrap(), level);

    assert_eq!(counters.opens(), 2);
    assert_eq!(counters.lookups_of("av_log_get_level"), 2);
}

#[test]
fn registries_are_independent() {
    let (first, first_counters) = stub_registry();
    let loader = StubLoader::new();
    let second_counters = loader.counters();
    let second = Registry::with_loader(
        LibraryConfig::default().with_path(Component::AvUtil, "stub/elsewhere.so"),
        loader,
    );

    assert!(first.avutil().version().is_ok());
    assert!(second.avutil().version().is_err());
    assert_eq!(first_counters.opens(), 1);
    assert_eq!(second_counters.opens(), 0);
}

#[test]
fn stats_count_real_work_only() {
    let (registry, _) = stub_registry();

    for _ in 0..3 {
        registry.version(Component::AvUtil).unwrap();
    }

    let stats = registry.stats();
    assert_eq!(stats.libraries_opened, 1);
    // One lookup for the version check on open, one for the memoized call.
    assert_eq!(stats.symbol_lookups, 2);
}

#[test]
fn typed_function_calls_through() {
    let (registry, _) = stub_registry();
    let f = unsafe {
        registry
            .function::<VersionFn>(Component::AvFilter, c"avfilter_version")
            .unwrap()
    };
    assert_eq!(unsafe { (f.get())() } >> 16, 7);
}
