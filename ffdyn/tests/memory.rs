//! Kept in its own test binary: it compares the stub's global allocation
//! count, which concurrently running tests would disturb.

mod common;

use common::stub_registry;

#[test]
fn av_buffer_is_freed_with_the_library_allocator() {
    let baseline = ffmpeg_stub::live_allocations();
    let (registry, _) = stub_registry();
    let avutil = registry.avutil();

    let mut buf = avutil.alloc(64).unwrap();
    assert_eq!(buf.len(), 64);
    assert_eq!(ffmpeg_stub::live_allocations(), baseline + 1);

    buf.as_mut_slice().fill(0xab);
    assert!(buf.as_slice().iter().all(|&b| b == 0xab));

    let mut empty = avutil.alloc(0).unwrap();
    assert!(empty.is_empty());
    assert!(empty.as_slice().is_empty());
    assert!(empty.as_mut_slice().is_empty());
    drop(empty);

    // The buffer keeps libavutil alive across teardown.
    registry.close_all();
    drop(buf);
    assert_eq!(ffmpeg_stub::live_allocations(), baseline);
}

