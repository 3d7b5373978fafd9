//! Stand-in for a tiny slice of libavutil 56 / libavfilter 7.
//!
//! Every exported function keeps the FFmpeg 4.4 prototype and struct layout
//! so a binding cannot tell it apart from the real thing for these symbols.

use std::alloc::{Layout, alloc, dealloc};
use std::ffi::{CStr, CString, c_void};
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

const fn version(major: c_uint, minor: c_uint, micro: c_uint) -> c_uint {
    (major << 16) | (minor << 8) | micro
}

/// Static data holding raw pointers into other statics.
#[repr(transparent)]
struct Table<T>(T);

// SAFETY: tables are immutable and only point at immutable statics.
unsafe impl<T> Sync for Table<T> {}

// ---------------------------------------------------------------------------
// libavutil: build information
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn avutil_version() -> c_uint {
    version(56, 70, 100)
}

#[unsafe(no_mangle)]
pub extern "C" fn avutil_configuration() -> *const c_char {
    c"--enable-stub --disable-programs".as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn avutil_license() -> *const c_char {
    c"LGPL version 2.1 or later".as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn av_version_info() -> *const c_char {
    c"4.4-stub".as_ptr()
}

// ---------------------------------------------------------------------------
// libavutil: errors and logging
// ---------------------------------------------------------------------------

const fn fferrtag(a: u8, b: u8, c: u8, d: u8) -> c_int {
    -((a as c_int) | ((b as c_int) << 8) | ((c as c_int) << 16) | ((d as c_int) << 24))
}

const EINVAL: c_int = 22;

const ERROR_MESSAGES: [(c_int, &CStr); 6] = [
    (fferrtag(b'E', b'O', b'F', b' '), c"End of file"),
    (fferrtag(b'I', b'N', b'D', b'A'), c"Invalid data found when processing input"),
    (fferrtag(0xF8, b'F', b'I', b'L'), c"Filter not found"),
    (-11, c"Resource temporarily unavailable"),
    (-12, c"Cannot allocate memory"),
    (-EINVAL, c"Invalid argument"),
];

fn write_truncated(buf: *mut c_char, size: usize, msg: &[u8]) {
    let n = msg.len().min(size - 1);
    // SAFETY:
    // - Callers checked `buf` is non-null and `size > 0`.
    // - FFI contract requires `buf` to be writable for `size` bytes.
    unsafe {
        ptr::copy_nonoverlapping(msg.as_ptr(), buf.cast::<u8>(), n);
        *buf.add(n) = 0;
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn av_strerror(errnum: c_int, errbuf: *mut c_char, errbuf_size: usize) -> c_int {
    if errbuf.is_null() || errbuf_size == 0 {
        return -EINVAL;
    }
    match ERROR_MESSAGES.iter().find(|(code, _)| *code == errnum) {
        Some((_, msg)) => {
            write_truncated(errbuf, errbuf_size, msg.to_bytes());
            0
        }
        None => {
            let msg = format!("Error number {errnum} occurred");
            write_truncated(errbuf, errbuf_size, msg.as_bytes());
            -EINVAL
        }
    }
}

static LOG_LEVEL: AtomicI32 = AtomicI32::new(32);

#[unsafe(no_mangle)]
pub extern "C" fn av_log_get_level() -> c_int {
    LOG_LEVEL.load(Ordering::Relaxed)
}

#[unsafe(no_mangle)]
pub extern "C" fn av_log_set_level(level: c_int) {
    LOG_LEVEL.store(level, Ordering::Relaxed);
}

#[unsafe(no_mangle)]
pub extern "C" fn av_get_media_type_string(media_type: c_int) -> *const c_char {
    match media_type {
        0 => c"video".as_ptr(),
        1 => c"audio".as_ptr(),
        2 => c"data".as_ptr(),
        3 => c"subtitle".as_ptr(),
        4 => c"attachment".as_ptr(),
        _ => ptr::null(),
    }
}

// ---------------------------------------------------------------------------
// libavutil: memory
// ---------------------------------------------------------------------------

const ALLOC_ALIGN: usize = 16;
// Room in front of each block for its size.
const HEADER: usize = ALLOC_ALIGN;

static LIVE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Blocks handed out by `av_malloc` and not yet passed to `av_free`.
pub fn live_allocations() -> usize {
    LIVE_ALLOCATIONS.load(Ordering::SeqCst)
}

fn block_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.checked_add(HEADER)?, ALLOC_ALIGN).ok()
}

#[unsafe(no_mangle)]
pub extern "C" fn av_malloc(size: usize) -> *mut c_void {
    let Some(layout) = block_layout(size) else {
        return ptr::null_mut();
    };
    // SAFETY: `layout` has a non-zero size (at least HEADER).
    let base = unsafe { alloc(layout) };
    if base.is_null() {
        return ptr::null_mut();
    }
    LIVE_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
    // SAFETY: `base` is aligned for usize and HEADER bytes long at least.
    unsafe {
        base.cast::<usize>().write(size);
        base.add(HEADER).cast()
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn av_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    // SAFETY:
    // - FFI contract requires `ptr` to come from `av_malloc`, so the header
    //   sits HEADER bytes before it and records the requested size.
    unsafe {
        let base = ptr.cast::<u8>().sub(HEADER);
        let size = base.cast::<usize>().read();
        if let Some(layout) = block_layout(size) {
            dealloc(base, layout);
        }
    }
    LIVE_ALLOCATIONS.fetch_sub(1, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// libavutil: rationals
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AVRational {
    pub num: c_int,
    pub den: c_int,
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

#[unsafe(no_mangle)]
pub extern "C" fn av_mul_q(b: AVRational, c: AVRational) -> AVRational {
    let mut num = i64::from(b.num) * i64::from(c.num);
    let mut den = i64::from(b.den) * i64::from(c.den);
    let g = gcd(num, den);
    if g > 1 {
        num /= g;
        den /= g;
    }
    if den < 0 {
        num = -num;
        den = -den;
    }
    AVRational {
        num: num.clamp(c_int::MIN.into(), c_int::MAX.into()) as c_int,
        den: den.clamp(c_int::MIN.into(), c_int::MAX.into()) as c_int,
    }
}

/// `AV_NOPTS_VALUE`, returned for a zero divisor.
pub const AV_NOPTS_VALUE: i64 = i64::MIN;

#[unsafe(no_mangle)]
pub extern "C" fn av_rescale_q(a: i64, bq: AVRational, cq: AVRational) -> i64 {
    let b = i128::from(bq.num) * i128::from(cq.den);
    let c = i128::from(cq.num) * i128::from(bq.den);
    if c == 0 {
        return AV_NOPTS_VALUE;
    }
    let (n, d) = if c < 0 { (-(i128::from(a) * b), -c) } else { (i128::from(a) * b, c) };
    // Round half away from zero (AV_ROUND_NEAR_INF).
    let r = if n >= 0 { (n + d / 2) / d } else { -((-n + d / 2) / d) };
    r.clamp(i64::MIN.into(), i64::MAX.into()) as i64
}

// ---------------------------------------------------------------------------
// libavutil: pixel formats
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy)]
pub struct AVComponentDescriptor {
    pub plane: c_int,
    pub step: c_int,
    pub offset: c_int,
    pub shift: c_int,
    pub depth: c_int,
    pub step_minus1: c_int,
    pub depth_minus1: c_int,
    pub offset_plus1: c_int,
}

#[repr(C)]
pub struct AVPixFmtDescriptor {
    pub name: *const c_char,
    pub nb_components: u8,
    pub log2_chroma_w: u8,
    pub log2_chroma_h: u8,
    pub flags: u64,
    pub comp: [AVComponentDescriptor; 4],
    pub alias: *const c_char,
}

const fn comp(plane: c_int, step: c_int, offset: c_int, depth: c_int) -> AVComponentDescriptor {
    AVComponentDescriptor {
        plane,
        step,
        offset,
        shift: 0,
        depth,
        step_minus1: step - 1,
        depth_minus1: depth - 1,
        offset_plus1: offset + 1,
    }
}

const NO_COMP: AVComponentDescriptor = comp(0, 0, 0, 0);
const FLAG_PLANAR: u64 = 1 << 4;
const FLAG_RGB: u64 = 1 << 5;

const fn desc(
    name: &'static CStr,
    log2_chroma: (u8, u8),
    flags: u64,
    c: [AVComponentDescriptor; 3],
) -> AVPixFmtDescriptor {
    AVPixFmtDescriptor {
        name: name.as_ptr(),
        nb_components: 3,
        log2_chroma_w: log2_chroma.0,
        log2_chroma_h: log2_chroma.1,
        flags,
        comp: [c[0], c[1], c[2], NO_COMP],
        alias: ptr::null(),
    }
}

// Indexed by AVPixelFormat, like libavutil's own table.
static PIX_FMT_DESCRIPTORS: Table<[AVPixFmtDescriptor; 4]> = Table([
    desc(c"yuv420p", (1, 1), FLAG_PLANAR, [comp(0, 1, 0, 8), comp(1, 1, 0, 8), comp(2, 1, 0, 8)]),
    desc(c"yuyv422", (1, 0), 0, [comp(0, 2, 0, 8), comp(0, 4, 1, 8), comp(0, 4, 3, 8)]),
    desc(c"rgb24", (0, 0), FLAG_RGB, [comp(0, 3, 0, 8), comp(0, 3, 1, 8), comp(0, 3, 2, 8)]),
    desc(c"bgr24", (0, 0), FLAG_RGB, [comp(0, 3, 2, 8), comp(0, 3, 1, 8), comp(0, 3, 0, 8)]),
]);

#[unsafe(no_mangle)]
pub extern "C" fn av_pix_fmt_desc_get(pix_fmt: c_int) -> *const AVPixFmtDescriptor {
    usize::try_from(pix_fmt)
        .ok()
        .and_then(|i| PIX_FMT_DESCRIPTORS.0.get(i))
        .map_or(ptr::null(), |d| d as *const _)
}

#[unsafe(no_mangle)]
pub extern "C" fn av_get_pix_fmt_name(pix_fmt: c_int) -> *const c_char {
    let desc = av_pix_fmt_desc_get(pix_fmt);
    if desc.is_null() {
        return ptr::null();
    }
    // SAFETY: non-null descriptors point into the static table.
    unsafe { (*desc).name }
}

#[unsafe(no_mangle)]
pub extern "C" fn av_get_pix_fmt(name: *const c_char) -> c_int {
    if name.is_null() {
        return -1;
    }
    // SAFETY: FFI contract requires a NUL-terminated string.
    let name = unsafe { CStr::from_ptr(name) };
    PIX_FMT_DESCRIPTORS
        .0
        .iter()
        .position(|d| {
            // SAFETY: table names are static C string literals.
            (unsafe { CStr::from_ptr(d.name) }) == name
        })
        .map_or(-1, |i| i as c_int)
}

// ---------------------------------------------------------------------------
// libavutil: dictionaries
// ---------------------------------------------------------------------------

const AV_DICT_MATCH_CASE: c_int = 1;
const AV_DICT_IGNORE_SUFFIX: c_int = 2;
const AV_DICT_DONT_OVERWRITE: c_int = 16;
const AV_DICT_APPEND: c_int = 32;

#[repr(C)]
pub struct AVDictionaryEntry {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

impl AVDictionaryEntry {
    fn key(&self) -> &CStr {
        // SAFETY: keys are CStrings owned by the dictionary.
        unsafe { CStr::from_ptr(self.key) }
    }

    fn value(&self) -> &CStr {
        // SAFETY: values are CStrings owned by the dictionary.
        unsafe { CStr::from_ptr(self.value) }
    }

    fn free(self) {
        // SAFETY: both were produced by `CString::into_raw`.
        unsafe {
            drop(CString::from_raw(self.key));
            drop(CString::from_raw(self.value));
        }
    }
}

pub struct AVDictionary {
    entries: Vec<AVDictionaryEntry>,
}

impl Drop for AVDictionary {
    fn drop(&mut self) {
        for entry in self.entries.drain(..) {
            entry.free();
        }
    }
}

fn key_matches(query: &[u8], key: &[u8], flags: c_int) -> bool {
    if key.len() < query.len() {
        return false;
    }
    let prefix = &key[..query.len()];
    let same = if flags & AV_DICT_MATCH_CASE != 0 {
        prefix == query
    } else {
        prefix.eq_ignore_ascii_case(query)
    };
    same && (key.len() == query.len() || flags & AV_DICT_IGNORE_SUFFIX != 0)
}

#[unsafe(no_mangle)]
pub extern "C" fn av_dict_get(
    m: *const AVDictionary,
    key: *const c_char,
    prev: *const AVDictionaryEntry,
    flags: c_int,
) -> *mut AVDictionaryEntry {
    if m.is_null() || key.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: FFI contract: `m` is a live dictionary and `key` a C string.
    let (dict, query) = unsafe { (&*m, CStr::from_ptr(key).to_bytes()) };
    let start = if prev.is_null() {
        0
    } else {
        // SAFETY: `prev` was returned by an earlier call on the unmodified `m`.
        unsafe { prev.offset_from(dict.entries.as_ptr()) as usize + 1 }
    };
    dict.entries
        .iter()
        .skip(start)
        .find(|e| key_matches(query, e.key().to_bytes(), flags))
        .map_or(ptr::null_mut(), |e| e as *const _ as *mut _)
}

#[unsafe(no_mangle)]
pub extern "C" fn av_dict_set(
    pm: *mut *mut AVDictionary,
    key: *const c_char,
    value: *const c_char,
    flags: c_int,
) -> c_int {
    if pm.is_null() || key.is_null() {
        return -EINVAL;
    }
    // SAFETY: FFI contract: `pm` points to a dictionary pointer (possibly
    // null) and `key`/`value` are C strings or null.
    let (slot, key, value) = unsafe {
        (
            &mut *pm,
            CStr::from_ptr(key),
            (!value.is_null()).then(|| CStr::from_ptr(value)),
        )
    };
    if slot.is_null() {
        *slot = Box::into_raw(Box::new(AVDictionary { entries: Vec::new() }));
    }
    // SAFETY: just ensured non-null; owned by the caller's slot.
    let dict = unsafe { &mut **slot };

    let existing = dict
        .entries
        .iter()
        .position(|e| key_matches(key.to_bytes(), e.key().to_bytes(), flags & AV_DICT_MATCH_CASE));
    let mut new_value = value.map(CStr::to_owned);
    if let Some(i) = existing {
        if flags & AV_DICT_DONT_OVERWRITE != 0 {
            return 0;
        }
        let old = dict.entries.swap_remove(i);
        if flags & AV_DICT_APPEND != 0 {
            if let Some(v) = &new_value {
                let mut joined = old.value().to_bytes().to_vec();
                joined.extend_from_slice(v.to_bytes());
                // Both halves came from C strings, so no interior NUL.
                new_value = CString::new(joined).ok();
            }
        }
        old.free();
    }
    if let Some(v) = new_value {
        dict.entries.push(AVDictionaryEntry {
            key: key.to_owned().into_raw(),
            value: v.into_raw(),
        });
    }
    if dict.entries.is_empty() {
        // SAFETY: allocated by `Box::into_raw` above or in an earlier call.
        drop(unsafe { Box::from_raw(*slot) });
        *slot = ptr::null_mut();
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn av_dict_count(m: *const AVDictionary) -> c_int {
    if m.is_null() {
        return 0;
    }
    // SAFETY: FFI contract: `m` is a live dictionary.
    unsafe { (*m).entries.len() as c_int }
}

#[unsafe(no_mangle)]
pub extern "C" fn av_dict_free(pm: *mut *mut AVDictionary) {
    if pm.is_null() {
        return;
    }
    // SAFETY: FFI contract: `pm` points to null or a dictionary from `av_dict_set`.
    unsafe {
        if !(*pm).is_null() {
            drop(Box::from_raw(*pm));
            *pm = ptr::null_mut();
        }
    }
}

// ---------------------------------------------------------------------------
// libavfilter
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn avfilter_version() -> c_uint {
    version(7, 110, 100)
}

#[unsafe(no_mangle)]
pub extern "C" fn avfilter_configuration() -> *const c_char {
    c"--enable-stub --disable-programs".as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn avfilter_license() -> *const c_char {
    c"LGPL version 2.1 or later".as_ptr()
}

/// Private to the stub; bindings only see it through `avfilter_pad_*`.
#[repr(C)]
pub struct AVFilterPad {
    name: *const c_char,
    media_type: c_int,
}

#[repr(C)]
pub struct AVFilter {
    pub name: *const c_char,
    pub description: *const c_char,
    pub inputs: *const AVFilterPad,
    pub outputs: *const AVFilterPad,
    pub priv_class: *const c_void,
    pub flags: c_int,
}

const AVFILTER_FLAG_DYNAMIC_OUTPUTS: c_int = 1 << 1;
const AVFILTER_FLAG_SUPPORT_TIMELINE_GENERIC: c_int = 1 << 16;

const PAD_END: AVFilterPad = AVFilterPad {
    name: ptr::null(),
    media_type: -1,
};

static VIDEO_PADS: Table<[AVFilterPad; 2]> = Table([
    AVFilterPad {
        name: c"default".as_ptr(),
        media_type: 0,
    },
    PAD_END,
]);

static AUDIO_PADS: Table<[AVFilterPad; 2]> = Table([
    AVFilterPad {
        name: c"default".as_ptr(),
        media_type: 1,
    },
    PAD_END,
]);

static FILTERS: Table<[AVFilter; 4]> = Table([
    AVFilter {
        name: c"null".as_ptr(),
        description: c"Pass the source unchanged to the output.".as_ptr(),
        inputs: VIDEO_PADS.0.as_ptr(),
        outputs: VIDEO_PADS.0.as_ptr(),
        priv_class: ptr::null(),
        flags: AVFILTER_FLAG_SUPPORT_TIMELINE_GENERIC,
    },
    AVFilter {
        name: c"anull".as_ptr(),
        description: c"Pass the source unchanged to the output.".as_ptr(),
        inputs: AUDIO_PADS.0.as_ptr(),
        outputs: AUDIO_PADS.0.as_ptr(),
        priv_class: ptr::null(),
        flags: AVFILTER_FLAG_SUPPORT_TIMELINE_GENERIC,
    },
    AVFilter {
        name: c"nullsink".as_ptr(),
        description: c"Do absolutely nothing with the input video.".as_ptr(),
        inputs: VIDEO_PADS.0.as_ptr(),
        outputs: ptr::null(),
        priv_class: ptr::null(),
        flags: 0,
    },
    AVFilter {
        name: c"split".as_ptr(),
        description: c"Pass on the input to N video outputs.".as_ptr(),
        inputs: VIDEO_PADS.0.as_ptr(),
        outputs: ptr::null(),
        priv_class: ptr::null(),
        flags: AVFILTER_FLAG_DYNAMIC_OUTPUTS,
    },
]);

#[unsafe(no_mangle)]
pub extern "C" fn av_filter_iterate(opaque: *mut *mut c_void) -> *const AVFilter {
    if opaque.is_null() {
        return ptr::null();
    }
    // SAFETY: FFI contract: `opaque` points to the caller's iteration state,
    // initially null. The state is the next index.
    unsafe {
        let idx = *opaque as usize;
        match FILTERS.0.get(idx) {
            Some(filter) => {
                *opaque = (idx + 1) as *mut c_void;
                filter as *const AVFilter
            }
            None => ptr::null(),
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn avfilter_get_by_name(name: *const c_char) -> *const AVFilter {
    if name.is_null() {
        return ptr::null();
    }
    // SAFETY: FFI contract requires a NUL-terminated string.
    let name = unsafe { CStr::from_ptr(name) };
    FILTERS
        .0
        .iter()
        .find(|f| {
            // SAFETY: filter names are static C string literals.
            (unsafe { CStr::from_ptr(f.name) }) == name
        })
        .map_or(ptr::null(), |f| f as *const _)
}

#[unsafe(no_mangle)]
pub extern "C" fn avfilter_pad_count(pads: *const AVFilterPad) -> c_int {
    if pads.is_null() {
        return 0;
    }
    let mut count = 0;
    // SAFETY: pad arrays end with a null-named entry.
    unsafe {
        while !(*pads.add(count)).name.is_null() {
            count += 1;
        }
    }
    count as c_int
}

#[unsafe(no_mangle)]
pub extern "C" fn avfilter_pad_get_name(pads: *const AVFilterPad, pad_idx: c_int) -> *const c_char {
    // SAFETY: FFI contract: `pad_idx` is below `avfilter_pad_count(pads)`.
    unsafe { (*pads.add(pad_idx as usize)).name }
}

#[unsafe(no_mangle)]
pub extern "C" fn avfilter_pad_get_type(pads: *const AVFilterPad, pad_idx: c_int) -> c_int {
    // SAFETY: as for `avfilter_pad_get_name`.
    unsafe { (*pads.add(pad_idx as usize)).media_type }
}
