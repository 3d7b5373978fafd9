//! libavutil wrappers.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::abi::{
    AV_DICT_IGNORE_SUFFIX, AV_ERROR_MAX_STRING_SIZE, AV_PIX_FMT_FLAG_ALPHA, AV_PIX_FMT_FLAG_BAYER,
    AV_PIX_FMT_FLAG_BE, AV_PIX_FMT_FLAG_BITSTREAM, AV_PIX_FMT_FLAG_FLOAT, AV_PIX_FMT_FLAG_HWACCEL,
    AV_PIX_FMT_FLAG_PAL, AV_PIX_FMT_FLAG_PLANAR, AV_PIX_FMT_FLAG_RGB, AV_PIX_FMT_NONE,
    AVComponentDescriptor, AVDictionary, AVDictionaryEntry, AVPixFmtDescriptor, AVRational,
    MediaType, Mirrored,
};
use crate::component::{Component, ComponentInfo, LibVersion};
use crate::error::{FfError, Result};
use crate::marshal;
use crate::registry::{NativeFn, Registry, StaticStringFn};

/// `av_strerror`
pub type StrerrorFn = unsafe extern "C" fn(c_int, *mut c_char, usize) -> c_int;
/// `av_get_media_type_string`
pub type MediaTypeStringFn = unsafe extern "C" fn(c_int) -> *const c_char;
/// `av_malloc`
pub type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
/// `av_free`
pub type FreeFn = unsafe extern "C" fn(*mut c_void);
/// `av_log_get_level`
pub type LogGetLevelFn = unsafe extern "C" fn() -> c_int;
/// `av_log_set_level`
pub type LogSetLevelFn = unsafe extern "C" fn(c_int);
/// `av_mul_q`
pub type MulQFn = unsafe extern "C" fn(AVRational, AVRational) -> AVRational;
/// `av_rescale_q`
pub type RescaleQFn = unsafe extern "C" fn(i64, AVRational, AVRational) -> i64;
/// `av_get_pix_fmt_name`
pub type PixFmtNameFn = unsafe extern "C" fn(c_int) -> *const c_char;
/// `av_get_pix_fmt`
pub type PixFmtByNameFn = unsafe extern "C" fn(*const c_char) -> c_int;
/// `av_pix_fmt_desc_get`
pub type PixFmtDescGetFn = unsafe extern "C" fn(c_int) -> *const AVPixFmtDescriptor;
/// `av_dict_set`
pub type DictSetFn =
    unsafe extern "C" fn(*mut *mut AVDictionary, *const c_char, *const c_char, c_int) -> c_int;
/// `av_dict_get`. An empty key with `AV_DICT_IGNORE_SUFFIX` walks every entry
/// after `prev`.
pub type DictGetFn = unsafe extern "C" fn(
    *const AVDictionary,
    *const c_char,
    *const AVDictionaryEntry,
    c_int,
) -> *mut AVDictionaryEntry;
/// `av_dict_count`
pub type DictCountFn = unsafe extern "C" fn(*const AVDictionary) -> c_int;
/// `av_dict_free`
pub type DictFreeFn = unsafe extern "C" fn(*mut *mut AVDictionary);

/// Print no output.
pub const AV_LOG_QUIET: c_int = -8;
/// Something went really wrong and we will crash now.
pub const AV_LOG_PANIC: c_int = 0;
/// Unrecoverable error.
pub const AV_LOG_FATAL: c_int = 8;
/// Recoverable error.
pub const AV_LOG_ERROR: c_int = 16;
/// Something might be wrong.
pub const AV_LOG_WARNING: c_int = 24;
/// Standard information.
pub const AV_LOG_INFO: c_int = 32;
/// Detailed information.
pub const AV_LOG_VERBOSE: c_int = 40;
/// Only useful for libav* developers.
pub const AV_LOG_DEBUG: c_int = 48;
/// Extremely verbose debugging.
pub const AV_LOG_TRACE: c_int = 56;

/// `FFERRTAG`: negated four-character code.
pub const fn fferrtag(a: u8, b: u8, c: u8, d: u8) -> c_int {
    -((a as c_int) | ((b as c_int) << 8) | ((c as c_int) << 16) | ((d as c_int) << 24))
}

/// End of file.
pub const AVERROR_EOF: c_int = fferrtag(b'E', b'O', b'F', b' ');
/// Invalid data found when processing input.
pub const AVERROR_INVALIDDATA: c_int = fferrtag(b'I', b'N', b'D', b'A');
/// Filter not found.
pub const AVERROR_FILTER_NOT_FOUND: c_int = fferrtag(0xF8, b'F', b'I', b'L');
/// Option not found.
pub const AVERROR_OPTION_NOT_FOUND: c_int = fferrtag(0xF8, b'O', b'P', b'T');
/// Unknown error, typically from an external library.
pub const AVERROR_UNKNOWN: c_int = fferrtag(b'U', b'N', b'K', b'N');

/// libavutil bound to a registry.
#[derive(Clone, Copy, Debug)]
pub struct AvUtil<'r> {
    registry: &'r Registry,
}

impl<'r> AvUtil<'r> {
    /// Wraps `registry`. Nothing is loaded until the first call.
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// # Safety
    /// `F` must match the C prototype of `name`.
    unsafe fn function<F: Copy>(&self, name: &'static CStr) -> Result<NativeFn<F>> {
        // SAFETY: forwarded to the caller.
        unsafe { self.registry.function(Component::AvUtil, name) }
    }

    /// # Safety
    /// `ptr` must be null or a NUL-terminated string owned by libavutil.
    unsafe fn read_string(&self, ptr: *const c_char) -> Result<String> {
        // SAFETY: forwarded to the caller; bounded by configuration.
        unsafe { marshal::from_c_string_bounded(ptr, self.registry.max_string_len()) }
    }

    /// `avutil_version`, unpacked.
    pub fn version(&self) -> Result<LibVersion> {
        self.registry.version(Component::AvUtil)
    }

    /// Configure flags libavutil was built with.
    pub fn configuration(&self) -> Result<String> {
        self.registry
            .static_string(Component::AvUtil, Component::AvUtil.configuration_symbol())
    }

    /// License libavutil was built under.
    pub fn license(&self) -> Result<String> {
        self.registry
            .static_string(Component::AvUtil, Component::AvUtil.license_symbol())
    }

    /// Version, configuration and license in one value.
    pub fn info(&self) -> Result<ComponentInfo> {
        self.registry.component_info(Component::AvUtil)
    }

    /// FFmpeg release string, e.g. `4.4.2`.
    pub fn version_info(&self) -> Result<String> {
        // SAFETY: `const char *av_version_info(void)`, static data.
        let f = unsafe { self.function::<StaticStringFn>(c"av_version_info")? };
        // SAFETY: no arguments; the result is static data `f` keeps mapped.
        unsafe { self.read_string((f.get())()) }
    }

    /// Describes an FFmpeg error code. Unknown codes still produce FFmpeg's
    /// generic message.
    pub fn strerror(&self, code: c_int) -> Result<String> {
        // SAFETY: `int av_strerror(int, char *, size_t)`.
        let f = unsafe { self.function::<StrerrorFn>(c"av_strerror")? };
        let mut buf = [0u8; AV_ERROR_MAX_STRING_SIZE];
        // SAFETY: `buf` is writable for its full length, which is passed along.
        let ret = unsafe { (f.get())(code, buf.as_mut_ptr().cast(), buf.len()) };
        if ret < 0 {
            debug!(code, "av_strerror has no description for code");
        }
        marshal::from_c_buffer(&buf)
    }

    /// Maps a negative return code of `function` to [`FfError::Native`],
    /// passing non-negative codes through.
    pub fn check(&self, function: &'static str, code: c_int) -> Result<c_int> {
        if code >= 0 {
            return Ok(code);
        }
        let message = self
            .strerror(code)
            .unwrap_or_else(|_| format!("error code {code}"));
        Err(FfError::Native {
            function,
            code,
            message,
        })
    }

    /// `"video"`, `"audio"`, ...; `None` for `AVMEDIA_TYPE_UNKNOWN`.
    pub fn media_type_string(&self, media_type: MediaType) -> Result<Option<String>> {
        // SAFETY: `const char *av_get_media_type_string(enum AVMediaType)`.
        let f = unsafe { self.function::<MediaTypeStringFn>(c"av_get_media_type_string")? };
        // SAFETY: any enum value is accepted; unknown ones return NULL.
        let ptr = unsafe { (f.get())(media_type.as_raw()) };
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null results are static literals of libavutil.
        unsafe { self.read_string(ptr) }.map(Some)
    }

    /// Current `av_log` level.
    pub fn log_level(&self) -> Result<c_int> {
        // SAFETY: `int av_log_get_level(void)`.
        let f = unsafe { self.function::<LogGetLevelFn>(c"av_log_get_level")? };
        // SAFETY: no arguments, no preconditions.
        Ok(unsafe { (f.get())() })
    }

    /// Sets the `av_log` level, one of the `AV_LOG_*` constants.
    pub fn set_log_level(&self, level: c_int) -> Result<()> {
        // SAFETY: `void av_log_set_level(int)`.
        let f = unsafe { self.function::<LogSetLevelFn>(c"av_log_set_level")? };
        // SAFETY: any level is accepted.
        unsafe { (f.get())(level) };
        Ok(())
    }

    /// `b * c`, reduced.
    pub fn mul_q(&self, b: AVRational, c: AVRational) -> Result<AVRational> {
        // SAFETY: `AVRational av_mul_q(AVRational, AVRational)`, by value.
        let f = unsafe { self.function::<MulQFn>(c"av_mul_q")? };
        // SAFETY: pure arithmetic on values.
        Ok(unsafe { (f.get())(b, c) })
    }

    /// `a * bq / cq`, rounded to nearest.
    pub fn rescale_q(&self, a: i64, bq: AVRational, cq: AVRational) -> Result<i64> {
        // SAFETY: `int64_t av_rescale_q(int64_t, AVRational, AVRational)`.
        let f = unsafe { self.function::<RescaleQFn>(c"av_rescale_q")? };
        // SAFETY: pure arithmetic on values.
        Ok(unsafe { (f.get())(a, bq, cq) })
    }

    /// Name of pixel format `pix_fmt`, or `None` if it is out of range.
    pub fn pix_fmt_name(&self, pix_fmt: c_int) -> Result<Option<String>> {
        // SAFETY: `const char *av_get_pix_fmt_name(enum AVPixelFormat)`.
        let f = unsafe { self.function::<PixFmtNameFn>(c"av_get_pix_fmt_name")? };
        // SAFETY: out-of-range formats return NULL.
        let ptr = unsafe { (f.get())(pix_fmt) };
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY: names live in libavutil's static descriptor table.
        unsafe { self.read_string(ptr) }.map(Some)
    }

    /// Pixel format called `name`, or `None` if libavutil does not know it.
    pub fn pix_fmt_by_name(&self, name: &str) -> Result<Option<c_int>> {
        let name = marshal::to_c_string(name)?;
        // SAFETY: `enum AVPixelFormat av_get_pix_fmt(const char *)`.
        let f = unsafe { self.function::<PixFmtByNameFn>(c"av_get_pix_fmt")? };
        // SAFETY: `name` is NUL-terminated and outlives the call.
        let fmt = unsafe { (f.get())(name.as_ptr()) };
        Ok((fmt != AV_PIX_FMT_NONE).then_some(fmt))
    }

    fn pix_fmt_desc_ptr(&self, pix_fmt: c_int) -> Result<(*const AVPixFmtDescriptor, NativeFn<PixFmtDescGetFn>)> {
        // SAFETY: `const AVPixFmtDescriptor *av_pix_fmt_desc_get(enum AVPixelFormat)`.
        let f = unsafe { self.function::<PixFmtDescGetFn>(c"av_pix_fmt_desc_get")? };
        // SAFETY: out-of-range formats return NULL.
        let ptr = unsafe { (f.get())(pix_fmt) };
        Ok((ptr, f))
    }

    /// Copies the descriptor of `pix_fmt` out of the library's table.
    pub fn pix_fmt_descriptor(&self, pix_fmt: c_int) -> Result<Option<PixFmtInfo>> {
        let (ptr, _keep) = self.pix_fmt_desc_ptr(pix_fmt)?;
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY:
        // - Non-null descriptors point into libavutil's static table, which
        //   `_keep` holds mapped.
        // - The layout is the mirrored 56.x one; see `verify_pix_fmt_layout`.
        let desc = unsafe { &*ptr };
        let nb = usize::from(desc.nb_components).min(desc.comp.len());
        Ok(Some(PixFmtInfo {
            // SAFETY: descriptor names are static strings.
            name: unsafe { self.read_string(desc.name)? },
            nb_components: desc.nb_components,
            log2_chroma_w: desc.log2_chroma_w,
            log2_chroma_h: desc.log2_chroma_h,
            flags: desc.flags,
            components: desc.comp[..nb].to_vec(),
            alias: if desc.alias.is_null() {
                None
            } else {
                // SAFETY: as for `name`.
                Some(unsafe { self.read_string(desc.alias)? })
            },
        }))
    }

    /// Measures the stride of the loaded library's descriptor table and
    /// compares it with the Rust mirror.
    pub fn verify_pix_fmt_layout(&self) -> Result<()> {
        let (first, _keep) = self.pix_fmt_desc_ptr(0)?;
        let (second, _) = self.pix_fmt_desc_ptr(1)?;
        if first.is_null() || second.is_null() {
            return Err(FfError::NullPointer("av_pix_fmt_desc_get"));
        }
        let stride = (second as usize).wrapping_sub(first as usize);
        if stride != size_of::<AVPixFmtDescriptor>() {
            return Err(FfError::LayoutMismatch {
                type_name: AVPixFmtDescriptor::C_NAME,
                expected: size_of::<AVPixFmtDescriptor>(),
                found: stride,
            });
        }
        debug!(stride, "pixel format descriptor layout verified");
        Ok(())
    }

    /// Allocates `size` bytes with `av_malloc`.
    pub fn alloc(&self, size: usize) -> Result<AvBuffer> {
        // SAFETY: `void *av_malloc(size_t)` / `void av_free(void *)`.
        let malloc = unsafe { self.function::<MallocFn>(c"av_malloc")? };
        let free = unsafe { self.function::<FreeFn>(c"av_free")? };
        // SAFETY: any size is accepted; failure returns NULL.
        let ptr = unsafe { (malloc.get())(size) };
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or(FfError::NullPointer("av_malloc"))?;
        Ok(AvBuffer {
            ptr,
            len: size,
            free,
        })
    }

    /// An empty dictionary.
    ///
    /// Every `av_dict_*` function it uses is resolved here, so the entries are
    /// always allocated, read and freed by the same library even if the
    /// registry is closed and pointed elsewhere in the meantime.
    pub fn dictionary(&self) -> Result<Dictionary<'r>> {
        // SAFETY: prototypes per `libavutil/dict.h`; see the `Dict*Fn` aliases.
        let (set, get, count, free) = unsafe {
            (
                self.function::<DictSetFn>(c"av_dict_set")?,
                self.function::<DictGetFn>(c"av_dict_get")?,
                self.function::<DictCountFn>(c"av_dict_count")?,
                self.function::<DictFreeFn>(c"av_dict_free")?,
            )
        };
        Ok(Dictionary {
            util: *self,
            ptr: ptr::null_mut(),
            set,
            get,
            count,
            free,
        })
    }
}

/// Owned copy of an `AVPixFmtDescriptor`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixFmtInfo {
    /// Format name, e.g. `yuv420p`.
    pub name: String,
    /// Number of components, 1 to 4.
    pub nb_components: u8,
    /// Horizontal chroma subsampling shift.
    pub log2_chroma_w: u8,
    /// Vertical chroma subsampling shift.
    pub log2_chroma_h: u8,
    /// `AV_PIX_FMT_FLAG_*` bits.
    pub flags: u64,
    /// The first `nb_components` component descriptors.
    pub components: Vec<AVComponentDescriptor>,
    /// Alternative comma-separated names.
    pub alias: Option<String>,
}

impl PixFmtInfo {
    /// Lowercase names of the set `AV_PIX_FMT_FLAG_*` bits.
    pub fn flag_names(&self) -> Vec<&'static str> {
        const NAMES: [(u64, &str); 9] = [
            (AV_PIX_FMT_FLAG_BE, "be"),
            (AV_PIX_FMT_FLAG_PAL, "pal"),
            (AV_PIX_FMT_FLAG_BITSTREAM, "bitstream"),
            (AV_PIX_FMT_FLAG_HWACCEL, "hwaccel"),
            (AV_PIX_FMT_FLAG_PLANAR, "planar"),
            (AV_PIX_FMT_FLAG_RGB, "rgb"),
            (AV_PIX_FMT_FLAG_ALPHA, "alpha"),
            (AV_PIX_FMT_FLAG_BAYER, "bayer"),
            (AV_PIX_FMT_FLAG_FLOAT, "float"),
        ];
        NAMES
            .iter()
            .filter(|(bit, _)| self.flags & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }

    /// Bit depth of each component.
    pub fn bits_per_component(&self) -> Vec<c_int> {
        self.components.iter().map(|c| c.depth).collect()
    }
}

/// Memory from `av_malloc`, released with `av_free`.
pub struct AvBuffer {
    ptr: NonNull<u8>,
    len: usize,
    free: NativeFn<FreeFn>,
}

impl AvBuffer {
    /// Requested size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether zero bytes were requested.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of the allocation, for passing back to FFmpeg.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable start of the allocation.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Borrows the contents.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `av_malloc` returned at least `len` bytes, exclusively ours.
        unsafe { marshal::slice_from_ptr(self.ptr.as_ptr(), self.len) }
    }

    /// Mutably borrows the contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: as above; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AvBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated by the `av_malloc` of the library `free` keeps loaded.
        unsafe { (self.free.get())(self.ptr.as_ptr().cast()) };
    }
}

impl std::fmt::Debug for AvBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// An `AVDictionary`, freed with `av_dict_free`.
pub struct Dictionary<'r> {
    util: AvUtil<'r>,
    ptr: *mut AVDictionary,
    set: NativeFn<DictSetFn>,
    get: NativeFn<DictGetFn>,
    count: NativeFn<DictCountFn>,
    free: NativeFn<DictFreeFn>,
}

impl Dictionary<'_> {
    /// The underlying `AVDictionary *`, null while empty.
    pub fn as_ptr(&self) -> *const AVDictionary {
        self.ptr
    }

    /// Sets `key` to `value` with `AV_DICT_*` flags. `None` deletes the key.
    pub fn set_with_flags(&mut self, key: &str, value: Option<&str>, flags: c_int) -> Result<()> {
        let key = marshal::to_c_string(key)?;
        let value = value.map(marshal::to_c_string).transpose()?;
        let value_ptr = value.as_ref().map_or(ptr::null(), |v| v.as_ptr());
        // SAFETY: key and value outlive the call; the library copies them
        // (AV_DICT_DONT_STRDUP_* is never passed).
        let ret = unsafe { (self.set.get())(&mut self.ptr, key.as_ptr(), value_ptr, flags) };
        self.util.check("av_dict_set", ret).map(|_| ())
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_with_flags(key, Some(value), 0)
    }

    /// Deletes `key` if present.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.set_with_flags(key, None, 0)
    }

    /// Value of `key`, matched case-insensitively.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let key = marshal::to_c_string(key)?;
        // SAFETY: `ptr` is null or ours; `key` outlives the call.
        let entry = unsafe { (self.get.get())(self.ptr, key.as_ptr(), ptr::null(), 0) };
        if entry.is_null() {
            return Ok(None);
        }
        // SAFETY: entries stay valid until the dictionary is next modified,
        // which `&self` rules out.
        unsafe { self.util.read_string((*entry).value) }.map(Some)
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize> {
        // SAFETY: `ptr` is null or ours; NULL counts 0.
        let n = unsafe { (self.count.get())(self.ptr) };
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Whether the dictionary has no entries.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        let mut prev: *const AVDictionaryEntry = ptr::null();
        loop {
            // SAFETY: an empty key with IGNORE_SUFFIX matches every entry;
            // `prev` is null or the entry returned by the previous call.
            let entry = unsafe { (self.get.get())(self.ptr, c"".as_ptr(), prev, AV_DICT_IGNORE_SUFFIX) };
            if entry.is_null() {
                break;
            }
            // SAFETY: `entry` is a live entry of our dictionary, unmodified
            // while `&self` is held.
            let (key, value) = unsafe { ((*entry).key, (*entry).value) };
            // SAFETY: entry strings are NUL-terminated copies owned by the
            // dictionary.
            out.push(unsafe { (self.util.read_string(key)?, self.util.read_string(value)?) });
            prev = entry;
        }
        Ok(out)
    }
}

impl Drop for Dictionary<'_> {
    fn drop(&mut self) {
        // SAFETY: `ptr` is null or owned by us; av_dict_free accepts both.
        unsafe { (self.free.get())(&mut self.ptr) };
    }
}
