//! Conversions between Rust strings/slices and C buffers.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::error::{FfError, Result};

/// Copies `s` into a NUL-terminated buffer owned by the caller for the
/// duration of the native call.
pub fn to_c_string(s: &str) -> Result<CString> {
    Ok(CString::new(s)?)
}

/// Copies a NUL-terminated string out of native memory. Null yields an empty
/// string; invalid UTF-8 is replaced.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of this call. The scan is unbounded: a missing
/// terminator reads past the allocation. Prefer
/// [`from_c_string_bounded`] for anything not known to be terminated.
pub unsafe fn from_c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Like [`from_c_string`] but reads at most `max` bytes looking for the
/// terminator. The terminator counts towards the bound, so the longest
/// accepted string is `max - 1` bytes and `max == 0` rejects every non-null
/// pointer, including one to an empty string.
///
/// # Safety
/// `ptr` must be null, or every byte up to and including the terminator (or
/// the first `max` bytes, whichever comes first) must be readable.
pub unsafe fn from_c_string_bounded(ptr: *const c_char, max: usize) -> Result<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    let bytes = ptr.cast::<u8>();
    let mut len = 0;
    // SAFETY: only bytes before the terminator or the bound are read.
    while len < max && unsafe { bytes.add(len).read() } != 0 {
        len += 1;
    }
    if len == max {
        return Err(FfError::Unterminated { max });
    }
    // SAFETY: the `len` bytes just scanned are readable.
    let slice = unsafe { std::slice::from_raw_parts(bytes, len) };
    Ok(String::from_utf8_lossy(slice).into_owned())
}

/// Reads a string out of a caller-provided output buffer of known length,
/// such as the one `av_strerror` fills.
pub fn from_c_buffer(buf: &[u8]) -> Result<String> {
    let s = CStr::from_bytes_until_nul(buf).map_err(|_| FfError::Unterminated { max: buf.len() })?;
    Ok(s.to_string_lossy().into_owned())
}

/// Borrows `len` bytes of native memory without copying. Null or zero length
/// yields an empty slice.
///
/// # Safety
/// The memory must be readable for `len` bytes and must not be freed or
/// mutated by the library while the returned slice is alive. Nothing
/// enforces this.
pub unsafe fn slice_from_ptr<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    // SAFETY: readable for `len` bytes and unaliased per the caller's contract.
    unsafe { std::slice::from_raw_parts(ptr, len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_c_string() {
        let original = "scale=1280:720,format=yuv420p";
        let c = to_c_string(original).unwrap();
        let back = unsafe { from_c_string(c.as_ptr()) };
        assert_eq!(back, original);
    }

    #[test]
    fn rejects_interior_nul() {
        assert!(matches!(to_c_string("a\0b"), Err(FfError::InteriorNul(_))));
    }

    #[test]
    fn zero_bound_rejects_even_empty_strings() {
        let err = unsafe { from_c_string_bounded(c"".as_ptr(), 0) }.unwrap_err();
        assert!(matches!(err, FfError::Unterminated { max: 0 }));
        assert_eq!(unsafe { from_c_string_bounded(c"".as_ptr(), 1) }.unwrap(), "");
    }

    #[test]
    fn null_reads_as_empty() {
        assert_eq!(unsafe { from_c_string(std::ptr::null()) }, "");
        assert_eq!(unsafe { from_c_string_bounded(std::ptr::null(), 16) }.unwrap(), "");
    }

    #[test]
    fn bounded_scan_stops_at_terminator() {
        let c = c"libavutil";
        assert_eq!(unsafe { from_c_string_bounded(c.as_ptr(), 64) }.unwrap(), "libavutil");
        // The terminator must fall strictly inside the bound.
        assert_eq!(unsafe { from_c_string_bounded(c.as_ptr(), 10) }.unwrap(), "libavutil");
        assert!(matches!(
            unsafe { from_c_string_bounded(c.as_ptr(), 9) },
            Err(FfError::Unterminated { max: 9 })
        ));
    }

    #[test]
    fn unterminated_buffer_is_an_error() {
        let buf = *b"no terminator";
        let err = unsafe { from_c_string_bounded(buf.as_ptr().cast(), buf.len()) }.unwrap_err();
        assert!(matches!(err, FfError::Unterminated { max: 13 }));
        assert!(matches!(from_c_buffer(&buf), Err(FfError::Unterminated { .. })));
    }

    #[test]
    fn buffer_stops_at_first_nul() {
        let mut buf = [0u8; 64];
        buf[..7].copy_from_slice(b"EAGAIN\0");
        buf[7..10].copy_from_slice(b"xyz");
        assert_eq!(from_c_buffer(&buf).unwrap(), "EAGAIN");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let bytes = [b'a', 0xff, b'b', 0];
        let s = unsafe { from_c_string_bounded(bytes.as_ptr().cast(), 8) }.unwrap();
        assert_eq!(s, "a\u{fffd}b");
    }

    #[test]
    fn slice_view_aliases_source() {
        let data = [1u8, 2, 3, 4];
        let view = unsafe { slice_from_ptr(data.as_ptr(), 3) };
        assert_eq!(view, &[1, 2, 3]);
        assert_eq!(view.as_ptr(), data.as_ptr());
        assert!(unsafe { slice_from_ptr(std::ptr::null(), 8) }.is_empty());
    }
}
