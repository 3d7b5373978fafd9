//! `#[repr(C)]` mirrors of the FFmpeg 4.4 structs this crate reads.
//!
//! Layouts track libavutil 56 / libavfilter 7. The registry refuses other
//! major versions unless `verify_version` is turned off, and
//! [`AvUtil::verify_pix_fmt_layout`](crate::avutil::AvUtil::verify_pix_fmt_layout)
//! measures the descriptor table of the loaded library.

use std::os::raw::{c_char, c_int, c_void};

/// Struct whose size and alignment must match its C counterpart.
pub trait Mirrored: Sized {
    /// C type name, for diagnostics.
    const C_NAME: &'static str;
    /// `sizeof` on LP64/LLP64 targets.
    const SIZE: usize;
    /// `alignof` on LP64/LLP64 targets.
    const ALIGN: usize;
}

macro_rules! mirrored {
    ($ty:ident, $size:expr, $align:expr) => {
        impl Mirrored for $ty {
            const C_NAME: &'static str = stringify!($ty);
            const SIZE: usize = $size;
            const ALIGN: usize = $align;
        }

        #[cfg(target_pointer_width = "64")]
        const _: () = {
            assert!(size_of::<$ty>() == <$ty as Mirrored>::SIZE);
            assert!(align_of::<$ty>() == <$ty as Mirrored>::ALIGN);
        };
    };
}

/// Rational number (`num/den`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AVRational {
    /// Numerator.
    pub num: c_int,
    /// Denominator.
    pub den: c_int,
}

impl AVRational {
    /// `num/den`, not reduced.
    pub const fn new(num: c_int, den: c_int) -> Self {
        Self { num, den }
    }

    /// `av_q2d`; zero for a zero denominator.
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

mirrored!(AVRational, 8, 4);

/// A key/value pair owned by an `AVDictionary`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AVDictionaryEntry {
    #[allow(missing_docs)]
    pub key: *mut c_char,
    #[allow(missing_docs)]
    pub value: *mut c_char,
}

mirrored!(AVDictionaryEntry, 16, 8);

/// One component of a pixel format (`libavutil/pixdesc.h`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AVComponentDescriptor {
    /// Plane that stores this component.
    pub plane: c_int,
    /// Bytes between horizontally adjacent pixels.
    pub step: c_int,
    /// Bytes before the component's first pixel.
    pub offset: c_int,
    /// Right shift applied to the read value.
    pub shift: c_int,
    /// Bits per component.
    pub depth: c_int,
    // FF_API_PLUS1_MINUS1, present while libavutil < 57
    #[allow(missing_docs)]
    pub step_minus1: c_int,
    #[allow(missing_docs)]
    pub depth_minus1: c_int,
    #[allow(missing_docs)]
    pub offset_plus1: c_int,
}

mirrored!(AVComponentDescriptor, 32, 4);

/// Layout of a pixel format (`libavutil/pixdesc.h`).
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AVPixFmtDescriptor {
    /// Format name.
    pub name: *const c_char,
    /// Number of components, 1 to 4.
    pub nb_components: u8,
    /// Horizontal chroma subsampling shift.
    pub log2_chroma_w: u8,
    /// Vertical chroma subsampling shift.
    pub log2_chroma_h: u8,
    /// `AV_PIX_FMT_FLAG_*` bits.
    pub flags: u64,
    /// Component descriptors; only `nb_components` are meaningful.
    pub comp: [AVComponentDescriptor; 4],
    /// Alternative comma-separated names, or NULL.
    pub alias: *const c_char,
}

mirrored!(AVPixFmtDescriptor, 160, 8);

/// Big-endian.
pub const AV_PIX_FMT_FLAG_BE: u64 = 1 << 0;
/// Palettized.
pub const AV_PIX_FMT_FLAG_PAL: u64 = 1 << 1;
/// Bit-packed components.
pub const AV_PIX_FMT_FLAG_BITSTREAM: u64 = 1 << 2;
/// Hardware surface.
pub const AV_PIX_FMT_FLAG_HWACCEL: u64 = 1 << 3;
/// At least one component in a separate plane.
pub const AV_PIX_FMT_FLAG_PLANAR: u64 = 1 << 4;
/// RGB-like.
pub const AV_PIX_FMT_FLAG_RGB: u64 = 1 << 5;
/// Has an alpha channel.
pub const AV_PIX_FMT_FLAG_ALPHA: u64 = 1 << 7;
/// Bayer pattern.
pub const AV_PIX_FMT_FLAG_BAYER: u64 = 1 << 8;
/// IEEE-754 float components.
pub const AV_PIX_FMT_FLAG_FLOAT: u64 = 1 << 9;

/// `AV_PIX_FMT_NONE`
pub const AV_PIX_FMT_NONE: c_int = -1;

/// Public prefix of `AVFilter`. The library allocates these; only ever read
/// one through a pointer, never by value.
#[repr(C)]
pub struct AVFilter {
    /// Filter name.
    pub name: *const c_char,
    /// Human-readable description.
    pub description: *const c_char,
    /// Static inputs, NULL if none.
    pub inputs: *const AVFilterPad,
    /// Static outputs, NULL if none.
    pub outputs: *const AVFilterPad,
    /// `const AVClass *`, unused here.
    pub priv_class: *const c_void,
    /// `AVFILTER_FLAG_*` bits.
    pub flags: c_int,
}

/// Inputs are added at init time.
pub const AVFILTER_FLAG_DYNAMIC_INPUTS: c_int = 1 << 0;
/// Outputs are added at init time.
pub const AVFILTER_FLAG_DYNAMIC_OUTPUTS: c_int = 1 << 1;
/// Supports slice threading.
pub const AVFILTER_FLAG_SLICE_THREADS: c_int = 1 << 2;
/// Timeline handled by libavfilter.
pub const AVFILTER_FLAG_SUPPORT_TIMELINE_GENERIC: c_int = 1 << 16;
/// Timeline handled by the filter itself.
pub const AVFILTER_FLAG_SUPPORT_TIMELINE_INTERNAL: c_int = 1 << 17;

/// Opaque; accessed through `avfilter_pad_*`.
#[repr(C)]
pub struct AVFilterPad {
    _opaque: [u8; 0],
}

/// Opaque; accessed through `av_dict_*`.
#[repr(C)]
pub struct AVDictionary {
    _opaque: [u8; 0],
}

/// Case-sensitive key match.
pub const AV_DICT_MATCH_CASE: c_int = 1;
/// Match keys that start with the given key.
pub const AV_DICT_IGNORE_SUFFIX: c_int = 2;
/// Keep an existing value.
pub const AV_DICT_DONT_OVERWRITE: c_int = 16;
/// Append to an existing value.
pub const AV_DICT_APPEND: c_int = 32;

/// `AV_ERROR_MAX_STRING_SIZE`
pub const AV_ERROR_MAX_STRING_SIZE: usize = 64;

/// `enum AVMediaType`, carried as `c_int` across the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MediaType {
    Unknown,
    Video,
    Audio,
    Data,
    Subtitle,
    Attachment,
}

impl MediaType {
    /// Every media type, `Unknown` first.
    pub const ALL: [MediaType; 6] = [
        MediaType::Unknown,
        MediaType::Video,
        MediaType::Audio,
        MediaType::Data,
        MediaType::Subtitle,
        MediaType::Attachment,
    ];

    /// The `AVMEDIA_TYPE_*` value.
    pub const fn as_raw(self) -> c_int {
        match self {
            MediaType::Unknown => -1,
            MediaType::Video => 0,
            MediaType::Audio => 1,
            MediaType::Data => 2,
            MediaType::Subtitle => 3,
            MediaType::Attachment => 4,
        }
    }
}

impl TryFrom<c_int> for MediaType {
    type Error = c_int;

    fn try_from(raw: c_int) -> Result<Self, Self::Error> {
        MediaType::ALL
            .into_iter()
            .find(|t| t.as_raw() == raw)
            .ok_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_round_trips_through_raw() {
        for t in MediaType::ALL {
            assert_eq!(MediaType::try_from(t.as_raw()), Ok(t));
        }
        assert_eq!(MediaType::try_from(5), Err(5));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn descriptor_fields_sit_at_c_offsets() {
        assert_eq!(std::mem::offset_of!(AVPixFmtDescriptor, nb_components), 8);
        assert_eq!(std::mem::offset_of!(AVPixFmtDescriptor, flags), 16);
        assert_eq!(std::mem::offset_of!(AVPixFmtDescriptor, comp), 24);
        assert_eq!(std::mem::offset_of!(AVPixFmtDescriptor, alias), 152);
        assert_eq!(std::mem::offset_of!(AVFilter, flags), 40);
    }

    #[test]
    fn rational_as_f64_guards_zero_denominator() {
        assert_eq!(AVRational::new(1, 0).as_f64(), 0.0);
        assert_eq!(AVRational::new(30000, 1001).as_f64(), 30000.0 / 1001.0);
    }
}
