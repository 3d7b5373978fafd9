//! libavfilter wrappers.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

use crate::abi::{
    AVFILTER_FLAG_DYNAMIC_INPUTS, AVFILTER_FLAG_DYNAMIC_OUTPUTS, AVFILTER_FLAG_SLICE_THREADS,
    AVFILTER_FLAG_SUPPORT_TIMELINE_GENERIC, AVFILTER_FLAG_SUPPORT_TIMELINE_INTERNAL, AVFilter,
    AVFilterPad, MediaType,
};
use crate::component::{Component, ComponentInfo, LibVersion};
use crate::error::Result;
use crate::marshal;
use crate::registry::{NativeFn, Registry};

/// `avfilter_get_by_name`
pub type GetByNameFn = unsafe extern "C" fn(*const c_char) -> *const AVFilter;
/// `av_filter_iterate`
pub type IterateFn = unsafe extern "C" fn(*mut *mut c_void) -> *const AVFilter;
/// `avfilter_pad_count`
pub type PadCountFn = unsafe extern "C" fn(*const AVFilterPad) -> c_int;
/// `avfilter_pad_get_name`
pub type PadGetNameFn = unsafe extern "C" fn(*const AVFilterPad, c_int) -> *const c_char;
/// `avfilter_pad_get_type`
pub type PadGetTypeFn = unsafe extern "C" fn(*const AVFilterPad, c_int) -> c_int;

/// libavfilter bound to a registry.
#[derive(Clone, Copy, Debug)]
pub struct AvFilter<'r> {
    registry: &'r Registry,
}

/// A filter input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PadInfo {
    /// Pad name, e.g. `default`.
    pub name: String,
    /// `None` when the library reports a media type this crate does not know.
    pub media_type: Option<MediaType>,
}

/// Owned copy of the public part of an `AVFilter`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterInfo {
    /// Filter name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// `AVFILTER_FLAG_*` bits.
    pub flags: c_int,
    /// Static inputs; empty for sources and for dynamic inputs.
    pub inputs: Vec<PadInfo>,
    /// Static outputs; empty for sinks and for dynamic outputs.
    pub outputs: Vec<PadInfo>,
}

impl FilterInfo {
    /// Lowercase names of the set `AVFILTER_FLAG_*` bits.
    pub fn flag_names(&self) -> Vec<&'static str> {
        const NAMES: [(c_int, &str); 5] = [
            (AVFILTER_FLAG_DYNAMIC_INPUTS, "dynamic_inputs"),
            (AVFILTER_FLAG_DYNAMIC_OUTPUTS, "dynamic_outputs"),
            (AVFILTER_FLAG_SLICE_THREADS, "slice_threads"),
            (AVFILTER_FLAG_SUPPORT_TIMELINE_GENERIC, "timeline_generic"),
            (AVFILTER_FLAG_SUPPORT_TIMELINE_INTERNAL, "timeline_internal"),
        ];
        NAMES
            .iter()
            .filter(|(bit, _)| self.flags & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl<'r> AvFilter<'r> {
    /// Wraps `registry`. Nothing is loaded until the first call.
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// # Safety
    /// `F` must match the C prototype of `name`.
    unsafe fn function<F: Copy>(&self, name: &'static CStr) -> Result<NativeFn<F>> {
        // SAFETY: forwarded to the caller.
        unsafe { self.registry.function(Component::AvFilter, name) }
    }

    /// `avfilter_version`, unpacked.
    pub fn version(&self) -> Result<LibVersion> {
        self.registry.version(Component::AvFilter)
    }

    /// Configure flags libavfilter was built with.
    pub fn configuration(&self) -> Result<String> {
        self.registry
            .static_string(Component::AvFilter, Component::AvFilter.configuration_symbol())
    }

    /// License libavfilter was built under.
    pub fn license(&self) -> Result<String> {
        self.registry
            .static_string(Component::AvFilter, Component::AvFilter.license_symbol())
    }

    /// Version, configuration and license in one value.
    pub fn info(&self) -> Result<ComponentInfo> {
        self.registry.component_info(Component::AvFilter)
    }

    /// Looks a filter up by name.
    pub fn filter(&self, name: &str) -> Result<Option<FilterInfo>> {
        let name = marshal::to_c_string(name)?;
        // SAFETY: `const AVFilter *avfilter_get_by_name(const char *)`.
        let f = unsafe { self.function::<GetByNameFn>(c"avfilter_get_by_name")? };
        // SAFETY: `name` is NUL-terminated and outlives the call.
        let filter = unsafe { (f.get())(name.as_ptr()) };
        if filter.is_null() {
            return Ok(None);
        }
        // SAFETY: registered filters are static data of the library `f` keeps
        // mapped.
        unsafe { self.describe(filter) }.map(Some)
    }

    /// Names of every registered filter, in registration order.
    pub fn filter_names(&self) -> Result<Vec<String>> {
        // SAFETY: `const AVFilter *av_filter_iterate(void **opaque)`.
        let f = unsafe { self.function::<IterateFn>(c"av_filter_iterate")? };
        let max = self.registry.max_string_len();
        let mut opaque: *mut c_void = ptr::null_mut();
        let mut names = Vec::new();
        loop {
            // SAFETY: `opaque` starts null and is only advanced by the library.
            let filter = unsafe { (f.get())(&mut opaque) };
            if filter.is_null() {
                break;
            }
            // SAFETY: see `filter`; only the mirrored prefix is read.
            names.push(unsafe { marshal::from_c_string_bounded((*filter).name, max)? });
        }
        Ok(names)
    }

    /// # Safety
    /// `filter` must point to a live `AVFilter` of the loaded libavfilter.
    unsafe fn describe(&self, filter: *const AVFilter) -> Result<FilterInfo> {
        let max = self.registry.max_string_len();
        // SAFETY: the caller guarantees `filter` is live; the prefix we read
        // is public ABI.
        let filter = unsafe { &*filter };
        // SAFETY: filter names and descriptions are static strings.
        Ok(FilterInfo {
            name: unsafe { marshal::from_c_string_bounded(filter.name, max)? },
            description: unsafe { marshal::from_c_string_bounded(filter.description, max)? },
            flags: filter.flags,
            inputs: self.pads(filter.inputs)?,
            outputs: self.pads(filter.outputs)?,
        })
    }

    fn pads(&self, pads: *const AVFilterPad) -> Result<Vec<PadInfo>> {
        if pads.is_null() {
            return Ok(Vec::new());
        }
        // SAFETY: prototypes per `libavfilter/avfilter.h` 7.x.
        let count = unsafe { self.function::<PadCountFn>(c"avfilter_pad_count")? };
        // SAFETY: as above.
        let get_name = unsafe { self.function::<PadGetNameFn>(c"avfilter_pad_get_name")? };
        // SAFETY: as above.
        let get_type = unsafe { self.function::<PadGetTypeFn>(c"avfilter_pad_get_type")? };
        let max = self.registry.max_string_len();

        // SAFETY: `pads` is a filter's static, terminated pad array.
        let n = unsafe { (count.get())(pads) };
        (0..n)
            .map(|i| -> Result<PadInfo> {
                // SAFETY: `i` is within the count the library reported.
                let (name, raw_type) = unsafe { ((get_name.get())(pads, i), (get_type.get())(pads, i)) };
                // SAFETY: pad names are static strings of the filter.
                Ok(PadInfo {
                    name: unsafe { marshal::from_c_string_bounded(name, max)? },
                    media_type: MediaType::try_from(raw_type).ok(),
                })
            })
            .collect()
    }
}
