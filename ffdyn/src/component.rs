use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

const fn c_name(bytes: &'static [u8]) -> &'static CStr {
    match CStr::from_bytes_with_nul(bytes) {
        Ok(name) => name,
        Err(_) => panic!("symbol name must end with exactly one NUL"),
    }
}

macro_rules! components {
    ($($variant:ident => $name:literal, $major:literal;)+) => {
        /// One of the FFmpeg shared libraries.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum Component {
            $(
                #[doc = concat!("lib", $name)]
                $variant,
            )+
        }

        impl Component {
            /// Every component, in load order.
            pub const ALL: &'static [Component] = &[$(Component::$variant,)+];

            /// Short library name, e.g. `avutil`.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Component::$variant => $name,)+
                }
            }

            /// Major version the mirrored layouts were written against.
            pub const fn expected_major(self) -> u32 {
                match self {
                    $(Component::$variant => $major,)+
                }
            }

            /// `<name>_version`
            pub const fn version_symbol(self) -> &'static CStr {
                match self {
                    $(Component::$variant => {
                        const SYM: &CStr = c_name(concat!($name, "_version\0").as_bytes());
                        SYM
                    })+
                }
            }

            /// `<name>_configuration`
            pub const fn configuration_symbol(self) -> &'static CStr {
                match self {
                    $(Component::$variant => {
                        const SYM: &CStr = c_name(concat!($name, "_configuration\0").as_bytes());
                        SYM
                    })+
                }
            }

            /// `<name>_license`
            pub const fn license_symbol(self) -> &'static CStr {
                match self {
                    $(Component::$variant => {
                        const SYM: &CStr = c_name(concat!($name, "_license\0").as_bytes());
                        SYM
                    })+
                }
            }
        }

        impl FromStr for Component {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lower = s.to_ascii_lowercase();
                let lower = lower.strip_prefix("lib").unwrap_or(&lower);
                match lower {
                    $($name => Ok(Component::$variant),)+
                    _ => Err(format!("unknown FFmpeg component: {s}")),
                }
            }
        }
    };
}

components! {
    AvUtil => "avutil", 56;
    AvCodec => "avcodec", 58;
    AvFormat => "avformat", 58;
    AvFilter => "avfilter", 7;
    AvDevice => "avdevice", 58;
    SwScale => "swscale", 5;
    SwResample => "swresample", 3;
    PostProc => "postproc", 55;
}

impl Component {
    /// Platform-specific file name of the pinned major version, resolved
    /// through the OS library search path when no directory is configured.
    pub fn default_file_name(self) -> String {
        let name = self.name();
        let major = self.expected_major();
        if cfg!(target_os = "windows") {
            format!("{name}-{major}.dll")
        } else if cfg!(target_os = "macos") {
            format!("lib{name}.{major}.dylib")
        } else {
            format!("lib{name}.so.{major}")
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lib{}", self.name())
    }
}

/// FFmpeg's packed `major << 16 | minor << 8 | micro` version number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LibVersion {
    /// Bumped on ABI breaks.
    pub major: u32,
    #[allow(missing_docs)]
    pub minor: u32,
    #[allow(missing_docs)]
    pub micro: u32,
}

impl LibVersion {
    /// Unpacks a `<lib>_version()` result.
    pub const fn from_packed(v: u32) -> Self {
        Self {
            major: v >> 16,
            minor: (v >> 8) & 0xff,
            micro: v & 0xff,
        }
    }

    /// Inverse of [`from_packed`](Self::from_packed).
    pub const fn packed(self) -> u32 {
        (self.major << 16) | (self.minor << 8) | self.micro
    }
}

impl fmt::Display for LibVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Build information every FFmpeg component exports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Component the values were read from.
    pub component: Component,
    /// `<lib>_version`
    pub version: LibVersion,
    /// `<lib>_configuration`
    pub configuration: String,
    /// `<lib>_license`
    pub license: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_names_follow_component_name() {
        assert_eq!(Component::AvUtil.version_symbol(), c"avutil_version");
        assert_eq!(Component::SwResample.configuration_symbol(), c"swresample_configuration");
        assert_eq!(Component::PostProc.license_symbol(), c"postproc_license");
    }

    #[test]
    fn parses_with_or_without_lib_prefix() {
        assert_eq!("avfilter".parse::<Component>(), Ok(Component::AvFilter));
        assert_eq!("libswscale".parse::<Component>(), Ok(Component::SwScale));
        assert_eq!("AVCODEC".parse::<Component>(), Ok(Component::AvCodec));
        assert!("avframe".parse::<Component>().is_err());
    }

    #[test]
    fn default_file_name_is_platform_specific() {
        let name = Component::AvUtil.default_file_name();
        if cfg!(target_os = "windows") {
            assert_eq!(name, "avutil-56.dll");
        } else if cfg!(target_os = "macos") {
            assert_eq!(name, "libavutil.56.dylib");
        } else {
            assert_eq!(name, "libavutil.so.56");
        }
    }

    #[test]
    fn packed_version_decodes() {
        let v = LibVersion::from_packed((56 << 16) | (70 << 8) | 100);
        assert_eq!((v.major, v.minor, v.micro), (56, 70, 100));
        assert_eq!(v.to_string(), "56.70.100");
        assert_eq!(LibVersion::from_packed(v.packed()), v);
    }
}
