use bitflags::bitflags;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Flags controlling which journal files a reader can see.
    ///
    /// Values match libsystemd's `SD_JOURNAL_*` open flags. Bits this crate
    /// does not name are retained and passed to the backend unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: i32 {
        const LOCAL_ONLY = 1 << 0;
        const RUNTIME_ONLY = 1 << 1;
        const SYSTEM = 1 << 2;
        const CURRENT_USER = 1 << 3;
        const OS_ROOT = 1 << 4;
        const ALL_NAMESPACES = 1 << 5;
        const INCLUDE_DEFAULT_NAMESPACE = 1 << 6;

        const _ = !0;
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags::empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFlag(String);

impl fmt::Display for UnknownFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown journal open flag: {:?}", self.0)
    }
}

impl std::error::Error for UnknownFlag {}

impl OpenFlags {
    /// Parses a single kebab-case flag name, eg. `local-only`.
    pub fn from_flag_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.starts_with('_') {
            return None;
        }

        OpenFlags::from_name(&name.to_ascii_uppercase().replace('-', "_"))
    }

    /// Parses a comma separated list of flag names. An empty list yields
    /// no flags.
    pub fn parse_list(list: &str) -> Result<Self, UnknownFlag> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(OpenFlags::empty(), |acc, name| {
                OpenFlags::from_flag_name(name)
                    .map(|flag| acc | flag)
                    .ok_or_else(|| UnknownFlag(name.to_string()))
            })
    }
}

impl FromStr for OpenFlags {
    type Err = UnknownFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpenFlags::parse_list(s)
    }
}

/// Accepted configuration forms: a raw integer, a list of names, or a
/// comma separated string of names.
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagsRepr {
    Bits(i32),
    Names(Vec<String>),
    List(String),
}

impl<'de> Deserialize<'de> for OpenFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match FlagsRepr::deserialize(deserializer)? {
            FlagsRepr::Bits(bits) => Ok(OpenFlags::from_bits_retain(bits)),
            FlagsRepr::Names(names) => OpenFlags::parse_list(&names.join(","))
                .map_err(serde::de::Error::custom),
            FlagsRepr::List(list) => OpenFlags::parse_list(&list).map_err(serde::de::Error::custom),
        }
    }
}
