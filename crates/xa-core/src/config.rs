//! Per-domain configuration.
//!
//! The configuration is a JSON document keyed by domain name:
//!
//! ```json
//! {
//!     "domains": {
//!         "debian": {
//!             "ostype": "Linux",
//!             "sysmap": "/boot/System.map-2.6.16-xen",
//!             "offsets": {
//!                 "linux_tasks": "0x60",
//!                 "linux_pid": 156
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! Offsets may be given as numbers or as `0x`-prefixed strings. Offsets
//! that are not listed fall back to the OS defaults.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{OsKind, XaError};

/// Configuration for all known domains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XaConfig {
    /// Domain entries keyed by domain name.
    #[serde(default)]
    pub domains: IndexMap<String, DomainConfig>,
}

impl XaConfig {
    /// Parses a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, XaError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XaError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "reading configuration");
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Returns the entry for a domain.
    pub fn domain(&self, name: &str) -> Result<&DomainConfig, XaError> {
        self.domains
            .get(name)
            .ok_or_else(|| XaError::ConfigurationMissing(name.to_owned()))
    }
}

/// Configuration of a single domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// The guest operating system.
    pub ostype: OsKind,

    /// The kernel symbol file.
    ///
    /// A `System.map` for Linux, a dump of the kernel export table for
    /// Windows.
    #[serde(default)]
    pub sysmap: Option<PathBuf>,

    /// The start of the kernel address space, if it differs from the OS
    /// default.
    #[serde(default)]
    pub page_offset: Option<Offset>,

    /// Named field offsets.
    #[serde(default)]
    pub offsets: IndexMap<String, Offset>,
}

impl DomainConfig {
    /// Creates an entry with no symbol file and default offsets.
    pub fn new(ostype: OsKind) -> Self {
        Self {
            ostype,
            sysmap: None,
            page_offset: None,
            offsets: IndexMap::new(),
        }
    }

    /// Returns the start of the kernel address space.
    pub fn page_offset(&self) -> u64 {
        match self.page_offset {
            Some(offset) => offset.0,
            None => self.ostype.default_page_offset(),
        }
    }

    /// Returns the named offset, or `default` if it is not configured.
    pub fn offset_or(&self, name: &str, default: u64) -> u64 {
        match self.offsets.get(name) {
            Some(offset) => offset.0,
            None => default,
        }
    }

    /// Returns the symbol file.
    pub fn sysmap(&self) -> Result<&Path, XaError> {
        self.sysmap
            .as_deref()
            .ok_or_else(|| XaError::ConfigurationMissing("sysmap".into()))
    }
}

/// A numeric configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOffset", into = "u64")]
pub struct Offset(pub u64);

impl From<Offset> for u64 {
    fn from(value: Offset) -> Self {
        value.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOffset {
    Number(u64),
    Text(String),
}

impl TryFrom<RawOffset> for Offset {
    type Error = String;

    fn try_from(value: RawOffset) -> Result<Self, Self::Error> {
        match value {
            RawOffset::Number(value) => Ok(Self(value)),
            RawOffset::Text(text) => {
                let text = text.trim();
                let parsed = match text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => text.parse(),
                };

                parsed
                    .map(Self)
                    .map_err(|err| format!("invalid offset `{text}`: {err}"))
            }
        }
    }
}
