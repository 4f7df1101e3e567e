//! Kernel export tables.

use std::path::Path;

use indexmap::IndexMap;
use xa_core::{XaError, os::SymbolResolver};

/// Kernel exports loaded from a `dumpbin /exports` listing.
///
/// Export rows have the form `<ordinal> <hint> <rva> <name>`, with the
/// ordinal in decimal and the hint and RVA in hexadecimal. Every other line
/// (headers, summaries, forwarded exports) is skipped.
///
/// Resolved values are relative to the kernel image base.
#[derive(Debug, Default, Clone)]
pub struct ExportTable {
    exports: IndexMap<String, u64>,
}

impl ExportTable {
    /// Parses a `dumpbin /exports` listing.
    pub fn parse(text: &str) -> Self {
        let exports: Self = text.lines().filter_map(parse_row).collect();

        if exports.is_empty() {
            tracing::warn!("export table has no rows");
        } else {
            tracing::debug!(exports = exports.len(), "parsed export table");
        }

        exports
    }

    /// Reads and parses a `dumpbin /exports` listing.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XaError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "reading export table");
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Returns the RVA of an export.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.exports.get(name).copied()
    }

    /// Returns the number of exports.
    pub fn len(&self) -> usize {
        self.exports.len()
    }

    /// Checks whether the table holds no exports.
    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl SymbolResolver for ExportTable {
    fn resolve_symbol(&self, name: &str) -> Result<u64, XaError> {
        self.get(name)
            .ok_or_else(|| XaError::SymbolNotFound(name.to_owned()))
    }
}

impl FromIterator<(String, u64)> for ExportTable {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut exports = IndexMap::new();
        for (name, rva) in iter {
            exports.entry(name).or_insert(rva);
        }
        Self { exports }
    }
}

fn parse_row(line: &str) -> Option<(String, u64)> {
    let mut columns = line.split_whitespace();

    let _ordinal: u32 = columns.next()?.parse().ok()?;
    let _hint = u32::from_str_radix(columns.next()?, 16).ok()?;
    let rva = u64::from_str_radix(columns.next()?, 16).ok()?;
    let name = columns.next()?;

    Some((name.to_owned(), rva))
}
