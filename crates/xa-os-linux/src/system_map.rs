//! `System.map` symbol tables.

use std::path::Path;

use indexmap::IndexMap;
use xa_core::{XaError, os::SymbolResolver};

use crate::LinuxError;

/// Kernel symbols loaded from a `System.map` file.
///
/// Each line has the form `<address> <type> <name>`, with the address in
/// hexadecimal. Trailing columns (such as the module name in
/// `/proc/kallsyms` dumps) are ignored. If a name appears more than once,
/// the first occurrence wins.
#[derive(Debug, Default, Clone)]
pub struct SystemMap {
    symbols: IndexMap<String, u64>,
}

impl SystemMap {
    /// Parses the contents of a `System.map` file.
    pub fn parse(text: &str) -> Result<Self, LinuxError> {
        let mut symbols = IndexMap::new();

        for (index, line) in text.lines().enumerate() {
            let mut columns = line.split_whitespace();

            let (address, name) = match (columns.next(), columns.next(), columns.next()) {
                (None, _, _) => continue,
                (Some(address), Some(_kind), Some(name)) => (address, name),
                _ => return Err(malformed(index, line)),
            };

            let address = u64::from_str_radix(address, 16).map_err(|_| malformed(index, line))?;

            symbols.entry(name.to_owned()).or_insert(address);
        }

        tracing::debug!(symbols = symbols.len(), "parsed System.map");
        Ok(Self { symbols })
    }

    /// Reads and parses a `System.map` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XaError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "reading System.map");
        Ok(Self::parse(&std::fs::read_to_string(path)?)?)
    }

    /// Returns the address of a symbol.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    /// Returns the number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Checks whether the map holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Returns an iterator over the symbols in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.symbols
            .iter()
            .map(|(name, address)| (name.as_str(), *address))
    }
}

impl SymbolResolver for SystemMap {
    fn resolve_symbol(&self, name: &str) -> Result<u64, XaError> {
        self.get(name)
            .ok_or_else(|| XaError::SymbolNotFound(name.to_owned()))
    }
}

impl FromIterator<(String, u64)> for SystemMap {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut symbols = IndexMap::new();
        for (name, address) in iter {
            symbols.entry(name).or_insert(address);
        }
        Self { symbols }
    }
}

fn malformed(index: usize, line: &str) -> LinuxError {
    LinuxError::MalformedSymbolMap {
        line: index + 1,
        text: line.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_MAP: &str = "\
c0100000 T _text
c0100000 T startup_32
c0101000 T swapper_pg_dir

c0302a40 D init_task
c0302a40 d init_task
c8850000 t ext3_get_block\t[ext3]
";

    #[test]
    fn parses_symbols() {
        let map = SystemMap::parse(SYSTEM_MAP).unwrap();

        assert_eq!(map.len(), 5);
        assert_eq!(map.get("swapper_pg_dir"), Some(0xc010_1000));
        assert_eq!(map.get("init_task"), Some(0xc030_2a40));
        assert_eq!(map.get("ext3_get_block"), Some(0xc885_0000));
        assert_eq!(map.iter().next(), Some(("_text", 0xc010_0000)));
    }

    #[test]
    fn first_occurrence_wins() {
        let map: SystemMap = [("a".to_owned(), 1), ("a".to_owned(), 2)]
            .into_iter()
            .collect();
        assert_eq!(map.get("a"), Some(1));
    }

    #[test]
    fn unknown_symbol() {
        let map = SystemMap::parse(SYSTEM_MAP).unwrap();
        assert!(matches!(
            map.resolve_symbol("sys_call_table"),
            Err(XaError::SymbolNotFound(name)) if name == "sys_call_table"
        ));
    }

    #[test]
    fn malformed_lines() {
        assert!(matches!(
            SystemMap::parse("c0100000 T _text\nc0100000 T\n"),
            Err(LinuxError::MalformedSymbolMap { line: 2, .. })
        ));

        assert!(matches!(
            SystemMap::parse("zzzzzzzz T _text\n"),
            Err(LinuxError::MalformedSymbolMap { line: 1, .. })
        ));
    }
}
