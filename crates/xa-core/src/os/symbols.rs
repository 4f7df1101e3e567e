use crate::XaError;

/// A source of kernel symbol addresses.
///
/// What the returned value means depends on the source: a Linux
/// `System.map` yields absolute virtual addresses, while a Windows export
/// table yields addresses relative to the kernel image base.
pub trait SymbolResolver {
    /// Looks up a symbol by name.
    fn resolve_symbol(&self, name: &str) -> Result<u64, XaError>;
}
