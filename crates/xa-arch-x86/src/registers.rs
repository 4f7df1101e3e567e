use super::{Cr0, Cr3, Cr4};

/// The control registers needed to walk guest page tables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Operating mode, including the paging enable bit.
    pub cr0: Cr0,

    /// Active page directory.
    pub cr3: Cr3,

    /// Paging extensions (PSE, PAE).
    pub cr4: Cr4,
}

impl xa_core::Registers for Registers {}
