//! Architecture abstraction.

use std::fmt::Debug;

use crate::{Ma, Pa, Va, XaCore, XaDriver, XaError};

/// Defines an interface for CPU architecture-specific operations and constants.
///
/// The translator is the only place that knows the layout of the guest's
/// paging structures. Everything else in the crate deals in virtual,
/// pseudo-physical and machine addresses only.
pub trait Architecture {
    /// The size of a memory page in bytes.
    ///
    /// # Architecture-specific
    ///
    /// - **x86**: `0x1000` (4096 bytes)
    const PAGE_SIZE: u64;

    /// The number of bits to shift when converting between page numbers and
    /// addresses.
    ///
    /// # Architecture-specific
    ///
    /// - **x86**: `12` (2^12 = 4096)
    const PAGE_SHIFT: u64;

    /// A bitmask used to isolate the page number from a full address.
    ///
    /// # Architecture-specific
    ///
    /// - **x86**: `0xFFFFFFFFFFFFF000`
    const PAGE_MASK: u64;

    /// The set of CPU registers needed to bootstrap a session.
    type Registers: Registers;

    /// The levels of the architecture's paging structures.
    type PageTableLevel: Debug + Clone + Copy;

    /// Paging capabilities of the guest, derived once from the registers.
    type PagingConfig: Debug + Clone + Copy;

    /// Derives the paging capabilities from the guest's registers.
    ///
    /// Fails with [`XaError::PagingDisabled`] if the guest does not have
    /// paging enabled.
    fn paging_config(registers: &Self::Registers) -> Result<Self::PagingConfig, XaError>;

    /// Extracts the offset within a page from a virtual address.
    fn va_offset(va: Va) -> u64;

    /// Calculates the index into the specified level of the page table
    /// hierarchy for a given virtual address.
    fn va_index_for(va: Va, level: Self::PageTableLevel, paging: Self::PagingConfig) -> u64;

    /// Performs a full page table walk to translate a virtual address to a
    /// machine address.
    ///
    /// No caching happens here. See [`XaCore::translate_kernel`] for the
    /// cached variant.
    fn translate_address<Driver>(
        xa: &XaCore<Driver>,
        va: Va,
        root: TranslationRoot,
    ) -> Result<Ma, XaError>
    where
        Driver: XaDriver<Architecture = Self>;
}

/// CPU registers of a specific architecture.
///
/// Only consulted to derive the paging configuration. The kernel root always
/// comes from the guest OS.
pub trait Registers
where
    Self: Debug + Default + Clone + Copy,
{
}

/// The root of a page table walk, together with the way the top-level table
/// is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationRoot {
    /// Kernel mode.
    ///
    /// The top-level table is read through its pseudo-physical address,
    /// resolved to a machine frame with the frame indirection table.
    Kernel(Pa),

    /// User mode.
    ///
    /// The top-level table is read through its kernel virtual address, which
    /// itself is translated with the kernel page tables.
    User(Va),
}

impl TranslationRoot {
    /// Returns the raw root address.
    pub fn address(self) -> u64 {
        match self {
            Self::Kernel(pa) => pa.0,
            Self::User(va) => va.0,
        }
    }
}
