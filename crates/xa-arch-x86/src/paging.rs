use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Supported paging modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PagingMode {
    /// 32-bit paging (2 levels, 4-byte entries).
    Legacy,

    /// Physical Address Extension (3 levels, 8-byte entries).
    Pae,
}

impl PagingMode {
    /// Returns the size of a page table entry in bytes.
    pub fn entry_size(self) -> u64 {
        match self {
            Self::Legacy => 4,
            Self::Pae => 8,
        }
    }

    /// Returns the mask selecting the base address of a 4KB page or of the
    /// next-level table.
    pub fn base_mask(self) -> u64 {
        match self {
            Self::Legacy => 0xffff_f000,
            Self::Pae => 0x000f_ffff_ffff_f000,
        }
    }

    /// Returns the mask selecting the base address of a large page.
    pub fn large_base_mask(self) -> u64 {
        match self {
            Self::Legacy => 0xffc0_0000,
            Self::Pae => 0x000f_ffff_ffe0_0000,
        }
    }

    /// Returns the size of a large page in bytes.
    pub fn large_page_size(self) -> u64 {
        match self {
            Self::Legacy => 0x40_0000,
            Self::Pae => 0x20_0000,
        }
    }
}

/// Paging capabilities of a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagingConfig {
    /// The paging mode.
    pub mode: PagingMode,

    /// Whether large pages are honored (CR4.PSE).
    pub large_pages: bool,
}

impl PagingConfig {
    /// 32-bit paging without large pages.
    pub const fn legacy() -> Self {
        Self {
            mode: PagingMode::Legacy,
            large_pages: false,
        }
    }

    /// PAE paging without large pages.
    pub const fn pae() -> Self {
        Self {
            mode: PagingMode::Pae,
            large_pages: false,
        }
    }

    /// Enables or disables large pages.
    pub const fn with_large_pages(self, large_pages: bool) -> Self {
        Self {
            large_pages,
            ..self
        }
    }
}

/// The levels in the page table hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PageTableLevel {
    /// Page Table (PT) - the lowest level, pointing directly to 4KB pages.
    Pt,

    /// Page Directory (PD) - can point to PTs or large pages.
    Pd,

    /// Page Directory Pointer Table (PDPT) - the top level with PAE.
    Pdpt,
}

/// A page table entry in the paging structures.
///
/// Legacy entries are zero-extended to 64 bits.
#[repr(transparent)]
#[derive(Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PageTableEntry(pub u64);

impl PageTableEntry {
    /// Checks if the page is present in physical memory.
    pub fn present(self) -> bool {
        self.0 & 1 != 0
    }

    /// Checks if this entry refers to a large page.
    pub fn large(self) -> bool {
        (self.0 >> 7) & 1 != 0
    }

    /// Returns the base address of the next-level table or the 4KB page.
    pub fn base(self, mode: PagingMode) -> u64 {
        self.0 & mode.base_mask()
    }

    /// Returns the base address of the large page.
    pub fn large_base(self, mode: PagingMode) -> u64 {
        self.0 & mode.large_base_mask()
    }
}

impl std::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("value", &format_args!("0x{:x}", self.0))
            .field("present", &self.present())
            .field("large", &self.large())
            .finish()
    }
}
