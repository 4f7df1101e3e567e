//! 32-bit x86 architecture definitions.
//!
//! Supports 32-bit paging (2 levels) and PAE paging (3 levels). Large pages
//! are honored only when the guest enables them through CR4.PSE.

mod cr;
mod paging;
mod registers;

use xa_core::{Architecture, Ma, TranslationRoot, Va, XaCore, XaDriver, XaError};

pub use self::{
    cr::{Cr0, Cr3, Cr4},
    paging::{PageTableEntry, PageTableLevel, PagingConfig, PagingMode},
    registers::Registers,
};

/// 32-bit x86 architecture.
#[derive(Debug)]
pub struct X86;

impl Architecture for X86 {
    const PAGE_SIZE: u64 = 0x1000;
    const PAGE_SHIFT: u64 = 12;
    const PAGE_MASK: u64 = 0xFFFFFFFFFFFFF000;

    type Registers = Registers;
    type PageTableLevel = PageTableLevel;
    type PagingConfig = PagingConfig;

    fn paging_config(registers: &Registers) -> Result<PagingConfig, XaError> {
        if !registers.cr0.paging() {
            return Err(XaError::PagingDisabled);
        }

        let mode = if registers.cr4.physical_address_extension() {
            PagingMode::Pae
        } else {
            PagingMode::Legacy
        };

        Ok(PagingConfig {
            mode,
            large_pages: registers.cr4.page_size_extension(),
        })
    }

    fn va_offset(va: Va) -> u64 {
        va.0 & !Self::PAGE_MASK
    }

    fn va_index_for(va: Va, level: PageTableLevel, paging: PagingConfig) -> u64 {
        match (paging.mode, level) {
            (PagingMode::Legacy, PageTableLevel::Pt) => (va.0 >> 12) & 0x3ff,
            (PagingMode::Legacy, PageTableLevel::Pd) => (va.0 >> 22) & 0x3ff,
            (PagingMode::Legacy, PageTableLevel::Pdpt) => 0,
            (PagingMode::Pae, PageTableLevel::Pt) => (va.0 >> 12) & 0x1ff,
            (PagingMode::Pae, PageTableLevel::Pd) => (va.0 >> 21) & 0x1ff,
            (PagingMode::Pae, PageTableLevel::Pdpt) => (va.0 >> 30) & 0x3,
        }
    }

    fn translate_address<Driver>(
        xa: &XaCore<Driver>,
        va: Va,
        root: TranslationRoot,
    ) -> Result<Ma, XaError>
    where
        Driver: XaDriver<Architecture = Self>,
    {
        let paging = xa.paging();
        let mode = paging.mode;

        let pde = match mode {
            PagingMode::Legacy => {
                let pdi = Self::va_index_for(va, PageTableLevel::Pd, paging);
                Self::read_root_entry(xa, root, pdi, mode)?
            }
            PagingMode::Pae => {
                let pdpti = Self::va_index_for(va, PageTableLevel::Pdpt, paging);
                let pdpte = Self::read_root_entry(xa, root, pdpti, mode)?;

                if !pdpte.present() {
                    return Err(XaError::page_fault((va, root.address())));
                }

                let pdi = Self::va_index_for(va, PageTableLevel::Pd, paging);
                Self::read_entry(xa, pdpte.base(mode), pdi, mode)?
            }
        };

        tracing::trace!(%va, ?pde, "pde");

        if !pde.present() {
            return Err(XaError::page_fault((va, root.address())));
        }

        if pde.large() {
            if !paging.large_pages {
                return Err(XaError::LargePageUnsupported { address: va });
            }

            let offset = va.0 & (mode.large_page_size() - 1);
            return Ok(Ma(pde.large_base(mode) + offset));
        }

        let pti = Self::va_index_for(va, PageTableLevel::Pt, paging);
        let pte = Self::read_entry(xa, pde.base(mode), pti, mode)?;

        tracing::trace!(%va, ?pte, "pte");

        if !pte.present() {
            return Err(XaError::page_fault((va, root.address())));
        }

        Ok(Ma(pte.base(mode) + Self::va_offset(va)))
    }
}

impl X86 {
    /// Reads an entry of the top-level table.
    ///
    /// Kernel roots are read through the pseudo-physical address space,
    /// user roots through the kernel virtual address space.
    fn read_root_entry<Driver>(
        xa: &XaCore<Driver>,
        root: TranslationRoot,
        index: u64,
        mode: PagingMode,
    ) -> Result<PageTableEntry, XaError>
    where
        Driver: XaDriver<Architecture = Self>,
    {
        let offset = index * mode.entry_size();

        let value = match (root, mode) {
            (TranslationRoot::Kernel(pa), PagingMode::Legacy) => xa.read_u32_pa(pa + offset)? as u64,
            (TranslationRoot::Kernel(pa), PagingMode::Pae) => xa.read_u64_pa(pa + offset)?,
            (TranslationRoot::User(va), PagingMode::Legacy) => xa.read_u32_kva(va + offset)? as u64,
            (TranslationRoot::User(va), PagingMode::Pae) => xa.read_u64_kva(va + offset)?,
        };

        Ok(PageTableEntry(value))
    }

    /// Reads an entry of a lower-level table located at a machine address.
    fn read_entry<Driver>(
        xa: &XaCore<Driver>,
        table: u64,
        index: u64,
        mode: PagingMode,
    ) -> Result<PageTableEntry, XaError>
    where
        Driver: XaDriver<Architecture = Self>,
    {
        let ma = Ma(table + index * mode.entry_size());

        let value = match mode {
            PagingMode::Legacy => xa.read_u32_ma(ma)? as u64,
            PagingMode::Pae => xa.read_u64_ma(ma)?,
        };

        Ok(PageTableEntry(value))
    }
}
