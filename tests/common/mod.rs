#![allow(dead_code)]

use std::{cell::RefCell, collections::HashMap};

use xa::{
    Ma, MemoryAccess, Mfn, Pa, Pfn, Va, VcpuId, XaDriver, XaError, XaInfo, XaMappedPage,
    arch::x86::{Cr0, Cr3, Cr4, Registers, X86},
    p2m::SHARED_INFO_FRAME_LIST_LIST,
};

pub const CR0_PG: u64 = 1 << 31;
pub const CR4_PSE: u64 = 1 << 4;

/// Number of pseudo-physical frames of the mock guest (4 MB).
pub const NR_PFNS: u64 = 0x400;

/// Machine frames backing the frame lists of paravirtualized guests.
const SHARED_INFO: Mfn = Mfn(0x2000);
const FRAME_LIST_LIST: Mfn = Mfn(0x2001);
const FRAME_LIST: Mfn = Mfn(0x2002);
const FRAME_TABLE: Mfn = Mfn(0x2003);

/// Machine frames of paravirtualized guests are shifted by this much.
pub const PV_FRAME_SHIFT: u64 = 0x1000;

///////////////////////////////////////////////////////////////////////////////
// Mock Driver
///////////////////////////////////////////////////////////////////////////////

/// A guest backed by a map of machine frames.
///
/// Pseudo-physical memory is written through [`MockDriver::write_pa`]. For
/// hardware-virtualized guests pfn and mfn are equal; paravirtualized
/// guests get a frame table mapping pfn `n` to mfn `n + 0x1000`.
pub struct MockDriver {
    hvm: bool,
    pages: RefCell<HashMap<Mfn, Vec<u8>>>,
    maps: RefCell<usize>,
}

impl MockDriver {
    pub fn hvm() -> Self {
        Self {
            hvm: true,
            pages: RefCell::new(HashMap::new()),
            maps: RefCell::new(0),
        }
    }

    pub fn pv() -> Self {
        let driver = Self {
            hvm: false,
            ..Self::hvm()
        };

        driver.write_ma(
            SHARED_INFO.ma(12) + SHARED_INFO_FRAME_LIST_LIST as u64,
            &(FRAME_LIST_LIST.0 as u32).to_le_bytes(),
        );
        driver.write_ma(FRAME_LIST_LIST.ma(12), &(FRAME_LIST.0 as u32).to_le_bytes());
        driver.write_ma(FRAME_LIST.ma(12), &(FRAME_TABLE.0 as u32).to_le_bytes());
        for pfn in 0..NR_PFNS {
            let mfn = (pfn + PV_FRAME_SHIFT) as u32;
            driver.write_ma(FRAME_TABLE.ma(12) + pfn * 4, &mfn.to_le_bytes());
        }

        driver
    }

    pub fn pfn_to_mfn(&self, pfn: Pfn) -> Mfn {
        if self.hvm {
            Mfn(pfn.0)
        } else {
            Mfn(pfn.0 + PV_FRAME_SHIFT)
        }
    }

    pub fn pa_to_ma(&self, pa: Pa) -> Ma {
        self.pfn_to_mfn(pa.pfn(12)).ma(12) + (pa.0 & 0xfff)
    }

    pub fn write_ma(&self, ma: Ma, bytes: &[u8]) {
        let mut pages = self.pages.borrow_mut();
        let page = pages
            .entry(ma.mfn(12))
            .or_insert_with(|| vec![0u8; 4096]);
        let offset = (ma.0 & 0xfff) as usize;
        page[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Writes bytes at a pseudo-physical address. Must not cross a page.
    pub fn write_pa(&self, pa: Pa, bytes: &[u8]) {
        self.write_ma(self.pa_to_ma(pa), bytes);
    }

    pub fn write_u32_pa(&self, pa: Pa, value: u32) {
        self.write_pa(pa, &value.to_le_bytes());
    }

    /// Returns the number of frames mapped so far.
    pub fn maps(&self) -> usize {
        *self.maps.borrow()
    }
}

impl XaDriver for MockDriver {
    type Architecture = X86;

    fn info(&self) -> Result<XaInfo, XaError> {
        Ok(XaInfo {
            domain_id: 3,
            page_size: 4096,
            page_shift: 12,
            nr_pfns: NR_PFNS,
            shared_info_frame: SHARED_INFO,
            hvm: self.hvm,
            vcpus: 1,
        })
    }

    fn registers(&self, _vcpu: VcpuId) -> Result<Registers, XaError> {
        Ok(Registers {
            cr0: Cr0(CR0_PG | 1),
            cr3: Cr3(0x1000),
            cr4: Cr4(CR4_PSE),
        })
    }

    fn map_frame(&self, mfn: Mfn, _access: MemoryAccess) -> Result<XaMappedPage, XaError> {
        *self.maps.borrow_mut() += 1;

        let pages = self.pages.borrow();
        let page = pages.get(&mfn).ok_or(XaError::FrameMapping(mfn))?;
        Ok(XaMappedPage::new(page.clone()))
    }

    fn translate_pseudo_physical(&self, pfns: &[Pfn]) -> Result<Vec<Mfn>, XaError> {
        if !self.hvm {
            return Err(XaError::NotSupported);
        }

        Ok(pfns.iter().map(|&pfn| self.pfn_to_mfn(pfn)).collect())
    }
}

///////////////////////////////////////////////////////////////////////////////
// Guest Layout
///////////////////////////////////////////////////////////////////////////////

/// Maps the first 4 MB of pseudo-physical memory at `page_offset` with a
/// large page in the page directory at `directory`.
pub fn map_kernel_window(driver: &MockDriver, directory: Pa, page_offset: u64) {
    let index = page_offset >> 22;
    let base = driver.pa_to_ma(Pa(0));
    driver.write_u32_pa(directory + index * 4, (base.0 | 0x83) as u32);
}

/// Maps the user page at `va` to the pseudo-physical page `page` through
/// the page directory at `directory`, using `table` for the page table.
///
/// Page table entries hold machine addresses.
pub fn map_user_page(driver: &MockDriver, directory: Pa, table: Pa, va: Va, page: Pa) {
    let pdi = (va.0 >> 22) & 0x3ff;
    let pti = (va.0 >> 12) & 0x3ff;

    let table_ma = driver.pa_to_ma(table);
    let page_ma = driver.pa_to_ma(page);

    driver.write_u32_pa(directory + pdi * 4, (table_ma.0 | 0x67) as u32);
    driver.write_u32_pa(table + pti * 4, (page_ma.0 | 0x07) as u32);
}

/// Links the records at `records` into a circular list through the link
/// field at `link_offset`. The last record points back at the first.
pub fn link_records(driver: &MockDriver, records: &[Pa], link_offset: u64, page_offset: u64) {
    for (index, record) in records.iter().enumerate() {
        let next = records[(index + 1) % records.len()];
        let next_link = next.0 + link_offset + page_offset;
        driver.write_u32_pa(*record + link_offset, next_link as u32);
    }
}
