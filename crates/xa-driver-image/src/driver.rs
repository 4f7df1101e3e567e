use std::{fs::File, path::Path};

use memmap2::Mmap;
use xa_arch_x86::Registers;
use xa_core::{Mfn, Pfn, VcpuId, XaInfo, XaMappedPage};

use crate::Error;

const PAGE_SIZE: u64 = 0x1000;
const PAGE_SHIFT: u64 = 12;

pub struct ImageDriver {
    mmap: Mmap,
    registers: Registers,
    domain_id: u32,
}

impl ImageDriver {
    pub fn new(path: impl AsRef<Path>, registers: Registers) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // SAFETY: The image is opened read-only and is not expected to be
        // modified while mapped.
        let mmap = unsafe { Mmap::map(&file)? };

        let size = mmap.len() as u64;
        if size % PAGE_SIZE != 0 {
            return Err(Error::UnalignedImage(size));
        }

        tracing::debug!(
            path = %path.display(),
            frames = size >> PAGE_SHIFT,
            "mapped memory image"
        );

        Ok(Self {
            mmap,
            registers,
            domain_id: 0,
        })
    }

    pub fn set_domain_id(&mut self, domain_id: u32) {
        self.domain_id = domain_id;
    }

    pub fn nr_frames(&self) -> u64 {
        self.mmap.len() as u64 >> PAGE_SHIFT
    }

    pub fn info(&self) -> Result<XaInfo, Error> {
        Ok(XaInfo {
            domain_id: self.domain_id,
            page_size: PAGE_SIZE,
            page_shift: PAGE_SHIFT,
            nr_pfns: self.nr_frames(),
            shared_info_frame: Mfn(0),
            hvm: true,
            vcpus: 1,
        })
    }

    pub fn registers(&self, vcpu: VcpuId) -> Result<Registers, Error> {
        if vcpu.0 != 0 {
            return Err(Error::InvalidVcpu(vcpu.0));
        }

        Ok(self.registers)
    }

    pub fn map_frame(&self, mfn: Mfn) -> Result<XaMappedPage, Error> {
        if mfn.0 >= self.nr_frames() {
            return Err(Error::FrameOutOfBounds(mfn));
        }

        let start = (mfn.0 << PAGE_SHIFT) as usize;
        let end = start + PAGE_SIZE as usize;
        let content = &self.mmap[start..end];

        Ok(XaMappedPage::new(Vec::from(content)))
    }

    /// The image holds pseudo-physical memory, so frames map to themselves.
    pub fn translate_pseudo_physical(&self, pfns: &[Pfn]) -> Result<Vec<Mfn>, Error> {
        pfns.iter()
            .map(|&pfn| {
                if pfn.0 < self.nr_frames() {
                    Ok(Mfn(pfn.0))
                } else {
                    Err(Error::PfnOutOfBounds(pfn))
                }
            })
            .collect()
    }
}
