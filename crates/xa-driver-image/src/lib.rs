//! Guest memory driver for raw physical memory images.
//!
//! A raw image is a flat dump of guest pseudo-physical memory, page 0
//! first. Images carry no CPU state, so the control registers of the guest
//! are supplied by the caller.

mod driver;
mod error;

use std::path::Path;

use xa_arch_x86::{Registers, X86};
use xa_core::{MemoryAccess, Mfn, Pfn, VcpuId, XaDriver, XaError, XaInfo, XaMappedPage};

pub use self::error::Error;
use self::driver::ImageDriver;

/// Guest memory driver for raw physical memory images.
pub struct XaImageDriver {
    inner: ImageDriver,
}

impl XaImageDriver {
    /// Maps a memory image.
    ///
    /// `registers` are reported as the state of vCPU 0.
    pub fn new(path: impl AsRef<Path>, registers: Registers) -> Result<Self, XaError> {
        Ok(Self {
            inner: ImageDriver::new(path, registers)?,
        })
    }

    /// Sets the domain ID reported by [`XaDriver::info`].
    pub fn with_domain_id(mut self, domain_id: u32) -> Self {
        self.inner.set_domain_id(domain_id);
        self
    }
}

impl XaDriver for XaImageDriver {
    type Architecture = X86;

    fn info(&self) -> Result<XaInfo, XaError> {
        Ok(self.inner.info()?)
    }

    fn registers(&self, vcpu: VcpuId) -> Result<Registers, XaError> {
        Ok(self.inner.registers(vcpu)?)
    }

    fn map_frame(&self, mfn: Mfn, access: MemoryAccess) -> Result<XaMappedPage, XaError> {
        if access.contains(MemoryAccess::W) {
            return Err(XaError::NotSupported);
        }

        Ok(self.inner.map_frame(mfn)?)
    }

    fn translate_pseudo_physical(&self, pfns: &[Pfn]) -> Result<Vec<Mfn>, XaError> {
        Ok(self.inner.translate_pseudo_physical(pfns)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;
    use xa_arch_x86::{Cr0, Cr3, Cr4};
    use xa_core::{Ma, Pa, Va, XaCore};

    use super::*;

    const CR0_PG: u64 = 1 << 31;

    /// Writes an image of `frames` pages into a temporary file.
    ///
    /// The file is removed when the returned handle is dropped.
    fn write_image(frames: usize, fill: impl Fn(&mut [u8])) -> NamedTempFile {
        let mut image = vec![0u8; frames * 0x1000];
        fill(&mut image);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&image).unwrap();
        file.flush().unwrap();
        file
    }

    fn registers() -> Registers {
        Registers {
            cr0: Cr0(CR0_PG | 1),
            cr3: Cr3(0x1000),
            cr4: Cr4(0),
        }
    }

    #[test]
    fn maps_frames_by_index() {
        let image = write_image(4, |image| {
            image[0x2000..0x2004].copy_from_slice(&0xdead_beef_u32.to_le_bytes());
        });

        let driver = XaImageDriver::new(image.path(), registers())
            .unwrap()
            .with_domain_id(7);
        let info = driver.info().unwrap();
        assert_eq!(info.domain_id, 7);
        assert_eq!(info.nr_pfns, 4);
        assert!(info.hvm);

        let page = driver.map_frame(Mfn(2), MemoryAccess::R).unwrap();
        assert_eq!(page.len(), 0x1000);
        assert_eq!(&page[..4], &0xdead_beef_u32.to_le_bytes());

        assert!(matches!(
            driver.map_frame(Mfn(4), MemoryAccess::R),
            Err(XaError::FrameMapping(Mfn(4)))
        ));
        assert!(matches!(
            driver.map_frame(Mfn(0), MemoryAccess::RW),
            Err(XaError::NotSupported)
        ));
    }

    #[test]
    fn identity_pseudo_physical_translation() {
        let image = write_image(2, |_| {});
        let driver = XaImageDriver::new(image.path(), registers()).unwrap();

        assert_eq!(
            driver.translate_pseudo_physical(&[Pfn(0), Pfn(1)]).unwrap(),
            vec![Mfn(0), Mfn(1)]
        );
        assert!(matches!(
            driver.translate_pseudo_physical(&[Pfn(2)]),
            Err(XaError::InvalidFrame(Pfn(2)))
        ));
        assert!(driver.registers(VcpuId(1)).is_err());
    }

    #[test]
    fn rejects_unaligned_images() {
        let mut image = NamedTempFile::new().unwrap();
        image.write_all(&[0u8; 100]).unwrap();
        image.flush().unwrap();

        assert!(matches!(
            XaImageDriver::new(image.path(), registers()),
            Err(XaError::Driver(_))
        ));
    }

    #[test]
    fn missing_image() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            XaImageDriver::new(dir.path().join("missing.raw"), registers()),
            Err(XaError::Io(_))
        ));
    }

    #[test]
    fn translates_through_the_image() {
        // Page directory at 0x1000, page table at 0x2000, data at 0x3000.
        let image = write_image(4, |image| {
            let pde = 0x300 * 4;
            image[0x1000 + pde..0x1000 + pde + 4].copy_from_slice(&0x2001_u32.to_le_bytes());
            image[0x2000..0x2004].copy_from_slice(&0x3001_u32.to_le_bytes());
            image[0x3010..0x3015].copy_from_slice(b"hello");
        });

        let driver = XaImageDriver::new(image.path(), registers()).unwrap();
        let xa = XaCore::new(driver, 0xc000_0000).unwrap();
        xa.set_kernel_root(Va(0xc000_1000));

        assert_eq!(xa.translate_kernel(Va(0xc000_0010)).unwrap(), Ma(0x3010));
        assert_eq!(xa.read_string_kva(Va(0xc000_0010), 16).unwrap(), "hello");
        assert_eq!(xa.read_u32_pa(Pa(0x2000)).unwrap(), 0x3001);
    }
}
