//! Core guest memory introspection functionality.

pub mod arch;
pub mod cache;
pub mod config;
mod core;
mod driver;
mod error;
pub mod os;
pub mod p2m;
mod page;
mod session;

use std::cell::{Cell, RefCell};

use zerocopy::{FromBytes, IntoBytes};

pub use self::{
    arch::{Architecture, Registers, TranslationRoot},
    cache::{CacheKey, TranslationCache},
    config::{DomainConfig, XaConfig},
    core::{Ma, MemoryAccess, Mfn, Pa, Pfn, Va, VcpuId, XaInfo},
    driver::XaDriver,
    error::{PageFault, PageFaults, XaError},
    os::{OsKind, ProcessHandle, ProcessId, XaOs},
    p2m::FrameTable,
    page::XaMappedPage,
    session::XaSession,
};

/// Paging configuration of the driver's architecture.
pub type PagingConfig<Driver> =
    <<Driver as XaDriver>::Architecture as Architecture>::PagingConfig;

/// The core functionality for guest memory introspection.
///
/// Owns the driver together with the per-guest state every translation
/// needs: the paging configuration read from the first vCPU, the kernel
/// page directory, the translation cache and the frame indirection table.
pub struct XaCore<Driver>
where
    Driver: XaDriver,
{
    driver: Driver,
    info: XaInfo,
    paging: PagingConfig<Driver>,
    page_offset: u64,
    kernel_root: Cell<Option<Va>>,
    cache: RefCell<TranslationCache>,
    frame_table: FrameTable,
}

impl<Driver> XaCore<Driver>
where
    Driver: XaDriver,
{
    /// Creates a new `XaCore` instance with the given driver.
    ///
    /// `page_offset` is the start of the guest kernel's address space. The
    /// paging configuration is read from vCPU 0.
    pub fn new(driver: Driver, page_offset: u64) -> Result<Self, XaError> {
        let info = driver.info()?;
        let registers = driver.registers(VcpuId(0))?;
        let paging = Driver::Architecture::paging_config(&registers)?;

        tracing::debug!(
            domain_id = info.domain_id,
            hvm = info.hvm,
            nr_pfns = info.nr_pfns,
            ?paging,
            page_offset = %Va(page_offset),
            "attached to guest"
        );

        Ok(Self {
            cache: RefCell::new(TranslationCache::new(info.page_size)),
            driver,
            info,
            paging,
            page_offset,
            kernel_root: Cell::new(None),
            frame_table: FrameTable::new(),
        })
    }

    /// Replaces the translation cache with one of the given capacity.
    ///
    /// A capacity of zero disables caching.
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        let page_size = self.info.page_size;
        self.cache.replace(TranslationCache::with_capacity(capacity, page_size));
        self
    }

    /// Returns the driver used by this `XaCore` instance.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Returns information about the guest domain.
    pub fn info(&self) -> &XaInfo {
        &self.info
    }

    /// Returns the paging configuration of the guest.
    pub fn paging(&self) -> PagingConfig<Driver> {
        self.paging
    }

    /// Returns the start of the guest kernel's address space.
    pub fn page_offset(&self) -> u64 {
        self.page_offset
    }

    /// Returns the size of a guest page.
    pub fn page_size(&self) -> u64 {
        self.info.page_size
    }

    /// Returns the translation cache.
    pub fn cache(&self) -> &RefCell<TranslationCache> {
        &self.cache
    }

    /// Returns the frame indirection table.
    pub fn frame_table(&self) -> &FrameTable {
        &self.frame_table
    }

    /// Returns the kernel page directory.
    pub fn kernel_root(&self) -> Result<Va, XaError> {
        self.kernel_root.get().ok_or(XaError::RootNotPresent)
    }

    /// Installs the kernel page directory.
    ///
    /// Cached translations are dropped, since they were made against the
    /// previous root.
    pub fn set_kernel_root(&self, root: Va) {
        tracing::debug!(%root, "kernel page directory");
        self.kernel_root.set(Some(root));
        self.cache.borrow_mut().invalidate_all();
    }

    /// Converts a kernel virtual address in the linearly mapped window to a
    /// pseudo-physical address.
    pub fn kernel_va_to_pa(&self, va: Va) -> Result<Pa, XaError> {
        match va.checked_sub(self.page_offset) {
            Some(pa) => Ok(Pa(pa.0)),
            None => Err(XaError::OutOfBounds),
        }
    }

    ///////////////////////////////////////////////////////////////////////////
    // Frames
    ///////////////////////////////////////////////////////////////////////////

    /// Resolves a pseudo-physical frame to a machine frame.
    ///
    /// Hardware-virtualized guests ask the driver directly. Paravirtualized
    /// guests go through the frame indirection table, which is built on the
    /// first call.
    pub fn pfn_to_mfn(&self, pfn: Pfn) -> Result<Mfn, XaError> {
        if self.info.hvm {
            let mfns = self.driver.translate_pseudo_physical(&[pfn])?;
            return mfns.first().copied().ok_or(XaError::InvalidFrame(pfn));
        }

        self.frame_table.resolve(&self.driver, &self.info, pfn)
    }

    /// Converts a pseudo-physical address to a machine address.
    pub fn pa_to_ma(&self, pa: Pa) -> Result<Ma, XaError> {
        let shift = self.info.page_shift;
        let mfn = self.pfn_to_mfn(pa.pfn(shift))?;
        Ok(mfn.ma(shift) + self.page_in_offset(pa.0))
    }

    /// Maps the machine frame containing `ma`.
    ///
    /// Returns the page together with the offset of `ma` inside it.
    pub fn access_machine_address(&self, ma: Ma) -> Result<(XaMappedPage, usize), XaError> {
        let page = self
            .driver
            .map_frame(ma.mfn(self.info.page_shift), MemoryAccess::R)?;
        Ok((page, self.page_in_offset(ma.0) as usize))
    }

    /// Maps the frame backing the pseudo-physical address `pa`.
    pub fn access_physical_address(&self, pa: Pa) -> Result<(XaMappedPage, usize), XaError> {
        self.access_machine_address(self.pa_to_ma(pa)?)
    }

    /// Maps the frame backing the kernel virtual address `va`.
    pub fn access_kernel_virtual_address(
        &self,
        va: Va,
    ) -> Result<(XaMappedPage, usize), XaError> {
        self.access_machine_address(self.translate_kernel(va)?)
    }

    ///////////////////////////////////////////////////////////////////////////
    // Translation
    ///////////////////////////////////////////////////////////////////////////

    /// Walks the page tables rooted at `root` to translate `va`.
    ///
    /// The result is not cached.
    pub fn translate(&self, va: Va, root: TranslationRoot) -> Result<Ma, XaError> {
        Driver::Architecture::translate_address(self, va, root)
    }

    /// Translates a kernel virtual address using the kernel page directory.
    ///
    /// Successful translations are cached for the kernel pseudo process.
    pub fn translate_kernel(&self, va: Va) -> Result<Ma, XaError> {
        let key = CacheKey::Address(va);

        if let Some(ma) = self.cache.borrow_mut().lookup(&key, ProcessId::KERNEL) {
            return Ok(ma);
        }

        let root = self.kernel_va_to_pa(self.kernel_root()?)?;
        let ma = self.translate(va, TranslationRoot::Kernel(root))?;

        self.cache.borrow_mut().insert(key, ProcessId::KERNEL, ma);
        Ok(ma)
    }

    ///////////////////////////////////////////////////////////////////////////
    // Reads
    ///////////////////////////////////////////////////////////////////////////

    /// Reads memory at a machine address.
    pub fn read_ma(&self, ma: Ma, buffer: &mut [u8]) -> Result<(), XaError> {
        self.read_translated(ma.0, buffer, |address| Ok(Ma(address)))
    }

    /// Reads memory at a pseudo-physical address.
    pub fn read_pa(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), XaError> {
        self.read_translated(pa.0, buffer, |address| self.pa_to_ma(Pa(address)))
    }

    /// Reads memory at a kernel virtual address.
    pub fn read_kva(&self, va: Va, buffer: &mut [u8]) -> Result<(), XaError> {
        self.read_translated(va.0, buffer, |address| self.translate_kernel(Va(address)))
    }

    /// Reads a 32-bit unsigned integer at a machine address.
    pub fn read_u32_ma(&self, ma: Ma) -> Result<u32, XaError> {
        let mut buffer = [0u8; 4];
        self.read_ma(ma, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit unsigned integer at a machine address.
    pub fn read_u64_ma(&self, ma: Ma) -> Result<u64, XaError> {
        let mut buffer = [0u8; 8];
        self.read_ma(ma, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads a 32-bit unsigned integer at a pseudo-physical address.
    pub fn read_u32_pa(&self, pa: Pa) -> Result<u32, XaError> {
        let mut buffer = [0u8; 4];
        self.read_pa(pa, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit unsigned integer at a pseudo-physical address.
    pub fn read_u64_pa(&self, pa: Pa) -> Result<u64, XaError> {
        let mut buffer = [0u8; 8];
        self.read_pa(pa, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads a 32-bit unsigned integer at a kernel virtual address.
    pub fn read_u32_kva(&self, va: Va) -> Result<u32, XaError> {
        let mut buffer = [0u8; 4];
        self.read_kva(va, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit unsigned integer at a kernel virtual address.
    pub fn read_u64_kva(&self, va: Va) -> Result<u64, XaError> {
        let mut buffer = [0u8; 8];
        self.read_kva(va, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads a guest pointer at a kernel virtual address.
    pub fn read_va_kva(&self, va: Va) -> Result<Va, XaError> {
        self.read_u32_kva(va).map(Va::from)
    }

    /// Reads a struct at a kernel virtual address.
    pub fn read_struct_kva<T>(&self, va: Va) -> Result<T, XaError>
    where
        T: FromBytes + IntoBytes,
    {
        let mut result = T::new_zeroed();
        self.read_kva(va, result.as_mut_bytes())?;
        Ok(result)
    }

    /// Reads a NUL-terminated string of at most `limit` bytes at a kernel
    /// virtual address.
    ///
    /// Reading stops at the end of the page once a terminator is seen, so
    /// the string may end right before an unmapped page.
    pub fn read_string_kva(&self, va: Va, limit: usize) -> Result<String, XaError> {
        let mut result = Vec::new();
        let mut address = va;

        while result.len() < limit {
            let in_page = (self.page_size() - self.page_in_offset(address.0)) as usize;
            let mut chunk = vec![0u8; in_page.min(limit - result.len())];
            self.read_kva(address, &mut chunk)?;

            if let Some(end) = memchr::memchr(0, &chunk) {
                result.extend_from_slice(&chunk[..end]);
                break;
            }

            address += chunk.len() as u64;
            result.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&result).into_owned())
    }

    /// Reads `buffer.len()` bytes starting at `address`, translating each
    /// page separately.
    pub(crate) fn read_translated(
        &self,
        address: u64,
        buffer: &mut [u8],
        translate: impl Fn(u64) -> Result<Ma, XaError>,
    ) -> Result<(), XaError> {
        let mut position = 0usize;

        while position < buffer.len() {
            let ma = translate(address + position as u64)?;
            let (page, offset) = self.access_machine_address(ma)?;
            let page = match page.get(offset..) {
                Some(page) if !page.is_empty() => page,
                _ => return Err(XaError::OutOfBounds),
            };

            let size = std::cmp::min(buffer.len() - position, page.len());
            buffer[position..position + size].copy_from_slice(&page[..size]);

            position += size;
        }

        Ok(())
    }

    fn page_in_offset(&self, address: u64) -> u64 {
        address & (self.info.page_size - 1)
    }
}
