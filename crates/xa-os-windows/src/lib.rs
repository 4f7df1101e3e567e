//! Windows OS-specific introspection.
//!
//! Kernel symbols are resolved through a dump of the kernel's export
//! table. The table only knows RVAs, so the physical base of the kernel
//! image is located first by scanning low physical memory for a PE header
//! whose `PsInitialSystemProcess` export points at a valid `EPROCESS`.

mod error;
mod export_table;
mod offsets;

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use xa_core::{
    DomainConfig, OsKind, Pa, Va, XaCore, XaDriver, XaError, XaOs, XaSession,
    os::{Field, ProcessHandle, ProcessId, ProcessLayout, SymbolResolver},
};

pub use self::{
    error::WindowsError,
    export_table::ExportTable,
    offsets::{IMAGE_FILE_NAME_LEN, Offsets},
};

/// `MZ`, the first two bytes of a PE image.
const IMAGE_DOS_SIGNATURE: u32 = 0x5a4d;

/// First word of the `DISPATCHER_HEADER` of a process object.
const PROCESS_DISPATCHER_HEADER: u32 = 0x001b_0003;

/// The kernel image is searched for below this physical address.
const KERNEL_SCAN_LIMIT: u64 = 0x0100_0000;

/// Introspection of Windows guests.
#[derive(Debug)]
pub struct WindowsOs {
    offsets: Offsets,
    exports: ExportTable,
    page_offset: u64,
    kernel_base: OnceCell<Pa>,
}

/// Selected fields of a process environment block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peb {
    /// `PEB.ImageBaseAddress`
    pub image_base_address: Va,

    /// `PEB.ProcessHeap`
    pub process_heap: Va,
}

impl WindowsOs {
    /// Creates a new `WindowsOs` from a domain configuration.
    ///
    /// Loads the export table named by the configuration.
    pub fn new(config: &DomainConfig) -> Result<Self, XaError> {
        let exports = ExportTable::from_path(config.sysmap()?)?;

        Ok(Self::with_exports(
            Offsets::from_config(config),
            exports,
            config.page_offset(),
        ))
    }

    /// Creates a new `WindowsOs` from already loaded parts.
    pub fn with_exports(offsets: Offsets, exports: ExportTable, page_offset: u64) -> Self {
        Self {
            offsets,
            exports,
            page_offset,
            kernel_base: OnceCell::new(),
        }
    }

    /// Returns the structure offsets.
    pub fn offsets(&self) -> &Offsets {
        &self.offsets
    }

    /// Returns the kernel export table.
    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    /// Returns the physical base address of the kernel image.
    ///
    /// The address is searched for on the first call and remembered.
    pub fn kernel_base<Driver>(&self, xa: &XaCore<Driver>) -> Result<Pa, XaError>
    where
        Driver: XaDriver,
    {
        self.kernel_base
            .get_or_try_init(|| self.find_kernel_base(xa))
            .copied()
    }

    /// Reads the process environment block of a process.
    ///
    /// The PEB lives in the user address space of the process. Uses the
    /// offsets of the session's own `WindowsOs`.
    pub fn peb<Driver>(xa: &XaSession<Driver, Self>, pid: ProcessId) -> Result<Peb, XaError>
    where
        Driver: XaDriver,
    {
        let offsets = &xa.os().offsets;
        let process = xa
            .find_process(pid)?
            .ok_or(XaError::ProcessNotFound(pid.0))?;

        let peb = process.read_va(offsets.peb)?;
        if peb.is_null() {
            return Err(WindowsError::MissingPeb(pid.0).into());
        }

        Ok(Peb {
            image_base_address: xa.read_va_uva(peb + offsets.iba, pid)?,
            process_heap: xa.read_va_uva(peb + offsets.ph, pid)?,
        })
    }

    fn find_kernel_base<Driver>(&self, xa: &XaCore<Driver>) -> Result<Pa, XaError>
    where
        Driver: XaDriver,
    {
        let sysproc_rva = self.exports.resolve_symbol("PsInitialSystemProcess")?;
        let page_size = xa.page_size();

        let mut base = Pa(page_size);
        while base.0 < KERNEL_SCAN_LIMIT {
            let is_image = matches!(
                xa.read_u32_pa(base),
                Ok(header) if header & 0xffff == IMAGE_DOS_SIGNATURE
            );

            if is_image && self.is_kernel_base(xa, base, sysproc_rva) {
                tracing::debug!(%base, "found kernel image");
                return Ok(base);
            }

            base += page_size;
        }

        tracing::warn!("no kernel image below {:#x}", KERNEL_SCAN_LIMIT);
        Err(WindowsError::KernelBaseNotFound.into())
    }

    fn is_kernel_base<Driver>(&self, xa: &XaCore<Driver>, base: Pa, sysproc_rva: u64) -> bool
    where
        Driver: XaDriver,
    {
        let sysproc = match self.system_process(xa, base, sysproc_rva) {
            Ok(sysproc) => sysproc,
            Err(_) => return false,
        };

        matches!(xa.read_u32_pa(sysproc), Ok(PROCESS_DISPATCHER_HEADER))
    }

    /// Returns the physical address of the `EPROCESS` of the System process.
    ///
    /// Follows `PsInitialSystemProcess` of the kernel image at `base`.
    fn system_process<Driver>(
        &self,
        xa: &XaCore<Driver>,
        base: Pa,
        sysproc_rva: u64,
    ) -> Result<Pa, XaError>
    where
        Driver: XaDriver,
    {
        let sysproc = Va::from(xa.read_u32_pa(base + sysproc_rva)?);
        if sysproc.0 <= self.page_offset {
            return Err(WindowsError::CorruptedStruct("PsInitialSystemProcess").into());
        }

        xa.kernel_va_to_pa(sysproc)
    }

    fn initial_system_process<Driver>(&self, xa: &XaCore<Driver>) -> Result<Pa, XaError>
    where
        Driver: XaDriver,
    {
        let base = self.kernel_base(xa)?;
        let sysproc_rva = self.exports.resolve_symbol("PsInitialSystemProcess")?;
        self.system_process(xa, base, sysproc_rva)
    }
}

impl<Driver> XaOs<Driver> for WindowsOs
where
    Driver: XaDriver,
{
    fn kind(&self) -> OsKind {
        OsKind::Windows
    }

    fn page_offset(&self) -> u64 {
        self.page_offset
    }

    fn resolve_symbol(&self, xa: &XaCore<Driver>, name: &str) -> Result<Va, XaError> {
        let rva = self.exports.resolve_symbol(name)?;
        let base = self.kernel_base(xa)?;
        Ok(Va(base.0 + rva + self.page_offset))
    }

    fn kernel_page_directory(&self, xa: &XaCore<Driver>) -> Result<Va, XaError> {
        let sysproc = self.initial_system_process(xa)?;
        tracing::debug!(%sysproc, "found System process");

        let directory_table_base = xa.read_u32_pa(sysproc + self.offsets.pdbase)?;
        Ok(Va(directory_table_base as u64 + self.page_offset))
    }

    fn process_list_head(&self, xa: &XaCore<Driver>) -> Result<Va, XaError> {
        let sysproc = self.initial_system_process(xa)?;
        Ok(Va::from(xa.read_u32_pa(sysproc + self.offsets.tasks)?))
    }

    fn process_layout(&self) -> ProcessLayout {
        ProcessLayout {
            link_offset: self.offsets.tasks,
            pid: Field::u32(self.offsets.pid),
            record_len: self.offsets.eprocess_len(),
        }
    }

    fn process_page_directory(
        &self,
        _xa: &XaCore<Driver>,
        process: &ProcessHandle,
    ) -> Result<Va, XaError> {
        let directory_table_base = process.read(Field::u32(self.offsets.pdbase))?;
        Ok(Va(directory_table_base + self.page_offset))
    }

    fn process_name(
        &self,
        _xa: &XaCore<Driver>,
        process: &ProcessHandle,
    ) -> Result<String, XaError> {
        process
            .record()
            .read_string(self.offsets.name, IMAGE_FILE_NAME_LEN)
    }
}
