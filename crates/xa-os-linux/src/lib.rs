//! Linux OS-specific introspection.
//!
//! Kernel symbols come from the guest's `System.map`. Process records are
//! `task_struct`s chained through `task_struct.tasks`, starting at
//! `init_task`.

mod error;
mod offsets;
mod system_map;

use xa_core::{
    DomainConfig, OsKind, Va, XaCore, XaDriver, XaError, XaOs, XaSession,
    os::{Field, ProcessHandle, ProcessId, ProcessLayout, SymbolResolver},
};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub use self::{
    error::LinuxError,
    offsets::{Offsets, TASK_COMM_LEN},
    system_map::SystemMap,
};

/// Introspection of Linux guests.
#[derive(Debug)]
pub struct LinuxOs {
    offsets: Offsets,
    symbols: SystemMap,
    page_offset: u64,
}

/// Address space boundaries from a process's `mm_struct`.
///
/// The fields mirror the `mm_struct` members starting at `start_code`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(C)]
pub struct TaskAddresses {
    /// Start of the code segment.
    pub start_code: u32,
    /// End of the code segment.
    pub end_code: u32,
    /// Start of the data segment.
    pub start_data: u32,
    /// End of the data segment.
    pub end_data: u32,
    /// Start of the heap.
    pub start_brk: u32,
    /// Current end of the heap.
    pub brk: u32,
    /// Start of the stack.
    pub start_stack: u32,
    /// Start of the command line arguments.
    pub arg_start: u32,
    /// End of the command line arguments.
    pub arg_end: u32,
    /// Start of the environment.
    pub env_start: u32,
    /// End of the environment.
    pub env_end: u32,
}

impl LinuxOs {
    /// Creates a new `LinuxOs` from a domain configuration.
    ///
    /// Loads the `System.map` named by the configuration.
    pub fn new(config: &DomainConfig) -> Result<Self, XaError> {
        let symbols = SystemMap::from_path(config.sysmap()?)?;

        Ok(Self::with_symbols(
            Offsets::from_config(config),
            symbols,
            config.page_offset(),
        ))
    }

    /// Creates a new `LinuxOs` from already loaded parts.
    pub fn with_symbols(offsets: Offsets, symbols: SystemMap, page_offset: u64) -> Self {
        Self {
            offsets,
            symbols,
            page_offset,
        }
    }

    /// Returns the structure offsets.
    pub fn offsets(&self) -> &Offsets {
        &self.offsets
    }

    /// Returns the kernel symbols.
    pub fn symbols(&self) -> &SystemMap {
        &self.symbols
    }

    /// Returns the memory descriptor (`task_struct.mm`) of a process.
    ///
    /// Kernel threads have none and yield [`LinuxError::KernelThread`].
    pub fn mm(&self, process: &ProcessHandle) -> Result<Va, XaError> {
        let mm = process.read_va(self.offsets.mm)?;
        if mm.is_null() {
            return Err(LinuxError::KernelThread(process.id().0).into());
        }

        Ok(mm)
    }

    /// Reads the address space boundaries of a process.
    ///
    /// Uses the offsets of the session's own `LinuxOs`.
    pub fn task_addresses<Driver>(
        xa: &XaSession<Driver, Self>,
        pid: ProcessId,
    ) -> Result<TaskAddresses, XaError>
    where
        Driver: XaDriver,
    {
        let os = xa.os();
        let process = xa
            .find_process(pid)?
            .ok_or(XaError::ProcessNotFound(pid.0))?;

        let mm = os.mm(&process)?;
        xa.read_struct_kva(mm + os.offsets.addr)
    }
}

impl<Driver> XaOs<Driver> for LinuxOs
where
    Driver: XaDriver,
{
    fn kind(&self) -> OsKind {
        OsKind::Linux
    }

    fn page_offset(&self) -> u64 {
        self.page_offset
    }

    fn resolve_symbol(&self, _xa: &XaCore<Driver>, name: &str) -> Result<Va, XaError> {
        self.symbols.resolve_symbol(name).map(Va)
    }

    fn kernel_page_directory(&self, xa: &XaCore<Driver>) -> Result<Va, XaError> {
        let swapper_pg_dir = Va(self.symbols.resolve_symbol("swapper_pg_dir")?);
        tracing::debug!(%swapper_pg_dir, "found swapper_pg_dir");

        if xa.info().hvm {
            return Ok(swapper_pg_dir);
        }

        // Paravirtualized kernels keep the address of the directory in use
        // in the first word of swapper_pg_dir.
        let pgd = xa.read_u32_pa(xa.kernel_va_to_pa(swapper_pg_dir)?)?;
        if pgd == 0 {
            return Err(LinuxError::CorruptedStruct("swapper_pg_dir").into());
        }

        Ok(Va::from(pgd))
    }

    fn process_list_head(&self, xa: &XaCore<Driver>) -> Result<Va, XaError> {
        let init_task = Va(self.symbols.resolve_symbol("init_task")?);
        xa.read_va_kva(init_task + self.offsets.tasks)
    }

    fn process_layout(&self) -> ProcessLayout {
        ProcessLayout {
            link_offset: self.offsets.tasks,
            pid: Field::u32(self.offsets.pid),
            record_len: self.offsets.task_struct_len(),
        }
    }

    fn process_page_directory(
        &self,
        xa: &XaCore<Driver>,
        process: &ProcessHandle,
    ) -> Result<Va, XaError> {
        let mm = self.mm(process)?;
        xa.read_va_kva(mm + self.offsets.pgd)
    }

    fn process_name(
        &self,
        _xa: &XaCore<Driver>,
        process: &ProcessHandle,
    ) -> Result<String, XaError> {
        process
            .record()
            .read_string(self.offsets.name, TASK_COMM_LEN)
    }
}
