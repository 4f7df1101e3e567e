//! OS-specific functionality.
//!
//! The core knows nothing about a particular kernel. Each supported OS
//! implements [`XaOs`], which tells the session where the kernel page
//! directory and the process list live, and how to read a process record.

mod process;
mod struct_reader;
mod symbols;
mod walker;

use serde::{Deserialize, Serialize};

pub use self::{
    process::{ProcessHandle, ProcessId, ProcessObject},
    struct_reader::{Field, StructReader},
    symbols::SymbolResolver,
    walker::{ProcessIterator, ProcessLayout, find_process},
};
use crate::{Va, XaCore, XaDriver, XaError};

/// The kind of guest operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsKind {
    /// Linux.
    Linux,

    /// Windows.
    Windows,
}

impl OsKind {
    /// Returns the default start of the kernel address space.
    ///
    /// # Platform-specific
    ///
    /// - **Linux**: `0xC0000000`
    /// - **Windows**: `0x80000000`
    pub fn default_page_offset(self) -> u64 {
        match self {
            Self::Linux => 0xc000_0000,
            Self::Windows => 0x8000_0000,
        }
    }
}

impl std::fmt::Display for OsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Linux => f.write_str("Linux"),
            Self::Windows => f.write_str("Windows"),
        }
    }
}

/// OS capabilities required by a session.
pub trait XaOs<Driver>
where
    Driver: XaDriver,
{
    /// Returns the kind of the operating system.
    fn kind(&self) -> OsKind;

    /// Returns the start of the kernel address space.
    fn page_offset(&self) -> u64;

    /// Resolves a kernel symbol to its virtual address.
    fn resolve_symbol(&self, xa: &XaCore<Driver>, name: &str) -> Result<Va, XaError>;

    /// Locates the kernel page directory.
    ///
    /// The result is a kernel virtual address.
    fn kernel_page_directory(&self, xa: &XaCore<Driver>) -> Result<Va, XaError>;

    /// Locates the head of the process list.
    ///
    /// Called after the kernel page directory has been installed, so kernel
    /// virtual reads are available.
    fn process_list_head(&self, xa: &XaCore<Driver>) -> Result<Va, XaError>;

    /// Returns the layout of a process record.
    fn process_layout(&self) -> ProcessLayout;

    /// Reads the page directory of a process.
    ///
    /// # Platform-specific
    ///
    /// - **Linux**: `task_struct.mm->pgd`
    /// - **Windows**: `EPROCESS.Pcb.DirectoryTableBase` plus the kernel page
    ///   offset
    fn process_page_directory(
        &self,
        xa: &XaCore<Driver>,
        process: &ProcessHandle,
    ) -> Result<Va, XaError>;

    /// Returns the name of a process.
    ///
    /// # Platform-specific
    ///
    /// - **Linux**: `task_struct.comm` (limited to 16 characters)
    /// - **Windows**: `EPROCESS.ImageFileName` (limited to 16 characters)
    fn process_name(&self, xa: &XaCore<Driver>, process: &ProcessHandle)
    -> Result<String, XaError>;

    /// Finds the process with the given id in the list starting at `head`.
    fn find_process(
        &self,
        xa: &XaCore<Driver>,
        head: Va,
        pid: ProcessId,
    ) -> Result<Option<ProcessHandle>, XaError> {
        find_process(xa, head, &self.process_layout(), pid)
    }

    /// Finds the page directory of the process with the given id.
    fn pid_to_page_directory(
        &self,
        xa: &XaCore<Driver>,
        head: Va,
        pid: ProcessId,
    ) -> Result<Va, XaError> {
        let process = self
            .find_process(xa, head, pid)?
            .ok_or(XaError::ProcessNotFound(pid.0))?;

        self.process_page_directory(xa, &process)
    }
}
