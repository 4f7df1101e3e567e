use std::ops::Deref;

use crate::{
    CacheKey, Ma, TranslationRoot, Va, XaCore, XaDriver, XaError, XaMappedPage,
    os::{ProcessHandle, ProcessId, ProcessIterator, XaOs},
};

/// An introspection session attached to one guest.
///
/// Combines [`XaCore`] with an OS implementation. Creating the session
/// locates the kernel page directory and the head of the process list.
/// Dropping it releases the translation cache and the frame indirection
/// table.
pub struct XaSession<Driver, Os>
where
    Driver: XaDriver,
    Os: XaOs<Driver>,
{
    core: XaCore<Driver>,
    os: Os,
    process_list_head: Va,
}

impl<Driver, Os> XaSession<Driver, Os>
where
    Driver: XaDriver,
    Os: XaOs<Driver>,
{
    /// Creates a new session.
    pub fn new(core: XaCore<Driver>, os: Os) -> Result<Self, XaError> {
        let root = os.kernel_page_directory(&core)?;
        core.set_kernel_root(root);

        let process_list_head = os.process_list_head(&core)?;

        tracing::debug!(
            os = %os.kind(),
            %root,
            head = %process_list_head,
            "session ready"
        );

        Ok(Self {
            core,
            os,
            process_list_head,
        })
    }

    /// Returns the core.
    pub fn core(&self) -> &XaCore<Driver> {
        &self.core
    }

    /// Returns the OS implementation.
    pub fn os(&self) -> &Os {
        &self.os
    }

    /// Returns the head of the process list.
    pub fn process_list_head(&self) -> Va {
        self.process_list_head
    }

    ///////////////////////////////////////////////////////////////////////////
    // Symbols
    ///////////////////////////////////////////////////////////////////////////

    /// Resolves a kernel symbol to its virtual address.
    pub fn symbol_address(&self, name: &str) -> Result<Va, XaError> {
        self.os.resolve_symbol(&self.core, name)
    }

    /// Translates a kernel symbol to a machine address.
    ///
    /// Successful translations are cached under the symbol name.
    pub fn translate_symbol(&self, name: &str) -> Result<Ma, XaError> {
        let key = CacheKey::Symbol(name.to_owned());

        if let Some(ma) = self.core.cache().borrow_mut().lookup(&key, ProcessId::KERNEL) {
            return Ok(ma);
        }

        let va = self.symbol_address(name)?;
        let ma = self.core.translate_kernel(va)?;

        self.core.cache().borrow_mut().insert(key, ProcessId::KERNEL, ma);
        Ok(ma)
    }

    /// Maps the frame holding a kernel symbol.
    ///
    /// Returns the page together with the offset of the symbol inside it.
    pub fn access_kernel_symbol(&self, name: &str) -> Result<(XaMappedPage, usize), XaError> {
        self.core.access_machine_address(self.translate_symbol(name)?)
    }

    /// Reads a 32-bit unsigned integer at a kernel symbol.
    pub fn read_u32_symbol(&self, name: &str) -> Result<u32, XaError> {
        self.core.read_u32_ma(self.translate_symbol(name)?)
    }

    /// Reads a 64-bit unsigned integer at a kernel symbol.
    pub fn read_u64_symbol(&self, name: &str) -> Result<u64, XaError> {
        self.core.read_u64_ma(self.translate_symbol(name)?)
    }

    ///////////////////////////////////////////////////////////////////////////
    // User address spaces
    ///////////////////////////////////////////////////////////////////////////

    /// Translates a virtual address in the address space of a process.
    ///
    /// Process id 0 denotes the kernel. Successful translations are cached
    /// for the owning process.
    pub fn translate_user(&self, va: Va, pid: ProcessId) -> Result<Ma, XaError> {
        if pid == ProcessId::KERNEL {
            return self.core.translate_kernel(va);
        }

        let key = CacheKey::Address(va);

        if let Some(ma) = self.core.cache().borrow_mut().lookup(&key, pid) {
            return Ok(ma);
        }

        let root = self.pid_to_page_directory(pid)?;
        let ma = self.core.translate(va, TranslationRoot::User(root))?;

        self.core.cache().borrow_mut().insert(key, pid, ma);
        Ok(ma)
    }

    /// Maps the frame backing a virtual address of a process.
    pub fn access_user_virtual_address(
        &self,
        va: Va,
        pid: ProcessId,
    ) -> Result<(XaMappedPage, usize), XaError> {
        self.core.access_machine_address(self.translate_user(va, pid)?)
    }

    /// Reads memory in the address space of a process.
    pub fn read_uva(&self, va: Va, pid: ProcessId, buffer: &mut [u8]) -> Result<(), XaError> {
        self.core
            .read_translated(va.0, buffer, |address| self.translate_user(Va(address), pid))
    }

    /// Reads a 32-bit unsigned integer in the address space of a process.
    pub fn read_u32_uva(&self, va: Va, pid: ProcessId) -> Result<u32, XaError> {
        let mut buffer = [0u8; 4];
        self.read_uva(va, pid, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a guest pointer in the address space of a process.
    pub fn read_va_uva(&self, va: Va, pid: ProcessId) -> Result<Va, XaError> {
        self.read_u32_uva(va, pid).map(Va::from)
    }

    ///////////////////////////////////////////////////////////////////////////
    // Processes
    ///////////////////////////////////////////////////////////////////////////

    /// Finds the process with the given id.
    ///
    /// Returns `Ok(None)` if no such process exists.
    pub fn find_process(&self, pid: ProcessId) -> Result<Option<ProcessHandle>, XaError> {
        self.os.find_process(&self.core, self.process_list_head, pid)
    }

    /// Finds the page directory of the process with the given id.
    pub fn pid_to_page_directory(&self, pid: ProcessId) -> Result<Va, XaError> {
        self.os.pid_to_page_directory(&self.core, self.process_list_head, pid)
    }

    /// Returns the name of a process.
    pub fn process_name(&self, process: &ProcessHandle) -> Result<String, XaError> {
        self.os.process_name(&self.core, process)
    }

    /// Returns an iterator over the processes of the guest.
    pub fn processes(&self) -> ProcessIterator<'_, Driver> {
        ProcessIterator::new(&self.core, self.process_list_head, self.os.process_layout())
    }
}

impl<Driver, Os> Deref for XaSession<Driver, Os>
where
    Driver: XaDriver,
    Os: XaOs<Driver>,
{
    type Target = XaCore<Driver>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}
