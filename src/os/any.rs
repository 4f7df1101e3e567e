use xa_core::{
    DomainConfig, OsKind, Va, XaCore, XaDriver, XaError, XaOs,
    os::{ProcessHandle, ProcessLayout},
};
use xa_os_linux::LinuxOs;
use xa_os_windows::WindowsOs;

/// Either supported operating system, chosen at runtime.
#[derive(Debug)]
pub enum AnyOs {
    /// A Linux guest.
    Linux(LinuxOs),

    /// A Windows guest.
    Windows(WindowsOs),
}

macro_rules! dispatch {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            AnyOs::Linux(os) => XaOs::<Driver>::$method(os, $($arg),*),
            AnyOs::Windows(os) => XaOs::<Driver>::$method(os, $($arg),*),
        }
    };
}

impl AnyOs {
    /// Creates the OS implementation named by a domain configuration.
    pub fn from_config(config: &DomainConfig) -> Result<Self, XaError> {
        tracing::debug!(ostype = %config.ostype, "selecting OS");

        match config.ostype {
            OsKind::Linux => Ok(Self::Linux(LinuxOs::new(config)?)),
            OsKind::Windows => Ok(Self::Windows(WindowsOs::new(config)?)),
        }
    }

    /// Returns the Linux implementation, if this is a Linux guest.
    pub fn as_linux(&self) -> Option<&LinuxOs> {
        match self {
            Self::Linux(os) => Some(os),
            Self::Windows(_) => None,
        }
    }

    /// Returns the Windows implementation, if this is a Windows guest.
    pub fn as_windows(&self) -> Option<&WindowsOs> {
        match self {
            Self::Linux(_) => None,
            Self::Windows(os) => Some(os),
        }
    }
}

impl From<LinuxOs> for AnyOs {
    fn from(value: LinuxOs) -> Self {
        Self::Linux(value)
    }
}

impl From<WindowsOs> for AnyOs {
    fn from(value: WindowsOs) -> Self {
        Self::Windows(value)
    }
}

impl<Driver> XaOs<Driver> for AnyOs
where
    Driver: XaDriver,
{
    fn kind(&self) -> OsKind {
        dispatch!(self, kind())
    }

    fn page_offset(&self) -> u64 {
        dispatch!(self, page_offset())
    }

    fn resolve_symbol(&self, xa: &XaCore<Driver>, name: &str) -> Result<Va, XaError> {
        dispatch!(self, resolve_symbol(xa, name))
    }

    fn kernel_page_directory(&self, xa: &XaCore<Driver>) -> Result<Va, XaError> {
        dispatch!(self, kernel_page_directory(xa))
    }

    fn process_list_head(&self, xa: &XaCore<Driver>) -> Result<Va, XaError> {
        dispatch!(self, process_list_head(xa))
    }

    fn process_layout(&self) -> ProcessLayout {
        dispatch!(self, process_layout())
    }

    fn process_page_directory(
        &self,
        xa: &XaCore<Driver>,
        process: &ProcessHandle,
    ) -> Result<Va, XaError> {
        dispatch!(self, process_page_directory(xa, process))
    }

    fn process_name(
        &self,
        xa: &XaCore<Driver>,
        process: &ProcessHandle,
    ) -> Result<String, XaError> {
        dispatch!(self, process_name(xa, process))
    }
}
