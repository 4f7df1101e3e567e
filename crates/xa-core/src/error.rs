use crate::{Mfn, Pfn, Va};

/// An error that can occur while introspecting a guest.
#[derive(thiserror::Error, Debug)]
pub enum XaError {
    /// An error occurred in the driver.
    #[error(transparent)]
    Driver(Box<dyn std::error::Error>),

    /// An OS-specific error occurred.
    #[error(transparent)]
    Os(Box<dyn std::error::Error>),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error(transparent)]
    Config(#[from] serde_json::Error),

    /// A page table entry was not present during translation.
    #[error("Page not present ({:?}, len: {})", .0[0], .0.len())]
    PageFault(PageFaults),

    /// A large page was encountered while large pages are disabled.
    #[error("Large page at {address} while PSE is disabled")]
    LargePageUnsupported {
        /// The virtual address being translated.
        address: Va,
    },

    /// The driver could not map a machine frame.
    #[error("Failed to map machine frame {0}")]
    FrameMapping(Mfn),

    /// A pseudo-physical frame could not be resolved to a machine frame.
    #[error("Invalid pseudo-physical frame {0}")]
    InvalidFrame(Pfn),

    /// No configuration is available for the domain.
    #[error("No configuration for domain `{0}`")]
    ConfigurationMissing(String),

    /// The symbol could not be resolved.
    #[error("Symbol `{0}` not found")]
    SymbolNotFound(String),

    /// No process with the given id exists in the guest.
    #[error("Process {0} not found")]
    ProcessNotFound(u32),

    /// Paging is disabled in the guest.
    #[error("Paging is disabled")]
    PagingDisabled,

    /// Operation not supported.
    #[error("Operation not supported.")]
    NotSupported,

    /// Out of bounds.
    #[error("Out of bounds")]
    OutOfBounds,

    /// Root not present.
    #[error("Root not present")]
    RootNotPresent,

    /// Other error.
    #[error("{0}")]
    Other(&'static str),
}

/// A page table entry that was not present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageFault {
    /// The virtual address being translated.
    pub address: Va,

    /// The root of the page table hierarchy.
    pub root: u64,
}

/// A collection of page faults.
pub type PageFaults = smallvec::SmallVec<[PageFault; 1]>;

impl<T> From<(Va, T)> for PageFault
where
    T: Into<u64>,
{
    fn from((address, root): (Va, T)) -> Self {
        Self {
            address,
            root: root.into(),
        }
    }
}

impl XaError {
    /// Creates a new page fault error.
    pub fn page_fault(pf: impl Into<PageFault>) -> Self {
        Self::PageFault(smallvec::smallvec![pf.into()])
    }

    /// Checks whether the error is a translation failure.
    ///
    /// Translation failures are a missing page table entry, or a large page
    /// encountered while large pages are disabled.
    pub fn is_translation_failure(&self) -> bool {
        matches!(self, Self::PageFault(_) | Self::LargePageUnsupported { .. })
    }
}
