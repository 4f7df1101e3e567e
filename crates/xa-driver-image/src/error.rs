use xa_core::{Mfn, Pfn};

/// Error type for the memory image driver.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The image size is not a multiple of the page size.
    #[error("Image size {0:#x} is not page aligned")]
    UnalignedImage(u64),

    /// The frame lies outside the image.
    #[error("Frame {0} is outside the image")]
    FrameOutOfBounds(Mfn),

    /// The pseudo-physical frame lies outside the image.
    #[error("Pseudo-physical frame {0} is outside the image")]
    PfnOutOfBounds(Pfn),

    /// The image has a single vCPU.
    #[error("No such vCPU: {0}")]
    InvalidVcpu(u16),
}

impl From<Error> for xa_core::XaError {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(value) => Self::Io(value),
            Error::FrameOutOfBounds(mfn) => Self::FrameMapping(mfn),
            Error::PfnOutOfBounds(pfn) => Self::InvalidFrame(pfn),
            value => Self::Driver(Box::new(value)),
        }
    }
}
