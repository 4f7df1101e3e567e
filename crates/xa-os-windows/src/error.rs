/// Error types for Windows operations.
#[derive(thiserror::Error, Debug)]
pub enum WindowsError {
    /// No kernel image was found in the scanned physical range.
    #[error("Kernel image base not found")]
    KernelBaseNotFound,

    /// The process has no process environment block.
    #[error("Process {0} has no PEB")]
    MissingPeb(u32),

    /// Corrupted struct.
    #[error("Corrupted struct: {0}")]
    CorruptedStruct(&'static str),
}

impl From<WindowsError> for xa_core::XaError {
    fn from(value: WindowsError) -> Self {
        xa_core::XaError::Os(value.into())
    }
}
