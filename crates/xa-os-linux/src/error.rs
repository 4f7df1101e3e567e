/// Error types for Linux operations.
#[derive(thiserror::Error, Debug)]
pub enum LinuxError {
    /// A line of the `System.map` file could not be parsed.
    #[error("Malformed System.map entry at line {line}: `{text}`")]
    MalformedSymbolMap {
        /// The 1-based line number.
        line: usize,

        /// The offending line.
        text: String,
    },

    /// The process has no user address space.
    #[error("Process {0} is a kernel thread")]
    KernelThread(u32),

    /// Corrupted struct.
    #[error("Corrupted struct: {0}")]
    CorruptedStruct(&'static str),
}

impl From<LinuxError> for xa_core::XaError {
    fn from(value: LinuxError) -> Self {
        xa_core::XaError::Os(value.into())
    }
}
