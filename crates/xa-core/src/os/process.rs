use serde::{Deserialize, Serialize};

use super::{Field, StructReader};
use crate::{Va, XaError};

/// A process ID within a system.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// The pseudo process owning kernel translations.
    pub const KERNEL: Self = Self(0);
}

impl From<u32> for ProcessId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ProcessId> for u32 {
    fn from(value: ProcessId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process object within a system.
///
/// Equivalent to `EPROCESS*` on Windows or `task_struct*` on Linux.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProcessObject(pub Va);

impl ProcessObject {
    /// Checks if the process object is a null reference.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl From<Va> for ProcessObject {
    fn from(va: Va) -> Self {
        Self(va)
    }
}

impl From<ProcessObject> for Va {
    fn from(value: ProcessObject) -> Self {
        value.0
    }
}

impl std::fmt::Display for ProcessObject {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process record located in guest memory.
///
/// The handle owns a copy of the record bytes taken when the process was
/// found. It holds no guest mapping.
#[derive(Debug)]
pub struct ProcessHandle {
    object: ProcessObject,
    id: ProcessId,
    record: StructReader,
}

impl ProcessHandle {
    /// Creates a new process handle.
    pub fn new(object: ProcessObject, id: ProcessId, record: StructReader) -> Self {
        Self { object, id, record }
    }

    /// Returns the address of the process record.
    pub fn object(&self) -> ProcessObject {
        self.object
    }

    /// Returns the process ID.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Returns the snapshot of the process record.
    pub fn record(&self) -> &StructReader {
        &self.record
    }

    /// Reads a field of the process record.
    pub fn read(&self, field: Field) -> Result<u64, XaError> {
        self.record.read(field)
    }

    /// Reads a pointer-sized field of the process record as a virtual
    /// address.
    pub fn read_va(&self, offset: u64) -> Result<Va, XaError> {
        Ok(Va(self.record.read(Field::u32(offset))?))
    }
}
