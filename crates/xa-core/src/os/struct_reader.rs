use crate::{Va, XaCore, XaDriver, XaError};

/// The location of a field inside a guest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    /// Byte offset from the start of the record.
    pub offset: u64,

    /// Size of the field in bytes.
    pub size: u64,
}

impl Field {
    /// Creates a new field descriptor.
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// A 32-bit field, which is also the size of a guest pointer.
    pub const fn u32(offset: u64) -> Self {
        Self::new(offset, 4)
    }

    /// A 64-bit field.
    pub const fn u64(offset: u64) -> Self {
        Self::new(offset, 8)
    }

    /// Returns the offset one past the end of the field.
    pub const fn end(self) -> u64 {
        self.offset + self.size
    }
}

/// A bounds-checked view of a guest record.
///
/// The record is read from guest memory once and then accessed through
/// [`Field`] descriptors. A field that does not fit the record yields
/// [`XaError::OutOfBounds`] instead of reading past it.
///
/// # Examples
///
/// ```
/// use xa_core::os::{Field, StructReader};
///
/// let record = StructReader::from_bytes(vec![0x78, 0x56, 0x34, 0x12, 0xff]);
/// assert_eq!(record.read(Field::u32(0)).unwrap(), 0x1234_5678);
/// assert!(record.read(Field::u32(2)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct StructReader(Vec<u8>);

impl StructReader {
    /// Reads `len` bytes at the kernel virtual address `va`.
    pub fn new<Driver>(xa: &XaCore<Driver>, va: Va, len: usize) -> Result<Self, XaError>
    where
        Driver: XaDriver,
    {
        let mut buffer = vec![0u8; len];
        xa.read_kva(va, &mut buffer)?;
        Ok(Self(buffer))
    }

    /// Wraps an already read record.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the size of the record.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a field value from the record.
    ///
    /// The value is interpreted as a little-endian integer of the field's
    /// size and returned zero-extended.
    pub fn read(&self, field: Field) -> Result<u64, XaError> {
        let data = self.bytes(field.offset, field.size)?;

        match data.len() {
            1 => Ok(data[0] as u64),
            2 => Ok(u16::from_le_bytes([data[0], data[1]]) as u64),
            4 => Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64),
            8 => Ok(u64::from_le_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ])),
            _ => Err(XaError::OutOfBounds),
        }
    }

    /// Returns `size` raw bytes starting at `offset`.
    pub fn bytes(&self, offset: u64, size: u64) -> Result<&[u8], XaError> {
        let offset = usize::try_from(offset).map_err(|_| XaError::OutOfBounds)?;
        let size = usize::try_from(size).map_err(|_| XaError::OutOfBounds)?;

        let offset_end = offset.checked_add(size).ok_or(XaError::OutOfBounds)?;
        self.0.get(offset..offset_end).ok_or(XaError::OutOfBounds)
    }

    /// Reads a NUL-terminated string of at most `size` bytes at `offset`.
    pub fn read_string(&self, offset: u64, size: u64) -> Result<String, XaError> {
        let data = self.bytes(offset, size)?;
        let end = memchr::memchr(0, data).unwrap_or(data.len());
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }
}
