//! Circular process list traversal.
//!
//! Both supported kernels chain their process records through an embedded
//! doubly linked list. The head points at the list link of the first record,
//! and each link's first word points at the link of the next record.
//!
//! The walk stops as soon as a link points back at the head. The record
//! whose link closes the cycle is therefore never reported.

use super::{Field, ProcessHandle, ProcessId, ProcessObject, StructReader};
use crate::{Va, XaCore, XaDriver, XaError};

/// Upper bound on the number of links followed in one walk.
const MAX_LINKS: usize = 0x10000;

/// Where the walker finds its way around a process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLayout {
    /// Offset of the list link inside the record.
    pub link_offset: u64,

    /// The process id field.
    pub pid: Field,

    /// Number of bytes copied into a [`ProcessHandle`].
    pub record_len: usize,
}

impl ProcessLayout {
    fn object(&self, link: Va) -> ProcessObject {
        ProcessObject(link - self.link_offset)
    }
}

/// Finds the process record with the given id.
///
/// Returns `Ok(None)` when the walk returns to `head` without a match.
pub fn find_process<Driver>(
    xa: &XaCore<Driver>,
    head: Va,
    layout: &ProcessLayout,
    pid: ProcessId,
) -> Result<Option<ProcessHandle>, XaError>
where
    Driver: XaDriver,
{
    let mut current = head;

    for _ in 0..MAX_LINKS {
        let next = xa.read_va_kva(current)?;
        if next == head {
            tracing::debug!(%pid, "process not found");
            return Ok(None);
        }

        let object = layout.object(current);
        let id = xa.read_u32_kva(object.0 + layout.pid.offset)?;

        if id == pid.0 {
            let record = StructReader::new(xa, object.0, layout.record_len)?;
            return Ok(Some(ProcessHandle::new(object, pid, record)));
        }

        current = next;
    }

    Err(XaError::Other("process list does not return to its head"))
}

/// An iterator over the records of a circular process list.
///
/// Follows the same rules as [`find_process`].
pub struct ProcessIterator<'a, Driver>
where
    Driver: XaDriver,
{
    xa: &'a XaCore<Driver>,
    layout: ProcessLayout,
    head: Va,
    current: Option<Va>,
    remaining: usize,
}

impl<'a, Driver> ProcessIterator<'a, Driver>
where
    Driver: XaDriver,
{
    /// Creates a new iterator starting at `head`.
    pub fn new(xa: &'a XaCore<Driver>, head: Va, layout: ProcessLayout) -> Self {
        Self {
            xa,
            layout,
            head,
            current: Some(head),
            remaining: MAX_LINKS,
        }
    }

    fn __next(&mut self) -> Result<Option<ProcessHandle>, XaError> {
        let current = match self.current {
            Some(current) => current,
            None => return Ok(None),
        };

        if self.remaining == 0 {
            self.current = None;
            return Err(XaError::Other("process list does not return to its head"));
        }
        self.remaining -= 1;

        let next = self.xa.read_va_kva(current)?;
        if next == self.head {
            self.current = None;
            return Ok(None);
        }

        let object = self.layout.object(current);
        let record = StructReader::new(self.xa, object.0, self.layout.record_len)?;
        let id = ProcessId(record.read(self.layout.pid)? as u32);

        self.current = Some(next);
        Ok(Some(ProcessHandle::new(object, id, record)))
    }
}

impl<Driver> Iterator for ProcessIterator<'_, Driver>
where
    Driver: XaDriver,
{
    type Item = Result<ProcessHandle, XaError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.__next().transpose();
        if matches!(result, Some(Err(_))) {
            self.current = None;
        }
        result
    }
}

impl<Driver> std::iter::FusedIterator for ProcessIterator<'_, Driver> where Driver: XaDriver {}
