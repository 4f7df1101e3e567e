//! Pseudo-physical to machine frame translation.
//!
//! Paravirtualized guests publish their frame table as a three-level
//! structure rooted in the shared info page:
//!
//! ```text
//! shared_info.arch.pfn_to_mfn_frame_list_list
//!     -> frame list list (one frame of mfns)
//!         -> frame lists (mfns of the table frames)
//!             -> table (one mfn per pfn)
//! ```
//!
//! The table is copied out once and kept for the lifetime of the session.

use once_cell::unsync::OnceCell;

use crate::{MemoryAccess, Mfn, Pfn, XaDriver, XaError, XaInfo, XaMappedPage};

/// Offset of `arch.pfn_to_mfn_frame_list_list` in the x86_32 `shared_info`
/// page.
pub const SHARED_INFO_FRAME_LIST_LIST: usize = 0x910;

/// Table entry marking a pfn without a backing machine frame.
pub const INVALID_P2M_ENTRY: u32 = u32::MAX;

/// Size of a frame number in the guest's frame lists.
const ENTRY_SIZE: usize = size_of::<u32>();

/// Lazily built frame indirection table.
#[derive(Debug, Default)]
pub struct FrameTable {
    table: OnceCell<Vec<Mfn>>,
}

impl FrameTable {
    /// Creates an empty, not yet built table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether the table has been built.
    pub fn is_built(&self) -> bool {
        self.table.get().is_some()
    }

    /// Returns the number of frames in the table, if built.
    pub fn len(&self) -> Option<usize> {
        self.table.get().map(Vec::len)
    }

    /// Resolves a pseudo-physical frame to a machine frame.
    ///
    /// The table is built on first use. A failed build leaves the table
    /// absent, so the next call tries again.
    pub fn resolve<Driver>(&self, driver: &Driver, info: &XaInfo, pfn: Pfn) -> Result<Mfn, XaError>
    where
        Driver: XaDriver,
    {
        let table = self.table.get_or_try_init(|| Self::build(driver, info))?;

        match table.get(pfn.0 as usize) {
            Some(&mfn) if mfn.0 != INVALID_P2M_ENTRY as u64 => Ok(mfn),
            _ => Err(XaError::InvalidFrame(pfn)),
        }
    }

    /// Builds the table by walking the guest's frame lists.
    ///
    /// All frames mapped here are released before returning.
    fn build<Driver>(driver: &Driver, info: &XaInfo) -> Result<Vec<Mfn>, XaError>
    where
        Driver: XaDriver,
    {
        let nr_pfns = info.nr_pfns as usize;
        let per_page = info.page_size as usize / ENTRY_SIZE;

        if nr_pfns == 0 {
            return Err(XaError::Other("guest has no frames"));
        }

        let table_frames = nr_pfns.div_ceil(per_page);
        let list_frames = table_frames.div_ceil(per_page);

        tracing::debug!(
            nr_pfns,
            table_frames,
            list_frames,
            shared_info = %info.shared_info_frame,
            "building frame table"
        );

        let list_list_mfn = {
            let shared_info = driver.map_frame(info.shared_info_frame, MemoryAccess::R)?;
            read_frame_numbers(&[shared_info], SHARED_INFO_FRAME_LIST_LIST, 1)?[0]
        };

        if list_list_mfn.is_null() {
            return Err(XaError::FrameMapping(list_list_mfn));
        }

        let list_mfns = {
            let list_list = driver.map_frame(list_list_mfn, MemoryAccess::R)?;
            read_frame_numbers(&[list_list], 0, list_frames)?
        };

        let table_mfns = {
            let lists = driver.map_frames(&list_mfns, MemoryAccess::R)?;
            read_frame_numbers(&lists, 0, table_frames)?
        };

        let table = driver.map_frames(&table_mfns, MemoryAccess::R)?;
        read_frame_numbers(&table, 0, nr_pfns)
    }
}

/// Reads `count` frame numbers starting at `offset` from a run of mapped
/// frames, treated as one contiguous buffer.
fn read_frame_numbers(
    pages: &[XaMappedPage],
    offset: usize,
    count: usize,
) -> Result<Vec<Mfn>, XaError> {
    debug_assert_eq!(offset % ENTRY_SIZE, 0);

    let result = pages
        .iter()
        .flat_map(|page| page.chunks_exact(ENTRY_SIZE))
        .skip(offset / ENTRY_SIZE)
        .take(count)
        .map(|bytes| Mfn(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64))
        .collect::<Vec<_>>();

    if result.len() != count {
        return Err(XaError::OutOfBounds);
    }

    Ok(result)
}
