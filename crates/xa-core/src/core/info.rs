use serde::{Deserialize, Serialize};

use crate::Mfn;

/// Represents information about the guest domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaInfo {
    /// The domain identifier.
    pub domain_id: u32,

    /// The size of a page in bytes.
    pub page_size: u64,

    /// The shift value to convert a page number to a page address.
    pub page_shift: u64,

    /// The number of pseudo-physical frames assigned to the guest.
    pub nr_pfns: u64,

    /// The machine frame holding the guest's shared info page.
    ///
    /// Only meaningful for paravirtualized guests.
    pub shared_info_frame: Mfn,

    /// Whether the guest is hardware-virtualized.
    pub hvm: bool,

    /// The number of virtual CPUs.
    pub vcpus: u16,
}
