use crate::{Architecture, MemoryAccess, Mfn, Pfn, VcpuId, XaError, XaInfo, XaMappedPage};

/// A trait for implementing a guest memory driver.
///
/// The driver is the only component that touches the hypervisor. Every other
/// operation in this crate is built on [`map_frame`].
///
/// [`map_frame`]: Self::map_frame
pub trait XaDriver {
    /// The architecture supported by the driver.
    type Architecture: Architecture + ?Sized;

    /// Retrieves information about the guest domain.
    fn info(&self) -> Result<XaInfo, XaError>;

    /// Retrieves the registers of a specific virtual CPU.
    fn registers(
        &self,
        vcpu: VcpuId,
    ) -> Result<<Self::Architecture as Architecture>::Registers, XaError>;

    /// Maps a single machine frame into local memory.
    ///
    /// The frame is unmapped when the returned page is dropped.
    fn map_frame(&self, mfn: Mfn, access: MemoryAccess) -> Result<XaMappedPage, XaError>;

    /// Maps a batch of machine frames into local memory.
    ///
    /// The default implementation maps the frames one by one and fails on
    /// the first frame that cannot be mapped.
    fn map_frames(&self, mfns: &[Mfn], access: MemoryAccess) -> Result<Vec<XaMappedPage>, XaError> {
        mfns.iter()
            .map(|&mfn| self.map_frame(mfn, access))
            .collect()
    }

    /// Asks the hypervisor to translate pseudo-physical frames to machine
    /// frames.
    ///
    /// Only hardware-virtualized guests support this operation.
    fn translate_pseudo_physical(&self, pfns: &[Pfn]) -> Result<Vec<Mfn>, XaError>;
}
