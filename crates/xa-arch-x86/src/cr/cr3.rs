/// `CR3` control register.
///
/// Contains the physical address of the top-level paging structure of the
/// current process. Reported with the rest of the vCPU state; translations
/// use the kernel root located through the guest OS instead.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr3(pub u64);

impl std::fmt::Debug for Cr3 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Cr3(0x{:08x})", self.0)
    }
}

impl From<u64> for Cr3 {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
