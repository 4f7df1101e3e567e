/// `CR0` control register.
///
/// Controls the operating mode of the processor.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr0(pub u64);

impl Cr0 {
    /// Checks if the CR0.PG flag is set.
    ///
    /// Enables paging when set. Without it, linear addresses are physical
    /// addresses and there is nothing to walk.
    pub fn paging(self) -> bool {
        (self.0 >> 31) & 1 != 0
    }
}

impl std::fmt::Debug for Cr0 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Cr0")
            .field("paging", &self.paging())
            .finish()
    }
}

impl From<u64> for Cr0 {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
