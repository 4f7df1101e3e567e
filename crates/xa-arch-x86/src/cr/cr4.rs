/// `CR4` control register.
///
/// Contains architectural feature enable bits.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr4(pub u64);

impl Cr4 {
    /// Checks if the CR4.PSE flag is set.
    ///
    /// Enables 4-MByte pages with 32-bit paging when set; restricts
    /// 32-bit paging to pages of 4 KBytes when clear.
    pub fn page_size_extension(self) -> bool {
        (self.0 >> 4) & 1 != 0
    }

    /// Checks if the CR4.PAE flag is set.
    ///
    /// When set, enables paging to produce physical addresses
    /// with more than 32 bits. When clear, restricts physical addresses to 32
    /// bits.
    pub fn physical_address_extension(self) -> bool {
        (self.0 >> 5) & 1 != 0
    }
}

impl std::fmt::Debug for Cr4 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Cr4")
            .field("page_size_extension", &self.page_size_extension())
            .field("physical_address_extension", &self.physical_address_extension())
            .finish()
    }
}

impl From<u64> for Cr4 {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
