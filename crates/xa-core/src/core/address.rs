use super::macros::impl_address;

impl_address!(Va, "guest virtual address");
impl_address!(Pa, "guest pseudo-physical address");
impl_address!(Ma, "host machine address");
impl_address!(Pfn, "guest pseudo-physical frame number");
impl_address!(Mfn, "host machine frame number");

impl Pa {
    /// Returns the pseudo-physical frame containing this address.
    pub const fn pfn(self, page_shift: u64) -> Pfn {
        Pfn(self.0 >> page_shift)
    }
}

impl Ma {
    /// Returns the machine frame containing this address.
    pub const fn mfn(self, page_shift: u64) -> Mfn {
        Mfn(self.0 >> page_shift)
    }
}

impl Pfn {
    /// Returns the address of the first byte of the frame.
    pub const fn pa(self, page_shift: u64) -> Pa {
        Pa(self.0 << page_shift)
    }
}

impl Mfn {
    /// Returns the address of the first byte of the frame.
    pub const fn ma(self, page_shift: u64) -> Ma {
        Ma(self.0 << page_shift)
    }
}
