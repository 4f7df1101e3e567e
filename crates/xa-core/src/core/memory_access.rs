use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Access requested when mapping a guest frame.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MemoryAccess: u8 {
        /// Read permission.
        const R = 0b00000001;

        /// Write permission.
        const W = 0b00000010;

        /// Combined Read and Write permissions.
        const RW = Self::R.bits() | Self::W.bits();
    }
}

impl std::fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let r = if self.contains(Self::R) { 'r' } else { '-' };
        let w = if self.contains(Self::W) { 'w' } else { '-' };
        write!(f, "{r}{w}")
    }
}
