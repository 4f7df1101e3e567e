use xa_core::{DomainConfig, os::Field};

/// Length of `task_struct.comm`.
pub const TASK_COMM_LEN: u64 = 16;

/// Byte offsets into Linux kernel structures.
///
/// The defaults match a 2.6-era 32-bit Xen guest kernel. Each offset can be
/// overridden in the domain configuration under the key shown in its
/// documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offsets {
    /// `task_struct.tasks` (`linux_tasks`).
    pub tasks: u64,

    /// `task_struct.mm` (`linux_mm`).
    pub mm: u64,

    /// `task_struct.pid` (`linux_pid`).
    pub pid: u64,

    /// `task_struct.comm` (`linux_name`).
    pub name: u64,

    /// `mm_struct.pgd` (`linux_pgd`).
    pub pgd: u64,

    /// `mm_struct.start_code` (`linux_addr`).
    pub addr: u64,
}

impl Default for Offsets {
    fn default() -> Self {
        Self {
            tasks: 0x60,
            mm: 0x78,
            pid: 0x9c,
            name: 0x1b0,
            pgd: 0x24,
            addr: 0x80,
        }
    }
}

impl Offsets {
    /// Reads the offsets from a domain configuration.
    pub fn from_config(config: &DomainConfig) -> Self {
        let default = Self::default();

        Self {
            tasks: config.offset_or("linux_tasks", default.tasks),
            mm: config.offset_or("linux_mm", default.mm),
            pid: config.offset_or("linux_pid", default.pid),
            name: config.offset_or("linux_name", default.name),
            pgd: config.offset_or("linux_pgd", default.pgd),
            addr: config.offset_or("linux_addr", default.addr),
        }
    }

    /// Number of `task_struct` bytes needed to read every field above.
    pub fn task_struct_len(&self) -> usize {
        [
            Field::u32(self.tasks).end(),
            Field::u32(self.mm).end(),
            Field::u32(self.pid).end(),
            Field::new(self.name, TASK_COMM_LEN).end(),
        ]
        .into_iter()
        .max()
        .unwrap_or_default() as usize
    }
}
