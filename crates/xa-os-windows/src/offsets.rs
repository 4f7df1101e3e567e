use xa_core::{DomainConfig, os::Field};

/// Length of `EPROCESS.ImageFileName`.
pub const IMAGE_FILE_NAME_LEN: u64 = 16;

/// Byte offsets into Windows kernel structures.
///
/// The defaults match a 32-bit Windows XP SP2 kernel. Each offset can be
/// overridden in the domain configuration under the key shown in its
/// documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offsets {
    /// `EPROCESS.ActiveProcessLinks` (`win_tasks`).
    pub tasks: u64,

    /// `EPROCESS.Pcb.DirectoryTableBase` (`win_pdbase`).
    pub pdbase: u64,

    /// `EPROCESS.UniqueProcessId` (`win_pid`).
    pub pid: u64,

    /// `EPROCESS.Peb` (`win_peb`).
    pub peb: u64,

    /// `EPROCESS.ImageFileName` (`win_pname`).
    pub name: u64,

    /// `PEB.ImageBaseAddress` (`win_iba`).
    pub iba: u64,

    /// `PEB.ProcessHeap` (`win_ph`).
    pub ph: u64,
}

impl Default for Offsets {
    fn default() -> Self {
        Self {
            tasks: 0x88,
            pdbase: 0x18,
            pid: 0x84,
            peb: 0x1b0,
            name: 0x174,
            iba: 0x8,
            ph: 0x18,
        }
    }
}

impl Offsets {
    /// Reads the offsets from a domain configuration.
    pub fn from_config(config: &DomainConfig) -> Self {
        let default = Self::default();

        Self {
            tasks: config.offset_or("win_tasks", default.tasks),
            pdbase: config.offset_or("win_pdbase", default.pdbase),
            pid: config.offset_or("win_pid", default.pid),
            peb: config.offset_or("win_peb", default.peb),
            name: config.offset_or("win_pname", default.name),
            iba: config.offset_or("win_iba", default.iba),
            ph: config.offset_or("win_ph", default.ph),
        }
    }

    /// Number of `EPROCESS` bytes needed to read every process field above.
    pub fn eprocess_len(&self) -> usize {
        [
            Field::u32(self.tasks).end(),
            Field::u32(self.pdbase).end(),
            Field::u32(self.pid).end(),
            Field::u32(self.peb).end(),
            Field::new(self.name, IMAGE_FILE_NAME_LEN).end(),
        ]
        .into_iter()
        .max()
        .unwrap_or_default() as usize
    }
}

#[cfg(test)]
mod tests {
    use xa_core::{OsKind, XaConfig};

    use super::*;

    #[test]
    fn defaults() {
        let offsets = Offsets::from_config(&DomainConfig::new(OsKind::Windows));
        assert_eq!(offsets, Offsets::default());
        assert_eq!(offsets.eprocess_len(), 0x1b4);
    }

    #[test]
    fn overrides() {
        let config = XaConfig::from_json(
            r#"{ "domains": { "win2k3": { "ostype": "Windows", "offsets": {
                "win_tasks": "0x98", "win_pid": "0x94", "win_peb": "0x190"
            } } } }"#,
        )
        .unwrap();

        let offsets = Offsets::from_config(config.domain("win2k3").unwrap());
        assert_eq!(offsets.tasks, 0x98);
        assert_eq!(offsets.pid, 0x94);
        assert_eq!(offsets.peb, 0x190);
        assert_eq!(offsets.pdbase, 0x18);
        assert_eq!(offsets.eprocess_len(), 0x194);
    }
}
