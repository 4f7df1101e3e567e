//! Memory introspection for 32-bit x86 Xen guests.
//!
//! This crate re-exports the workspace crates behind one facade:
//!
//! - [`xa_core`] at the root: addresses, the driver trait, translation,
//!   the translation cache, the frame indirection table and sessions.
//! - [`arch::x86`]: 32-bit and PAE page table walks.
//! - [`driver::image`]: a driver for raw physical memory images.
//! - [`os::linux`] and [`os::windows`]: kernel bootstrap and process
//!   records, with [`os::AnyOs`] choosing between them from a
//!   configuration entry.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use xa_core::*;

pub mod arch {
    //! Architecture implementations.

    #[cfg(feature = "arch-x86")]
    #[cfg_attr(docsrs, doc(cfg(feature = "arch-x86")))]
    pub mod x86 {
        //! 32-bit x86 architecture.

        pub use xa_arch_x86::*;
    }

    pub use xa_core::arch::*;
}

pub mod driver {
    //! Guest memory drivers.

    #[cfg(feature = "driver-image")]
    #[cfg_attr(docsrs, doc(cfg(feature = "driver-image")))]
    pub mod image {
        //! Raw physical memory images.

        pub use xa_driver_image::*;
    }

    pub use xa_core::XaDriver;
}

pub mod os;
