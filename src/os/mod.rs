//! Operating system implementations.

#[cfg(all(feature = "os-linux", feature = "os-windows"))]
mod any;

#[cfg(all(feature = "os-linux", feature = "os-windows"))]
#[cfg_attr(docsrs, doc(cfg(all(feature = "os-linux", feature = "os-windows"))))]
pub use self::any::AnyOs;

#[cfg(feature = "os-linux")]
#[cfg_attr(docsrs, doc(cfg(feature = "os-linux")))]
pub mod linux {
    //! Linux guests.

    pub use xa_os_linux::*;
}

#[cfg(feature = "os-windows")]
#[cfg_attr(docsrs, doc(cfg(feature = "os-windows")))]
pub mod windows {
    //! Windows guests.

    pub use xa_os_windows::*;
}

pub use xa_core::os::*;
