mod address;
mod info;
pub(crate) mod macros;
mod memory_access;
mod vcpu_id;

pub use self::{
    address::{Ma, Mfn, Pa, Pfn, Va},
    info::XaInfo,
    memory_access::MemoryAccess,
    vcpu_id::VcpuId,
};
