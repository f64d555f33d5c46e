use crate::backend::{Address, MemoryBackend};
use crate::protection::ProtectionMask;

/// Whether `[address, address + len)` lies inside one committed region whose
/// protection is in `mask`. Pure query.
pub(crate) fn probe<B: MemoryBackend + ?Sized>(
    backend: &B,
    address: Address,
    len: usize,
    mask: ProtectionMask,
) -> bool {
    if address == 0 {
        return false;
    }
    let Some(region) = backend.query(address) else {
        return false;
    };
    region.is_committed() && mask.contains(region.protection) && region.covers(address, len)
}
