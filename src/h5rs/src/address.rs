//! Address arithmetic. Every stored address is a 64-bit file offset
//! relative to the base offset discovered when locating the superblock.

/// The distinguished "no such object" address: all bits set.
pub const UNDEFINED: u64 = u64::MAX;

pub fn is_defined(addr: u64) -> bool {
    addr != UNDEFINED
}

/// Converts a stored (relative) address into an absolute file offset.
pub fn absolute(base_offset: u64, addr: u64) -> Option<u64> {
    if !is_defined(addr) {
        None
    } else {
        Some(base_offset + addr)
    }
}
