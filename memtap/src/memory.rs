//! Raw target-memory access
//!
//! The memory-control commands operate on the target address space directly,
//! with no locking; correctness under preemption is the host firmware's
//! responsibility. Accesses are volatile, byte-wise raw-pointer operations,
//! so they never materialize references into foreign memory.

/// Copy `dst.len()` bytes out of target memory starting at `address`.
///
/// # Safety
/// The whole source range must be readable on this target. The dispatcher
/// only calls this after the configured address policy has passed; the host
/// vouches for everything its policy leaves accessible.
pub(crate) unsafe fn read_into(address: usize, dst: &mut [u8]) {
    let mut src = address as *const u8;
    for slot in dst.iter_mut() {
        *slot = core::ptr::read_volatile(src);
        src = src.add(1);
    }
}

/// Copy `src` into target memory starting at `address`.
///
/// # Safety
/// The whole destination range must be writable on this target. See
/// [`read_into`].
pub(crate) unsafe fn write_from(address: usize, src: &[u8]) {
    let mut dst = address as *mut u8;
    for &byte in src {
        core::ptr::write_volatile(dst, byte);
        dst = dst.add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_addresses() {
        let source = [0x11u8, 0x22, 0x33, 0x44];
        let mut sink = [0u8; 4];

        let mut copied = [0u8; 4];
        unsafe { read_into(source.as_ptr() as usize, &mut copied) };
        assert_eq!(copied, source);

        unsafe { write_from(sink.as_mut_ptr() as usize, &copied) };
        assert_eq!(sink, source);
    }
}
