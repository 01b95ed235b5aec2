//! Volatile access to the shared boot window.
//!
//! Two bridge styles are covered: a dual-port RAM mapped directly into the address space
//! ([`MmioRegion`]), and a programmable-logic bridge that exposes a small data window behind an
//! address latch ([`LatchedWindow`]).
//!
//! # Safety
//!
//! The caller is responsible for handing in addresses of mapped device memory.

use core::ptr::{read_volatile, write_volatile};

use crate::SharedMemory;

/// Directly mapped shared window.
pub struct MmioRegion {
    base: usize,
    size: usize,
}

impl MmioRegion {
    /// # Safety
    ///
    /// `base` must point to `size` bytes of mapped device memory which nothing else accesses
    /// while this region exists.
    pub const unsafe fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    pub const fn base(&self) -> usize {
        self.base
    }
}

impl SharedMemory for MmioRegion {
    fn size(&self) -> usize {
        self.size
    }

    fn read_bytes(&self, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= self.size, "read outside of shared window");
        for (i, byte) in buf.iter_mut().enumerate() {
            // SAFETY: within the window handed to `new`.
            *byte = unsafe { read_volatile((self.base + offset + i) as *const u8) };
        }
    }

    fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.size, "write outside of shared window");
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: within the window handed to `new`.
            unsafe { write_volatile((self.base + offset + i) as *mut u8, *byte) };
        }
    }

    fn read16(&self, offset: usize) -> u16 {
        assert!(offset + 2 <= self.size, "read outside of shared window");
        debug_assert!(offset % 2 == 0, "unaligned 16-bit read");
        // SAFETY: within the window, aligned.
        u16::from_le(unsafe { read_volatile((self.base + offset) as *const u16) })
    }

    fn write16(&mut self, offset: usize, value: u16) {
        assert!(offset + 2 <= self.size, "write outside of shared window");
        debug_assert!(offset % 2 == 0, "unaligned 16-bit write");
        // SAFETY: within the window, aligned.
        unsafe { write_volatile((self.base + offset) as *mut u16, value.to_le()) };
    }
}

/// Bits of a window offset the address latch decodes.
pub const ADDR_MASK: usize = 0x3FFF;

/// Shared memory reached through an address latch.
///
/// Every access first programs the latch with the target offset and then streams through the data
/// window, which auto-increments on the bridge side.
pub struct LatchedWindow {
    data: usize,
    latch: usize,
    size: usize,
}

impl LatchedWindow {
    /// # Safety
    ///
    /// `data` must point to the mapped data window, large enough for the biggest single access,
    /// and `latch` to the 16-bit address latch register of the same bridge.
    pub const unsafe fn new(data: usize, latch: usize, size: usize) -> Self {
        Self { data, latch, size }
    }

    fn select(&self, offset: usize) {
        // SAFETY: latch register handed to `new`.
        unsafe { write_volatile(self.latch as *mut u16, (offset & ADDR_MASK) as u16) };
    }
}

impl SharedMemory for LatchedWindow {
    fn size(&self) -> usize {
        self.size
    }

    fn read_bytes(&self, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= self.size, "read outside of shared window");
        self.select(offset);
        for (i, byte) in buf.iter_mut().enumerate() {
            // SAFETY: data window handed to `new`.
            *byte = unsafe { read_volatile((self.data + i) as *const u8) };
        }
    }

    fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.size, "write outside of shared window");
        self.select(offset);
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: data window handed to `new`.
            unsafe { write_volatile((self.data + i) as *mut u8, *byte) };
        }
    }
}
