//! OS memory operations. `VirtualMemory` reserves an aligned address range once, and the
//! rest of the heap carves pages out of it by committing and decommitting sub-ranges.

use crate::util::constants::{BYTES_IN_PAGE, BYTES_IN_WORD};
use crate::util::conversions::raw_align_up;
use crate::util::Address;
use std::io::{Error, ErrorKind, Result};

/// Page protection for a committed range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protection {
    NoAccess,
    ReadOnly,
    ReadWrite,
    ReadExecute,
    ReadWriteExecute,
}

impl Protection {
    fn into_native_flags(self) -> libc::c_int {
        match self {
            Self::NoAccess => libc::PROT_NONE,
            Self::ReadOnly => libc::PROT_READ,
            Self::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            Self::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
            Self::ReadWriteExecute => libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        }
    }
}

/// A reserved range of virtual memory, unmapped on drop.
///
/// The range starts out inaccessible. `commit` makes a sub-range read-write and `decommit`
/// gives its physical memory back to the OS.
#[derive(Debug)]
pub struct VirtualMemory {
    start: Address,
    size: usize,
}

impl VirtualMemory {
    /// Reserve `size` bytes whose start is aligned to `align` (a power of two, at least an OS page).
    pub fn reserve(size: usize, align: usize) -> Result<VirtualMemory> {
        debug_assert!(align.is_power_of_two() && align >= BYTES_IN_PAGE);
        let size = raw_align_up(size, BYTES_IN_PAGE);
        if size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "empty reservation"));
        }
        // Over-reserve, then trim the unaligned head and the tail.
        let padded = size
            .checked_add(align)
            .ok_or_else(|| Error::new(ErrorKind::OutOfMemory, "reservation too large"))?;
        let raw = mmap_reserve(padded)?;
        let start = raw.align_up(align);
        let head = start - raw;
        let tail = padded - head - size;
        if head > 0 {
            munmap(raw, head)?;
        }
        if tail > 0 {
            munmap(start + size, tail)?;
        }
        trace!("Reserved {} bytes at {} (align {})", size, start, align);
        Ok(VirtualMemory { start, size })
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start + self.size
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.end()
    }

    /// Make a sub-range accessible. Memory that was never committed, or was decommitted,
    /// reads as zero.
    pub fn commit(&self, start: Address, size: usize) -> Result<()> {
        debug_assert!(self.contains(start) && start + size <= self.end());
        mprotect(start, size, Protection::ReadWrite)
    }

    /// Give the physical memory of a sub-range back to the OS and make it inaccessible again.
    pub fn decommit(&self, start: Address, size: usize) -> Result<()> {
        debug_assert!(self.contains(start) && start + size <= self.end());
        let flags = libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_FIXED | libc::MAP_NORESERVE;
        let ret = unsafe { libc::mmap(start.to_mut_ptr(), size, libc::PROT_NONE, flags, -1, 0) };
        if ret == libc::MAP_FAILED {
            Err(Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Change the protection of a sub-range.
    pub fn protect(&self, start: Address, size: usize, prot: Protection) -> Result<()> {
        debug_assert!(self.contains(start) && start + size <= self.end());
        mprotect(start, size, prot)
    }
}

impl Drop for VirtualMemory {
    fn drop(&mut self) {
        if let Err(e) = munmap(self.start, self.size) {
            warn!("Failed to unmap {} ({} bytes): {}", self.start, self.size, e);
        }
    }
}

fn mmap_reserve(size: usize) -> Result<Address> {
    let flags = libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_NORESERVE;
    let ret = unsafe { libc::mmap(std::ptr::null_mut(), size, libc::PROT_NONE, flags, -1, 0) };
    if ret == libc::MAP_FAILED {
        Err(Error::last_os_error())
    } else {
        Ok(Address::from_mut_ptr(ret))
    }
}

fn munmap(start: Address, size: usize) -> Result<()> {
    let ret = unsafe { libc::munmap(start.to_mut_ptr(), size) };
    if ret == 0 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// Change the protection of any mapped range, including ranges the heap does not own.
pub fn mprotect(start: Address, size: usize, prot: Protection) -> Result<()> {
    let ret = unsafe { libc::mprotect(start.to_mut_ptr(), size, prot.into_native_flags()) };
    if ret == 0 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// Set a memory region to zero.
pub fn zero(start: Address, len: usize) {
    set(start, 0, len);
}

/// Set a memory region to a specific value.
pub fn set(start: Address, val: u8, len: usize) {
    unsafe {
        std::ptr::write_bytes::<u8>(start.to_mut_ptr(), val, len);
    }
}

/// Fill a word-aligned region with a repeated word.
pub fn fill_words(start: Address, len: usize, word: usize) {
    debug_assert!(start.is_aligned_to(BYTES_IN_WORD) && len % BYTES_IN_WORD == 0);
    let words = unsafe { std::slice::from_raw_parts_mut(start.to_mut_ptr::<usize>(), len / BYTES_IN_WORD) };
    words.fill(word);
}

/// Copy `len` bytes between two regions that do not overlap.
///
/// # Safety
/// Both regions must be valid and disjoint.
pub unsafe fn copy_nonoverlapping(from: Address, to: Address, len: usize) {
    std::ptr::copy_nonoverlapping(from.to_ptr::<u8>(), to.to_mut_ptr::<u8>(), len);
}
