use std::ptr::NonNull;

use log::debug;

use crate::utils::align_up;

/// Abstraction over the platform calls that back the heap with real memory.
/// The allocator proper has nothing to do with the concrete APIs offered by
/// each kernel; it talks to the platform exactly once per heap, at
/// configuration time, and once more when the heap is dropped. There is no
/// sbrk and no incremental mapping: growth happens inside the reservation.
trait PlatformMemory {
    /// Reserve `len` bytes of read-write memory. Returns the base address,
    /// or `None` if the underlying call fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Return the `len` bytes starting at `addr` to the platform.
    unsafe fn return_memory(addr: *mut u8, len: usize);

    /// Virtual memory page size of the machine in bytes.
    fn page_size() -> usize;
}

/// One contiguous reservation backing an entire heap.
///
/// The arena is requested whole when the heap is configured and is only
/// given back when the owning heap is dropped; every block, chunk and
/// free-list node the allocator ever writes lives inside it.
pub(crate) struct Arena {
    base: NonNull<u8>,
    /// Page-rounded length actually reserved.
    reserved: usize,
}

impl Arena {
    /// Reserves an arena of at least `len` bytes, rounded up to the page
    /// size the way the platform would anyway.
    pub fn reserve(len: usize) -> Option<Self> {
        let reserved = align_up(len, Self::page_size());
        let base = unsafe { Self::request_memory(reserved)? };

        debug!("arena: reserved {reserved:#x} bytes at {:p}", base.as_ptr());

        Some(Self { base, reserved })
    }

    /// Lowest address of the reservation.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { Self::return_memory(self.base.as_ptr(), self.reserved) }
    }
}

#[cfg(unix)]
mod unix {
    use super::{Arena, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Arena {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => Some(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Arena, PlatformMemory};

    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Arena {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_rounds_up_to_the_page_size() {
        let arena = Arena::reserve(100).expect("reservation failed");

        assert_eq!(arena.reserved % Arena::page_size(), 0);
        assert!(arena.reserved >= 100);
    }

    #[test]
    fn reservation_is_writable() {
        let arena = Arena::reserve(4096).expect("reservation failed");

        unsafe {
            let base = arena.base().as_ptr();
            base.write(0xA5);
            base.add(4095).write(0x5A);
            assert_eq!(base.read(), 0xA5);
        }
    }
}
