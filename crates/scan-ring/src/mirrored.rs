//! Linux double mapping over a memfd.
//!
//! Construction order:
//! 1. `memfd_create` an anonymous shared-memory file and size it to `N` samples
//! 2. reserve `2N` samples of address space (`PROT_NONE`)
//! 3. map the file over the first half with `MAP_FIXED | MAP_SHARED`
//! 4. map the same file over the second half the same way
//! 5. close the descriptor; the two mappings keep the pages alive
//!
//! Every step that fails unwinds what the previous steps created through
//! [`PartialMapping`], the same teardown path the finished region uses.

use std::io;
use std::ptr::{self, NonNull};

use libc::{c_void, off_t};
use scan_core::{Sample, SAMPLE_SIZE};
use tracing::{debug, warn};

use crate::storage::{Backend, RingStorage};
use crate::{Result, RingError};

const MEMFD_NAME: &[u8] = b"sdrscan-ring\0";

/// Resources acquired so far during construction.
struct PartialMapping {
    fd: libc::c_int,
    base: *mut c_void,
    len: usize,
}

impl PartialMapping {
    fn mapping_error(stage: &'static str) -> RingError {
        RingError::Mapping {
            stage,
            source: io::Error::last_os_error(),
        }
    }

    fn close_fd(&mut self) {
        if self.fd >= 0 {
            // SAFETY: fd is a descriptor we own and have not closed yet.
            if unsafe { libc::close(self.fd) } != 0 {
                warn!(error = %io::Error::last_os_error(), "Closing ring memfd failed");
            }
            self.fd = -1;
        }
    }
}

impl Drop for PartialMapping {
    fn drop(&mut self) {
        if !self.base.is_null() {
            // SAFETY: base/len describe the reservation made in `map`; munmap
            // removes whichever of the reservation or fixed halves are present.
            if unsafe { libc::munmap(self.base, self.len) } != 0 {
                warn!(error = %io::Error::last_os_error(), "Unmapping ring buffer failed");
            }
        }
        self.close_fd();
    }
}

pub(crate) struct MirroredRegion {
    base: NonNull<Sample>,
    capacity: usize,
    /// Owns the `2N` mapping; unmapped on drop.
    mapping: PartialMapping,
}

// SAFETY: the mapping is plain shared memory owned by this value; concurrent
// access is coordinated by the callers (see `RingStorage`).
unsafe impl Send for MirroredRegion {}
// SAFETY: as above.
unsafe impl Sync for MirroredRegion {}

impl MirroredRegion {
    /// Map a mirrored region of `capacity` samples. The capacity must already
    /// be page-aligned in bytes.
    pub(crate) fn map(capacity: usize) -> Result<Self> {
        let bytes = capacity * SAMPLE_SIZE;
        let mut partial = PartialMapping {
            fd: -1,
            base: ptr::null_mut(),
            len: 0,
        };

        // SAFETY: MEMFD_NAME is NUL-terminated.
        partial.fd = unsafe { libc::memfd_create(MEMFD_NAME.as_ptr().cast(), libc::MFD_CLOEXEC) };
        if partial.fd < 0 {
            return Err(PartialMapping::mapping_error("memfd_create"));
        }

        // SAFETY: fd is a valid memfd.
        if unsafe { libc::ftruncate(partial.fd, bytes as off_t) } != 0 {
            return Err(PartialMapping::mapping_error("ftruncate"));
        }

        // SAFETY: anonymous reservation, no fixed address.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                2 * bytes,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(PartialMapping::mapping_error("reserve"));
        }
        partial.base = base;
        partial.len = 2 * bytes;

        for (stage, half) in [("map first half", 0usize), ("map second half", bytes)] {
            // SAFETY: the target range lies inside our own reservation, so
            // MAP_FIXED only replaces pages we own.
            let target = unsafe { base.cast::<u8>().add(half).cast::<c_void>() };
            let mapped = unsafe {
                libc::mmap(
                    target,
                    bytes,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    partial.fd,
                    0,
                )
            };
            if mapped == libc::MAP_FAILED {
                return Err(PartialMapping::mapping_error(stage));
            }
            if mapped != target {
                return Err(RingError::Mapping {
                    stage,
                    source: io::Error::new(io::ErrorKind::Other, "kernel ignored fixed address"),
                });
            }
        }

        partial.close_fd();

        let Some(base) = NonNull::new(base.cast::<Sample>()) else {
            return Err(RingError::Mapping {
                stage: "reserve",
                source: io::Error::new(io::ErrorKind::Other, "null mapping"),
            });
        };

        debug!(capacity, bytes, base = ?base, "Mirrored mapping established");

        Ok(Self {
            base,
            capacity,
            mapping: partial,
        })
    }
}

impl Drop for MirroredRegion {
    fn drop(&mut self) {
        debug!(
            capacity = self.capacity,
            len = self.mapping.len,
            "Unmapping mirrored ring buffer"
        );
        // PartialMapping::drop unmaps both halves.
    }
}

// SAFETY: base is valid for 2 * capacity samples and the second half aliases
// the first, by construction in `map`.
unsafe impl RingStorage for MirroredRegion {
    fn backend(&self) -> Backend {
        Backend::Mirrored
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn span(&self) -> usize {
        2 * self.capacity
    }

    fn base(&self) -> *mut Sample {
        self.base.as_ptr()
    }
}
