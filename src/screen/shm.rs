//! POSIX shared memory segments
//!
//! A segment is created with `shm_open`, unlinked right away so only the file
//! descriptor keeps it alive, sized with `ftruncate` and mapped read/write.
//! The descriptor is later duplicated and handed to the X server.

use crate::error::{Error, Result};
use nix::fcntl::OFlag;
use nix::libc::off_t;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NAME: AtomicU64 = AtomicU64::new(0);

pub struct Segment {
    fd: OwnedFd,
    ptr: NonNull<c_void>,
    /// Bytes actually mapped; at least one
    map_len: usize,
    /// Bytes exposed to callers
    len: usize,
}

// SAFETY: the mapping is owned by the segment and only reachable through
// `&self`/`&mut self`, so the usual borrow rules govern access to it.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create and map a segment of `len` bytes
    pub fn open(len: usize) -> Result<Segment> {
        // mmap cannot map zero bytes; an empty buffer still gets a valid segment
        let map_len = len.max(1);

        let name = format!(
            "/x11screen-{}-{}",
            std::process::id(),
            NEXT_NAME.fetch_add(1, Ordering::Relaxed)
        );
        let fd = mman::shm_open(
            name.as_str(),
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(Error::shm("shm_open"))?;
        if let Err(e) = mman::shm_unlink(name.as_str()) {
            log::warn!("shm_unlink {}: {}", name, e);
        }

        ftruncate(&fd, map_len as off_t).map_err(Error::shm("ftruncate"))?;

        let length = NonZeroUsize::new(map_len).ok_or(Error::Shm {
            op: "mmap",
            source: std::io::ErrorKind::InvalidInput.into(),
        })?;
        // SAFETY: fresh shared mapping of a descriptor we own, no fixed address.
        let ptr = unsafe {
            mman::mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
        }
        .map_err(Error::shm("mmap"))?;

        Ok(Segment {
            fd,
            ptr,
            map_len,
            len,
        })
    }

    /// Duplicate the descriptor for the server
    pub fn server_fd(&self) -> Result<OwnedFd> {
        self.fd.try_clone().map_err(|source| Error::Shm {
            op: "dup",
            source,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is at least `len` bytes and lives as long as self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access on our side.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: ptr/map_len come from the successful mmap in `open`.
        if let Err(e) = unsafe { mman::munmap(self.ptr, self.map_len) } {
            log::warn!("munmap: {}", e);
        }
    }
}
