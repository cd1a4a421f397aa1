// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System V shared memory segment handle.
// Delegates to the raw wrappers in platform::posix.

use std::io;

use crate::error::{ErrorCode, IpcError};
use crate::platform::posix;

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively, fail if it already exists.
    Create,
    /// Open existing, fail if it does not exist.
    Open,
    /// Create if missing, open if it already exists.
    CreateOrOpen,
}

impl ShmOpenMode {
    fn flags(self) -> libc::c_int {
        match self {
            Self::Create => libc::IPC_CREAT | libc::IPC_EXCL,
            Self::Open => 0,
            Self::CreateOrOpen => libc::IPC_CREAT,
        }
    }
}

/// An attached System V shared memory segment.
///
/// Dropping the handle detaches it; the segment itself survives until
/// [`ShmSegment::remove`] is called and the last process detaches.
pub struct ShmSegment {
    id: i32,
    addr: *mut u8,
    size: usize,
}

// Safety: the mapping is process-wide; access is serialised by the
// semaphore set that guards each segment.
unsafe impl Send for ShmSegment {}

impl ShmSegment {
    /// Acquire the segment at `key` of at least `size` bytes and attach it.
    pub fn acquire(key: i32, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let id = posix::shm_get(key, size, mode.flags())?;
        Self::attach(id)
    }

    /// Allocate a fresh private segment.
    ///
    /// `shmget(IPC_PRIVATE)` is retried up to `attempts` times; the last
    /// failure is returned if every attempt fails.
    pub fn allocate_private(size: usize, attempts: usize) -> io::Result<Self> {
        let mut last = io::Error::from(io::ErrorKind::OutOfMemory);
        for attempt in 0..attempts.max(1) {
            match posix::shm_get(posix::PRIVATE_KEY, size, libc::IPC_CREAT | libc::IPC_EXCL) {
                Ok(id) => return Self::attach(id),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "private segment lookup failed");
                    last = e;
                }
            }
        }
        Err(last)
    }

    /// Attach an existing segment by id (a reply segment received from a peer).
    pub fn attach(id: i32) -> io::Result<Self> {
        let size = posix::shm_size(id)?;
        let addr = posix::shm_attach(id)?;
        Ok(Self { id, addr, size })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Size of the segment as recorded by the kernel.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy the first `dst.len()` bytes of the segment into `dst`.
    pub fn read_into(&self, dst: &mut [u8]) -> Result<(), IpcError> {
        if dst.len() > self.size {
            return Err(ErrorCode::MemoryError.into());
        }
        unsafe {
            std::ptr::copy_nonoverlapping(self.addr, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    /// Copy `src` to the start of the segment.
    pub fn write_from(&self, src: &[u8]) -> Result<(), IpcError> {
        if src.len() > self.size {
            return Err(ErrorCode::MemoryError.into());
        }
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.addr, src.len());
        }
        Ok(())
    }

    /// Mark the segment for destruction.
    pub fn remove(&self) -> io::Result<()> {
        posix::shm_remove(self.id)?;
        tracing::debug!(id = self.id, "shared memory segment removed");
        Ok(())
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        if let Err(e) = posix::shm_detach(self.addr) {
            tracing::warn!(id = self.id, error = %e, "shmdt failed");
        }
    }
}

impl std::fmt::Debug for ShmSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmSegment")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}
