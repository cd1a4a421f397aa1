// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System V semaphore set with the two-slot writer/reader discipline used by
// the shared-memory mailboxes.

use std::io;

use crate::platform::posix;

/// Index of the semaphore that grants write access to a mailbox.
pub const WRITER: u16 = 0;
/// Index of the semaphore that signals a frame is ready to be read.
pub const READER: u16 = 1;

/// Initial values of a fresh mailbox set: writable, nothing to read.
pub const MAILBOX_INIT: [u16; 2] = [1, 0];

/// Outcome of a blocking wait or a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemStatus {
    Done,
    /// Interrupted by a caught signal (`EINTR`).
    Interrupted,
    /// The set was removed by another process (`EIDRM` / `EINVAL`).
    Removed,
}

/// A System V semaphore set.
///
/// The set is a kernel object: dropping the handle leaves it in place.
/// Call [`SemSet::destroy`] to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemSet {
    id: i32,
}

impl SemSet {
    /// Create a set at `key` (or a private set for `IPC_PRIVATE`) and
    /// initialise every slot from `init`.
    ///
    /// An existing set at the same key is reused and re-initialised.
    pub fn create(key: i32, init: &[u16]) -> io::Result<Self> {
        let id = posix::sem_get(key, init.len() as i32, libc::IPC_CREAT)?;
        posix::sem_set_all(id, init)?;
        tracing::debug!(key, id, ?init, "semaphore set created");
        Ok(Self { id })
    }

    /// Create a fresh private set.
    pub fn create_private(init: &[u16]) -> io::Result<Self> {
        Self::create(posix::PRIVATE_KEY, init)
    }

    /// Open the existing set at `key` without touching its values.
    pub fn open(key: i32) -> io::Result<Self> {
        let id = posix::sem_get(key, 0, 0)?;
        Ok(Self { id })
    }

    /// Wrap an id received from a peer.
    pub fn from_id(id: i32) -> Self {
        Self { id }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Block until slot `index` is positive, then decrement it.
    pub fn wait(&self, index: u16) -> io::Result<SemStatus> {
        self.op(index, -1, "wait")
    }

    /// Increment slot `index`.
    pub fn signal(&self, index: u16) -> io::Result<SemStatus> {
        self.op(index, 1, "signal")
    }

    /// Current value of slot `index`.
    pub fn value(&self, index: u16) -> io::Result<i32> {
        posix::sem_get_val(self.id, index)
    }

    /// Remove the set from the system. Blocked waiters wake with `Removed`.
    pub fn destroy(&self) -> io::Result<()> {
        posix::sem_remove(self.id)?;
        tracing::debug!(id = self.id, "semaphore set removed");
        Ok(())
    }

    fn op(&self, index: u16, delta: i16, what: &str) -> io::Result<SemStatus> {
        match posix::sem_op(self.id, index, delta) {
            Ok(()) => Ok(SemStatus::Done),
            Err(e) => match e.raw_os_error() {
                Some(libc::EINTR) => {
                    tracing::warn!(id = self.id, index, "semaphore {what} interrupted");
                    Ok(SemStatus::Interrupted)
                }
                Some(libc::EIDRM) | Some(libc::EINVAL) => {
                    tracing::warn!(id = self.id, index, "semaphore set removed during {what}");
                    Ok(SemStatus::Removed)
                }
                _ => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_set_starts_writable() {
        let set = SemSet::create_private(&MAILBOX_INIT).expect("create");
        assert_eq!(set.value(WRITER).unwrap(), 1);
        assert_eq!(set.value(READER).unwrap(), 0);
        set.destroy().unwrap();
    }

    #[test]
    fn ops_on_removed_set_report_removed() {
        let set = SemSet::create_private(&MAILBOX_INIT).expect("create");
        set.destroy().unwrap();
        assert_eq!(set.signal(WRITER).unwrap(), SemStatus::Removed);
    }
}
