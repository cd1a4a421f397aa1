// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// One-slot mailbox: a shared memory segment guarded by a writer/reader
// semaphore pair. Access goes through RAII guards that take one semaphore
// on construction and release the other on drop.

use crate::error::{ErrorCode, IpcError};
use crate::sem::{SemSet, SemStatus, READER, WRITER};
use crate::shm::ShmSegment;

fn acquired(status: std::io::Result<SemStatus>, op: &'static str) -> Result<(), IpcError> {
    match status {
        Ok(SemStatus::Done) => Ok(()),
        Ok(SemStatus::Interrupted) => Err(ErrorCode::Interrupted.into()),
        Ok(SemStatus::Removed) => Err(ErrorCode::Removed.into()),
        Err(e) => Err(IpcError::os(op, e)),
    }
}

fn release(sems: &SemSet, index: u16) {
    match sems.signal(index) {
        Ok(_) => {}
        Err(e) => tracing::error!(id = sems.id(), index, error = %e, "semaphore signal failed"),
    }
}

/// RAII guard: waits on `WRITER` on construction, signals `READER` on drop.
///
/// If no write succeeded, the guard hands `WRITER` back instead so the
/// reader never sees a stale frame.
pub struct WriteAccess<'a> {
    shm: &'a ShmSegment,
    sems: &'a SemSet,
    written: bool,
}

impl<'a> WriteAccess<'a> {
    pub fn new(shm: &'a ShmSegment, sems: &'a SemSet) -> Result<Self, IpcError> {
        acquired(sems.wait(WRITER), "semop(writer)")?;
        Ok(Self {
            shm,
            sems,
            written: false,
        })
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<(), IpcError> {
        self.shm.write_from(buf)?;
        self.written = true;
        Ok(())
    }
}

impl Drop for WriteAccess<'_> {
    fn drop(&mut self) {
        release(self.sems, if self.written { READER } else { WRITER });
    }
}

/// RAII guard: waits on `READER` on construction, signals `WRITER` on drop.
pub struct ReadAccess<'a> {
    shm: &'a ShmSegment,
    sems: &'a SemSet,
}

impl<'a> ReadAccess<'a> {
    pub fn new(shm: &'a ShmSegment, sems: &'a SemSet) -> Result<Self, IpcError> {
        acquired(sems.wait(READER), "semop(reader)")?;
        Ok(Self { shm, sems })
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<(), IpcError> {
        self.shm.read_into(buf)
    }
}

impl Drop for ReadAccess<'_> {
    fn drop(&mut self) {
        release(self.sems, WRITER);
    }
}

/// A segment paired with the semaphore set guarding it.
pub struct Mailbox<'a> {
    pub shm: &'a ShmSegment,
    pub sems: &'a SemSet,
}

impl<'a> Mailbox<'a> {
    pub fn new(shm: &'a ShmSegment, sems: &'a SemSet) -> Self {
        Self { shm, sems }
    }

    /// Block until the mailbox is free, copy `frame` in, mark it readable.
    pub fn post(&self, frame: &[u8]) -> Result<(), IpcError> {
        let mut access = WriteAccess::new(self.shm, self.sems)?;
        access.write(frame)
    }

    /// Block until a frame is posted, copy it out, mark the mailbox free.
    pub fn take(&self, buf: &mut [u8]) -> Result<(), IpcError> {
        let access = ReadAccess::new(self.shm, self.sems)?;
        access.read(buf)
    }
}
