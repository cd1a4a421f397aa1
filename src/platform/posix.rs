// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Thin wrappers over the System V IPC syscalls used by the semaphore and
// shared memory layers. Every function maps `-1` to `io::Error::last_os_error()`
// and performs no policy of its own.

use std::io;
use std::ptr;

/// Permission bits for every segment and semaphore set we create (owner rw).
pub const IPC_PERMS: libc::c_int = 0o600;

/// Key that asks the kernel for a fresh, unnamed object.
pub const PRIVATE_KEY: i32 = libc::IPC_PRIVATE;

fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

// ---------------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------------

/// `semget(key, nsems, flags | 0600)`.
pub fn sem_get(key: i32, nsems: i32, flags: libc::c_int) -> io::Result<i32> {
    check(unsafe { libc::semget(key as libc::key_t, nsems, flags | IPC_PERMS) })
}

/// `semctl(SETALL)`: initialise every semaphore of the set at once.
pub fn sem_set_all(id: i32, values: &[u16]) -> io::Result<()> {
    let mut values = values.to_vec();
    // The semun union's `array` member is a pointer; pass it through varargs.
    check(unsafe { libc::semctl(id, 0, libc::SETALL, values.as_mut_ptr()) })?;
    Ok(())
}

/// Apply a single `delta` to semaphore `index` (one atomic `semop`).
pub fn sem_op(id: i32, index: u16, delta: i16) -> io::Result<()> {
    let mut op = libc::sembuf {
        sem_num: index,
        sem_op: delta,
        sem_flg: 0,
    };
    check(unsafe { libc::semop(id, &mut op, 1) })?;
    Ok(())
}

/// `semctl(GETVAL)`.
pub fn sem_get_val(id: i32, index: u16) -> io::Result<i32> {
    check(unsafe { libc::semctl(id, index as libc::c_int, libc::GETVAL) })
}

/// `semctl(IPC_RMID)`.
pub fn sem_remove(id: i32) -> io::Result<()> {
    check(unsafe { libc::semctl(id, 0, libc::IPC_RMID) })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared memory
// ---------------------------------------------------------------------------

/// `shmget(key, size, flags | 0600)`.
pub fn shm_get(key: i32, size: usize, flags: libc::c_int) -> io::Result<i32> {
    check(unsafe { libc::shmget(key as libc::key_t, size, flags | IPC_PERMS) })
}

/// `shmat(id, NULL, 0)`.
pub fn shm_attach(id: i32) -> io::Result<*mut u8> {
    let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(addr as *mut u8)
}

/// `shmdt(addr)`.
pub fn shm_detach(addr: *mut u8) -> io::Result<()> {
    check(unsafe { libc::shmdt(addr as *const libc::c_void) })?;
    Ok(())
}

/// Segment size as recorded by the kernel (`IPC_STAT`).
pub fn shm_size(id: i32) -> io::Result<usize> {
    let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
    check(unsafe { libc::shmctl(id, libc::IPC_STAT, &mut ds) })?;
    Ok(ds.shm_segsz as usize)
}

/// Mark a segment for destruction after the last detach (`IPC_RMID`).
pub fn shm_remove(id: i32) -> io::Result<()> {
    check(unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) })?;
    Ok(())
}
