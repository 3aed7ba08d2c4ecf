//! # Writer Lock
//!
//! At most one process may mutate a segment at a time. The lock is a named
//! POSIX semaphore (initial value 1) sharing the segment's name stem, so
//! any process that can open the segment can also find its lock.
//!
//! `acquire` returns an RAII `WriterGuard` that posts the semaphore on
//! drop. Mutating operations hold the guard for their full duration, so the
//! lock is released on every exit path, including error paths.
//!
//! The semaphore outlives any single process (it lives in the system
//! namespace like the segment itself); `WriterLock::remove` is the
//! administrative cleanup, paired with `SharedSegment::remove`.

use std::ffi::CString;
use std::fmt;
use std::io;

use eyre::{Result, WrapErr};

use crate::error::StorageError;

use super::naming::SegmentKey;

/// Handle to the named writer-exclusion semaphore of one segment.
pub struct WriterLock {
    sem: *mut libc::sem_t,
    name: String,
}

// SAFETY: POSIX named semaphores are inherently process shared; the handle
// may be used and waited on from any thread.
unsafe impl Send for WriterLock {}
unsafe impl Sync for WriterLock {}

impl WriterLock {
    /// Open (creating if absent) the writer lock for `key`.
    pub fn open(key: SegmentKey) -> Result<Self> {
        let name = key.lock_name()?;
        let cname = sem_name(&name)?;

        // SAFETY: cname is a valid NUL-terminated string. O_CREAT with an
        // initial value of 1 makes open idempotent: whoever arrives first
        // creates the semaphore, everyone else attaches to it.
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT,
                0o644 as libc::c_uint,
                1 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(StorageError::LockFailed {
                name,
                source: io::Error::last_os_error(),
            }
            .into());
        }

        Ok(Self { sem, name })
    }

    /// Block until this process holds the writer lock.
    pub fn acquire(&self) -> Result<WriterGuard<'_>> {
        loop {
            // SAFETY: sem is a valid semaphore handle for the lifetime of
            // self.
            let rc = unsafe { libc::sem_wait(self.sem) };
            if rc == 0 {
                return Ok(WriterGuard { lock: self });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(StorageError::LockFailed {
                    name: self.name.clone(),
                    source: err,
                }
                .into());
            }
        }
    }

    /// Administrative removal of the named semaphore. Missing semaphores
    /// are not an error.
    pub fn remove(key: SegmentKey) -> Result<()> {
        let name = key.lock_name()?;
        let cname = sem_name(&name)?;

        // SAFETY: see open.
        let rc = unsafe { libc::sem_unlink(cname.as_ptr()) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(StorageError::LockFailed { name, source: err }.into());
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        // SAFETY: sem was returned by sem_open and is closed exactly once.
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

impl fmt::Debug for WriterLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterLock").field("name", &self.name).finish()
    }
}

/// Held writer lock; posts the semaphore when dropped.
#[must_use = "the writer lock is released as soon as the guard is dropped"]
pub struct WriterGuard<'a> {
    lock: &'a WriterLock,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while the semaphore is held.
        unsafe {
            libc::sem_post(self.lock.sem);
        }
    }
}

fn sem_name(name: &str) -> Result<CString> {
    CString::new(name).wrap_err("semaphore name contains an interior NUL byte")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fresh_key(column: u16) -> SegmentKey {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let key = SegmentKey::new(
            std::process::id(),
            8000 + NEXT.fetch_add(1, Ordering::Relaxed),
            column,
        );
        WriterLock::remove(key).unwrap();
        key
    }

    #[test]
    fn acquire_and_release() {
        let key = fresh_key(1);
        let lock = WriterLock::open(key).unwrap();

        let guard = lock.acquire().unwrap();
        drop(guard);

        // Reacquirable once the guard is gone.
        let guard = lock.acquire().unwrap();
        drop(guard);

        drop(lock);
        WriterLock::remove(key).unwrap();
    }

    #[test]
    fn two_handles_share_one_semaphore() {
        let key = fresh_key(2);
        let a = WriterLock::open(key).unwrap();
        let b = WriterLock::open(key).unwrap();

        {
            let _held = a.acquire().unwrap();
            // b would block here; sem_trywait shows the lock is taken.
            // SAFETY: b.sem is valid while b is alive.
            let rc = unsafe { libc::sem_trywait(b.sem) };
            assert_eq!(rc, -1);
            assert_eq!(
                io::Error::last_os_error().raw_os_error(),
                Some(libc::EAGAIN)
            );
        }

        // Released by the guard drop above.
        let guard = b.acquire().unwrap();
        drop(guard);

        drop(a);
        drop(b);
        WriterLock::remove(key).unwrap();
    }

    #[test]
    fn guard_releases_on_early_return() {
        let key = fresh_key(3);
        let lock = WriterLock::open(key).unwrap();

        fn failing_mutation(lock: &WriterLock) -> Result<()> {
            let _guard = lock.acquire()?;
            eyre::bail!("mutation failed after taking the lock");
        }

        assert!(failing_mutation(&lock).is_err());

        // The lock must have been released on the error path.
        let guard = lock.acquire().unwrap();
        drop(guard);

        drop(lock);
        WriterLock::remove(key).unwrap();
    }
}
