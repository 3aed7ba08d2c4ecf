//! # Shared-Memory Segments
//!
//! `SharedSegment` wraps one named POSIX shared-memory object mapped
//! read/write into this process. Opening is split from header
//! initialization on purpose: the "was this call the one that created the
//! object" signal from `open_or_create` is what gates the one-time
//! `initialize_header`, so a second attacher never re-zeroes live data.
//!
//! ## Creation Signal
//!
//! A freshly created shared object has size zero. `open_or_create` treats a
//! zero-sized object as newly created, sizes it to `SEGMENT_SIZE`, and
//! reports `was_created = true`; any non-zero size means some process got
//! there first.
//!
//! ## Length Publication
//!
//! The header's `length` field is the publication point between the single
//! writer and concurrent readers: the writer stores it with release
//! ordering only after the element's bytes are in place, and readers load
//! it with acquire ordering before touching buffers. Any reader that
//! observes a given length therefore sees fully written elements up to that
//! point, in this process or any other attached to the same object.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::FromRawFd;
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;
use tracing::debug;

use crate::error::StorageError;

use super::layout::LENGTH_OFFSET;
use super::naming::SegmentKey;
use super::SEGMENT_SIZE;

const SEGMENT_MODE: libc::mode_t = 0o644;

/// One column's shared storage region, mapped into this process.
#[derive(Debug)]
pub struct SharedSegment {
    mmap: MmapMut,
    name: String,
    key: SegmentKey,
}

impl SharedSegment {
    /// Open the shared object for `key`, creating it if requested and
    /// absent, and map it read/write. Returns the mapped segment and
    /// whether this call created the underlying object.
    ///
    /// A created object is sized to exactly `SEGMENT_SIZE`; the caller must
    /// follow up with `initialize_header` before any other access.
    pub fn open_or_create(key: SegmentKey, create_if_missing: bool) -> Result<(Self, bool)> {
        let name = key.segment_name()?;
        let cname = shm_name(&name)?;

        let mut oflag = libc::O_RDWR;
        if create_if_missing {
            oflag |= libc::O_CREAT;
        }

        // SAFETY: cname is a valid NUL-terminated string; shm_open does not
        // retain the pointer past the call.
        let fd = unsafe { libc::shm_open(cname.as_ptr(), oflag, SEGMENT_MODE) };
        if fd < 0 {
            return Err(StorageError::OpenFailed {
                name,
                source: io::Error::last_os_error(),
            }
            .into());
        }

        // SAFETY: shm_open returned a fresh descriptor we own; File takes
        // over closing it on every path below.
        let file = unsafe { File::from_raw_fd(fd) };

        let metadata = file.metadata().map_err(|e| StorageError::OpenFailed {
            name: name.clone(),
            source: e,
        })?;

        // Zero size marks a freshly created object.
        let created = metadata.len() == 0;
        if created {
            file.set_len(SEGMENT_SIZE as u64)
                .map_err(|e| StorageError::SizeFailed {
                    name: name.clone(),
                    size: SEGMENT_SIZE,
                    source: e,
                })?;
        } else {
            ensure!(
                metadata.len() >= SEGMENT_SIZE as u64,
                "shared segment \"{}\" is {} bytes, expected at least {}",
                name,
                metadata.len(),
                SEGMENT_SIZE
            );
        }

        // SAFETY: MmapMut::map_mut is unsafe because the object can be
        // modified externally. That is the point here: the region is shared
        // column storage, and coherence is provided by the append-only
        // discipline plus the acquire/release length protocol. The mapping
        // lifetime is tied to SharedSegment, and all access is bounds
        // checked through bytes()/bytes_mut().
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| StorageError::OpenFailed {
            name: name.clone(),
            source: e,
        })?;

        debug!(segment = %name, created, "mapped shared segment");

        Ok((Self { mmap, name, key }, created))
    }

    /// Probe for the named object without creating or mapping it.
    pub fn exists(key: SegmentKey) -> Result<bool> {
        let name = key.segment_name()?;
        let cname = shm_name(&name)?;

        // SAFETY: see open_or_create.
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(false);
            }
            return Err(StorageError::OpenFailed { name, source: err }.into());
        }

        // SAFETY: fd is a valid descriptor returned by shm_open.
        unsafe { libc::close(fd) };
        Ok(true)
    }

    /// Administrative removal of the named object. Existing mappings stay
    /// valid; the name becomes free for re-creation. Missing objects are
    /// not an error.
    pub fn remove(key: SegmentKey) -> Result<()> {
        let name = key.segment_name()?;
        let cname = shm_name(&name)?;

        // SAFETY: see open_or_create.
        let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(StorageError::OpenFailed { name, source: err }.into());
            }
        }
        Ok(())
    }

    pub fn key(&self) -> SegmentKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    fn length_cell(&self) -> &AtomicU64 {
        // SAFETY: the mapping is page aligned and LENGTH_OFFSET is 8-byte
        // aligned within it, so the cast target is a valid aligned u64. The
        // field is accessed only through this cell once the header exists,
        // and the returned reference cannot outlive the mapping.
        unsafe { &*(self.mmap.as_ptr().add(LENGTH_OFFSET) as *const AtomicU64) }
    }

    /// Current element count, with acquire ordering: elements below the
    /// returned length are fully published.
    pub fn length(&self) -> u64 {
        self.length_cell().load(Ordering::Acquire)
    }

    /// Publish a new element count, with release ordering: all buffer
    /// writes made before this call become visible to readers that observe
    /// the new length. Callers hold the writer lock.
    pub fn publish_length(&mut self, length: u64) {
        self.length_cell().store(length, Ordering::Release);
    }
}

fn shm_name(name: &str) -> Result<CString> {
    CString::new(name).wrap_err("shared object name contains an interior NUL byte")
}
