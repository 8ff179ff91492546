//! File-backed shared-memory region.
//!
//! The kernel server creates the backing file under a well-known
//! temporary directory; the host attaches to it by the same
//! deterministically-derived path, so the two processes agree on the
//! name without prior coordination. Word-sized fields are accessed
//! through shared atomics; bulk blocks (pixels, ring slots, command
//! text) move via raw byte copies with no cross-block synchronization.
//!
//! # Platform
//!
//! Unix only (`mmap`/`munmap` with `MAP_SHARED`). On other platforms
//! every mapping attempt reports [`SlateError::Unsupported`].

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU32};

use tracing::debug;

use crate::error::SlateError;
use crate::wire::REGION_SIZE;

// ── Path derivation ──────────────────────────────────────────────

/// Directory holding all Slate backing stores.
pub fn region_dir() -> PathBuf {
    std::env::temp_dir().join("slate")
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_` so any
/// session identifier yields a portable file name.
pub fn sanitize_session_id(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The backing-store path for a session id.
///
/// Deterministic: independent computations from the same id (in either
/// process) resolve to the same path.
pub fn region_path(session_id: &str) -> PathBuf {
    region_dir().join(format!("slate_{}.shm", sanitize_session_id(session_id)))
}

// ── ShmRegion ────────────────────────────────────────────────────

/// A mapped shared-memory region.
///
/// The creator owns the backing file and unlinks it on drop; an opener
/// only unmaps. Cross-process writes become visible through the shared
/// page cache without any explicit flush.
#[derive(Debug)]
pub struct ShmRegion {
    // Keeps the descriptor alive for the lifetime of the mapping.
    _file: File,
    base: *mut u8,
    len: usize,
    path: PathBuf,
    owned: bool,
}

// SAFETY: all concurrent access to the mapping goes through the atomic
// accessors or through bulk copies whose tearing is tolerated by the
// protocol; the raw pointer itself is never exposed.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Create (or truncate) the backing file at the full region size
    /// and map it. Used by the kernel side.
    pub fn create(path: &Path) -> Result<Self, SlateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(REGION_SIZE as u64)?;
        let base = platform::map(&file, REGION_SIZE)?;
        debug!(path = %path.display(), size = REGION_SIZE, "created region");
        Ok(Self {
            _file: file,
            base,
            len: REGION_SIZE,
            path: path.to_path_buf(),
            owned: true,
        })
    }

    /// Map an existing backing file. Used by the host side.
    ///
    /// Fails with [`SlateError::Io`] (`NotFound`) while the kernel has
    /// not created the file yet — an expected startup state.
    pub fn open(path: &Path) -> Result<Self, SlateError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size < REGION_SIZE as u64 {
            return Err(SlateError::RegionTooSmall {
                size,
                need: REGION_SIZE as u64,
            });
        }
        let base = platform::map(&file, REGION_SIZE)?;
        debug!(path = %path.display(), "opened region");
        Ok(Self {
            _file: file,
            base,
            len: REGION_SIZE,
            path: path.to_path_buf(),
            owned: false,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_word(&self, offset: usize) {
        assert!(offset % 4 == 0, "offset {offset} not word aligned");
        assert!(offset + 4 <= self.len, "offset {offset} out of range");
    }

    /// Shared atomic view of the `u32` at `offset`.
    pub fn atomic_u32(&self, offset: usize) -> &AtomicU32 {
        self.check_word(offset);
        // SAFETY: offset is aligned and in range; AtomicU32 has the
        // same layout as u32 and the mapping outlives the reference.
        unsafe { &*(self.base.add(offset) as *const AtomicU32) }
    }

    /// Shared atomic view of the `i32` at `offset`.
    pub fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        self.check_word(offset);
        // SAFETY: as in atomic_u32.
        unsafe { &*(self.base.add(offset) as *const AtomicI32) }
    }

    /// Copy bytes out of the region. Not synchronized against a
    /// concurrent writer; callers order the copy against an atomic
    /// publication word or tolerate tearing.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.len);
        // SAFETY: range checked above; regions never overlap a local slice.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.add(offset), out.as_mut_ptr(), out.len());
        }
    }

    /// Copy bytes into the region. Same ordering caveats as
    /// [`read_bytes`](Self::read_bytes).
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.len);
        // SAFETY: range checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base.add(offset), data.len());
        }
    }

    /// Bulk-copy `u32` words out of the region (pixel block reads).
    pub fn read_words(&self, offset: usize, out: &mut [u32]) {
        assert!(offset % 4 == 0);
        assert!(offset + out.len() * 4 <= self.len);
        // SAFETY: range and alignment checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.add(offset) as *const u32,
                out.as_mut_ptr(),
                out.len(),
            );
        }
    }

    /// Bulk-copy `u32` words into the region (pixel block writes).
    pub fn write_words(&self, offset: usize, data: &[u32]) {
        assert!(offset % 4 == 0);
        assert!(offset + data.len() * 4 <= self.len);
        // SAFETY: range and alignment checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.base.add(offset) as *mut u32,
                data.len(),
            );
        }
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        // SAFETY: base/len came from a successful map call.
        unsafe { platform::unmap(self.base, self.len) };
        if self.owned {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), "failed to remove region file: {e}");
            }
        }
    }
}

// ── Unix implementation ──────────────────────────────────────────

#[cfg(unix)]
mod platform {
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    use crate::error::SlateError;

    pub(super) fn map(file: &File, len: usize) -> Result<*mut u8, SlateError> {
        // SAFETY: fd is valid for the duration of the call; length and
        // protection flags describe a plain shared file mapping.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(SlateError::Io(std::io::Error::last_os_error()));
        }
        Ok(base as *mut u8)
    }

    pub(super) unsafe fn unmap(base: *mut u8, len: usize) {
        // SAFETY: caller passes a base/len pair returned by map.
        unsafe {
            libc::munmap(base as *mut libc::c_void, len);
        }
    }
}

// ── Non-Unix stub ────────────────────────────────────────────────

#[cfg(not(unix))]
mod platform {
    use std::fs::File;

    use crate::error::SlateError;

    pub(super) fn map(_file: &File, _len: usize) -> Result<*mut u8, SlateError> {
        Err(SlateError::Unsupported(
            "shared-memory mapping is only implemented on Unix",
        ))
    }

    pub(super) unsafe fn unmap(_base: *mut u8, _len: usize) {}
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn test_path(tag: &str) -> PathBuf {
        region_dir().join(format!("test_{tag}_{}.shm", std::process::id()))
    }

    #[test]
    fn path_is_deterministic() {
        let a = region_path("world-42");
        let b = region_path("world-42");
        assert_eq!(a, b);
        assert!(a.to_string_lossy().ends_with("slate_world-42.shm"));
    }

    #[test]
    fn path_is_sanitized() {
        assert_eq!(sanitize_session_id("my world/1:2"), "my_world_1_2");
        let p = region_path("a b/c");
        assert!(p.to_string_lossy().ends_with("slate_a_b_c.shm"));
    }

    #[test]
    fn open_missing_region_is_not_found() {
        let err = ShmRegion::open(Path::new("/nonexistent/slate/nope.shm")).unwrap_err();
        match err {
            SlateError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn create_open_share_words() {
        let path = test_path("share");
        let creator = ShmRegion::create(&path).unwrap();
        let opener = ShmRegion::open(&path).unwrap();

        creator.atomic_u32(16).store(0xABCD, Ordering::Release);
        assert_eq!(opener.atomic_u32(16).load(Ordering::Acquire), 0xABCD);

        let words = [1u32, 2, 3, 4];
        creator.write_words(crate::wire::OFFSET_PIXELS, &words);
        let mut out = [0u32; 4];
        opener.read_words(crate::wire::OFFSET_PIXELS, &mut out);
        assert_eq!(out, words);
        drop(opener);
        drop(creator);
        assert!(!path.exists());
    }

    #[test]
    fn creator_unlinks_on_drop() {
        let path = test_path("unlink");
        let region = ShmRegion::create(&path).unwrap();
        assert!(path.exists());
        drop(region);
        assert!(!path.exists());
    }

    #[test]
    fn opener_leaves_file_alone() {
        let path = test_path("keep");
        let creator = ShmRegion::create(&path).unwrap();
        let opener = ShmRegion::open(&path).unwrap();
        drop(opener);
        assert!(path.exists());
        drop(creator);
    }

    #[test]
    fn short_file_rejected() {
        let path = test_path("short");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, [0u8; 64]).unwrap();
        let err = ShmRegion::open(&path).unwrap_err();
        assert!(matches!(err, SlateError::RegionTooSmall { size: 64, .. }));
        std::fs::remove_file(&path).unwrap();
    }
}
