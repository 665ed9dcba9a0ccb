use std::fs::{self, File};
use std::io;
use std::path::Path;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, Result};

/// Read buffer size used when the filesystem does not report a preferred
/// I/O block size.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Regular files at least this large are scanned through mmap.
/// Below it, a plain read loop wins: mmap setup/teardown costs more than
/// the copy it saves.
pub const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
/// After the first EPERM, we never try O_NOATIME again. Every worker opens
/// the input, so this saves one syscall per worker.
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open a file read-only with O_NOATIME on Linux to avoid atime inode writes.
#[cfg(target_os = "linux")]
pub fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                // O_NOATIME requires file ownership or CAP_FOWNER
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
pub fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Open the input file, mapping failure to `Error::NoInput`.
pub fn open_input(path: &Path) -> Result<File> {
    open_noatime(path).map_err(|source| Error::NoInput {
        path: path.to_path_buf(),
        source,
    })
}

/// Preferred I/O block size (`st_blksize`) for an open file.
pub fn block_size(file: &File) -> usize {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Ok(meta) = file.metadata() {
            let blksize = meta.blksize() as usize;
            if blksize > 0 {
                return blksize;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = file;
    DEFAULT_BLOCK_SIZE
}

/// Allocate a zeroed scratch buffer, reporting failure instead of aborting.
pub fn alloc_buffer(len: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::Alloc { what, bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Map a regular file read-only for a single sequential pass.
/// Returns None for small or non-regular files, or if mmap fails; callers
/// fall back to a read loop.
pub fn map_for_scan(file: &File) -> Option<Mmap> {
    let meta = file.metadata().ok()?;
    let len = meta.len();
    if !meta.file_type().is_file() || len < MMAP_THRESHOLD {
        return None;
    }
    // SAFETY: read-only mapping, dropped before any worker starts.
    let mmap = unsafe { MmapOptions::new().map(file) }.ok()?;
    #[cfg(target_os = "linux")]
    {
        // HUGEPAGE must come before the first page fault to take effect.
        if len >= 2 * 1024 * 1024 {
            let _ = mmap.advise(memmap2::Advice::HugePage);
        }
        let _ = mmap.advise(memmap2::Advice::Sequential);
        let _ = mmap.advise(memmap2::Advice::WillNeed);
    }
    Some(mmap)
}
