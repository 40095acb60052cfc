use anyhow::{Context, Result};
use std::fs::File;

/// Finds the next maximal non-hole byte range starting at or after `from`.
///
/// Returns `Ok(None)` when everything from `from` to end-of-file is hole (or
/// `from` is at/past end-of-file). The range end is inclusive. Uses the
/// filesystem's SEEK_DATA/SEEK_HOLE primitives, so large holes are skipped
/// without reading them; filesystems that do not support the query report the
/// whole remainder of the file as a single data segment.
pub fn next_data_segment(file: &File, from: u64) -> Result<Option<(u64, u64)>> {
    let size = file.metadata().context("stat image")?.len();
    if from >= size {
        return Ok(None);
    }
    match imp::seek_data(file, from) {
        Ok(Some(start)) => {
            // SEEK_HOLE always succeeds past the last data byte because every
            // file has a virtual hole at end-of-file.
            let hole = imp::seek_hole(file, start).context("seek to next hole")?;
            Ok(Some((start, hole - 1)))
        }
        Ok(None) => Ok(None),
        Err(e) if imp::is_unsupported(&e) => Ok(Some((from, size - 1))),
        Err(e) => Err(e).context("seek to next data segment"),
    }
}

#[cfg(unix)]
mod imp {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    fn lseek(file: &File, offset: u64, whence: libc::c_int) -> io::Result<u64> {
        let rc = unsafe { libc::lseek(file.as_raw_fd(), offset as libc::off_t, whence) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc as u64)
        }
    }

    /// ENXIO means there is no data at or after `offset`, which terminates
    /// the scan normally rather than erroring.
    pub(super) fn seek_data(file: &File, offset: u64) -> io::Result<Option<u64>> {
        match lseek(file, offset, libc::SEEK_DATA) {
            Ok(pos) => Ok(Some(pos)),
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(super) fn seek_hole(file: &File, offset: u64) -> io::Result<u64> {
        lseek(file, offset, libc::SEEK_HOLE)
    }

    pub(super) fn is_unsupported(e: &io::Error) -> bool {
        matches!(e.raw_os_error(), Some(libc::EINVAL) | Some(libc::EOPNOTSUPP))
    }
}

#[cfg(not(unix))]
mod imp {
    use std::fs::File;
    use std::io;

    // No sparse query primitive; the caller degrades to one dense segment.
    pub(super) fn seek_data(_file: &File, _offset: u64) -> io::Result<Option<u64>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub(super) fn seek_hole(_file: &File, _offset: u64) -> io::Result<u64> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub(super) fn is_unsupported(_e: &io::Error) -> bool {
        true
    }
}

/// Lazy iterator over the indices of chunks that overlap at least one data
/// segment, in strictly increasing order. One-shot: it consumes the sparse
/// scan as it goes; rescanning requires a new iterator.
pub struct NonemptyChunks<'a> {
    file: &'a File,
    chunk_size: u64,
    pos: u64,
    // Floor below which indices were already yielded. Two segments can fall
    // inside one chunk; the floor keeps the yield unique.
    next_index: u64,
    pending: Option<(u64, u64)>,
    done: bool,
}

/// Scans `file` for non-hole regions and yields each overlapped chunk index
/// once, given chunks of `chunk_size` bytes.
pub fn nonempty_chunk_indices(file: &File, chunk_size: u64) -> NonemptyChunks<'_> {
    NonemptyChunks { file, chunk_size, pos: 0, next_index: 0, pending: None, done: false }
}

impl Iterator for NonemptyChunks<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((lo, hi)) = self.pending {
                if lo <= hi {
                    self.pending = if lo < hi { Some((lo + 1, hi)) } else { None };
                    self.next_index = lo + 1;
                    return Some(Ok(lo));
                }
                self.pending = None;
            }
            if self.done {
                return None;
            }
            match next_data_segment(self.file, self.pos) {
                Ok(Some((start, end))) => {
                    let first = (start / self.chunk_size).max(self.next_index);
                    let last = end / self.chunk_size;
                    self.pos = (end / self.chunk_size + 1) * self.chunk_size;
                    if first <= last {
                        self.pending = Some((first, last));
                    }
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
