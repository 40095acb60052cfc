use anyhow::{ensure, Context, Result};
use sha1::{Digest, Sha1};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::sparse::nonempty_chunk_indices;

/// Default chunk granularity: 1 MiB, matching the XVA block size.
pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 20;

/// Suffix of the per-chunk digest sidecar file.
pub const CHECKSUM_SUFFIX: &str = ".checksum";

const COPY_BUF_SIZE: usize = 1 << 20;

/// Chunk data file name: the index as a 20-digit zero-padded decimal, wide
/// enough that lexicographic order equals numeric order for any u64 index.
pub fn chunk_file_name(index: u64) -> String {
    format!("{index:020}")
}

/// Callback invoked by [`chunk_image`] after each chunk (data file plus
/// checksum) lands on disk. The core has no logging of its own; callers wire
/// this to whatever reporting they want.
pub trait ChunkObserver {
    fn on_chunk_written(&mut self, _index: u64) {}
}

/// No-op observer.
impl ChunkObserver for () {}

/// Result of chunking one image.
pub struct ChunkSet {
    /// Logical size of the source image in bytes, holes included.
    pub virtual_size: u64,
    /// Every file in the output directory, lexicographically sorted. Data
    /// and checksum files interleave; the zero-padded naming keeps the data
    /// files in numeric chunk order.
    pub files: Vec<PathBuf>,
}

impl ChunkSet {
    /// The data chunk files only, still sorted.
    pub fn data_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.ends_with(CHECKSUM_SUFFIX))
        })
    }
}

/// Writes single chunks of an open image into an output directory. Holds the
/// one shared read cursor; writes are strictly sequential.
struct ChunkWriter<'a> {
    source: &'a File,
    out_dir: &'a Path,
    chunk_size: u64,
    buf: Vec<u8>,
}

impl<'a> ChunkWriter<'a> {
    fn new(source: &'a File, out_dir: &'a Path, chunk_size: u64) -> Self {
        Self { source, out_dir, chunk_size, buf: vec![0u8; COPY_BUF_SIZE] }
    }

    /// Copies chunk `index` from the source into its data file, streaming the
    /// bytes through SHA-1, then writes the lowercase hex digest to the
    /// checksum sidecar. A short read is end-of-file and simply shortens the
    /// chunk.
    fn write_chunk(&mut self, index: u64) -> Result<()> {
        let name = chunk_file_name(index);
        let data_path = self.out_dir.join(&name);
        let mut out = File::create(&data_path)
            .with_context(|| format!("create chunk file {}", data_path.display()))?;

        let mut src = self.source;
        src.seek(SeekFrom::Start(index * self.chunk_size))
            .with_context(|| format!("seek to chunk {index}"))?;
        let mut sha = Sha1::new();
        let mut remaining = self.chunk_size;
        while remaining > 0 {
            let want = remaining.min(self.buf.len() as u64) as usize;
            let n = src
                .read(&mut self.buf[..want])
                .with_context(|| format!("read chunk {index}"))?;
            if n == 0 {
                break;
            }
            sha.update(&self.buf[..n]);
            out.write_all(&self.buf[..n])
                .with_context(|| format!("write chunk file {}", data_path.display()))?;
            remaining -= n as u64;
        }

        let sum_path = self.out_dir.join(format!("{name}{CHECKSUM_SUFFIX}"));
        fs::write(&sum_path, hex::encode(sha.finalize()))
            .with_context(|| format!("write checksum file {}", sum_path.display()))?;
        Ok(())
    }
}

/// Splits `image` into `chunk_size`-byte chunks under `output_dir`, writing a
/// data file and a SHA-1 checksum file per materialized chunk.
///
/// Chunk 0 and the final chunk are always materialized, even when they are
/// entirely hole; the archive's virtual disk geometry requires well-defined
/// boundary chunks. Interior chunks are materialized only when the sparse
/// scan reports data in them. Any I/O failure is fatal and aborts the run; a
/// partially populated `output_dir` is left for the caller to discard.
pub fn chunk_image(
    image: &Path,
    output_dir: &Path,
    chunk_size: u64,
    observer: &mut dyn ChunkObserver,
) -> Result<ChunkSet> {
    ensure!(chunk_size > 0, "chunk size must be positive");
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;

    let source =
        File::open(image).with_context(|| format!("open image {}", image.display()))?;
    let virtual_size =
        source.metadata().with_context(|| format!("stat image {}", image.display()))?.len();

    let mut writer = ChunkWriter::new(&source, output_dir, chunk_size);
    // An empty image still gets its chunk 0.
    let last = virtual_size.div_ceil(chunk_size).saturating_sub(1);

    writer.write_chunk(0)?;
    observer.on_chunk_written(0);
    if last > 0 {
        writer.write_chunk(last)?;
        observer.on_chunk_written(last);
    }
    for index in nonempty_chunk_indices(&source, chunk_size) {
        let index = index?;
        // 0 and `last` were forced above; skip to avoid rewriting them.
        if index > 0 && index < last {
            writer.write_chunk(index)?;
            observer.on_chunk_written(index);
        }
    }

    let mut files: Vec<PathBuf> = fs::read_dir(output_dir)
        .with_context(|| format!("list output dir {}", output_dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("list output dir {}", output_dir.display()))?;
    files.sort();

    Ok(ChunkSet { virtual_size, files })
}
