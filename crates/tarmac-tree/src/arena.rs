//! C1: the append-only disk arena (§4.1).
//!
//! During indexing, nodes and blobs are appended to a plain [`File`] via
//! positioned writes/reads (no in-memory buffering of the whole arena).
//! Once indexing finishes, [`ArenaWriter::finalize`] writes the footer and
//! the file becomes read-only; [`ArenaReader`] then serves all reads from
//! a memory map.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tarmac_core::{Off, TarmacError};

/// The literal 12-byte magic string written at offset 0 (§6).
pub const HEADER_MAGIC: &[u8; 12] = b"TARMAC-INDEX";

pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: u64 = 32;
pub const FOOTER_LEN: u64 = 64;
pub const FOOTER_TAIL_MAGIC: &[u8; 4] = b"EOTI";

const FLAG_AARCH64: u8 = 1 << 0;
const FLAG_BIG_ENDIAN_TRACE: u8 = 1 << 1;

// Layout of the fixed-size footer, relative to its own start (§6): the
// named fields sit at the tail of the 64-byte region; everything before
// them is reserved and zeroed.
const FOOTER_SEQ_ROOT: usize = 36;
const FOOTER_BYPC_ROOT: usize = 44;
const FOOTER_LINENO_OFFSET: usize = 52;
const FOOTER_TAIL: usize = 56;
const FOOTER_CRC32: usize = 60;

/// Errors specific to arena I/O and on-disk format validation.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error(transparent)]
    Tarmac(#[from] TarmacError),
    #[error("index arena is already finalized")]
    AlreadyFinalized,
}

impl From<ArenaError> for TarmacError {
    fn from(e: ArenaError) -> Self {
        match e {
            ArenaError::Tarmac(t) => t,
            ArenaError::AlreadyFinalized => TarmacError::internal("arena already finalized"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArenaError>;

/// Read-only access to arena bytes. Implemented by both the writer (during
/// indexing, via positioned reads) and the mmap-backed reader (post
/// finalize), so the generic tree code in [`crate::avl`] is agnostic to
/// which phase it's running in.
pub trait Arena {
    fn read_bytes(&self, off: Off, len: usize) -> Result<Vec<u8>>;
}

/// Allocation capability, implemented only by the writer.
pub trait ArenaMut: Arena {
    /// Append `bytes` to the arena, aligned to `align` bytes, returning
    /// its offset.
    fn append(&mut self, bytes: &[u8], align: u64) -> Result<Off>;
}

/// The append-only writer used while indexing.
pub struct ArenaWriter {
    file: File,
    path: PathBuf,
    pos: u64,
    finalized: bool,
}

impl ArenaWriter {
    pub fn create(path: impl AsRef<Path>, aarch64: bool, big_endian_trace: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| TarmacError::io(&path, e))?;

        let mut header = [0u8; HEADER_LEN as usize];
        header[0..12].copy_from_slice(HEADER_MAGIC);
        header[12] = FORMAT_VERSION;
        let mut flags = 0u8;
        if aarch64 {
            flags |= FLAG_AARCH64;
        }
        if big_endian_trace {
            flags |= FLAG_BIG_ENDIAN_TRACE;
        }
        header[13] = flags;
        file.write_all(&header).map_err(|e| TarmacError::io(&path, e))?;

        Ok(ArenaWriter { file, path, pos: HEADER_LEN, finalized: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the footer and flush to disk. Consumes the writer so it can't
    /// be appended to afterwards.
    pub fn finalize(mut self, seq_root: Off, bypc_root: Off, lineno_offset: u32) -> Result<PathBuf> {
        let footer_start = self.pos;
        let file_len = footer_start + FOOTER_LEN;
        self.file.set_len(file_len).map_err(|e| TarmacError::io(&self.path, e))?;

        let mut footer = [0u8; FOOTER_LEN as usize];
        footer[FOOTER_SEQ_ROOT..FOOTER_SEQ_ROOT + 8].copy_from_slice(&seq_root.to_le_bytes());
        footer[FOOTER_BYPC_ROOT..FOOTER_BYPC_ROOT + 8].copy_from_slice(&bypc_root.to_le_bytes());
        footer[FOOTER_LINENO_OFFSET..FOOTER_LINENO_OFFSET + 4]
            .copy_from_slice(&lineno_offset.to_le_bytes());
        footer[FOOTER_TAIL..FOOTER_TAIL + 4].copy_from_slice(FOOTER_TAIL_MAGIC);

        let mut hasher = crc32fast::Hasher::new();
        let mut body = vec![0u8; footer_start as usize];
        self.file.read_exact_at(&mut body, 0).map_err(|e| TarmacError::io(&self.path, e))?;
        hasher.update(&body);
        hasher.update(&footer[..FOOTER_CRC32]);
        let crc = hasher.finalize();
        footer[FOOTER_CRC32..FOOTER_CRC32 + 4].copy_from_slice(&crc.to_le_bytes());

        self.file.write_at(&footer, footer_start).map_err(|e| TarmacError::io(&self.path, e))?;
        self.file.sync_all().map_err(|e| TarmacError::io(&self.path, e))?;
        self.finalized = true;
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for ArenaWriter {
    fn drop(&mut self) {
        if !self.finalized {
            // §7: an I/O error or early exit during indexing aborts and
            // deletes the partial file.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Arena for ArenaWriter {
    fn read_bytes(&self, off: Off, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.read_exact_at(&mut buf, off as u64).map_err(|e| TarmacError::io(&self.path, e))?;
        Ok(buf)
    }
}

impl ArenaMut for ArenaWriter {
    fn append(&mut self, bytes: &[u8], align: u64) -> Result<Off> {
        let offset = align_up(self.pos, align);
        self.file.write_at(bytes, offset).map_err(|e| TarmacError::io(&self.path, e))?;
        self.pos = offset + bytes.len() as u64;
        Ok(offset as Off)
    }
}

fn align_up(pos: u64, align: u64) -> u64 {
    if align <= 1 {
        return pos;
    }
    pos.div_ceil(align) * align
}

/// Parsed footer contents, read back from the last 64 bytes of a
/// finalized index file (§6).
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    pub seq_root: Off,
    pub bypc_root: Off,
    pub lineno_offset: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub aarch64: bool,
    pub big_endian_trace: bool,
}

/// The mmap-backed, read-only arena used by the query layer.
pub struct ArenaReader {
    mmap: memmap2::Mmap,
    path: PathBuf,
    pub header: Header,
    pub footer: Footer,
}

impl ArenaReader {
    /// Open and validate a finalized index file. Returns
    /// `Err(ArenaError::Tarmac(TarmacError::Format(..)))` (exit code 3, per
    /// §6/§7) if the magic, version, or footer tail don't match; callers
    /// (the indexer driver) treat this as "stale index, rebuild".
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| TarmacError::io(&path, e))?;
        let len = file.metadata().map_err(|e| TarmacError::io(&path, e))?.len();
        if len < HEADER_LEN + FOOTER_LEN {
            return Err(TarmacError::format("index file too small").into());
        }

        let mmap = unsafe { memmap2::Mmap::map(&file).map_err(|e| TarmacError::io(&path, e))? };

        if &mmap[0..12] != HEADER_MAGIC {
            return Err(TarmacError::format("bad magic number").into());
        }
        if mmap[12] != FORMAT_VERSION {
            return Err(TarmacError::format("unsupported index format version").into());
        }
        let flags = mmap[13];
        let header = Header {
            aarch64: flags & FLAG_AARCH64 != 0,
            big_endian_trace: flags & FLAG_BIG_ENDIAN_TRACE != 0,
        };

        let footer_start = (len - FOOTER_LEN) as usize;
        let footer_bytes = &mmap[footer_start..];
        let f = |at: usize, n: usize| &footer_bytes[at..at + n];
        let seq_root = i64::from_le_bytes(f(FOOTER_SEQ_ROOT, 8).try_into().unwrap());
        let bypc_root = i64::from_le_bytes(f(FOOTER_BYPC_ROOT, 8).try_into().unwrap());
        let lineno_offset = u32::from_le_bytes(f(FOOTER_LINENO_OFFSET, 4).try_into().unwrap());
        if f(FOOTER_TAIL, 4) != FOOTER_TAIL_MAGIC {
            return Err(TarmacError::format("bad footer tail magic").into());
        }
        let stored_crc = u32::from_le_bytes(f(FOOTER_CRC32, 4).try_into().unwrap());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&mmap[0..footer_start + FOOTER_CRC32]);
        if hasher.finalize() != stored_crc {
            return Err(TarmacError::format("footer checksum mismatch").into());
        }

        Ok(ArenaReader { mmap, path, header, footer: Footer { seq_root, bypc_root, lineno_offset } })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Arena for ArenaReader {
    fn read_bytes(&self, off: Off, len: usize) -> Result<Vec<u8>> {
        let start = off as usize;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= self.mmap.len())
            .ok_or_else(|| TarmacError::format("out-of-range arena offset"))?;
        Ok(self.mmap[start..end].to_vec())
    }
}

/// Quick magic/version/checksum check, used by the indexer driver to
/// decide whether an existing index can be reused without rebuilding.
pub fn magic_number_ok(path: impl AsRef<Path>) -> bool {
    ArenaReader::open(path).is_ok()
}
