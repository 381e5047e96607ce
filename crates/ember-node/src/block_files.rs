//! Flat-file storage for block bodies and undo logs.
//!
//! Records append to numbered `blk*.dat` and `rev*.dat` files, framed as
//! network magic, a little-endian u32 length, then the bincode payload.
//! A record's address is its [`DiskPos`]; files roll over at
//! [`MAX_FILE_SIZE`]. Records are never rewritten in place.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ember_core::error::ChainError;

/// Roll to the next file once the current one exceeds this (128 MiB).
pub const MAX_FILE_SIZE: u64 = 128 * 1024 * 1024;

const FRAME_HEADER_LEN: u64 = 8; // magic + length

/// Which series of files a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Block bodies, `blk*.dat`.
    Block,
    /// Undo logs, `rev*.dat`.
    Undo,
}

impl FileKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Block => "blk",
            Self::Undo => "rev",
        }
    }
}

/// Address of a framed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct DiskPos {
    /// File number within the series.
    pub file: u32,
    /// Byte offset of the frame start.
    pub offset: u64,
}

fn storage_err(e: std::io::Error) -> ChainError {
    ChainError::Storage(e.to_string())
}

/// Append-only access to one series of flat files.
struct FileSeries {
    kind: FileKind,
    dir: PathBuf,
    current: u32,
    /// Write offset in the current file.
    offset: u64,
}

impl FileSeries {
    fn open(kind: FileKind, dir: &Path) -> Result<Self, ChainError> {
        // Resume at the highest existing file number.
        let mut current = 0u32;
        while dir.join(file_name(kind, current + 1)).exists() {
            current += 1;
        }
        let offset = match std::fs::metadata(dir.join(file_name(kind, current))) {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        Ok(Self { kind, dir: dir.to_path_buf(), current, offset })
    }

    fn path(&self, file: u32) -> PathBuf {
        self.dir.join(file_name(self.kind, file))
    }

    fn append(&mut self, magic: [u8; 4], payload: &[u8]) -> Result<DiskPos, ChainError> {
        let frame_len = FRAME_HEADER_LEN + payload.len() as u64;
        if self.offset > 0 && self.offset + frame_len > MAX_FILE_SIZE {
            self.current += 1;
            self.offset = 0;
        }
        let pos = DiskPos { file: self.current, offset: self.offset };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(self.current))
            .map_err(storage_err)?;
        file.write_all(&magic).map_err(storage_err)?;
        file.write_all(&(payload.len() as u32).to_le_bytes()).map_err(storage_err)?;
        file.write_all(payload).map_err(storage_err)?;
        file.sync_data().map_err(storage_err)?;

        self.offset += frame_len;
        Ok(pos)
    }

    fn read(&self, magic: [u8; 4], pos: DiskPos) -> Result<Vec<u8>, ChainError> {
        let mut file = File::open(self.path(pos.file)).map_err(storage_err)?;
        file.seek(SeekFrom::Start(pos.offset)).map_err(storage_err)?;

        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        file.read_exact(&mut header).map_err(storage_err)?;
        if header[..4] != magic {
            return Err(ChainError::Storage(format!(
                "bad record magic in {} at offset {}",
                file_name(self.kind, pos.file),
                pos.offset
            )));
        }
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload).map_err(storage_err)?;
        Ok(payload)
    }
}

fn file_name(kind: FileKind, file: u32) -> String {
    format!("{}{:05}.dat", kind.prefix(), file)
}

/// Block and undo file series under one directory.
pub struct BlockFiles {
    magic: [u8; 4],
    blocks: FileSeries,
    undos: FileSeries,
}

impl BlockFiles {
    /// Open the series under `dir`, creating the directory if needed.
    pub fn open(dir: &Path, magic: [u8; 4]) -> Result<Self, ChainError> {
        std::fs::create_dir_all(dir).map_err(storage_err)?;
        Ok(Self {
            magic,
            blocks: FileSeries::open(FileKind::Block, dir)?,
            undos: FileSeries::open(FileKind::Undo, dir)?,
        })
    }

    pub fn append(&mut self, kind: FileKind, payload: &[u8]) -> Result<DiskPos, ChainError> {
        let series = match kind {
            FileKind::Block => &mut self.blocks,
            FileKind::Undo => &mut self.undos,
        };
        series.append(self.magic, payload)
    }

    pub fn read(&self, kind: FileKind, pos: DiskPos) -> Result<Vec<u8>, ChainError> {
        let series = match kind {
            FileKind::Block => &self.blocks,
            FileKind::Undo => &self.undos,
        };
        series.read(self.magic, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAGIC: [u8; 4] = [0x45, 0x4D, 0x52, 0x54];

    #[test]
    fn append_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut files = BlockFiles::open(dir.path(), MAGIC).unwrap();

        let a = files.append(FileKind::Block, b"first").unwrap();
        let b = files.append(FileKind::Block, b"second record").unwrap();
        assert_eq!(a, DiskPos { file: 0, offset: 0 });
        assert_eq!(b.offset, FRAME_HEADER_LEN + 5);

        assert_eq!(files.read(FileKind::Block, a).unwrap(), b"first");
        assert_eq!(files.read(FileKind::Block, b).unwrap(), b"second record");
    }

    #[test]
    fn block_and_undo_series_are_separate() {
        let dir = TempDir::new().unwrap();
        let mut files = BlockFiles::open(dir.path(), MAGIC).unwrap();

        let bp = files.append(FileKind::Block, b"block").unwrap();
        let up = files.append(FileKind::Undo, b"undo").unwrap();
        // Both land at the start of their own series.
        assert_eq!(bp, up);
        assert_eq!(files.read(FileKind::Block, bp).unwrap(), b"block");
        assert_eq!(files.read(FileKind::Undo, up).unwrap(), b"undo");
    }

    #[test]
    fn reopen_resumes_at_end() {
        let dir = TempDir::new().unwrap();
        let first = {
            let mut files = BlockFiles::open(dir.path(), MAGIC).unwrap();
            files.append(FileKind::Block, b"persisted").unwrap()
        };

        let mut files = BlockFiles::open(dir.path(), MAGIC).unwrap();
        let second = files.append(FileKind::Block, b"more").unwrap();
        assert!(second.offset > first.offset);
        assert_eq!(files.read(FileKind::Block, first).unwrap(), b"persisted");
        assert_eq!(files.read(FileKind::Block, second).unwrap(), b"more");
    }

    #[test]
    fn wrong_magic_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let mut files = BlockFiles::open(dir.path(), MAGIC).unwrap();
        let pos = files.append(FileKind::Block, b"payload").unwrap();

        let other = BlockFiles::open(dir.path(), [0; 4]).unwrap();
        assert!(matches!(
            other.read(FileKind::Block, pos),
            Err(ChainError::Storage(_))
        ));
    }
}
