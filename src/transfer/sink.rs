//! Destinations for reassembled payload.
//!
//! A [`Sink`] sees exactly one destination at a time: `begin` opens it (and
//! throws away anything unfinished), `write` appends at the session cursor and
//! `finalize` closes it once the declared size has arrived.

use super::error::SinkError;
use fs2::FileExt;
use log::{debug, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub trait Sink {
    /// Largest transfer this sink can hold, in bytes.
    fn capacity(&self) -> u32;

    /// Open a destination for a new transfer, discarding any unfinished one.
    fn begin(&mut self, file_id: u32, name: &str, total_size: u32) -> Result<(), SinkError>;

    /// Append `bytes` at `offset`, which is always the number of bytes written so far.
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), SinkError>;

    /// Close the destination. Returns where it ended up, if on disk.
    fn finalize(&mut self) -> Result<Option<PathBuf>, SinkError>;

    /// Drop the open destination without completing it.
    fn abort(&mut self);
}

impl<T: Sink + ?Sized> Sink for Box<T> {
    fn capacity(&self) -> u32 {
        (**self).capacity()
    }

    fn begin(&mut self, file_id: u32, name: &str, total_size: u32) -> Result<(), SinkError> {
        (**self).begin(file_id, name, total_size)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), SinkError> {
        (**self).write(offset, bytes)
    }

    fn finalize(&mut self) -> Result<Option<PathBuf>, SinkError> {
        (**self).finalize()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

/// Fixed memory region, the RAM window a transfer is loaded into.
#[derive(Debug)]
pub struct MemorySink {
    region: Box<[u8]>,
    filled: usize,
    open: bool,
    name: String,
}

impl MemorySink {
    pub fn new(capacity: u32) -> Self {
        Self {
            region: vec![0u8; capacity as usize].into_boxed_slice(),
            filled: 0,
            open: false,
            name: String::new(),
        }
    }

    /// Bytes written for the current (or last completed) transfer.
    pub fn contents(&self) -> &[u8] {
        &self.region[..self.filled]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Sink for MemorySink {
    fn capacity(&self) -> u32 {
        self.region.len() as u32
    }

    fn begin(&mut self, _file_id: u32, name: &str, _total_size: u32) -> Result<(), SinkError> {
        self.filled = 0;
        self.open = true;
        self.name = name.to_string();
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), SinkError> {
        if !self.open {
            return Err(SinkError::NotOpen);
        }
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.region.len() {
            return Err(SinkError::Capacity {
                offset,
                len: bytes.len(),
                capacity: self.capacity(),
            });
        }
        self.region[start..end].copy_from_slice(bytes);
        self.filled = end;
        Ok(())
    }

    fn finalize(&mut self) -> Result<Option<PathBuf>, SinkError> {
        if !self.open {
            return Err(SinkError::NotOpen);
        }
        self.open = false;
        Ok(None)
    }

    fn abort(&mut self) {
        self.open = false;
        self.filled = 0;
    }
}

const NAME_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

/// Longest encoded name that still fits `.<name>.part` in a 255-byte file name.
pub const SAFE_NAME_MAX: usize = 255 - ".".len() - ".part".len();

/// Filesystem-safe version of a name received over the link. Path separators
/// and other specials are percent-encoded and the result is cut to
/// [`SAFE_NAME_MAX`] on a character boundary, never inside an escape. Names
/// that would be empty or only dots fall back to `transfer-<file_id>.bin`.
pub fn safe_file_name(name: &str, file_id: u32) -> String {
    let mut encoded = String::new();
    let mut utf8 = [0u8; 4];
    for ch in name.chars() {
        let piece = utf8_percent_encode(ch.encode_utf8(&mut utf8), NAME_SET).to_string();
        if encoded.len() + piece.len() > SAFE_NAME_MAX {
            break;
        }
        encoded.push_str(&piece);
    }
    if encoded.chars().all(|c| c == '.') {
        format!("transfer-{:08x}.bin", file_id)
    } else {
        encoded
    }
}

struct PartFile {
    file: File,
    part_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

/// Persistent storage writer. Data goes to a locked `.<name>.part` file that is
/// renamed into place only after the last byte has been synced.
pub struct FileSink {
    dir: PathBuf,
    capacity: u32,
    current: Option<PartFile>,
}

impl FileSink {
    pub fn new(dir: impl AsRef<Path>, capacity: u32) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            capacity,
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the partial file being written, if any.
    pub fn part_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|p| p.part_path.as_path())
    }
}

impl Sink for FileSink {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn begin(&mut self, file_id: u32, name: &str, _total_size: u32) -> Result<(), SinkError> {
        self.abort();
        fs::create_dir_all(&self.dir)?;
        let safe = safe_file_name(name, file_id);
        let part_path = self.dir.join(format!(".{}.part", safe));
        let final_path = self.dir.join(&safe);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part_path)?;
        file.try_lock_exclusive()?;
        debug!("Opened {}", part_path.display());
        self.current = Some(PartFile {
            file,
            part_path,
            final_path,
            written: 0,
        });
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), SinkError> {
        let capacity = self.capacity;
        let part = self.current.as_mut().ok_or(SinkError::NotOpen)?;
        if offset as u64 != part.written || offset as u64 + bytes.len() as u64 > capacity as u64 {
            return Err(SinkError::Capacity {
                offset,
                len: bytes.len(),
                capacity,
            });
        }
        part.file.write_all(bytes)?;
        part.written += bytes.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<Option<PathBuf>, SinkError> {
        let PartFile {
            mut file,
            part_path,
            final_path,
            ..
        } = self.current.take().ok_or(SinkError::NotOpen)?;
        let synced = file.flush().and_then(|_| file.sync_all());
        // Closing releases the lock before the rename.
        drop(file);
        if let Err(e) = synced.and_then(|_| fs::rename(&part_path, &final_path)) {
            let _ = fs::remove_file(&part_path);
            return Err(e.into());
        }
        Ok(Some(final_path))
    }

    fn abort(&mut self) {
        if let Some(part) = self.current.take() {
            drop(part.file);
            if let Err(e) = fs::remove_file(&part.part_path) {
                warn!("Failed to remove {}: {}", part.part_path.display(), e);
            } else {
                debug!("Discarded {}", part.part_path.display());
            }
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_writes_at_offset() {
        let mut sink = MemorySink::new(8);
        sink.begin(1, "a", 4).unwrap();
        sink.write(0, &[1, 2]).unwrap();
        sink.write(2, &[3, 4]).unwrap();
        assert_eq!(sink.contents(), &[1, 2, 3, 4]);
        assert_eq!(sink.finalize().unwrap(), None);
        assert!(!sink.is_open());
    }

    #[test]
    fn memory_sink_refuses_out_of_bounds() {
        let mut sink = MemorySink::new(2);
        sink.begin(1, "a", 2).unwrap();
        assert!(matches!(
            sink.write(1, &[1, 2]),
            Err(SinkError::Capacity { offset: 1, len: 2, capacity: 2 })
        ));
    }

    #[test]
    fn memory_sink_requires_begin() {
        let mut sink = MemorySink::new(2);
        assert!(matches!(sink.write(0, &[1]), Err(SinkError::NotOpen)));
    }

    #[test]
    fn safe_file_name_blocks_traversal() {
        assert_eq!(safe_file_name("photo.bmp", 1), "photo.bmp");
        assert_eq!(safe_file_name("a b", 1), "a%20b");
        assert!(!safe_file_name("../etc/passwd", 1).contains('/'));
        assert_eq!(safe_file_name("..", 0x2a), "transfer-0000002a.bin");
        assert_eq!(safe_file_name("", 0x2a), "transfer-0000002a.bin");
    }

    #[test]
    fn safe_file_name_is_capped_between_escapes() {
        let long = safe_file_name(&"a".repeat(255), 1);
        assert_eq!(long.len(), SAFE_NAME_MAX);

        // Each Hangul syllable encodes to nine characters: %XX%XX%XX
        let wide = safe_file_name(&"한".repeat(30), 1);
        assert_eq!(wide.len(), 27 * 9);
        assert!(wide.len() <= SAFE_NAME_MAX);
        assert!(wide.ends_with("%95%9C"));

        let mixed = safe_file_name(&format!("{}/x", "b".repeat(247)), 1);
        assert_eq!(mixed.len(), 247, "escape that would not fit is dropped whole");
    }
}
