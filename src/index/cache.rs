//! Index caching (C11): a process-scoped cache keyed by a small positive
//! handle, a cheap `Copy` newtype preferred over raw integers or paths.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::Mutex;

use super::format::IndexBuffer;
use super::scan::scan_file;
use super::IndexError;
use crate::error::GribError;

/// A small positive handle identifying one indexed source file, valid in
/// `1..=9999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(u16);

impl FileHandle {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for FileHandle {
    type Error = IndexError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if (1..=9999).contains(&value) {
            Ok(Self(value))
        } else {
            Err(IndexError::OutOfRange(value))
        }
    }
}

/// Holds one [`IndexBuffer`] per [`FileHandle`], built lazily and kept until
/// explicitly dropped, regenerated, or replaced.
#[derive(Default)]
pub struct IndexCache {
    entries: Mutex<HashMap<FileHandle, IndexBuffer>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached buffer for `handle`, scanning `source` to build
    /// and insert one if absent.
    pub fn get<R, F>(&self, handle: FileHandle, source_name: &str, mut open_source: F) -> Result<IndexBuffer, GribError>
    where
        R: Read + Seek,
        F: FnMut() -> std::io::Result<R>,
    {
        let mut entries = self.entries.lock().expect("index cache mutex poisoned");
        if let Some(buffer) = entries.get(&handle) {
            return Ok(buffer.clone());
        }
        let mut reader = open_source().map_err(crate::error::ParseError::from)?;
        let buffer = scan_file(source_name, &mut reader)?;
        entries.insert(handle, buffer.clone());
        Ok(buffer)
    }

    /// Forces a fresh scan of `source`, overwriting whatever was cached for
    /// `handle`.
    pub fn regenerate<R: Read + Seek>(&self, handle: FileHandle, source_name: &str, reader: &mut R) -> Result<(), GribError> {
        let buffer = scan_file(source_name, reader)?;
        self.entries.lock().expect("index cache mutex poisoned").insert(handle, buffer);
        Ok(())
    }

    /// Replaces the cached entry for `handle` with a buffer decoded
    /// directly from a previously saved index file's bytes, skipping the
    /// source scan entirely.
    pub fn reload_from(&self, handle: FileHandle, encoded_index: &[u8]) -> Result<(), IndexError> {
        let buffer = IndexBuffer::decode(encoded_index)?;
        self.entries.lock().expect("index cache mutex poisoned").insert(handle, buffer);
        Ok(())
    }

    /// Drops every cached entry, releasing their memory.
    pub fn finalize(&self) {
        self.entries.lock().expect("index cache mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn handle_rejects_zero_and_values_above_9999() {
        assert_eq!(FileHandle::try_from(0), Err(IndexError::OutOfRange(0)));
        assert_eq!(FileHandle::try_from(10000), Err(IndexError::OutOfRange(10000)));
        assert!(FileHandle::try_from(1).is_ok());
        assert!(FileHandle::try_from(9999).is_ok());
    }

    #[test]
    fn finalize_clears_cache_forcing_rescan() {
        let cache = IndexCache::new();
        let handle = FileHandle::try_from(1).unwrap();
        cache.reload_from(handle, &IndexBuffer::new("a", vec![]).encode()).unwrap();
        assert_eq!(cache.entries.lock().unwrap().len(), 1);
        cache.finalize();
        assert_eq!(cache.entries.lock().unwrap().len(), 0);
    }

    #[test]
    fn get_builds_and_caches_on_first_call() {
        let cache = IndexCache::new();
        let handle = FileHandle::try_from(2).unwrap();
        let mut calls = 0;
        let data: Vec<u8> = Vec::new();
        let buffer = cache
            .get(handle, "empty.grib2", || {
                calls += 1;
                Ok(Cursor::new(data.clone()))
            })
            .unwrap();
        assert_eq!(buffer.records.len(), 0);
        assert_eq!(calls, 1);
        cache.get(handle, "empty.grib2", || { calls += 1; Ok(Cursor::new(data.clone())) }).unwrap();
        assert_eq!(calls, 1, "second get should hit the cache, not rescan");
    }
}
