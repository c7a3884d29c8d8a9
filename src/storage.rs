//! RocksDB-backed key/value storage

use crate::config::StorageConfig;
use crate::errors::{BotResult, StorageError};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Single write inside an atomic batch
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

#[derive(Clone)]
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(path: P) -> BotResult<Self> {
        Self::open(path.as_ref(), 32)
    }

    pub fn new_with_config(config: &StorageConfig) -> BotResult<Self> {
        if config.clear_on_start {
            let _ = std::fs::remove_dir_all(&config.data_directory);
        }
        Self::open(Path::new(&config.data_directory), config.write_buffer_size_mb)
    }

    fn open(path: &Path, write_buffer_size_mb: usize) -> BotResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(write_buffer_size_mb * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::DatabaseOpenFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> BotResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> BotResult<()> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    pub fn delete(&self, key: &[u8]) -> BotResult<()> {
        self.db
            .delete(key)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    /// Apply every op or none of them
    pub fn batch_write(&self, ops: Vec<BatchOp>) -> BotResult<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put(key, value) => batch.put(key, value),
                BatchOp::Delete(key) => batch.delete(key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    /// Scan keys sharing `prefix` in ascending order, starting strictly after `cursor`
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        cursor: Option<&[u8]>,
        limit: usize,
    ) -> BotResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = cursor.unwrap_or(prefix);
        let iter = self.db.iterator(IteratorMode::From(start, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            if cursor.is_some_and(|c| key.as_ref() == c) {
                continue;
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> BotResult<Option<T>> {
        match self.get(key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::CorruptedData(format!(
                        "Failed to decode {}: {}",
                        String::from_utf8_lossy(key),
                        e
                    ))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &[u8], value: &T) -> BotResult<()> {
        let bytes = encode_json(value)?;
        self.put(key, &bytes)
    }
}

pub fn encode_json<T: Serialize>(value: &T) -> BotResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StorageError::WriteFailed(format!("Failed to encode: {}", e)).into())
}
