//! Filesystem-backed JSON documents, one file per key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Document not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Key cannot be mapped to a file name.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage result type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage backend for persisting documents under one directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a storage instance rooted at `root`. The directory is created lazily.
    #[must_use]
    pub const fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the storage root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to its file, escaping anything that is not `[A-Za-z0-9_.-]`.
    ///
    /// Escaping is injective so distinct keys never share a file.
    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key == "." || key == ".." {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' => {
                    name.push(char::from(byte));
                }
                other => name.push_str(&format!("%{other:02X}")),
            }
        }
        name.push_str(".json");
        Ok(self.root.join(name))
    }

    fn key_from_file_stem(stem: &str) -> Option<String> {
        let mut bytes = Vec::with_capacity(stem.len());
        let mut iter = stem.bytes();
        while let Some(byte) = iter.next() {
            if byte == b'%' {
                let hi = iter.next()?;
                let lo = iter.next()?;
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).ok()?;
                bytes.push(u8::from_str_radix(hex, 16).ok()?);
            } else {
                bytes.push(byte);
            }
        }
        String::from_utf8(bytes).ok()
    }

    /// Read a document.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or cannot be parsed.
    pub fn read<T>(&self, key: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let path = self.path(key)?;

        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let contents = std::fs::read_to_string(&path)?;
        let value: T = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write a document, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be written.
    pub fn write<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let path = self.path(key)?;
        std::fs::create_dir_all(&self.root)?;

        let json = serde_json::to_string_pretty(value)?;
        let tmp = self
            .root
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove a document. Missing documents are not an error.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be removed.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// List all stored keys, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = Self::key_from_file_stem(stem) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Check if a key exists.
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.path(key).is_ok_and(|p| p.exists())
    }
}
