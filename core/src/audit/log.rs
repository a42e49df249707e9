use crate::audit::event::AuditEvent;
use crate::determinism::hash_chain::{seal, verify_links, ChainLink, ZERO_HASH_64};
use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Append-only NDJSON file whose lines form a hash chain.
pub struct ChainedLog<T> {
    path: PathBuf,
    last_hash: String,
    len: usize,
    _record: PhantomData<T>,
}

pub type AuditLog = ChainedLog<AuditEvent>;

impl<T: ChainLink + DeserializeOwned> ChainedLog<T> {
    /// Opens (or creates) the log and returns every record already in it.
    /// The chain is verified on open; a broken chain is a hard error.
    pub fn open_or_create(path: impl AsRef<Path>) -> CoreResult<(Self, Vec<T>)> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(&path)?;
            return Ok((
                Self {
                    path,
                    last_hash: ZERO_HASH_64.to_string(),
                    len: 0,
                    _record: PhantomData,
                },
                Vec::new(),
            ));
        }
        Self::read(path)
    }

    /// Opens a log that must already exist. Nothing is created on disk.
    pub fn open_existing(path: impl AsRef<Path>) -> CoreResult<(Self, Vec<T>)> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(CoreError::InvalidInput(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Self::read(path)
    }

    fn read(path: PathBuf) -> CoreResult<(Self, Vec<T>)> {
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(&line).map_err(|e| {
                CoreError::CorpusIntegrity(format!(
                    "{} line {} is not a valid record: {}",
                    path.display(),
                    n + 1,
                    e
                ))
            })?;
            records.push(record);
        }
        let last_hash = verify_links(&records)?;
        Ok((
            Self {
                path,
                last_hash,
                len: records.len(),
                _record: PhantomData,
            },
            records,
        ))
    }

    pub fn append(&mut self, record: T) -> CoreResult<T> {
        let record = seal(record, &self.last_hash)?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        // One write per record keeps lines whole.
        f.write_all(line.as_bytes())?;
        f.flush()?;
        self.last_hash = record.link_hash().to_string();
        self.len += 1;
        Ok(record)
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
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
}
