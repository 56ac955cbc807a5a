//! Append-only writer for sparse pairwise matrices.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use coexnet_core::{CoexError, Result};
use tracing::debug;

use crate::codec::PayloadCodec;
use crate::header::{MatrixHeader, COUNTS_OFFSET, MAX_CLUSTERS};
use crate::index::total_pairs;
use crate::matrix::SparseMatrix;
use crate::pair::Pair;

/// Writes pair records in strictly increasing index order.
///
/// The header is written once by [`initialize`](Self::initialize).
/// Records are staged in memory and reach the file on
/// [`flush`](Self::flush), which also refreshes the header counters and
/// marks a checkpoint. Staged records never reach the file on drop, and
/// [`rollback`](Self::rollback) returns the file to the last checkpoint.
pub struct MatrixWriter<C: PayloadCodec> {
    path: PathBuf,
    file: File,
    codec: C,
    header: Option<MatrixHeader>,
    last_write: Option<u64>,
    staged: Vec<u8>,
    /// File length including persisted records.
    len: u64,
    checkpoint: Checkpoint,
}

/// Persisted state at the last successful flush.
#[derive(Debug, Clone, Copy, Default)]
struct Checkpoint {
    len: u64,
    pair_count: u64,
    item_count: u64,
    last_write: Option<u64>,
}

fn write_counts(file: &mut File, pair_count: u64, item_count: u64) -> Result<()> {
    file.seek(SeekFrom::Start(COUNTS_OFFSET))?;
    file.write_all(&pair_count.to_le_bytes())?;
    file.write_all(&item_count.to_le_bytes())?;
    Ok(())
}

fn open_error(path: &Path, e: std::io::Error) -> CoexError {
    CoexError::Io(std::io::Error::new(
        e.kind(),
        format!("{}: {}", path.display(), e),
    ))
}

impl<C: PayloadCodec> MatrixWriter<C> {
    /// Create (or truncate) a matrix file. Call
    /// [`initialize`](Self::initialize) before writing records.
    pub fn create(path: impl AsRef<Path>, codec: C) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| open_error(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            codec,
            header: None,
            last_write: None,
            staged: Vec::new(),
            len: 0,
            checkpoint: Checkpoint::default(),
        })
    }

    /// Reopen an existing, initialized matrix file to add more records.
    ///
    /// The last written index is recovered from the file, so the ordering
    /// invariant holds across sessions.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (header, codec, last_write) = {
            let matrix = SparseMatrix::<C>::open(path)?;
            (
                matrix.header().clone(),
                matrix.codec().clone(),
                matrix.last_index()?,
            )
        };
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;
        let len = file.seek(SeekFrom::End(0))?;
        debug!(
            path = %path.display(),
            pairs = header.pair_count,
            last = ?last_write,
            "reopened matrix for append"
        );
        let checkpoint = Checkpoint {
            len,
            pair_count: header.pair_count,
            item_count: header.item_count,
            last_write,
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            codec,
            header: Some(header),
            last_write,
            staged: Vec::new(),
            len,
            checkpoint,
        })
    }

    /// Write the header.
    ///
    /// Item size and sub-header come from the codec.
    ///
    /// # Errors
    ///
    /// [`CoexError::AlreadyInitialized`] if the header was already written
    /// (including a file opened with [`append`](Self::append));
    /// [`CoexError::InvalidInput`] if `max_clusters` is outside
    /// `1..=64`.
    pub fn initialize(
        &mut self,
        gene_names: Vec<String>,
        sample_size: u32,
        max_clusters: u8,
    ) -> Result<()> {
        if self.header.is_some() {
            return Err(CoexError::AlreadyInitialized);
        }
        if max_clusters == 0 || max_clusters > MAX_CLUSTERS {
            return Err(CoexError::InvalidInput(format!(
                "max clusters {max_clusters} outside 1..={MAX_CLUSTERS}"
            )));
        }
        let header = MatrixHeader {
            kind: C::KIND,
            max_clusters,
            gene_names,
            sample_size,
            item_size: self.codec.item_size() as u32,
            sub_header: self.codec.sub_header(),
            pair_count: 0,
            item_count: 0,
        };
        let bytes = header.encode();
        self.file.write_all(&bytes)?;
        self.len = bytes.len() as u64;
        self.checkpoint = Checkpoint {
            len: self.len,
            ..Checkpoint::default()
        };
        debug!(
            path = %self.path.display(),
            kind = %header.kind,
            genes = header.gene_size(),
            samples = sample_size,
            "initialized matrix header"
        );
        self.header = Some(header);
        Ok(())
    }

    /// A staging pair sized for this matrix.
    pub fn pair(&self) -> Result<Pair<C>> {
        let header = self.header.as_ref().ok_or(CoexError::NotInitialized)?;
        Ok(Pair::new(
            &self.codec,
            header.gene_size(),
            header.max_clusters,
        ))
    }

    /// Append the record for pair `index`.
    ///
    /// An empty `clusters` slice stores nothing but is still checked
    /// against the ordering invariant.
    ///
    /// # Errors
    ///
    /// [`CoexError::NotInitialized`] before [`initialize`](Self::initialize);
    /// [`CoexError::IndexOutOfRange`] past the last pair;
    /// [`CoexError::NonMonotonicWrite`] if `index` is not greater than the
    /// last stored index; [`CoexError::InvalidInput`] for too many clusters
    /// or a payload of the wrong shape.
    pub fn write(&mut self, index: u64, clusters: &[C::Item]) -> Result<()> {
        let header = self.header.as_mut().ok_or(CoexError::NotInitialized)?;
        let total = total_pairs(header.gene_size());
        if index >= total {
            return Err(CoexError::IndexOutOfRange { index, total });
        }
        if let Some(last) = self.last_write {
            if index <= last {
                return Err(CoexError::NonMonotonicWrite { index, last });
            }
        }
        if clusters.is_empty() {
            return Ok(());
        }
        if clusters.len() > header.max_clusters as usize {
            return Err(CoexError::InvalidInput(format!(
                "pair {index} has {} clusters, limit is {}",
                clusters.len(),
                header.max_clusters
            )));
        }

        let start = self.staged.len();
        let count = clusters.len() as u8;
        for (k, item) in clusters.iter().enumerate() {
            self.staged.extend_from_slice(&index.to_le_bytes());
            self.staged.push(count);
            self.staged.push(k as u8);
            if let Err(e) = self.codec.encode(item, &mut self.staged) {
                self.staged.truncate(start);
                return Err(e);
            }
        }

        header.pair_count += 1;
        header.item_count += clusters.len() as u64;
        self.last_write = Some(index);
        Ok(())
    }

    /// Append a staged pair. See [`write`](Self::write).
    pub fn write_pair(&mut self, pair: &Pair<C>) -> Result<()> {
        self.write(pair.index(), pair.clusters())
    }

    /// Write staged records to the file, refresh the header counters and
    /// mark a checkpoint. On failure the file is rolled back to the
    /// previous checkpoint.
    pub fn flush(&mut self) -> Result<()> {
        if let Err(e) = self.persist() {
            self.rollback()?;
            return Err(e);
        }
        self.mark_checkpoint();
        Ok(())
    }

    /// Write staged records and counters without marking a checkpoint.
    ///
    /// Used to persist several writers before checkpointing any of them;
    /// follow with [`mark_checkpoint`](Self::mark_checkpoint) or
    /// [`rollback`](Self::rollback).
    pub fn persist(&mut self) -> Result<()> {
        if !self.staged.is_empty() {
            self.file.seek(SeekFrom::Start(self.len))?;
            self.file.write_all(&self.staged)?;
            self.len += self.staged.len() as u64;
            self.staged.clear();
        }
        if let Some(header) = &self.header {
            write_counts(&mut self.file, header.pair_count, header.item_count)?;
        }
        Ok(())
    }

    /// Accept everything persisted so far as the rollback point.
    pub fn mark_checkpoint(&mut self) {
        self.checkpoint = Checkpoint {
            len: self.len,
            pair_count: self.size(),
            item_count: self.header.as_ref().map_or(0, |h| h.item_count),
            last_write: self.last_write,
        };
    }

    /// Drop staged records and truncate the file to the last checkpoint.
    pub fn rollback(&mut self) -> Result<()> {
        let cp = self.checkpoint;
        self.staged.clear();
        self.last_write = cp.last_write;
        self.len = cp.len;
        self.file.set_len(cp.len)?;
        if let Some(header) = self.header.as_mut() {
            header.pair_count = cp.pair_count;
            header.item_count = cp.item_count;
            write_counts(&mut self.file, cp.pair_count, cp.item_count)?;
        }
        debug!(
            path = %self.path.display(),
            len = cp.len,
            pairs = cp.pair_count,
            "rolled back matrix to checkpoint"
        );
        Ok(())
    }

    /// Flush, sync to disk and close the file.
    pub fn finish(mut self) -> Result<()> {
        self.flush()?;
        self.file.sync_all()?;
        if let Some(header) = &self.header {
            debug!(
                path = %self.path.display(),
                pairs = header.pair_count,
                items = header.item_count,
                "finished matrix"
            );
        }
        Ok(())
    }

    /// Linear index of the last stored record.
    pub fn last_write(&self) -> Option<u64> {
        self.last_write
    }

    /// Number of stored records so far.
    pub fn size(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.pair_count)
    }

    /// The codec items are encoded with.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
