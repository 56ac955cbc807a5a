//! Read-only access to a sparse pairwise matrix file.
//!
//! Records are stored as runs of fixed-stride items, one item per cluster,
//! each prefixed by its pair index, the record's cluster count `K` and the
//! item's ordinal `k`. Because every item is addressable by slot number, a
//! seek is a binary search over item slots followed by a rewind of `k`
//! slots to the start of the record.

use core::fmt;
use std::path::Path;

use coexnet_core::{CoexError, MappedFile, Result};
use tracing::warn;

use crate::codec::PayloadCodec;
use crate::header::{MatrixHeader, ITEM_HEADER_SIZE};
use crate::index::{total_pairs, PairIndex};
use crate::pair::Pair;

/// One item slot as stored on disk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawItem<'a> {
    pub index: u64,
    pub count: u8,
    pub ordinal: u8,
    pub payload: &'a [u8],
}

pub(crate) fn decode_item(bytes: &[u8]) -> RawItem<'_> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    RawItem {
        index: u64::from_le_bytes(raw),
        count: bytes[8],
        ordinal: bytes[9],
        payload: &bytes[ITEM_HEADER_SIZE..],
    }
}

/// A memory-mapped sparse matrix opened for reading.
pub struct SparseMatrix<C: PayloadCodec> {
    map: MappedFile,
    header: MatrixHeader,
    codec: C,
    data_start: usize,
    stride: usize,
    slots: u64,
}

impl<C: PayloadCodec> SparseMatrix<C> {
    /// Open a matrix file written with codec `C`.
    ///
    /// # Errors
    ///
    /// [`CoexError::MalformedRecord`] if the header is invalid, was written
    /// by another codec, or the item area ends in a partial item.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let map = MappedFile::open(path)?;
        let mut header = MatrixHeader::decode(map.as_bytes())?;
        if header.kind != C::KIND {
            return Err(CoexError::MalformedRecord(format!(
                "{}: file holds a {}, expected a {}",
                path.display(),
                header.kind,
                C::KIND
            )));
        }
        let codec = C::from_header(&header)?;

        let data_start = header.data_start();
        let stride = header.stride();
        let body = map.len().saturating_sub(data_start);
        if body % stride != 0 {
            return Err(CoexError::MalformedRecord(format!(
                "{}: {} trailing bytes after the last complete item",
                path.display(),
                body % stride
            )));
        }
        let slots = (body / stride) as u64;

        let mut matrix = Self {
            map,
            header: header.clone(),
            codec,
            data_start,
            stride,
            slots,
        };

        if header.item_count != slots {
            let pairs = matrix.count_records()?;
            warn!(
                path = %path.display(),
                header_items = header.item_count,
                found_items = slots,
                found_pairs = pairs,
                "matrix header counters are stale; recovered by scan"
            );
            header.item_count = slots;
            header.pair_count = pairs;
            matrix.header = header;
        }

        Ok(matrix)
    }

    /// Number of stored (`K > 0`) pair records.
    pub fn size(&self) -> u64 {
        self.header.pair_count
    }

    /// Number of stored cluster items across all records.
    pub fn item_count(&self) -> u64 {
        self.header.item_count
    }

    /// Number of genes.
    pub fn gene_size(&self) -> u32 {
        self.header.gene_size()
    }

    /// Number of samples per gene.
    pub fn sample_size(&self) -> u32 {
        self.header.sample_size
    }

    /// Upper bound on clusters per pair.
    pub fn max_clusters(&self) -> u8 {
        self.header.max_clusters
    }

    /// Ordered gene names.
    pub fn gene_names(&self) -> &[String] {
        &self.header.gene_names
    }

    /// The decoded header.
    pub fn header(&self) -> &MatrixHeader {
        &self.header
    }

    /// The codec rebuilt from the header.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// A new cursor positioned before the first record.
    pub fn cursor(&self) -> Cursor<'_, C> {
        Cursor {
            matrix: self,
            pair: Pair::new(&self.codec, self.gene_size(), self.max_clusters()),
            next_slot: 0,
        }
    }

    /// Linear index of the last stored record.
    pub fn last_index(&self) -> Result<Option<u64>> {
        match self.slots {
            0 => Ok(None),
            n => Ok(Some(self.item(n - 1)?.index)),
        }
    }

    pub(crate) fn slot_count(&self) -> u64 {
        self.slots
    }

    pub(crate) fn item(&self, slot: u64) -> Result<RawItem<'_>> {
        let offset = self.data_start + slot as usize * self.stride;
        let bytes = self.map.slice(offset, self.stride).ok_or_else(|| {
            CoexError::MalformedRecord(format!("item slot {slot} lies past end of file"))
        })?;
        Ok(decode_item(bytes))
    }

    /// First slot whose pair index is greater than `index`.
    fn upper_bound(&self, index: u64) -> Result<u64> {
        let (mut lo, mut hi) = (0u64, self.slots);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.item(mid)?.index <= index {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn count_records(&self) -> Result<u64> {
        let mut pairs = 0;
        for slot in 0..self.slots {
            if self.item(slot)?.ordinal == 0 {
                pairs += 1;
            }
        }
        Ok(pairs)
    }

    /// Decode the record starting at `start` into `pair`; returns the slot
    /// after the record.
    fn load_record(&self, start: u64, pair: &mut Pair<C>) -> Result<u64> {
        let first = self.item(start)?;
        if first.ordinal != 0 || first.count == 0 {
            return Err(CoexError::MalformedRecord(format!(
                "slot {start} does not start a record (k={}, K={})",
                first.ordinal, first.count
            )));
        }
        let count = first.count as u64;
        if start + count > self.slots {
            return Err(CoexError::MalformedRecord(format!(
                "record at pair {} is truncated",
                first.index
            )));
        }
        pair.reset_to(first.index);
        for k in 0..count {
            let item = self.item(start + k)?;
            if item.index != first.index || item.count != first.count || item.ordinal as u64 != k
            {
                return Err(CoexError::MalformedRecord(format!(
                    "inconsistent item {k} in record for pair {}",
                    first.index
                )));
            }
            pair.push(self.codec.decode(item.payload)?);
        }
        Ok(start + count)
    }
}

impl<C: PayloadCodec> fmt::Debug for SparseMatrix<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseMatrix")
            .field("kind", &self.header.kind)
            .field("gene_size", &self.gene_size())
            .field("size", &self.size())
            .field("items", &self.slots)
            .finish()
    }
}

/// A read cursor over a [`SparseMatrix`].
///
/// Holds the current [`Pair`] and the slot of the next stored record.
pub struct Cursor<'m, C: PayloadCodec> {
    matrix: &'m SparseMatrix<C>,
    pair: Pair<C>,
    next_slot: u64,
}

impl<'m, C: PayloadCodec> Cursor<'m, C> {
    /// Seek to linear pair index `index`.
    ///
    /// Returns `true` and loads the record if one is stored; otherwise
    /// returns `false`, leaves the cursor on an empty pair at `index`, and
    /// positions [`read_next`](Self::read_next) on the first stored record
    /// after it.
    ///
    /// # Errors
    ///
    /// [`CoexError::IndexOutOfRange`] if `index` is not below the total
    /// pair count for the matrix's genes.
    pub fn read(&mut self, index: u64) -> Result<bool> {
        let total = total_pairs(self.matrix.gene_size());
        if index >= total {
            return Err(CoexError::IndexOutOfRange { index, total });
        }

        let upper = self.matrix.upper_bound(index)?;
        if upper > 0 {
            let landed = self.matrix.item(upper - 1)?;
            if landed.index == index {
                let start = (upper - 1).checked_sub(landed.ordinal as u64).ok_or_else(|| {
                    CoexError::MalformedRecord(format!(
                        "record for pair {index} starts before the first item"
                    ))
                })?;
                self.next_slot = self.matrix.load_record(start, &mut self.pair)?;
                return Ok(true);
            }
        }
        self.pair.reset_to(index);
        self.next_slot = upper;
        Ok(false)
    }

    /// Seek to the pair `(x, y)`. See [`read`](Self::read).
    pub fn read_pair(&mut self, index: PairIndex) -> Result<bool> {
        self.read(index.to_linear())
    }

    /// Advance to the next stored record. Returns `false` at the end,
    /// leaving the current pair unchanged.
    pub fn read_next(&mut self) -> Result<bool> {
        if !self.has_next() {
            return Ok(false);
        }
        self.next_slot = self.matrix.load_record(self.next_slot, &mut self.pair)?;
        Ok(true)
    }

    /// Whether another stored record follows the cursor.
    pub fn has_next(&self) -> bool {
        self.next_slot < self.matrix.slot_count()
    }

    /// Rewind to before the first record.
    pub fn reset(&mut self) {
        self.pair.reset_to(0);
        self.next_slot = 0;
    }

    /// The current pair.
    pub fn pair(&self) -> &Pair<C> {
        &self.pair
    }

    /// Linear index of the current pair.
    pub fn index(&self) -> u64 {
        self.pair.index()
    }

    /// Number of clusters in the current pair.
    pub fn cluster_size(&self) -> usize {
        self.pair.cluster_size()
    }

    /// Whether the current pair has no record.
    pub fn is_empty(&self) -> bool {
        self.pair.is_empty()
    }

    /// Cluster `k` of the current pair.
    pub fn at(&self, k: usize) -> Option<&C::Item> {
        self.pair.at(k)
    }
}

impl<C: PayloadCodec> fmt::Display for Cursor<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pair.pair_index() {
            Ok(idx) => write!(f, "{idx}")?,
            Err(_) => write!(f, "#{}", self.pair.index())?,
        }
        write!(f, " K={}", self.pair.cluster_size())?;
        let codec = self.matrix.codec();
        for (k, item) in self.pair.clusters().iter().enumerate() {
            let sep = if k == 0 { ": " } else { ", " };
            write!(f, "{sep}{}", codec.format_item(item))?;
        }
        Ok(())
    }
}
