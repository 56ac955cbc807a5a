//! Fixed file header, gene-name table and codec sub-header.
//!
//! Layout (all integers little-endian):
//!
//! | offset | size | field            |
//! |-------:|-----:|------------------|
//! | 0      | 4    | magic `CXPM`     |
//! | 4      | 2    | format version   |
//! | 6      | 1    | payload kind     |
//! | 7      | 1    | max clusters     |
//! | 8      | 4    | gene size        |
//! | 12     | 4    | sample size      |
//! | 16     | 4    | item size        |
//! | 20     | 2    | item header size |
//! | 22     | 4    | sub-header size  |
//! | 26     | 8    | pair count       |
//! | 34     | 8    | item count       |
//!
//! followed by the gene-name table (`u32` count, then `u32`-prefixed UTF-8
//! names) and the codec sub-header bytes. Items start right after.

use coexnet_core::{CoexError, Result};

use crate::bytes::{read_string, read_u16_le, read_u32_le, read_u64_le, read_u8, write_string};
use crate::codec::PayloadKind;

/// File magic.
pub const MAGIC: [u8; 4] = *b"CXPM";
/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;
/// Byte size of the fixed part of the header.
pub const FIXED_HEADER_SIZE: usize = 42;
/// Byte size of the per-item prefix `{pair index u64, K u8, k u8}`.
pub const ITEM_HEADER_SIZE: usize = 10;
/// Upper bound on clusters per pair.
pub const MAX_CLUSTERS: u8 = 64;

/// Offset of the pair count; the item count follows immediately.
pub(crate) const COUNTS_OFFSET: u64 = 26;

/// Decoded matrix header.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixHeader {
    pub kind: PayloadKind,
    pub max_clusters: u8,
    pub gene_names: Vec<String>,
    pub sample_size: u32,
    pub item_size: u32,
    pub sub_header: Vec<u8>,
    /// Number of pairs with at least one cluster.
    pub pair_count: u64,
    /// Number of stored cluster items.
    pub item_count: u64,
}

impl MatrixHeader {
    /// Number of genes.
    pub fn gene_size(&self) -> u32 {
        self.gene_names.len() as u32
    }

    /// Full byte width of one stored item, prefix included.
    pub fn stride(&self) -> usize {
        ITEM_HEADER_SIZE + self.item_size as usize
    }

    /// Byte offset where items begin.
    pub fn data_start(&self) -> usize {
        FIXED_HEADER_SIZE
            + 4
            + self.gene_names.iter().map(|n| 4 + n.len()).sum::<usize>()
            + self.sub_header.len()
    }

    /// Serialize the complete header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_start());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.push(self.kind.tag());
        out.push(self.max_clusters);
        out.extend_from_slice(&self.gene_size().to_le_bytes());
        out.extend_from_slice(&self.sample_size.to_le_bytes());
        out.extend_from_slice(&self.item_size.to_le_bytes());
        out.extend_from_slice(&(ITEM_HEADER_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(self.sub_header.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.pair_count.to_le_bytes());
        out.extend_from_slice(&self.item_count.to_le_bytes());

        out.extend_from_slice(&(self.gene_names.len() as u32).to_le_bytes());
        for name in &self.gene_names {
            write_string(&mut out, name);
        }
        out.extend_from_slice(&self.sub_header);
        out
    }

    /// Parse a header from the start of `data`.
    ///
    /// # Errors
    ///
    /// [`CoexError::MalformedRecord`] on a wrong magic, unsupported version,
    /// unknown payload kind, or truncated data.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE || data[..4] != MAGIC {
            return Err(CoexError::MalformedRecord(
                "not a pairwise matrix file (bad magic)".into(),
            ));
        }
        let mut pos = 4;
        let version = read_u16_le(data, &mut pos)?;
        if version != FORMAT_VERSION {
            return Err(CoexError::MalformedRecord(format!(
                "unsupported matrix format version {version}"
            )));
        }
        let kind = PayloadKind::from_tag(read_u8(data, &mut pos)?)?;
        let max_clusters = read_u8(data, &mut pos)?;
        let gene_size = read_u32_le(data, &mut pos)?;
        let sample_size = read_u32_le(data, &mut pos)?;
        let item_size = read_u32_le(data, &mut pos)?;
        let item_header_size = read_u16_le(data, &mut pos)?;
        let sub_header_size = read_u32_le(data, &mut pos)? as usize;
        let pair_count = read_u64_le(data, &mut pos)?;
        let item_count = read_u64_le(data, &mut pos)?;

        if item_header_size as usize != ITEM_HEADER_SIZE {
            return Err(CoexError::MalformedRecord(format!(
                "item header size {item_header_size}, expected {ITEM_HEADER_SIZE}"
            )));
        }
        if max_clusters == 0 || max_clusters > MAX_CLUSTERS {
            return Err(CoexError::MalformedRecord(format!(
                "max clusters {max_clusters} outside 1..={MAX_CLUSTERS}"
            )));
        }

        let name_count = read_u32_le(data, &mut pos)?;
        if name_count != gene_size {
            return Err(CoexError::MalformedRecord(format!(
                "gene table has {name_count} names, header declares {gene_size}"
            )));
        }
        let gene_names = (0..name_count)
            .map(|_| read_string(data, &mut pos))
            .collect::<Result<Vec<_>>>()?;

        let end = pos
            .checked_add(sub_header_size)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| CoexError::MalformedRecord("truncated codec sub-header".into()))?;
        let sub_header = data[pos..end].to_vec();

        Ok(Self {
            kind,
            max_clusters,
            gene_names,
            sample_size,
            item_size,
            sub_header,
            pair_count,
            item_count,
        })
    }
}
