//! Work blocks (ranges of pair indices) and their result blocks.

use coexnet_core::Result;
use coexnet_pairwise::{PairIndex, PairRange};

/// A contiguous run of linear pair indices assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkBlock {
    /// Position of the block in commit order.
    pub index: usize,
    /// First linear pair index.
    pub start: u64,
    /// Number of pairs.
    pub size: u64,
}

impl WorkBlock {
    /// Split `total` pairs into blocks of at most `block_size`.
    pub fn partition(total: u64, block_size: usize) -> Vec<WorkBlock> {
        let block_size = block_size.max(1) as u64;
        let count = total.div_ceil(block_size);
        (0..count)
            .map(|i| {
                let start = i * block_size;
                WorkBlock {
                    index: i as usize,
                    start,
                    size: block_size.min(total - start),
                }
            })
            .collect()
    }

    /// The pairs of this block for `gene_size` genes.
    pub fn pairs(&self, gene_size: u32) -> Result<PairRange> {
        PairIndex::range(gene_size, self.start, self.size)
    }
}

/// Outcome of one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    /// Number of clusters; `0` means the pair could not be processed.
    pub k: u8,
    /// Per-sample labels, present when `k > 1`.
    pub labels: Option<Vec<i8>>,
    /// One correlation per cluster, present when `k > 0`.
    pub correlations: Option<Vec<f32>>,
}

impl PairOutcome {
    /// Build an outcome keeping only the parts stored for `k`.
    pub fn new(k: u8, labels: &[i8], correlations: &[f32]) -> Self {
        Self {
            k,
            labels: (k > 1).then(|| labels.to_vec()),
            correlations: (k > 0).then(|| correlations[..k as usize].to_vec()),
        }
    }
}

/// Computed outcomes of one [`WorkBlock`], in pair order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBlock {
    pub index: usize,
    pub start: u64,
    pub pairs: Vec<PairOutcome>,
}

impl ResultBlock {
    pub fn new(block: &WorkBlock) -> Self {
        Self {
            index: block.index,
            start: block.start,
            pairs: Vec::with_capacity(block.size as usize),
        }
    }
}
