//! In-memory staging of one pair's clusters.

use coexnet_core::{CoexError, Result};

use crate::codec::PayloadCodec;
use crate::index::PairIndex;

/// The clusters of one pair, keyed by its linear pair index.
///
/// A `Pair` is filled in place (via [`add_cluster`](Self::add_cluster) and
/// [`at_mut`](Self::at_mut)) before being handed to a
/// [`MatrixWriter`](crate::MatrixWriter), or populated by a
/// [`Cursor`](crate::Cursor) on read. It never owns the file.
#[derive(Debug, Clone)]
pub struct Pair<C: PayloadCodec> {
    index: u64,
    gene_size: u32,
    max_clusters: u8,
    empty: C::Item,
    clusters: Vec<C::Item>,
}

impl<C: PayloadCodec> Pair<C> {
    /// An empty pair at linear index 0.
    pub fn new(codec: &C, gene_size: u32, max_clusters: u8) -> Self {
        Self {
            index: 0,
            gene_size,
            max_clusters,
            empty: codec.empty_item(),
            clusters: Vec::new(),
        }
    }

    /// Linear pair index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Move to another linear index, keeping the staged clusters.
    pub fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    /// The `(x, y)` form of [`index`](Self::index).
    pub fn pair_index(&self) -> Result<PairIndex> {
        PairIndex::from_linear(self.gene_size, self.index)
    }

    /// Drop every staged cluster.
    pub fn clear_clusters(&mut self) {
        self.clusters.clear();
    }

    /// Append `n` clusters initialized to the codec's empty item.
    ///
    /// # Errors
    ///
    /// [`CoexError::InvalidInput`] if the pair would exceed the matrix's
    /// cluster bound.
    pub fn add_cluster(&mut self, n: usize) -> Result<()> {
        let total = self.clusters.len() + n;
        if total > self.max_clusters as usize {
            return Err(CoexError::InvalidInput(format!(
                "pair would hold {total} clusters, limit is {}",
                self.max_clusters
            )));
        }
        self.clusters.resize(total, self.empty.clone());
        Ok(())
    }

    /// Number of staged clusters (`K`).
    pub fn cluster_size(&self) -> usize {
        self.clusters.len()
    }

    /// Whether the pair has no clusters.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Cluster `k`.
    pub fn at(&self, k: usize) -> Option<&C::Item> {
        self.clusters.get(k)
    }

    /// Mutable cluster `k`.
    pub fn at_mut(&mut self, k: usize) -> Option<&mut C::Item> {
        self.clusters.get_mut(k)
    }

    /// All clusters in order.
    pub fn clusters(&self) -> &[C::Item] {
        &self.clusters
    }

    pub(crate) fn reset_to(&mut self, index: u64) {
        self.index = index;
        self.clusters.clear();
    }

    pub(crate) fn push(&mut self, item: C::Item) {
        self.clusters.push(item);
    }
}
