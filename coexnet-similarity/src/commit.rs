//! In-order commit of result blocks to the cluster and correlation
//! matrices.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use coexnet_core::{CoexError, Result};
use coexnet_omics::ExpressionMatrix;
use coexnet_pairwise::{ClusterCodec, ClusterWriter, CorrelationCodec, CorrelationWriter};

use crate::block::ResultBlock;
use crate::config::SimilarityConfig;

/// Record counts of a finished commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitStats {
    pub blocks: usize,
    pub cluster_records: u64,
    pub correlation_records: u64,
}

/// Writes result blocks strictly in block order.
///
/// Blocks may arrive in any order; a block is held until every block
/// before it has been written. A block is written to both files or to
/// neither: if any record of it fails, both files return to the end of
/// the previous block.
pub struct Committer {
    ccm: ClusterWriter,
    cmx: CorrelationWriter,
    sample_size: usize,
    max_clusters: u8,
    next: usize,
    pending: BTreeMap<usize, ResultBlock>,
    masks: Vec<Vec<u8>>,
}

impl Committer {
    /// Create both output files and write their headers.
    pub fn create(
        ccm_path: impl AsRef<Path>,
        cmx_path: impl AsRef<Path>,
        input: &ExpressionMatrix,
        config: &SimilarityConfig,
    ) -> Result<Self> {
        let sample_size = input.n_samples();
        let genes = input.gene_names().to_vec();

        let mut ccm = ClusterWriter::create(ccm_path, ClusterCodec::new(sample_size))?;
        ccm.initialize(genes.clone(), sample_size as u32, config.max_clusters)?;
        let mut cmx =
            CorrelationWriter::create(cmx_path, CorrelationCodec::new(config.correlation.name()))?;
        cmx.initialize(genes, sample_size as u32, config.max_clusters)?;

        Ok(Self {
            ccm,
            cmx,
            sample_size,
            max_clusters: config.max_clusters,
            next: 0,
            pending: BTreeMap::new(),
            masks: Vec::new(),
        })
    }

    /// Index of the next block to be written.
    pub fn next_block(&self) -> usize {
        self.next
    }

    /// Number of blocks waiting for an earlier block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Accept a result block, writing it and any held successors once all
    /// earlier blocks are written.
    ///
    /// Returns the number of pairs written by this call.
    pub fn commit(&mut self, block: ResultBlock) -> Result<u64> {
        if block.index < self.next || self.pending.contains_key(&block.index) {
            return Err(CoexError::InvalidInput(format!(
                "result block {} was already committed",
                block.index
            )));
        }
        self.pending.insert(block.index, block);

        let mut written = 0;
        while let Some(block) = self.pending.remove(&self.next) {
            self.write_block(&block)?;
            self.next += 1;
            written += block.pairs.len() as u64;
        }
        Ok(written)
    }

    fn write_block(&mut self, block: &ResultBlock) -> Result<()> {
        self.check_block(block)?;
        if let Err(e) = self.stage_block(block) {
            self.ccm.rollback()?;
            self.cmx.rollback()?;
            return Err(e);
        }
        self.ccm.mark_checkpoint();
        self.cmx.mark_checkpoint();
        debug!(
            block = block.index,
            start = block.start,
            pairs = block.pairs.len(),
            "committed block"
        );
        Ok(())
    }

    /// Reject a block whose outcomes cannot be stored.
    fn check_block(&self, block: &ResultBlock) -> Result<()> {
        for (offset, outcome) in block.pairs.iter().enumerate() {
            let index = block.start + offset as u64;
            if outcome.k > self.max_clusters {
                return Err(CoexError::InvalidInput(format!(
                    "pair {index} has {} clusters, limit is {}",
                    outcome.k, self.max_clusters
                )));
            }
            if let Some(labels) = &outcome.labels {
                if labels.len() != self.sample_size {
                    return Err(CoexError::InvalidInput(format!(
                        "pair {index} has {} labels, expected {}",
                        labels.len(),
                        self.sample_size
                    )));
                }
            }
            if let Some(correlations) = &outcome.correlations {
                if correlations.len() != outcome.k as usize {
                    return Err(CoexError::InvalidInput(format!(
                        "pair {index} has {} correlations for {} clusters",
                        correlations.len(),
                        outcome.k
                    )));
                }
            }
        }
        Ok(())
    }

    fn stage_block(&mut self, block: &ResultBlock) -> Result<()> {
        for (offset, outcome) in block.pairs.iter().enumerate() {
            let index = block.start + offset as u64;
            if let Some(correlations) = &outcome.correlations {
                self.cmx.write(index, correlations)?;
            }
            if let Some(labels) = &outcome.labels {
                self.masks.clear();
                self.masks
                    .extend((0..outcome.k as i8).map(|c| ClusterCodec::mask(labels, c)));
                self.ccm.write(index, &self.masks)?;
            }
        }
        self.ccm.persist()?;
        self.cmx.persist()
    }

    /// Close both files.
    ///
    /// # Errors
    ///
    /// [`CoexError::Other`] if blocks are still waiting for a predecessor
    /// that never arrived.
    pub fn finish(self) -> Result<CommitStats> {
        if let Some(first) = self.pending.keys().next() {
            return Err(CoexError::Other(format!(
                "{} result blocks never committed, waiting for block {} (first held: {first})",
                self.pending.len(),
                self.next
            )));
        }
        let stats = CommitStats {
            blocks: self.next,
            cluster_records: self.ccm.size(),
            correlation_records: self.cmx.size(),
        };
        self.ccm.finish()?;
        self.cmx.finish()?;
        Ok(stats)
    }
}
