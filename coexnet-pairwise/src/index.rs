//! Canonical linear enumeration of unordered gene pairs.
//!
//! A pair `(x, y)` with `0 <= y < x < gene_size` maps to the ordinal
//! `x * (x - 1) / 2 + y`, i.e. row-major order over the strict lower
//! triangle: `(1,0), (2,0), (2,1), (3,0), ...`.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use coexnet_core::{CoexError, Result};

/// Number of unordered pairs for `gene_size` genes.
pub fn total_pairs(gene_size: u32) -> u64 {
    let n = gene_size as u64;
    n * n.saturating_sub(1) / 2
}

/// An unordered gene pair `(x, y)` with `y < x`, bound to a gene count.
///
/// Equality and ordering consider only `(x, y)`, which matches the linear
/// order.
#[derive(Debug, Clone, Copy)]
pub struct PairIndex {
    gene_size: u32,
    x: u32,
    y: u32,
}

impl PairIndex {
    /// Create the pair `(x, y)`.
    ///
    /// # Errors
    ///
    /// [`CoexError::InvalidIndex`] if `gene_size < 2` or the coordinates
    /// violate `y < x < gene_size`.
    pub fn new(gene_size: u32, x: u32, y: u32) -> Result<Self> {
        check_gene_size(gene_size)?;
        if x >= gene_size || y >= x {
            return Err(CoexError::InvalidIndex(format!(
                "pair ({x}, {y}) is outside 0 <= y < x < {gene_size}"
            )));
        }
        Ok(Self { gene_size, x, y })
    }

    /// The first pair `(1, 0)`.
    pub fn first(gene_size: u32) -> Result<Self> {
        Self::new(gene_size, 1, 0)
    }

    /// The last pair `(gene_size - 1, gene_size - 2)`.
    pub fn last(gene_size: u32) -> Result<Self> {
        check_gene_size(gene_size)?;
        Self::new(gene_size, gene_size - 1, gene_size - 2)
    }

    /// Linear ordinal of `(x, y)` without any range check.
    pub fn linear_of(x: u32, y: u32) -> u64 {
        let x = x as u64;
        x * x.saturating_sub(1) / 2 + y as u64
    }

    /// Recover the pair at linear ordinal `index`.
    ///
    /// # Errors
    ///
    /// [`CoexError::InvalidIndex`] if `gene_size < 2` or `index` is not below
    /// [`total_pairs`].
    pub fn from_linear(gene_size: u32, index: u64) -> Result<Self> {
        check_gene_size(gene_size)?;
        let total = total_pairs(gene_size);
        if index >= total {
            return Err(CoexError::InvalidIndex(format!(
                "linear index {index} is outside 0..{total} for {gene_size} genes"
            )));
        }

        // Solve x(x-1)/2 <= index for the largest x, then fix float rounding.
        let mut x = ((1.0 + (1.0 + 8.0 * index as f64).sqrt()) / 2.0).floor() as u64;
        while x > 1 && x * (x - 1) / 2 > index {
            x -= 1;
        }
        while (x + 1) * x / 2 <= index {
            x += 1;
        }
        let y = index - x * (x - 1) / 2;
        Ok(Self {
            gene_size,
            x: x as u32,
            y: y as u32,
        })
    }

    /// Linear ordinal of this pair.
    pub fn to_linear(&self) -> u64 {
        Self::linear_of(self.x, self.y)
    }

    /// The larger gene index.
    pub fn x(&self) -> u32 {
        self.x
    }

    /// The smaller gene index.
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Number of genes this index is bound to.
    pub fn gene_size(&self) -> u32 {
        self.gene_size
    }

    /// Whether this is the final pair in canonical order.
    pub fn is_last(&self) -> bool {
        self.x == self.gene_size - 1 && self.y == self.gene_size - 2
    }

    /// Step to the next pair in canonical order.
    ///
    /// # Errors
    ///
    /// [`CoexError::InvalidIndex`] when already at the last pair; the index
    /// is left unchanged.
    pub fn increment(&mut self) -> Result<()> {
        if self.is_last() {
            return Err(CoexError::InvalidIndex(format!(
                "cannot increment past the last pair ({}, {})",
                self.x, self.y
            )));
        }
        self.y += 1;
        if self.y >= self.x {
            self.x += 1;
            self.y = 0;
        }
        Ok(())
    }

    /// Step to the previous pair in canonical order.
    ///
    /// # Errors
    ///
    /// [`CoexError::InvalidIndex`] when already at `(1, 0)`.
    pub fn decrement(&mut self) -> Result<()> {
        if self.x == 1 && self.y == 0 {
            return Err(CoexError::InvalidIndex(
                "cannot decrement before the first pair (1, 0)".into(),
            ));
        }
        if self.y == 0 {
            self.x -= 1;
            self.y = self.x - 1;
        } else {
            self.y -= 1;
        }
        Ok(())
    }

    /// Iterate `count` consecutive pairs starting at linear index `start`.
    ///
    /// # Errors
    ///
    /// [`CoexError::InvalidIndex`] if the range runs past the last pair.
    pub fn range(gene_size: u32, start: u64, count: u64) -> Result<PairRange> {
        check_gene_size(gene_size)?;
        let total = total_pairs(gene_size);
        if start.checked_add(count).map_or(true, |end| end > total) {
            return Err(CoexError::InvalidIndex(format!(
                "range {start}+{count} exceeds {total} pairs"
            )));
        }
        let next = if count > 0 {
            Some(Self::from_linear(gene_size, start)?)
        } else {
            None
        };
        Ok(PairRange {
            next,
            remaining: count,
        })
    }
}

fn check_gene_size(gene_size: u32) -> Result<()> {
    if gene_size < 2 {
        return Err(CoexError::InvalidIndex(format!(
            "gene size {gene_size} has no pairs (need at least 2)"
        )));
    }
    Ok(())
}

impl PartialEq for PairIndex {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Eq for PairIndex {}

impl Hash for PairIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
    }
}

impl PartialOrd for PairIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PairIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.x, self.y).cmp(&(other.x, other.y))
    }
}

impl fmt::Display for PairIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Iterator over a contiguous run of pairs. See [`PairIndex::range`].
#[derive(Debug, Clone)]
pub struct PairRange {
    next: Option<PairIndex>,
    remaining: u64,
}

impl Iterator for PairRange {
    type Item = PairIndex;

    fn next(&mut self) -> Option<PairIndex> {
        let current = self.next?;
        self.remaining -= 1;
        self.next = if self.remaining > 0 {
            let mut following = current;
            following.increment().ok().map(|_| following)
        } else {
            None
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for PairRange {}
