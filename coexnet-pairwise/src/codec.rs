//! Payload codecs: the per-cluster item formats of the three pairwise matrices.
//!
//! One generic sparse store ([`SparseMatrix`](crate::SparseMatrix)) is
//! parameterized by a [`PayloadCodec`] that fixes the byte width of every
//! cluster item and converts items to and from bytes.

use core::fmt;

use coexnet_core::{CoexError, Result};

use crate::bytes::{read_f32_le, read_f64_le, read_string, read_u32_le, write_string};
use crate::header::MatrixHeader;

/// Tag identifying which codec wrote a matrix file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadKind {
    /// Per-sample cluster composition masks.
    Cluster,
    /// One correlation coefficient per cluster.
    Correlation,
    /// `(p-value, effect size)` per test per cluster.
    ConditionTest,
}

impl PayloadKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Cluster => 1,
            Self::Correlation => 2,
            Self::ConditionTest => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Cluster),
            2 => Ok(Self::Correlation),
            3 => Ok(Self::ConditionTest),
            other => Err(CoexError::MalformedRecord(format!(
                "unknown payload kind tag {other}"
            ))),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster matrix"),
            Self::Correlation => write!(f, "correlation matrix"),
            Self::ConditionTest => write!(f, "condition-test matrix"),
        }
    }
}

/// Serializer/deserializer pair for one matrix kind's cluster items.
pub trait PayloadCodec: Clone + Sized {
    /// In-memory value of one cluster item.
    type Item: Clone + fmt::Debug + PartialEq;

    /// Tag written into the header.
    const KIND: PayloadKind;

    /// Fixed byte width of one encoded item.
    fn item_size(&self) -> usize;

    /// Codec parameters persisted after the gene-name table.
    fn sub_header(&self) -> Vec<u8>;

    /// Rebuild the codec from a decoded header.
    fn from_header(header: &MatrixHeader) -> Result<Self>;

    /// The value a freshly added cluster starts with.
    fn empty_item(&self) -> Self::Item;

    /// Append exactly [`item_size`](Self::item_size) bytes for `item`.
    fn encode(&self, item: &Self::Item, out: &mut Vec<u8>) -> Result<()>;

    /// Decode one item from exactly [`item_size`](Self::item_size) bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Item>;

    /// Render one item for display.
    fn format_item(&self, item: &Self::Item) -> String;
}

fn check_item_size<C: PayloadCodec>(codec: &C, header: &MatrixHeader) -> Result<()> {
    if codec.item_size() != header.item_size as usize {
        return Err(CoexError::MalformedRecord(format!(
            "{} header declares {}-byte items, codec expects {}",
            C::KIND,
            header.item_size,
            codec.item_size()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Cluster composition
// ---------------------------------------------------------------------------

/// Cluster composition: one byte per sample.
///
/// `1` marks a member of the cluster, `0` a member of another cluster, and
/// the remaining codes record why a sample was excluded (see
/// [`SampleCode`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCodec {
    sample_size: usize,
}

impl ClusterCodec {
    /// A codec for masks of `sample_size` bytes.
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size }
    }

    /// Number of samples per mask.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Mask of `cluster` from per-sample labels: cluster ids are
    /// non-negative, exclusions are negated sample codes.
    pub fn mask(labels: &[i8], cluster: i8) -> Vec<u8> {
        labels
            .iter()
            .map(|&l| {
                if l == cluster {
                    SampleCode::Member as u8
                } else if l >= 0 {
                    SampleCode::Other as u8
                } else {
                    l.unsigned_abs()
                }
            })
            .collect()
    }
}

/// Per-sample byte codes in a cluster mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleCode {
    /// Member of another cluster.
    Other = 0,
    /// Member of this cluster.
    Member = 1,
    /// Below the minimum expression threshold.
    BelowThreshold = 6,
    /// Removed as an outlier before clustering.
    PreOutlier = 7,
    /// Removed as an outlier of its cluster after clustering.
    PostOutlier = 8,
    /// Expression missing in either gene.
    Missing = 9,
}

impl SampleCode {
    /// Decode a mask byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Other),
            1 => Some(Self::Member),
            6 => Some(Self::BelowThreshold),
            7 => Some(Self::PreOutlier),
            8 => Some(Self::PostOutlier),
            9 => Some(Self::Missing),
            _ => None,
        }
    }
}

impl PayloadCodec for ClusterCodec {
    type Item = Vec<u8>;
    const KIND: PayloadKind = PayloadKind::Cluster;

    fn item_size(&self) -> usize {
        self.sample_size
    }

    fn sub_header(&self) -> Vec<u8> {
        Vec::new()
    }

    fn from_header(header: &MatrixHeader) -> Result<Self> {
        let codec = Self::new(header.sample_size as usize);
        check_item_size(&codec, header)?;
        Ok(codec)
    }

    fn empty_item(&self) -> Vec<u8> {
        vec![SampleCode::Other as u8; self.sample_size]
    }

    fn encode(&self, item: &Vec<u8>, out: &mut Vec<u8>) -> Result<()> {
        if item.len() != self.sample_size {
            return Err(CoexError::InvalidInput(format!(
                "cluster mask has {} samples, expected {}",
                item.len(),
                self.sample_size
            )));
        }
        out.extend_from_slice(item);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn format_item(&self, item: &Vec<u8>) -> String {
        item.iter().map(|&b| char::from(b'0' + b.min(9))).collect()
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// One `f32` correlation coefficient per cluster. `NaN` marks a cluster
/// that had too few samples for a coefficient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationCodec {
    name: String,
}

impl CorrelationCodec {
    /// A codec recording which coefficient was computed (e.g. `"pearson"`).
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name of the correlation coefficient.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PayloadCodec for CorrelationCodec {
    type Item = f32;
    const KIND: PayloadKind = PayloadKind::Correlation;

    fn item_size(&self) -> usize {
        4
    }

    fn sub_header(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_string(&mut out, &self.name);
        out
    }

    fn from_header(header: &MatrixHeader) -> Result<Self> {
        let mut pos = 0;
        let codec = Self::new(read_string(&header.sub_header, &mut pos)?);
        check_item_size(&codec, header)?;
        Ok(codec)
    }

    fn empty_item(&self) -> f32 {
        f32::NAN
    }

    fn encode(&self, item: &f32, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&item.to_le_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<f32> {
        let mut pos = 0;
        read_f32_le(bytes, &mut pos)
    }

    fn format_item(&self, item: &f32) -> String {
        format!("{item}")
    }
}

// ---------------------------------------------------------------------------
// Condition-specific tests
// ---------------------------------------------------------------------------

/// Result of one condition test on one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TestResult {
    /// Significance of the association.
    pub p_value: f64,
    /// Effect size (R² for regression tests, `NaN` where undefined).
    pub effect_size: f64,
}

impl Default for TestResult {
    fn default() -> Self {
        Self {
            p_value: f64::NAN,
            effect_size: f64::NAN,
        }
    }
}

/// One [`TestResult`] per named test for each cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionTestCodec {
    test_names: Vec<String>,
}

impl ConditionTestCodec {
    /// A codec for the given ordered test names.
    pub fn new(test_names: Vec<String>) -> Self {
        Self { test_names }
    }

    /// Number of tests per cluster.
    pub fn test_count(&self) -> usize {
        self.test_names.len()
    }

    /// Ordered test names.
    pub fn test_names(&self) -> &[String] {
        &self.test_names
    }
}

impl PayloadCodec for ConditionTestCodec {
    type Item = Vec<TestResult>;
    const KIND: PayloadKind = PayloadKind::ConditionTest;

    fn item_size(&self) -> usize {
        16 * self.test_names.len()
    }

    fn sub_header(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.test_names.len() as u32).to_le_bytes());
        for name in &self.test_names {
            write_string(&mut out, name);
        }
        out
    }

    fn from_header(header: &MatrixHeader) -> Result<Self> {
        let data = &header.sub_header;
        let mut pos = 0;
        let count = read_u32_le(data, &mut pos)? as usize;
        let names = (0..count)
            .map(|_| read_string(data, &mut pos))
            .collect::<Result<Vec<_>>>()?;
        let codec = Self::new(names);
        check_item_size(&codec, header)?;
        Ok(codec)
    }

    fn empty_item(&self) -> Vec<TestResult> {
        vec![TestResult::default(); self.test_names.len()]
    }

    fn encode(&self, item: &Vec<TestResult>, out: &mut Vec<u8>) -> Result<()> {
        if item.len() != self.test_names.len() {
            return Err(CoexError::InvalidInput(format!(
                "condition-test cell has {} results, expected {}",
                item.len(),
                self.test_names.len()
            )));
        }
        for result in item {
            out.extend_from_slice(&result.p_value.to_le_bytes());
            out.extend_from_slice(&result.effect_size.to_le_bytes());
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<TestResult>> {
        let mut pos = 0;
        (0..self.test_names.len())
            .map(|_| {
                Ok(TestResult {
                    p_value: read_f64_le(bytes, &mut pos)?,
                    effect_size: read_f64_le(bytes, &mut pos)?,
                })
            })
            .collect()
    }

    fn format_item(&self, item: &Vec<TestResult>) -> String {
        item.iter()
            .map(|r| format!("{}/{}", r.p_value, r.effect_size))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
