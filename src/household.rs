//! Household records and their derived encryption views

use crate::types::{Cell, Quantized};

/// One consumer's time series.
///
/// The raw series is immutable once loaded; everything the selection engine
/// and the attacker look at is derived from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Household {
    filename: String,
    raw: Vec<Quantized>,
    decorated: Vec<Quantized>,
}

impl Household {
    pub fn new(filename: impl Into<String>, raw: Vec<Quantized>) -> Self {
        let decorated = decorate(&raw);
        Household {
            filename: filename.into(),
            raw,
            decorated,
        }
    }

    /// Identifier of the source record stream
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The quantized raw series (`rawInput`)
    pub fn raw(&self) -> &[Quantized] {
        &self.raw
    }

    /// The series rounded to one decimal, with the last record absorbing the
    /// accumulated rounding delta so the household total is unchanged.
    pub fn decorated(&self) -> &[Quantized] {
        &self.decorated
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Round every record to one decimal place and push the rounding error into
/// the final record.
fn decorate(raw: &[Quantized]) -> Vec<Quantized> {
    let mut delta = 0i64;
    let mut out: Vec<Quantized> = raw
        .iter()
        .map(|q| {
            let rounded = (q.milli() + 50).div_euclid(100) * 100;
            delta += q.milli() - rounded;
            Quantized(rounded)
        })
        .collect();
    if let Some(last) = out.last_mut() {
        last.0 += delta;
    }
    out
}

/// The three parallel views the projector derives from a household and its
/// current marks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncryptionView {
    /// Unmarked records, in order (`plainInput`)
    pub plain_input: Vec<Quantized>,
    /// Marked records grouped by block, in block order (`input`)
    pub input: Vec<Vec<Quantized>>,
    /// The raw series with marked positions replaced by `Cell::Encrypted`
    pub encrypted_input: Vec<Cell>,
}

impl EncryptionView {
    /// Number of encrypted positions
    pub fn encrypted_count(&self) -> usize {
        self.encrypted_input.iter().filter(|c| c.is_encrypted()).count()
    }
}
