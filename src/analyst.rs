//! Analyst-side summation and variance over partially encrypted data
//!
//! Marked blocks travel as ciphertexts, unmarked records stay in the clear.
//! The two stages compose: [`summation`] produces the total that
//! [`variance`] needs for its mean.

use rand::RngCore;

use crate::error::HeError;
use crate::he::{HeCollaborator, HeMetrics, HeOp};
use crate::household::EncryptionView;

/// The dataset as the analyst receives it
#[derive(Clone, Debug)]
pub struct EncryptedDataset<C> {
    /// One ciphertext per marked block buffer, over all households
    pub blocks: Vec<C>,
    /// Unmarked records of all households
    pub plain: Vec<f64>,
    /// Number of encrypted records
    pub encrypted_records: usize,
    /// Zero slots added to fill partial blocks
    pub padded_slots: usize,
}

impl<C> EncryptedDataset<C> {
    /// Total number of records, encrypted or not
    pub fn record_count(&self) -> usize {
        self.encrypted_records + self.plain.len()
    }
}

/// Result of the summation stage
#[derive(Clone, Debug)]
pub struct SumOutput<C> {
    /// Inner sum of all encrypted blocks; `None` when nothing is encrypted
    pub cipher: Option<C>,
    /// Sum of the clear records
    pub plain_sum: f64,
    /// Records covered
    pub count: usize,
}

impl<C> SumOutput<C> {
    /// Decrypt and combine with the clear part
    pub fn total<H>(&self, he: &H, metrics: &mut HeMetrics) -> Result<f64, HeError>
    where
        H: HeCollaborator<Ciphertext = C>,
    {
        let encrypted = match &self.cipher {
            Some(ct) => first_slot(metrics.time(HeOp::Decrypt, || he.decrypt(ct))?),
            None => 0.0,
        };
        Ok(encrypted + self.plain_sum)
    }

    pub fn mean<H>(&self, he: &H, metrics: &mut HeMetrics) -> Result<f64, HeError>
    where
        H: HeCollaborator<Ciphertext = C>,
    {
        if self.count == 0 {
            return Ok(0.0);
        }
        Ok(self.total(he, metrics)? / self.count as f64)
    }
}

/// Result of the variance stage
#[derive(Clone, Debug)]
pub struct VarOutput<C> {
    /// Inner sum of squared deviations of the encrypted records
    pub cipher: Option<C>,
    /// Squared deviations of the clear records
    pub plain_sq: f64,
    /// Squared deviations contributed by zero padding, `padded · mean²`
    pub padding_correction: f64,
    pub mean: f64,
    pub count: usize,
}

impl<C> VarOutput<C> {
    /// Population variance (divisor `count`)
    pub fn value<H>(&self, he: &H, metrics: &mut HeMetrics) -> Result<f64, HeError>
    where
        H: HeCollaborator<Ciphertext = C>,
    {
        if self.count == 0 {
            return Ok(0.0);
        }
        let encrypted = match &self.cipher {
            Some(ct) => first_slot(metrics.time(HeOp::Decrypt, || he.decrypt(ct))?),
            None => 0.0,
        };
        Ok((encrypted - self.padding_correction + self.plain_sq) / self.count as f64)
    }
}

fn first_slot(slots: Vec<f64>) -> f64 {
    slots.first().copied().unwrap_or(0.0)
}

/// Encrypt every marked block buffer; the last partial block is padded
/// with zeros up to the slot count.
pub fn encrypt_dataset<H: HeCollaborator>(
    he: &H,
    views: &[EncryptionView],
    rng: &mut dyn RngCore,
    metrics: &mut HeMetrics,
) -> Result<EncryptedDataset<H::Ciphertext>, HeError> {
    let mut dataset = EncryptedDataset {
        blocks: Vec::new(),
        plain: Vec::new(),
        encrypted_records: 0,
        padded_slots: 0,
    };

    for view in views {
        dataset.plain.extend(view.plain_input.iter().map(|v| v.to_f64()));
        for buffer in &view.input {
            let values: Vec<f64> = buffer.iter().map(|v| v.to_f64()).collect();
            let ct = metrics.time(HeOp::Encrypt, || he.encrypt(&values, rng))?;
            dataset.encrypted_records += values.len();
            dataset.padded_slots += he.slots().saturating_sub(values.len());
            dataset.blocks.push(ct);
        }
    }

    Ok(dataset)
}

/// Add all encrypted blocks, inner-sum the result and sum the clear part
pub fn summation<H: HeCollaborator>(
    he: &H,
    enc: &EncryptedDataset<H::Ciphertext>,
    metrics: &mut HeMetrics,
) -> Result<SumOutput<H::Ciphertext>, HeError> {
    let cipher = match enc.blocks.split_first() {
        Some((first, rest)) => {
            let mut acc = first.clone();
            for ct in rest {
                acc = metrics.time(HeOp::Add, || he.add(&acc, ct))?;
            }
            Some(metrics.time(HeOp::InnerSum, || he.inner_sum(&acc))?)
        }
        None => None,
    };

    Ok(SumOutput {
        cipher,
        plain_sum: enc.plain.iter().sum(),
        count: enc.record_count(),
    })
}

/// Squared deviations from the mean of `sum`.
///
/// Each encrypted block has the mean subtracted and is squared with
/// `mul_relin` before accumulation. Padding slots then hold `mean²` each,
/// which is removed in the clear by [`VarOutput::value`].
pub fn variance<H: HeCollaborator>(
    he: &H,
    enc: &EncryptedDataset<H::Ciphertext>,
    sum: &SumOutput<H::Ciphertext>,
    rng: &mut dyn RngCore,
    metrics: &mut HeMetrics,
) -> Result<VarOutput<H::Ciphertext>, HeError> {
    let mean = sum.mean(he, metrics)?;

    let cipher = if enc.blocks.is_empty() {
        None
    } else {
        let neg_mean = vec![-mean; he.slots()];
        let neg_mean = metrics.time(HeOp::Encrypt, || he.encrypt(&neg_mean, rng))?;

        let mut acc: Option<H::Ciphertext> = None;
        for ct in &enc.blocks {
            let diff = metrics.time(HeOp::Add, || he.add(ct, &neg_mean))?;
            let sq = metrics.time(HeOp::MulRelin, || he.mul_relin(&diff, &diff))?;
            acc = Some(match acc {
                Some(prev) => metrics.time(HeOp::Add, || he.add(&prev, &sq))?,
                None => sq,
            });
        }
        match acc {
            Some(acc) => Some(metrics.time(HeOp::InnerSum, || he.inner_sum(&acc))?),
            None => None,
        }
    };

    Ok(VarOutput {
        cipher,
        plain_sq: enc.plain.iter().map(|x| (x - mean) * (x - mean)).sum(),
        padding_correction: enc.padded_slots as f64 * mean * mean,
        mean,
        count: sum.count,
    })
}
