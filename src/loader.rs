//! CSV loading of household series

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use crate::error::{PartencError, Result};
use crate::household::Household;
use crate::types::Quantized;

/// Parse one household stream.
///
/// The header line is discarded, the last field of each record is read as a
/// real number and quantized, and at most `max_records` records are kept.
/// Records past the cap are never parsed.
pub fn parse_series<R: Read>(reader: R, filename: &str, max_records: usize) -> Result<Vec<Quantized>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut series = Vec::new();
    for (record_index, record) in rdr.records().enumerate() {
        if series.len() >= max_records {
            break;
        }
        let record = record?;
        let field = match record.iter().last() {
            Some(field) => field.trim(),
            None => continue,
        };
        // Space-delimited lines arrive as a single field.
        let field = field.split_whitespace().last().unwrap_or("");
        if field.is_empty() && record.len() <= 1 {
            continue;
        }

        let value = field
            .parse::<f64>()
            .ok()
            .and_then(Quantized::from_f64)
            .ok_or_else(|| PartencError::QuantizationDomain {
                filename: filename.to_string(),
                record: record_index,
                field: field.to_string(),
            })?;
        series.push(value);
    }

    Ok(series)
}

/// Load a household from a CSV file
pub fn load_household(path: &Path, max_records: usize) -> Result<Household> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let file = File::open(path)?;
    let series = parse_series(file, &filename, max_records)?;
    debug!(%filename, records = series.len(), "loaded household");
    Ok(Household::new(filename, series))
}

/// Load every `*.csv` file in `dir`, in filename order.
///
/// A file holding an unparsable value is skipped with a warning. All kept
/// households must have the same length as the first one.
pub fn load_households(dir: &Path, max_records: usize) -> Result<Vec<Household>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "csv").unwrap_or(false))
        .collect();
    paths.sort();

    let mut households = Vec::with_capacity(paths.len());
    for path in &paths {
        match load_household(path, max_records) {
            Ok(household) => households.push(household),
            Err(err @ PartencError::QuantizationDomain { .. }) => {
                warn!(path = %path.display(), error = %err, "skipping household");
            }
            Err(err) => return Err(err),
        }
    }

    check_shape(&households)?;
    info!(
        households = households.len(),
        records = households.first().map(|h| h.len()).unwrap_or(0),
        dir = %dir.display(),
        "loaded dataset"
    );
    Ok(households)
}

/// Verify that every household has the same length as the first one
pub fn check_shape(households: &[Household]) -> Result<usize> {
    let first = households
        .first()
        .ok_or_else(|| PartencError::EmptyDataset("no households loaded".to_string()))?;
    let expected = first.len();
    if expected == 0 {
        return Err(PartencError::EmptyDataset(format!(
            "{} has no records",
            first.filename()
        )));
    }
    for household in &households[1..] {
        if household.len() != expected {
            return Err(PartencError::InputShape {
                filename: household.filename().to_string(),
                expected,
                actual: household.len(),
            });
        }
    }
    Ok(expected)
}
