//! Projection of a household and its marks into encryption views

use crate::blocks::BlockLayout;
use crate::household::{EncryptionView, Household};
use crate::types::Cell;

/// Which records of one household are marked for encryption
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Marks {
    /// One flag per block; a marked block encrypts all of its records
    Blocks(Vec<bool>),
    /// One flag per record
    Records(Vec<bool>),
}

impl Marks {
    /// Whether record `index` is marked
    pub fn is_marked(&self, layout: &BlockLayout, index: usize) -> bool {
        match self {
            Marks::Blocks(flags) => flags[layout.block_of(index)],
            Marks::Records(flags) => flags[index],
        }
    }

    /// Number of marked records
    pub fn marked_records(&self, layout: &BlockLayout) -> usize {
        match self {
            Marks::Blocks(flags) => flags
                .iter()
                .enumerate()
                .filter(|(_, m)| **m)
                .map(|(b, _)| layout.block_len(b))
                .sum(),
            Marks::Records(flags) => flags.iter().filter(|m| **m).count(),
        }
    }
}

/// Rebuild the three views of `household` under `marks`.
///
/// Marked records are grouped into one `input` buffer per block, opened at
/// the first marked record of that block, so that flattening `input` gives
/// the marked records in series order.
pub fn project(household: &Household, marks: &Marks, layout: &BlockLayout) -> EncryptionView {
    let raw = household.raw();
    let mut view = EncryptionView {
        plain_input: Vec::with_capacity(raw.len()),
        input: Vec::new(),
        encrypted_input: Vec::with_capacity(raw.len()),
    };
    let mut open_block = None;

    for (i, value) in raw.iter().enumerate() {
        if marks.is_marked(layout, i) {
            let block = layout.block_of(i);
            if open_block != Some(block) {
                view.input.push(Vec::with_capacity(layout.block_size()));
                open_block = Some(block);
            }
            if let Some(buffer) = view.input.last_mut() {
                buffer.push(*value);
            }
            view.encrypted_input.push(Cell::Encrypted);
        } else {
            view.plain_input.push(*value);
            view.encrypted_input.push(Cell::Plain(*value));
        }
    }

    view
}

/// Project every household under its marks
pub fn project_all(households: &[Household], marks: &[Marks], layout: &BlockLayout) -> Vec<EncryptionView> {
    households
        .iter()
        .zip(marks)
        .map(|(household, marks)| project(household, marks, layout))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Quantized;

    fn household(name: &str, values: &[i64]) -> Household {
        Household::new(name, values.iter().map(|v| Quantized(*v)).collect())
    }

    fn q(values: &[i64]) -> Vec<Quantized> {
        values.iter().map(|v| Quantized(*v)).collect()
    }

    #[test]
    fn test_projector_preserves_data() {
        let layout = BlockLayout::new(8, 4).unwrap();
        let h0 = household("h0", &[1, 2, 3, 4, 5, 6, 7, 8]);
        let h1 = household("h1", &[9, 8, 7, 6, 5, 4, 3, 2]);

        let v0 = project(&h0, &Marks::Blocks(vec![true, false]), &layout);
        assert_eq!(v0.plain_input, q(&[5, 6, 7, 8]));
        assert_eq!(v0.input, vec![q(&[1, 2, 3, 4])]);
        let mut expected = vec![Cell::Encrypted; 4];
        expected.extend(q(&[5, 6, 7, 8]).into_iter().map(Cell::Plain));
        assert_eq!(v0.encrypted_input, expected);

        let v1 = project(&h1, &Marks::Blocks(vec![false, true]), &layout);
        assert_eq!(v1.plain_input, q(&[9, 8, 7, 6]));
        assert_eq!(v1.input, vec![q(&[5, 4, 3, 2])]);
        let mut expected: Vec<Cell> = q(&[9, 8, 7, 6]).into_iter().map(Cell::Plain).collect();
        expected.extend(vec![Cell::Encrypted; 4]);
        assert_eq!(v1.encrypted_input, expected);
    }

    #[test]
    fn test_record_marks_group_by_block() {
        let layout = BlockLayout::new(6, 3).unwrap();
        let h = household("h", &[10, 11, 12, 13, 14, 15]);
        let marks = Marks::Records(vec![false, true, true, false, false, true]);
        let view = project(&h, &marks, &layout);

        assert_eq!(view.plain_input, q(&[10, 13, 14]));
        assert_eq!(view.input, vec![q(&[11, 12]), q(&[15])]);
        assert_eq!(view.encrypted_count(), 3);
        assert_eq!(marks.marked_records(&layout), 3);
    }

    #[test]
    fn test_partial_block_counts_real_length() {
        let layout = BlockLayout::new(5, 4).unwrap();
        let marks = Marks::Blocks(vec![false, true]);
        assert_eq!(marks.marked_records(&layout), 1);

        let view = project(&household("h", &[1, 2, 3, 4, 5]), &marks, &layout);
        assert_eq!(view.input, vec![q(&[5])]);
    }

    #[test]
    fn test_projection_is_idempotent() {
        let layout = BlockLayout::new(8, 4).unwrap();
        let h = household("h", &[1, 2, 3, 4, 5, 6, 7, 8]);
        let marks = Marks::Blocks(vec![false, true]);
        assert_eq!(project(&h, &marks, &layout), project(&h, &marks, &layout));
    }
}
