//! Library photos chosen for a batch export
//!
//! Indices are kept in the order they were selected, which is also the order
//! screenshots are produced in. Library mutations do not touch the selection;
//! indices are checked against the library only when an export resolves them.

use crate::error::{Error, Result};
use crate::media::compress::CompressedPhoto;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    indices: Vec<usize>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from indices in selection order, ignoring repeats
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut selection = Self::new();
        for index in indices {
            if !selection.contains(index) {
                selection.indices.push(index);
            }
        }
        selection
    }

    /// Select `index`, or deselect it if already selected.
    /// Returns whether it is selected afterwards.
    pub fn toggle(&mut self, index: usize) -> bool {
        if let Some(pos) = self.indices.iter().position(|&i| i == index) {
            self.indices.remove(pos);
            false
        } else {
            self.indices.push(index);
            true
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    /// Pick the selected photos out of `library`, in selection order
    pub fn resolve(&self, library: &[CompressedPhoto]) -> Result<Vec<CompressedPhoto>> {
        self.indices
            .iter()
            .map(|&index| {
                library.get(index).cloned().ok_or(Error::IndexOutOfRange {
                    index,
                    len: library.len(),
                })
            })
            .collect()
    }
}
