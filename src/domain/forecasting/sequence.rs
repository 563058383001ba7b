use chrono::NaiveDateTime;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Windowed training examples for one facility and variant.
///
/// `windows` is `[N, W, F]`, `targets` is `[N, H]`, and `label_timestamps[i]`
/// is the timestamp of the last step covered by example `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSet {
    pub windows: Array3<f64>,
    pub targets: Array2<f64>,
    pub label_timestamps: Vec<NaiveDateTime>,
}

/// Borrowed view of a single example.
#[derive(Debug, Clone, Copy)]
pub struct Sequence<'a> {
    pub window: ArrayView2<'a, f64>,
    pub target: ArrayView1<'a, f64>,
    pub label_timestamp: NaiveDateTime,
}

impl SequenceSet {
    pub fn empty(window_size: usize, horizon: usize, features: usize) -> Self {
        Self {
            windows: Array3::zeros((0, window_size, features)),
            targets: Array2::zeros((0, horizon)),
            label_timestamps: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.label_timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_timestamps.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.windows.dim().1
    }

    pub fn feature_count(&self) -> usize {
        self.windows.dim().2
    }

    pub fn horizon(&self) -> usize {
        self.targets.ncols()
    }

    pub fn get(&self, index: usize) -> Option<Sequence<'_>> {
        let label_timestamp = *self.label_timestamps.get(index)?;
        Some(Sequence {
            window: self.windows.index_axis(Axis(0), index),
            target: self.targets.row(index),
            label_timestamp,
        })
    }

    /// Examples at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> SequenceSet {
        SequenceSet {
            windows: self.windows.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            label_timestamps: indices.iter().map(|&i| self.label_timestamps[i]).collect(),
        }
    }

    /// Examples whose label timestamp is in `labels`, preserving chronological order.
    pub fn select_by_labels(&self, labels: &HashSet<NaiveDateTime>) -> SequenceSet {
        let indices: Vec<usize> = self
            .label_timestamps
            .iter()
            .enumerate()
            .filter(|(_, ts)| labels.contains(*ts))
            .map(|(i, _)| i)
            .collect();
        self.select(&indices)
    }
}

/// Label timestamps of each chronological partition, persisted so the test
/// set can be rebuilt from regenerated sequences.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SplitIndices {
    #[serde(rename = "dates_train")]
    pub train: Vec<NaiveDateTime>,
    #[serde(rename = "dates_val")]
    pub validation: Vec<NaiveDateTime>,
    #[serde(rename = "dates_test")]
    pub test: Vec<NaiveDateTime>,
}

impl SplitIndices {
    pub fn test_set(&self) -> HashSet<NaiveDateTime> {
        self.test.iter().copied().collect()
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Train/validation/test partitions together with their persisted label sets.
#[derive(Debug, Clone)]
pub struct DataSplit {
    pub train: SequenceSet,
    pub validation: SequenceSet,
    pub test: SequenceSet,
    pub indices: SplitIndices,
}
