use crate::domain::errors::PipelineError;
use crate::domain::forecasting::{DataSplit, SequenceSet, SplitIndices};

/// Chronological train/validation/test split by position.
///
/// Mirrors two consecutive unshuffled hold-out splits: first the hold-out
/// block (`validation + test`) is cut from the end, then the hold-out block is
/// halved by the test share. Partition sizes round the test side up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splitter {
    holdout_fraction: f64,
    test_share: f64,
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new(0.15, 0.15)
    }
}

const MIN_SEQUENCES_SEARCH_LIMIT: usize = 10_000;

/// Partition sizes `(train, validation, test)` for `n` sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl SplitSizes {
    pub fn is_complete(&self) -> bool {
        self.train > 0 && self.validation > 0 && self.test > 0
    }
}

impl Splitter {
    pub fn new(validation_fraction: f64, test_fraction: f64) -> Self {
        let holdout_fraction = validation_fraction + test_fraction;
        let test_share = if holdout_fraction > 0.0 {
            test_fraction / holdout_fraction
        } else {
            0.0
        };
        Self {
            holdout_fraction,
            test_share,
        }
    }

    pub fn sizes(&self, n: usize) -> SplitSizes {
        let holdout = ((self.holdout_fraction * n as f64).ceil() as usize).min(n);
        let test = ((self.test_share * holdout as f64).ceil() as usize).min(holdout);
        SplitSizes {
            train: n - holdout,
            validation: holdout - test,
            test,
        }
    }

    /// Smallest sequence count that leaves every partition non-empty.
    pub fn min_sequences(&self) -> usize {
        (3..=MIN_SEQUENCES_SEARCH_LIMIT)
            .find(|&n| self.sizes(n).is_complete())
            .unwrap_or(MIN_SEQUENCES_SEARCH_LIMIT)
    }

    /// Splits `set`; every partition must be non-empty.
    pub fn split(&self, facility_id: &str, set: &SequenceSet) -> Result<DataSplit, PipelineError> {
        let n = set.len();
        let sizes = self.sizes(n);
        if !sizes.is_complete() {
            return Err(PipelineError::TooFewSequences {
                facility_id: facility_id.to_string(),
                sequences: n,
                required: self.min_sequences().max(n + 1),
            });
        }

        let train_idx: Vec<usize> = (0..sizes.train).collect();
        let val_idx: Vec<usize> = (sizes.train..sizes.train + sizes.validation).collect();
        let test_idx: Vec<usize> = (sizes.train + sizes.validation..n).collect();

        let train = set.select(&train_idx);
        let validation = set.select(&val_idx);
        let test = set.select(&test_idx);

        let indices = SplitIndices {
            train: train.label_timestamps.clone(),
            validation: validation.label_timestamps.clone(),
            test: test.label_timestamps.clone(),
        };

        Ok(DataSplit {
            train,
            validation,
            test,
            indices,
        })
    }
}
