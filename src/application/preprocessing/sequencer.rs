use crate::domain::forecasting::{FeatureTable, SequenceSet};
use crate::domain::ml::feature_registry::TARGET_COLUMN;
use ndarray::{Array2, Array3, s};

/// Slides a window of `window_size` rows over a feature table; the target is
/// the next `horizon` values of `lots_available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequencer {
    pub window_size: usize,
    pub horizon: usize,
}

impl Sequencer {
    pub fn new(window_size: usize, horizon: usize) -> Self {
        Self {
            window_size,
            horizon,
        }
    }

    /// Minimum number of rows that yields one sequence.
    pub fn required_rows(&self) -> usize {
        self.window_size + self.horizon
    }

    /// `max(0, T - W - H + 1)`
    pub fn sequence_count(&self, rows: usize) -> usize {
        (rows + 1).saturating_sub(self.required_rows())
    }

    pub fn sequence(&self, table: &FeatureTable) -> SequenceSet {
        let features = table.variant.feature_count();
        let count = self.sequence_count(table.len());
        if count == 0 {
            return SequenceSet::empty(self.window_size, self.horizon, features);
        }

        let matrix = table.to_matrix();
        let (w, h) = (self.window_size, self.horizon);

        let mut windows = Array3::zeros((count, w, features));
        let mut targets = Array2::zeros((count, h));
        let mut label_timestamps = Vec::with_capacity(count);

        for i in 0..count {
            windows
                .slice_mut(s![i, .., ..])
                .assign(&matrix.slice(s![i..i + w, ..]));
            targets
                .row_mut(i)
                .assign(&matrix.slice(s![i + w..i + w + h, TARGET_COLUMN]));
            label_timestamps.push(table.rows[i + w + h - 1].timestamp);
        }

        SequenceSet {
            windows,
            targets,
            label_timestamps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::preprocessing::feature_builder::encode_row;
    use crate::domain::ml::feature_registry::FeatureVariant;
    use chrono::{Duration, NaiveDate};

    fn table(values: &[f64]) -> FeatureTable {
        let origin = NaiveDate::from_ymd_opt(2024, 2, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        FeatureTable {
            facility_id: "C3".to_string(),
            variant: FeatureVariant::TimeOnly,
            origin,
            rows: values
                .iter()
                .enumerate()
                .map(|(i, &v)| encode_row(origin + Duration::minutes(15 * i as i64), origin, v, 0.0))
                .collect(),
        }
    }

    #[test]
    fn test_window_count() {
        let seq = Sequencer::new(20, 8);
        assert_eq!(seq.sequence_count(960), 933);
        assert_eq!(seq.sequence_count(28), 1);
        assert_eq!(seq.sequence_count(27), 0);
        assert_eq!(seq.sequence_count(0), 0);
    }

    #[test]
    fn test_targets_follow_window() {
        let values: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let t = table(&values);
        let set = Sequencer::new(4, 3).sequence(&t);

        assert_eq!(set.len(), 12 - 4 - 3 + 1);
        assert_eq!(set.windows.dim(), (6, 4, 13));
        for i in 0..set.len() {
            let example = set.get(i).unwrap();
            assert_eq!(example.window[[0, 0]], i as f64);
            assert_eq!(example.window[[3, 0]], (i + 3) as f64);
            let target: Vec<f64> = example.target.to_vec();
            assert_eq!(target, vec![(i + 4) as f64, (i + 5) as f64, (i + 6) as f64]);
            assert_eq!(example.label_timestamp, t.rows[i + 6].timestamp);
        }
    }

    #[test]
    fn test_single_step_horizon() {
        let t = table(&[5.0, 6.0, 7.0, 8.0]);
        let set = Sequencer::new(2, 1).sequence(&t);
        assert_eq!(set.len(), 2);
        assert_eq!(set.targets.dim(), (2, 1));
        assert_eq!(set.targets.column(0).to_vec(), vec![7.0, 8.0]);
        assert_eq!(set.label_timestamps[0], t.rows[2].timestamp);
    }

    #[test]
    fn test_too_short_yields_empty() {
        let t = table(&[1.0, 2.0, 3.0]);
        let set = Sequencer::new(3, 2).sequence(&t);
        assert!(set.is_empty());
        assert_eq!(set.windows.dim(), (0, 3, 13));
        assert_eq!(set.horizon(), 2);
    }
}
