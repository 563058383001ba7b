//! Min-max scaling fitted on training data only.
//!
//! Columns are scaled independently to `[0, 1]` over the training range.
//! A column with zero range uses a unit scale, so it maps to `0` and inverts
//! back to its constant value.

use crate::domain::errors::PipelineError;
use crate::domain::forecasting::SequenceSet;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
}

impl MinMaxScaler {
    /// Fits per-column bounds over the rows of `data`.
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self, PipelineError> {
        if data.nrows() == 0 {
            return Err(PipelineError::InvalidInput(
                "cannot fit scaler on empty data".to_string(),
            ));
        }

        let mut data_min = vec![f64::INFINITY; data.ncols()];
        let mut data_max = vec![f64::NEG_INFINITY; data.ncols()];
        for row in data.rows() {
            for (j, &value) in row.iter().enumerate() {
                if !value.is_finite() {
                    return Err(PipelineError::InvalidInput(format!(
                        "non-finite value in scaler input column {}",
                        j
                    )));
                }
                data_min[j] = data_min[j].min(value);
                data_max[j] = data_max[j].max(value);
            }
        }

        Ok(Self { data_min, data_max })
    }

    pub fn n_features(&self) -> usize {
        self.data_min.len()
    }

    fn scale(&self, column: usize) -> f64 {
        let range = self.data_max[column] - self.data_min[column];
        if range == 0.0 { 1.0 } else { 1.0 / range }
    }

    fn check_width(&self, width: usize) -> Result<(), PipelineError> {
        if width != self.n_features() {
            return Err(PipelineError::InvalidInput(format!(
                "scaler expects {} columns, got {}",
                self.n_features(),
                width
            )));
        }
        Ok(())
    }

    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, PipelineError> {
        self.check_width(data.ncols())?;
        let mut out = data.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (min, scale) = (self.data_min[j], self.scale(j));
            column.mapv_inplace(|v| (v - min) * scale);
        }
        Ok(out)
    }

    pub fn inverse_transform(
        &self,
        data: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, PipelineError> {
        self.check_width(data.ncols())?;
        let mut out = data.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (min, scale) = (self.data_min[j], self.scale(j));
            column.mapv_inplace(|v| v / scale + min);
        }
        Ok(out)
    }

    /// Scales every timestep of `[N, W, F]` windows along the feature axis.
    pub fn transform_windows(&self, windows: &Array3<f64>) -> Result<Array3<f64>, PipelineError> {
        let (n, w, f) = windows.dim();
        self.check_width(f)?;
        let flat = windows
            .to_shape((n * w, f))
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        let scaled = self.transform(flat.view())?;
        scaled
            .into_shape((n, w, f))
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))
    }
}

/// Feature and target scalers fitted together in one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerPair {
    pub run_id: Uuid,
    pub feature: MinMaxScaler,
    pub target: MinMaxScaler,
}

impl ScalerPair {
    /// Fits both scalers on the training partition.
    ///
    /// Windows are flattened to `(N * W, F)` rows; targets keep one column per
    /// forecast step.
    pub fn fit(train: &SequenceSet, run_id: Uuid) -> Result<Self, PipelineError> {
        let (n, w, f) = train.windows.dim();
        let flat = train
            .windows
            .to_shape((n * w, f))
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        let feature = MinMaxScaler::fit(flat.view())?;
        let target = MinMaxScaler::fit(train.targets.view())?;
        Ok(Self {
            run_id,
            feature,
            target,
        })
    }

    /// Returns a copy of `set` in scaled space.
    pub fn transform_set(&self, set: &SequenceSet) -> Result<SequenceSet, PipelineError> {
        Ok(SequenceSet {
            windows: self.feature.transform_windows(&set.windows)?,
            targets: self.target.transform(set.targets.view())?,
            label_timestamps: set.label_timestamps.clone(),
        })
    }

    /// Maps scaled model output back to lot counts.
    pub fn invert_predictions(
        &self,
        predictions: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, PipelineError> {
        self.target.inverse_transform(predictions)
    }
}
