use crate::error::FitError;
use crate::models::ModelKind;
use crate::window::Window;
use serde::Serialize;

/// Residuals at or below this fraction of the window's magnitude are rounding
/// left over from the solve, not deviation, and score as an exact fit.
pub const EXACT_FIT_TOLERANCE: f64 = 1e-8;

/// One enriched output record. `stream` is the raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CleanedRecord {
    pub timestamp: i64,
    pub stream: f64,
    pub processed: f64,
    pub dirtiness: f64,
}

impl CleanedRecord {
    pub fn is_dirty(&self) -> bool {
        self.dirtiness > 0.0
    }
}

/// Four index-aligned columns, one entry per window sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FittedWindow {
    pub timestamps: Vec<i64>,
    pub raw: Vec<f64>,
    pub processed: Vec<f64>,
    pub dirtiness: Vec<f64>,
}

impl FittedWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(capacity),
            raw: Vec::with_capacity(capacity),
            processed: Vec::with_capacity(capacity),
            dirtiness: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirtiness.iter().filter(|d| **d > 0.0).count()
    }

    pub fn records(&self) -> impl Iterator<Item = CleanedRecord> + '_ {
        (0..self.len()).map(move |i| CleanedRecord {
            timestamp: self.timestamps[i],
            stream: self.raw[i],
            processed: self.processed[i],
            dirtiness: self.dirtiness[i],
        })
    }
}

/// Dirty iff the residual exceeds the bound; the residual itself is the score.
pub fn classify(residual: f64, error_bound: f64) -> f64 {
    if residual > error_bound {
        residual
    } else {
        0.0
    }
}

/// Absolute residual between a raw reading and its estimate, with anything
/// under `noise_floor` treated as zero.
pub fn residual(raw: f64, processed: f64, noise_floor: f64) -> f64 {
    let residual = (raw - processed).abs();
    if residual <= noise_floor {
        0.0
    } else {
        residual
    }
}

/// Largest residual that still counts as an exact fit for `values`.
pub fn noise_floor(values: &[f64]) -> f64 {
    let magnitude = values.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    EXACT_FIT_TOLERANCE * magnitude
}

/// Fits `window` with `model` and scores every point against `error_bound`,
/// reusing the columns of `out`.
pub fn fit_window_into(
    model: ModelKind,
    error_bound: f64,
    window: &Window<'_>,
    out: &mut FittedWindow,
) -> Result<(), FitError> {
    model.fit_into(window, &mut out.processed)?;

    out.timestamps.clear();
    out.timestamps.extend_from_slice(window.timestamps());
    out.raw.clear();
    out.raw.extend_from_slice(window.values());
    let floor = noise_floor(&out.raw);
    out.dirtiness.clear();
    out.dirtiness.extend(
        out.raw
            .iter()
            .zip(&out.processed)
            .map(|(raw, processed)| classify(residual(*raw, *processed, floor), error_bound)),
    );
    Ok(())
}

pub fn fit_window(
    model: ModelKind,
    error_bound: f64,
    window: &Window<'_>,
) -> Result<FittedWindow, FitError> {
    let mut out = FittedWindow::with_capacity(window.len());
    fit_window_into(model, error_bound, window, &mut out)?;
    Ok(out)
}

/// Holds the model choice and the output columns reused across windows.
#[derive(Debug)]
pub struct FittingEngine {
    model: ModelKind,
    error_bound: f64,
    fitted: FittedWindow,
}

impl FittingEngine {
    pub fn new(model: ModelKind, error_bound: f64, window_size: usize) -> Self {
        Self {
            model,
            error_bound,
            fitted: FittedWindow::with_capacity(window_size),
        }
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn error_bound(&self) -> f64 {
        self.error_bound
    }

    pub fn process(&mut self, window: &Window<'_>) -> Result<&FittedWindow, FitError> {
        fit_window_into(self.model, self.error_bound, window, &mut self.fitted)?;
        tracing::debug!(
            model = %self.model,
            len = self.fitted.len(),
            dirty = self.fitted.dirty_count(),
            "fitted window"
        );
        Ok(&self.fitted)
    }
}
