//! Closed set of fittable models.
//!
//! Every model is a one-step-ahead least-squares polynomial predictor: the
//! estimate for index `i` comes from the polynomial fitted to samples `0..i`
//! of the same window, evaluated at `t_i`. Until a model has seen enough
//! earlier samples to determine its coefficients, the estimate is the raw
//! value itself.
//!
//! The fit runs on offsets from the window's first sample: `t - t_0` divided
//! by the widest offset seen so far, and `y - y_0`. Millisecond epochs stay
//! well conditioned, and a window that never moves off its first value
//! reproduces it exactly.

use crate::error::FitError;
use crate::window::Window;

const SINGULAR_PIVOT: f64 = 1e-12;
const MAX_TERMS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Constant,
    Linear,
    Quadratic,
    Cubic,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Constant,
        ModelKind::Linear,
        ModelKind::Quadratic,
        ModelKind::Cubic,
    ];

    /// Case-insensitive name lookup; surrounding whitespace is ignored.
    pub fn from_name(raw: &str) -> Option<Self> {
        let name = raw.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn id(self) -> u8 {
        match self {
            ModelKind::Constant => 0,
            ModelKind::Linear => 1,
            ModelKind::Quadratic => 2,
            ModelKind::Cubic => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Constant => "constant",
            ModelKind::Linear => "linear",
            ModelKind::Quadratic => "quadratic",
            ModelKind::Cubic => "cubic",
        }
    }

    pub fn degree(self) -> usize {
        match self {
            ModelKind::Constant => 0,
            ModelKind::Linear => 1,
            ModelKind::Quadratic => 2,
            ModelKind::Cubic => 3,
        }
    }

    /// Writes one estimate per window sample into `out` (cleared first).
    pub fn fit_into(self, window: &Window<'_>, out: &mut Vec<f64>) -> Result<(), FitError> {
        window.check()?;
        out.clear();

        let degree = self.degree();
        let timestamps = window.timestamps();
        let values = window.values();
        let origin = timestamps[0];
        let baseline = values[0];

        let mut solver = LeastSquares::new(degree);
        for (index, (&ts, &value)) in timestamps.iter().zip(values).enumerate() {
            let offset = ts.saturating_sub(origin) as f64;
            let estimate = if index <= degree {
                value
            } else {
                baseline + solver.predict(degree, offset)
            };
            if !estimate.is_finite() {
                return Err(FitError::NonFiniteFit { index });
            }
            out.push(estimate);
            solver.add(offset, value - baseline);
        }
        Ok(())
    }

    pub fn fit(self, window: &Window<'_>) -> Result<Vec<f64>, FitError> {
        let mut out = Vec::with_capacity(window.len());
        self.fit_into(window, &mut out)?;
        Ok(out)
    }
}

impl TryFrom<u8> for ModelKind {
    type Error = FitError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(FitError::UnknownModel { id })
    }
}

/// Fits `window` with the model registered under `model_id`.
pub fn fit_model(model_id: u8, window: &Window<'_>) -> Result<Vec<f64>, FitError> {
    ModelKind::try_from(model_id)?.fit(window)
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Incremental least squares in the basis `1, u, u², u³` with `u = d / scale`.
///
/// Holds the upper-triangular factor `r` of the design matrix and `z = Qᵀy`.
/// Each sample is folded in with Givens rotations, so the normal equations
/// are never formed. The leading `k x k` block of `r` is the factor for the
/// first `k` basis functions, which is what the degree fallback solves.
#[derive(Debug)]
struct LeastSquares {
    r: [[f64; MAX_TERMS]; MAX_TERMS],
    z: [f64; MAX_TERMS],
    terms: usize,
    scale: f64,
}

impl LeastSquares {
    fn new(degree: usize) -> Self {
        Self {
            r: [[0.0; MAX_TERMS]; MAX_TERMS],
            z: [0.0; MAX_TERMS],
            terms: degree + 1,
            scale: 1.0,
        }
    }

    fn add(&mut self, d: f64, y: f64) {
        if d.abs() > self.scale {
            self.rescale(d.abs());
        }
        let u = d / self.scale;
        let mut row = [0.0; MAX_TERMS];
        let mut pow = 1.0;
        for cell in row.iter_mut().take(self.terms) {
            *cell = pow;
            pow *= u;
        }

        let mut rhs = y;
        for k in 0..self.terms {
            if row[k] == 0.0 {
                continue;
            }
            let (a, b) = (self.r[k][k], row[k]);
            let h = (a * a + b * b).sqrt();
            if h == 0.0 {
                continue;
            }
            let (c, s) = (a / h, b / h);
            for j in k..self.terms {
                let (above, below) = (self.r[k][j], row[j]);
                self.r[k][j] = c * above + s * below;
                row[j] = c * below - s * above;
            }
            let above = self.z[k];
            self.z[k] = c * above + s * rhs;
            rhs = c * rhs - s * above;
        }
    }

    /// Widens `scale` to `reach`. Column `j` of `r` picks up `(old/new)^j`.
    fn rescale(&mut self, reach: f64) {
        let factor = self.scale / reach;
        let mut column = 1.0;
        for j in 1..self.terms {
            column *= factor;
            for row in self.r.iter_mut().take(self.terms) {
                row[j] *= column;
            }
        }
        self.scale = reach;
    }

    /// Evaluates the best-fitting polynomial at offset `d`, stepping down one
    /// degree whenever the system is singular.
    fn predict(&self, degree: usize, d: f64) -> f64 {
        let u = d / self.scale;
        (1..=degree + 1)
            .rev()
            .find_map(|terms| self.solve(terms).map(|coeffs| (terms, coeffs)))
            .map(|(terms, coeffs)| coeffs[..terms].iter().rev().fold(0.0, |acc, c| acc * u + c))
            .unwrap_or(f64::NAN)
    }

    fn solve(&self, terms: usize) -> Option<[f64; MAX_TERMS]> {
        let norm = self
            .r
            .iter()
            .take(terms)
            .flat_map(|row| row[..terms].iter())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if norm == 0.0 || (0..terms).any(|k| self.r[k][k].abs() <= SINGULAR_PIVOT * norm) {
            return None;
        }

        let mut coeffs = [0.0; MAX_TERMS];
        for row in (0..terms).rev() {
            let tail: f64 = (row + 1..terms).map(|k| self.r[row][k] * coeffs[k]).sum();
            coeffs[row] = (self.z[row] - tail) / self.r[row][row];
        }
        Some(coeffs)
    }
}
