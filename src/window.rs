use crate::error::FitError;
use crate::sample::Sample;

/// Read-only view over one complete window, in arrival order.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    timestamps: &'a [i64],
    values: &'a [f64],
}

impl<'a> Window<'a> {
    pub fn new(timestamps: &'a [i64], values: &'a [f64]) -> Self {
        Self { timestamps, values }
    }

    pub fn timestamps(&self) -> &'a [i64] {
        self.timestamps
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn check(&self) -> Result<(), FitError> {
        if self.timestamps.len() != self.values.len() {
            return Err(FitError::LengthMismatch {
                timestamps: self.timestamps.len(),
                values: self.values.len(),
            });
        }
        if self.values.is_empty() {
            return Err(FitError::EmptyWindow);
        }
        Ok(())
    }
}

/// Fixed-capacity tumbling window. Storage is allocated once and reused; a
/// completed window resets the cursor so the next sample starts a fresh one.
///
/// A capacity of zero never completes a window: every sample is discarded.
#[derive(Debug)]
pub struct WindowBuffer {
    timestamps: Vec<i64>,
    values: Vec<f64>,
    cursor: usize,
}

impl WindowBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            timestamps: vec![0; capacity],
            values: vec![0.0; capacity],
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Number of samples waiting in the current, incomplete window.
    pub fn pending(&self) -> usize {
        self.cursor
    }

    pub fn append(&mut self, sample: Sample) -> Option<Window<'_>> {
        let capacity = self.capacity();
        if capacity == 0 {
            tracing::trace!(timestamp = sample.timestamp, "zero-size window; sample discarded");
            return None;
        }

        self.timestamps[self.cursor] = sample.timestamp;
        self.values[self.cursor] = sample.value;
        self.cursor += 1;

        if self.cursor < capacity {
            return None;
        }
        self.cursor = 0;
        Some(Window::new(&self.timestamps, &self.values))
    }
}
