pub const EMA_FAST: usize = 12;
pub const EMA_MID: usize = 30;
pub const EMA_SLOW: usize = 55;

/// Exponential moving average, aligned index-for-index with `closes`.
///
/// Multiplier `k = 2 / (span + 1)`, seeded with the first close (no SMA seed).
/// A series shorter than `span` is not an error; early values are simply less
/// converged. `span == 0` is treated as `span == 1`, which reproduces the input.
pub fn ema(closes: &[f64], span: usize) -> Vec<f64> {
    let Some(&first) = closes.first() else {
        return Vec::new();
    };

    let k = 2.0 / (span.max(1) as f64 + 1.0);
    let mut result = Vec::with_capacity(closes.len());
    result.push(first);

    let mut prev = first;
    for &close in &closes[1..] {
        prev = close * k + prev * (1.0 - k);
        result.push(prev);
    }
    result
}

/// The three EMA lines used by the detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmaSet {
    pub fast: Vec<f64>,
    pub mid: Vec<f64>,
    pub slow: Vec<f64>,
}

impl EmaSet {
    pub fn compute(closes: &[f64]) -> Self {
        Self {
            fast: ema(closes, EMA_FAST),
            mid: ema(closes, EMA_MID),
            slow: ema(closes, EMA_SLOW),
        }
    }

    pub fn len(&self) -> usize {
        self.fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_empty()
    }

    /// `(fast, mid, slow)` at `idx`, if present.
    pub fn at(&self, idx: usize) -> Option<(f64, f64, f64)> {
        Some((*self.fast.get(idx)?, *self.mid.get(idx)?, *self.slow.get(idx)?))
    }
}
