//! Pheromone trails with MAX-MIN bounds.

/// Trail limits `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PheromoneBounds {
    pub min: f64,
    pub max: f64,
}

impl PheromoneBounds {
    /// `max = 1 / ((1 - rho) * best_length)` and
    /// `min = max * (1 - p_dec) / ((n/2 - 1) * p_dec)`, where `p_dec` is the
    /// n-th root of `p_best`. `min` never exceeds `max`.
    pub fn compute(best_length: f64, rho: f64, p_dec: f64, n: usize) -> Self {
        let max = 1.0 / ((1.0 - rho) * best_length);
        let average_choices = n as f64 / 2.0;
        let denominator = (average_choices - 1.0) * p_dec;
        let min = if denominator > 0.0 {
            (max * (1.0 - p_dec) / denominator).min(max)
        } else {
            max
        };
        PheromoneBounds { min, max }
    }

    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// Dense N x N trail matrix. Bounds are unset until the first tour has been
/// evaluated; from then on every entry stays within them.
#[derive(Debug, Clone)]
pub struct PheromoneTrails {
    size: usize,
    values: Vec<f64>,
    bounds: Option<PheromoneBounds>,
}

impl PheromoneTrails {
    pub fn new(size: usize, initial: f64) -> Self {
        PheromoneTrails {
            size,
            values: vec![initial; size * size],
            bounds: None,
        }
    }

    #[inline]
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.values[from * self.size + to]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn bounds(&self) -> Option<PheromoneBounds> {
        self.bounds
    }

    #[inline]
    fn clamp(&self, value: f64) -> f64 {
        match self.bounds {
            Some(b) => b.clamp(value),
            None => value,
        }
    }

    /// Installs new bounds and re-clamps the whole matrix.
    pub fn set_bounds(&mut self, bounds: PheromoneBounds) {
        self.bounds = Some(bounds);
        for v in &mut self.values {
            *v = bounds.clamp(*v);
        }
    }

    /// Multiplies every entry by the retention factor `rho`, then clamps.
    pub fn evaporate(&mut self, rho: f64) {
        let bounds = self.bounds;
        for v in &mut self.values {
            let scaled = *v * rho;
            *v = match bounds {
                Some(b) => b.clamp(scaled),
                None => scaled,
            };
        }
    }

    /// Adds `amount` to every edge of the closed tour, then clamps those edges.
    pub fn deposit(&mut self, tour: &[usize], amount: f64) {
        if tour.is_empty() {
            return;
        }
        for (&from, &to) in tour.iter().zip(tour.iter().cycle().skip(1)) {
            let idx = from * self.size + to;
            self.values[idx] = self.clamp(self.values[idx] + amount);
        }
    }

    /// Sets every entry to the upper bound. Without bounds nothing changes.
    pub fn reset_to_max(&mut self) {
        if let Some(b) = self.bounds {
            self.values.fill(b.max);
        }
    }

    /// Average number of outgoing edges per city whose trail exceeds
    /// `min + lambda * (max - min)`, with min and max taken over that city's
    /// own outgoing edges. Values near 1 mean the colony has converged.
    pub fn branching_factor(&self, lambda: f64) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let n = self.size;
        let mut total = 0usize;
        for i in 0..n {
            let row = &self.values[i * n..(i + 1) * n];
            let outgoing = || row.iter().enumerate().filter(move |&(j, _)| j != i).map(|(_, &v)| v);
            let lo = outgoing().fold(f64::INFINITY, f64::min);
            let hi = outgoing().fold(f64::NEG_INFINITY, f64::max);
            let threshold = lo + lambda * (hi - lo);
            total += outgoing().filter(|&v| v > threshold).count();
        }
        total as f64 / n as f64
    }
}
