/// Piecewise-linear interpolation over scalar support points.
#[derive(Debug)]
pub(crate) struct Linear {
    /// Sorted, distinct abscissae.
    xs: Vec<f64>,
    /// Flattened value of each abscissa.
    ys: Vec<Vec<f64>>,
}

impl Linear {
    /// Build from unsorted support points. Of duplicated abscissae, the one
    /// given last wins.
    pub(crate) fn new(xs: &[f64], ys: &[Vec<f64>]) -> Self {
        let mut order: Vec<usize> = (0..xs.len()).collect();
        order.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));

        let mut sorted_xs: Vec<f64> = Vec::with_capacity(xs.len());
        let mut sorted_ys: Vec<Vec<f64>> = Vec::with_capacity(xs.len());
        for i in order {
            if sorted_xs.last() == Some(&xs[i]) {
                if let Some(last) = sorted_ys.last_mut() {
                    *last = ys[i].clone();
                }
                continue;
            }
            sorted_xs.push(xs[i]);
            sorted_ys.push(ys[i].clone());
        }
        Self {
            xs: sorted_xs,
            ys: sorted_ys,
        }
    }

    /// Interpolated value at `x`, or `None` outside the support range.
    pub(crate) fn eval(&self, x: f64) -> Option<Vec<f64>> {
        let (first, last) = (*self.xs.first()?, *self.xs.last()?);
        if x.is_nan() || x < first || x > last {
            return None;
        }
        // Index of the first abscissa >= x.
        let hi = self.xs.partition_point(|&v| v < x);
        if self.xs[hi] == x {
            return Some(self.ys[hi].clone());
        }
        let lo = hi - 1;
        let t = (x - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
        Some(
            self.ys[lo]
                .iter()
                .zip(&self.ys[hi])
                .map(|(a, b)| a + t * (b - a))
                .collect(),
        )
    }
}
