//! Per-component state and control bounds.

use nalgebra::{DMatrix, DVector};
use traj_types::TrajError;

/// Inequality constraint enforcing box bounds on state and control.
///
/// Infinite bounds are discarded at construction, so evaluation cost is
/// linear in the number of finite components. Residual ordering is
/// `[x_max, x_min, u_max, u_min]` over the finite entries; with the `c <= 0`
/// convention an upper bound contributes `v - hi` (Jacobian `+1`) and a
/// lower bound contributes `lo - v` (Jacobian `-1`).
#[derive(Debug, Clone)]
pub struct BoundConstraint {
    n: usize,
    m: usize,
    x_upper: Vec<(usize, f64)>,
    x_lower: Vec<(usize, f64)>,
    u_upper: Vec<(usize, f64)>,
    u_lower: Vec<(usize, f64)>,
}

fn finite_entries(bounds: &[f64]) -> Vec<(usize, f64)> {
    bounds
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, v)| (i, *v))
        .collect()
}

impl BoundConstraint {
    /// Build a box constraint from lower/upper bounds on state and control.
    ///
    /// Use `f64::INFINITY` / `f64::NEG_INFINITY` for absent bounds.
    ///
    /// # Errors
    ///
    /// Rejects mis-sized bound slices, NaN entries, and crossed bounds
    /// (`lower > upper`).
    pub fn new(
        n: usize,
        m: usize,
        x_min: &[f64],
        x_max: &[f64],
        u_min: &[f64],
        u_max: &[f64],
    ) -> Result<Self, TrajError> {
        check_pair("state bounds", n, x_min, x_max)?;
        check_pair("control bounds", m, u_min, u_max)?;

        let out = Self {
            n,
            m,
            x_upper: finite_entries(x_max),
            x_lower: finite_entries(x_min),
            u_upper: finite_entries(u_max),
            u_lower: finite_entries(u_min),
        };
        if out.len() == 0 {
            tracing::warn!("bound constraint has no finite components; it will be a no-op");
        }
        Ok(out)
    }

    /// Control-only bounds (state unconstrained).
    ///
    /// # Errors
    ///
    /// Same validation as [`BoundConstraint::new`].
    pub fn on_controls(n: usize, u_min: &[f64], u_max: &[f64]) -> Result<Self, TrajError> {
        let x_max = vec![f64::INFINITY; n];
        let x_min = vec![f64::NEG_INFINITY; n];
        Self::new(n, u_min.len(), &x_min, &x_max, u_min, u_max)
    }

    /// Number of finite bound components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x_upper.len() + self.x_lower.len() + self.u_upper.len() + self.u_lower.len()
    }

    /// Whether every bound is infinite.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// State dimension this constraint was built for.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.n
    }

    /// Control dimension this constraint was built for.
    #[must_use]
    pub fn control_dim(&self) -> usize {
        self.m
    }

    /// Whether any finite bound touches the state.
    #[must_use]
    pub fn has_state_rows(&self) -> bool {
        !self.x_upper.is_empty() || !self.x_lower.is_empty()
    }

    /// Whether any finite bound touches the control.
    #[must_use]
    pub fn has_control_rows(&self) -> bool {
        !self.u_upper.is_empty() || !self.u_lower.is_empty()
    }

    pub(crate) fn evaluate(&self, c: &mut DVector<f64>, x: &DVector<f64>, u: Option<&DVector<f64>>) {
        let mut row = 0;
        for &(i, hi) in &self.x_upper {
            c[row] = x[i] - hi;
            row += 1;
        }
        for &(i, lo) in &self.x_lower {
            c[row] = lo - x[i];
            row += 1;
        }
        // Attach-time validation keeps control bounds off the terminal knot.
        debug_assert!(u.is_some() || !self.has_control_rows());
        if let Some(u) = u {
            for &(i, hi) in &self.u_upper {
                c[row] = u[i] - hi;
                row += 1;
            }
            for &(i, lo) in &self.u_lower {
                c[row] = lo - u[i];
                row += 1;
            }
            debug_assert_eq!(row, self.len());
        }
    }

    /// Sign-pattern Jacobian; constant, so no trajectory arguments.
    pub(crate) fn init_jacobian(&self, cx: &mut DMatrix<f64>, cu: &mut DMatrix<f64>) {
        cx.fill(0.0);
        cu.fill(0.0);
        let mut row = 0;
        for &(i, _) in &self.x_upper {
            cx[(row, i)] = 1.0;
            row += 1;
        }
        for &(i, _) in &self.x_lower {
            cx[(row, i)] = -1.0;
            row += 1;
        }
        for &(i, _) in &self.u_upper {
            cu[(row, i)] = 1.0;
            row += 1;
        }
        for &(i, _) in &self.u_lower {
            cu[(row, i)] = -1.0;
            row += 1;
        }
    }

    pub(crate) fn scatter_jacobian(
        &self,
        d: &mut DMatrix<f64>,
        c_row: usize,
        x_col: usize,
        u_col: usize,
    ) {
        let mut row = c_row;
        for &(i, _) in &self.x_upper {
            d[(row, x_col + i)] = 1.0;
            row += 1;
        }
        for &(i, _) in &self.x_lower {
            d[(row, x_col + i)] = -1.0;
            row += 1;
        }
        for &(i, _) in &self.u_upper {
            d[(row, u_col + i)] = 1.0;
            row += 1;
        }
        for &(i, _) in &self.u_lower {
            d[(row, u_col + i)] = -1.0;
            row += 1;
        }
    }

    pub(crate) fn component_label(&self, row: usize) -> String {
        let mut r = row;
        if r < self.x_upper.len() {
            return format!("x_max[{}]", self.x_upper[r].0);
        }
        r -= self.x_upper.len();
        if r < self.x_lower.len() {
            return format!("x_min[{}]", self.x_lower[r].0);
        }
        r -= self.x_lower.len();
        if r < self.u_upper.len() {
            return format!("u_max[{}]", self.u_upper[r].0);
        }
        r -= self.u_upper.len();
        format!("u_min[{}]", self.u_lower[r].0)
    }
}

fn check_pair(what: &str, dim: usize, lo: &[f64], hi: &[f64]) -> Result<(), TrajError> {
    if lo.len() != dim {
        return Err(TrajError::dims(what, dim, lo.len()));
    }
    if hi.len() != dim {
        return Err(TrajError::dims(what, dim, hi.len()));
    }
    for i in 0..dim {
        if lo[i].is_nan() || hi[i].is_nan() {
            return Err(TrajError::invalid_config(format!("{what}[{i}] is NaN")));
        }
        if lo[i] > hi[i] {
            return Err(TrajError::invalid_config(format!(
                "{what}[{i}] crossed: {} > {}",
                lo[i], hi[i]
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const INF: f64 = f64::INFINITY;

    fn spec_bound() -> BoundConstraint {
        // x_max = (inf, 5), x_min = (-5, -inf), u_max = (1), u_min = (-1)
        BoundConstraint::new(2, 1, &[-5.0, -INF], &[INF, 5.0], &[-1.0], &[1.0]).unwrap()
    }

    #[test]
    fn test_residual_ordering_and_signs() {
        let con = spec_bound();
        assert_eq!(con.len(), 4);

        let x = DVector::from_vec(vec![-6.0, 7.0]);
        let u = DVector::from_vec(vec![2.0]);
        let mut c = DVector::zeros(4);
        con.evaluate(&mut c, &x, Some(&u));
        // [x_max(1), x_min(0), u_max(0), u_min(0)]
        assert_relative_eq!(c[0], 2.0); // 7 - 5
        assert_relative_eq!(c[1], 1.0); // -5 - (-6)
        assert_relative_eq!(c[2], 1.0); // 2 - 1
        assert_relative_eq!(c[3], -3.0); // -1 - 2

        let mut cx = DMatrix::zeros(4, 2);
        let mut cu = DMatrix::zeros(4, 1);
        con.init_jacobian(&mut cx, &mut cu);
        assert_relative_eq!(cx[(0, 1)], 1.0);
        assert_relative_eq!(cx[(1, 0)], -1.0);
        assert_relative_eq!(cu[(2, 0)], 1.0);
        assert_relative_eq!(cu[(3, 0)], -1.0);
    }

    #[test]
    fn test_all_infinite_is_noop() {
        let con = BoundConstraint::new(2, 1, &[-INF, -INF], &[INF, INF], &[-INF], &[INF]).unwrap();
        assert!(con.is_empty());
        assert!(!con.has_state_rows());
        assert!(!con.has_control_rows());
    }

    #[test]
    fn test_rejects_crossed_and_nan_bounds() {
        assert!(BoundConstraint::new(1, 1, &[1.0], &[-1.0], &[-INF], &[INF]).is_err());
        assert!(BoundConstraint::new(1, 1, &[f64::NAN], &[1.0], &[-INF], &[INF]).is_err());
    }

    #[test]
    fn test_scatter_matches_init() {
        let con = spec_bound();
        let mut d = DMatrix::zeros(6, 5);
        // rows 1.., x block at col 0, u block at col 2 (knot-interleaved layout)
        con.scatter_jacobian(&mut d, 1, 0, 2);
        assert_relative_eq!(d[(1, 1)], 1.0);
        assert_relative_eq!(d[(2, 0)], -1.0);
        assert_relative_eq!(d[(3, 2)], 1.0);
        assert_relative_eq!(d[(4, 2)], -1.0);
    }
}
