//! Terminal goal constraint.

use nalgebra::{DMatrix, DVector};
use traj_types::TrajError;

/// Equality constraint pinning a subset of state components to target values:
/// `x_k[inds] - xf[inds] = 0`.
///
/// Normally attached at the terminal knot. The Jacobian is the constant
/// selection matrix over `inds`.
#[derive(Debug, Clone)]
pub struct GoalConstraint {
    xf: DVector<f64>,
    inds: Vec<usize>,
}

impl GoalConstraint {
    /// Pin the components `inds` of the state to `xf[inds]`.
    ///
    /// # Errors
    ///
    /// Rejects out-of-range or repeated indices.
    pub fn new(xf: DVector<f64>, inds: Vec<usize>) -> Result<Self, TrajError> {
        let n = xf.len();
        for (pos, &i) in inds.iter().enumerate() {
            if i >= n {
                return Err(TrajError::dims("goal index", n, i));
            }
            if inds[..pos].contains(&i) {
                return Err(TrajError::invalid_config(format!(
                    "goal index {i} appears twice"
                )));
            }
        }
        Ok(Self { xf, inds })
    }

    /// Pin the full state to `xf`.
    #[must_use]
    pub fn pin_all(xf: DVector<f64>) -> Self {
        let inds = (0..xf.len()).collect();
        Self { xf, inds }
    }

    /// Number of pinned components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inds.len()
    }

    /// Whether no components are pinned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inds.is_empty()
    }

    /// State dimension this constraint was built for.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.xf.len()
    }

    pub(crate) fn evaluate(&self, c: &mut DVector<f64>, x: &DVector<f64>) {
        for (row, &i) in self.inds.iter().enumerate() {
            c[row] = x[i] - self.xf[i];
        }
    }

    /// Selection-matrix Jacobian; constant, so no trajectory arguments.
    pub(crate) fn init_jacobian(&self, cx: &mut DMatrix<f64>, cu: &mut DMatrix<f64>) {
        cx.fill(0.0);
        cu.fill(0.0);
        for (row, &i) in self.inds.iter().enumerate() {
            cx[(row, i)] = 1.0;
        }
    }

    pub(crate) fn scatter_jacobian(&self, d: &mut DMatrix<f64>, c_row: usize, x_col: usize) {
        for (row, &i) in self.inds.iter().enumerate() {
            d[(c_row + row, x_col + i)] = 1.0;
        }
    }

    pub(crate) fn component_label(&self, row: usize) -> String {
        format!("goal[{}]", self.inds[row])
    }
}
