//! Squared-norm equality constraint.

use nalgebra::{DMatrix, DVector};
use traj_types::TrajError;

/// Which vector a [`NormConstraint`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormVariable {
    /// Constrain selected state components.
    State,
    /// Constrain selected control components.
    Control,
}

/// Scalar equality constraint `sum_{i in inds} v_i^2 - n_max = 0`, where `v`
/// is the state or the control at the knot.
#[derive(Debug, Clone)]
pub struct NormConstraint {
    dim: usize,
    var: NormVariable,
    inds: Vec<usize>,
    n_max: f64,
}

impl NormConstraint {
    /// Constrain the squared norm of `v[inds]` to equal `n_max`.
    ///
    /// `dim` is the full dimension of the chosen vector. An empty index set
    /// yields a zero-length no-op constraint.
    ///
    /// # Errors
    ///
    /// Rejects out-of-range or repeated indices and a negative `n_max`.
    pub fn new(
        dim: usize,
        var: NormVariable,
        inds: Vec<usize>,
        n_max: f64,
    ) -> Result<Self, TrajError> {
        for (pos, &i) in inds.iter().enumerate() {
            if i >= dim {
                return Err(TrajError::dims("norm index", dim, i));
            }
            if inds[..pos].contains(&i) {
                return Err(TrajError::invalid_config(format!(
                    "norm index {i} appears twice"
                )));
            }
        }
        if !(n_max >= 0.0) {
            return Err(TrajError::invalid_config(format!(
                "squared-norm target {n_max} must be non-negative"
            )));
        }
        Ok(Self {
            dim,
            var,
            inds,
            n_max,
        })
    }

    /// Which vector the constraint reads.
    #[must_use]
    pub fn variable(&self) -> NormVariable {
        self.var
    }

    /// Number of scalar residuals: one, or zero for an empty index set.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(!self.inds.is_empty())
    }

    /// Whether the index set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inds.is_empty()
    }

    /// Dimension of the vector this constraint was built for.
    #[must_use]
    pub fn var_dim(&self) -> usize {
        self.dim
    }

    fn pick<'a>(&self, x: &'a DVector<f64>, u: Option<&'a DVector<f64>>) -> Option<&'a DVector<f64>> {
        match self.var {
            NormVariable::State => Some(x),
            NormVariable::Control => u,
        }
    }

    pub(crate) fn evaluate(&self, c: &mut DVector<f64>, x: &DVector<f64>, u: Option<&DVector<f64>>) {
        if self.is_empty() {
            return;
        }
        let Some(v) = self.pick(x, u) else {
            debug_assert!(false, "control-norm constraint evaluated without a control");
            return;
        };
        c[0] = self.inds.iter().map(|&i| v[i] * v[i]).sum::<f64>() - self.n_max;
    }

    pub(crate) fn jacobian(
        &self,
        cx: &mut DMatrix<f64>,
        cu: &mut DMatrix<f64>,
        x: &DVector<f64>,
        u: Option<&DVector<f64>>,
    ) {
        cx.fill(0.0);
        cu.fill(0.0);
        if self.is_empty() {
            return;
        }
        let Some(v) = self.pick(x, u) else {
            debug_assert!(false, "control-norm constraint differentiated without a control");
            return;
        };
        let out = match self.var {
            NormVariable::State => cx,
            NormVariable::Control => cu,
        };
        for &i in &self.inds {
            out[(0, i)] = 2.0 * v[i];
        }
    }

    pub(crate) fn scatter_jacobian(
        &self,
        d: &mut DMatrix<f64>,
        c_row: usize,
        x_col: usize,
        u_col: usize,
        x: &DVector<f64>,
        u: Option<&DVector<f64>>,
    ) {
        if self.is_empty() {
            return;
        }
        let Some(v) = self.pick(x, u) else {
            return;
        };
        let col0 = match self.var {
            NormVariable::State => x_col,
            NormVariable::Control => u_col,
        };
        for &i in &self.inds {
            d[(c_row, col0 + i)] = 2.0 * v[i];
        }
    }

    pub(crate) fn component_label(&self) -> String {
        match self.var {
            NormVariable::State => "norm(x)".to_string(),
            NormVariable::Control => "norm(u)".to_string(),
        }
    }
}
