//! Riccati backward pass.
//!
//! Right-to-left recursion over the knot points. At each knot the
//! action-value expansion is formed from the cost expansion and the dynamics
//! Jacobians, regularized, and factorized to produce the feedback gain `K`
//! and feedforward `d`. The cost-to-go accumulators are then updated from
//! the **unregularized** expansion and re-symmetrized.
//!
//! A failed factorization raises a regularize-and-restart signal: the
//! regularization grows, the accumulators are re-seeded from the terminal
//! expansion, and the whole recursion starts over from the last knot.
//! Exhausting the regularization cap is the only failure mode.

use nalgebra::{Cholesky, DMatrix};
use traj_types::{RegularizationType, SolveStatus, TrajError};

use crate::solver::IlqrSolver;

/// Run the backward pass, producing gains, feedforwards, and the expected
/// reduction pair `dv`.
///
/// On success the regularization is relaxed one step and `Ok(dv)` is
/// returned with `dv[0] = sum_k d_k . Qu_k` and
/// `dv[1] = 0.5 sum_k d_k . Quu_k d_k`.
///
/// # Errors
///
/// [`TrajError::RegularizationMax`] when a restart is requested with the
/// regularization already at its cap; the status is set to
/// [`SolveStatus::RegularizationMax`] and the per-knot buffers are left in
/// an unspecified partial state.
pub fn backward_pass(s: &mut IlqrSolver) -> Result<[f64; 2], TrajError> {
    let num_knots = s.problem.num_knots();
    let m = s.problem.control_dim();
    let ir = s.problem.integrator();
    let terminal = num_knots - 1;

    'restart: loop {
        // Terminal boundary: P <- Qf_xx, p <- Qf_x, dv <- 0.
        s.problem
            .objective()
            .terminal_expansion(&mut s.cost_exp[terminal], &s.xs[terminal]);
        s.ctg_hess.copy_from(&s.cost_exp[terminal].qxx);
        s.ctg_grad.copy_from(&s.cost_exp[terminal].qx);
        s.dv = [0.0, 0.0];
        if let Some(saved) = s.saved.as_mut() {
            saved.hess[terminal].copy_from(&s.ctg_hess);
            saved.grad[terminal].copy_from(&s.ctg_grad);
        }

        let mut k = terminal;
        while k > 0 {
            let ki = k - 1;
            let t = s.problem.times()[ki];
            let dt = s.problem.dt(ki);

            // 1. Dynamics Jacobians and cost expansion at this knot.
            s.problem.model().discrete_jacobian(
                &mut s.a_jac[ki],
                &mut s.b_jac[ki],
                ir,
                &s.xs[ki],
                &s.us[ki],
                t,
                dt,
            );
            s.problem
                .objective()
                .stage_expansion(&mut s.cost_exp[ki], &s.xs[ki], &s.us[ki], ki);

            // 2. Action-value expansion. pa/pb hold P*A and P*B.
            s.pa_tmp.gemm(1.0, &s.ctg_hess, &s.a_jac[ki], 0.0);
            s.pb_tmp.gemm(1.0, &s.ctg_hess, &s.b_jac[ki], 0.0);

            s.qxx[ki].copy_from(&s.cost_exp[ki].qxx);
            s.qxx[ki].gemm_tr(1.0, &s.a_jac[ki], &s.pa_tmp, 1.0);
            s.quu[ki].copy_from(&s.cost_exp[ki].ruu);
            s.quu[ki].gemm_tr(1.0, &s.b_jac[ki], &s.pb_tmp, 1.0);
            s.qux[ki].copy_from(&s.cost_exp[ki].rux);
            s.qux[ki].gemm_tr(1.0, &s.b_jac[ki], &s.pa_tmp, 1.0);
            s.qx[ki].copy_from(&s.cost_exp[ki].qx);
            s.qx[ki].gemv_tr(1.0, &s.a_jac[ki], &s.ctg_grad, 1.0);
            s.qu[ki].copy_from(&s.cost_exp[ki].ru);
            s.qu[ki].gemv_tr(1.0, &s.b_jac[ki], &s.ctg_grad, 1.0);

            // 3. Regularization of the selected type.
            let rho = s.reg.rho();
            match s.cfg.bp_reg_type {
                RegularizationType::Control => {
                    s.quu_reg[ki].copy_from(&s.quu[ki]);
                    for i in 0..m {
                        s.quu_reg[ki][(i, i)] += rho;
                    }
                    s.qux_reg[ki].copy_from(&s.qux[ki]);
                    if s.cfg.bp_reg && Cholesky::new(s.quu_reg[ki].clone()).is_none() {
                        raise_or_fail(s, ki)?;
                        continue 'restart;
                    }
                }
                RegularizationType::State => {
                    s.quu_reg[ki].copy_from(&s.quu[ki]);
                    s.quu_reg[ki].gemm_tr(rho, &s.b_jac[ki], &s.b_jac[ki], 1.0);
                    s.qux_reg[ki].copy_from(&s.qux[ki]);
                    s.qux_reg[ki].gemm_tr(rho, &s.b_jac[ki], &s.a_jac[ki], 1.0);
                }
            }

            // 4. Gains. The factorization consumes an owned copy, so
            // quu_reg keeps the unfactored matrix for later inspection.
            let Some(chol) = Cholesky::new(s.quu_reg[ki].clone()) else {
                raise_or_fail(s, ki)?;
                continue 'restart;
            };
            s.k_fb[ki].copy_from(&s.qux_reg[ki]);
            chol.solve_mut(&mut s.k_fb[ki]);
            s.k_fb[ki].neg_mut();
            s.d_ff[ki].copy_from(&s.qu[ki]);
            chol.solve_mut(&mut s.d_ff[ki]);
            s.d_ff[ki].neg_mut();

            // 5. Cost-to-go update from the unregularized expansion.
            s.quu_d_tmp.gemv(1.0, &s.quu[ki], &s.d_ff[ki], 0.0);
            s.quu_k_tmp.gemm(1.0, &s.quu[ki], &s.k_fb[ki], 0.0);

            s.ctg_grad.copy_from(&s.qx[ki]);
            s.ctg_grad.gemv_tr(1.0, &s.k_fb[ki], &s.quu_d_tmp, 1.0);
            s.ctg_grad.gemv_tr(1.0, &s.k_fb[ki], &s.qu[ki], 1.0);
            s.ctg_grad.gemv_tr(1.0, &s.qux[ki], &s.d_ff[ki], 1.0);

            s.ctg_hess.copy_from(&s.qxx[ki]);
            s.ctg_hess.gemm_tr(1.0, &s.k_fb[ki], &s.quu_k_tmp, 1.0);
            s.ctg_hess.gemm_tr(1.0, &s.k_fb[ki], &s.qux[ki], 1.0);
            s.ctg_hess.gemm_tr(1.0, &s.qux[ki], &s.k_fb[ki], 1.0);
            symmetrize(&mut s.ctg_hess);

            let dv1 = s.d_ff[ki].dot(&s.qu[ki]);
            let dv2 = 0.5 * s.d_ff[ki].dot(&s.quu_d_tmp);
            s.dv[0] += dv1;
            s.dv[1] += dv2;

            if let Some(saved) = s.saved.as_mut() {
                saved.hess[ki].copy_from(&s.ctg_hess);
                saved.grad[ki].copy_from(&s.ctg_grad);
                saved.dv[ki] = [dv1, dv2];
            }

            k -= 1;
        }

        s.reg.decrease(&s.cfg);
        return Ok(s.dv);
    }
}

/// Grow the regularization for a restart, or fail at the cap.
fn raise_or_fail(s: &mut IlqrSolver, knot: usize) -> Result<(), TrajError> {
    if s.reg.at_max(&s.cfg) {
        s.status = SolveStatus::RegularizationMax;
        return Err(TrajError::RegularizationMax { rho: s.reg.rho() });
    }
    s.reg.increase(&s.cfg);
    tracing::debug!(
        rho = s.reg.rho(),
        knot,
        "Quu not positive definite, restarting backward pass"
    );
    Ok(())
}

/// Explicit `0.5 * (P + P')`. Floating-point accumulation breaks exact
/// symmetry, which the Cholesky of the next knot relies on.
fn symmetrize(p: &mut DMatrix<f64>) {
    let n = p.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (p[(i, j)] + p[(j, i)]);
            p[(i, j)] = avg;
            p[(j, i)] = avg;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::cost::QuadraticCost;
    use crate::model::Integrator;
    use crate::models::DoubleIntegrator;
    use crate::problem::Problem;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use traj_types::IlqrConfig;

    fn di_solver(r_scale: f64, cfg: IlqrConfig) -> IlqrSolver {
        let problem = Problem::with_uniform_step(
            Box::new(DoubleIntegrator::new(1)),
            Box::new(
                QuadraticCost::regulator(
                    DMatrix::identity(2, 2),
                    DMatrix::identity(1, 1) * r_scale,
                    DMatrix::identity(2, 2) * 10.0,
                )
                .unwrap(),
            ),
            Integrator::RungeKutta4,
            11,
            0.1,
            DVector::from_vec(vec![1.0, 0.0]),
        )
        .unwrap();
        IlqrSolver::new(problem, cfg).unwrap()
    }

    #[test]
    fn test_gain_equations_hold() {
        let mut s = di_solver(1.0, IlqrConfig::default());
        // Make the live trajectory dynamically consistent first.
        let (_, aborted) = s.rollout(0.0);
        assert!(!aborted);
        s.accept_rollout();

        let dv = s.backward_pass().unwrap();
        assert!(dv[0] < 0.0, "descent direction expected, dv = {dv:?}");

        // Quu_reg K = -Qux_reg and Quu_reg d = -Qu at every knot.
        for k in 0..10 {
            let lhs_k = &s.quu_reg[k] * &s.k_fb[k];
            let lhs_d = &s.quu_reg[k] * &s.d_ff[k];
            for i in 0..1 {
                for j in 0..2 {
                    assert_relative_eq!(
                        lhs_k[(i, j)],
                        -s.qux_reg[k][(i, j)],
                        epsilon = 1e-10,
                        max_relative = 1e-8
                    );
                }
                assert_relative_eq!(lhs_d[i], -s.qu[k][i], epsilon = 1e-10, max_relative = 1e-8);
            }
        }
    }

    #[test]
    fn test_ctg_stays_symmetric() {
        let mut s = di_solver(1.0, IlqrConfig::default().with_saved_ctg());
        s.rollout(0.0);
        s.accept_rollout();
        s.backward_pass().unwrap();

        let saved = s.saved.as_ref().unwrap();
        for p in &saved.hess {
            let asym = (p - p.transpose()).norm();
            assert!(asym <= 1e-12, "P asymmetry {asym}");
        }
    }

    #[test]
    fn test_indefinite_quu_restarts_and_recovers() {
        // A negative control weight makes Quu indefinite at rho = 0; the
        // floor is set high enough that one bump suffices.
        let cfg = IlqrConfig::default()
            .with_bp_reg()
            .regularization(0.0, 2.0, 1e8, 1.6);
        let mut s = di_solver(-1.0, cfg);
        s.rollout(0.0);
        s.accept_rollout();

        s.backward_pass().unwrap();
        assert!(s.rho() > 0.0, "regularization must have been raised");
        // Invariant 1 still holds on the regularized system.
        for k in 0..10 {
            let lhs = &s.quu_reg[k] * &s.d_ff[k];
            assert_relative_eq!(lhs[0], -s.qu[k][0], epsilon = 1e-9, max_relative = 1e-7);
        }
    }

    #[test]
    fn test_regularization_cap_is_terminal() {
        // Cap low enough that the indefinite Quu can never be repaired.
        let cfg = IlqrConfig::default()
            .with_bp_reg()
            .regularization(0.0, 1e-4, 0.5, 1.6);
        let mut s = di_solver(-1.0, cfg);
        s.rollout(0.0);
        s.accept_rollout();

        let err = s.backward_pass().unwrap_err();
        assert!(err.is_regularization_max());
        assert_eq!(s.status(), SolveStatus::RegularizationMax);
    }
}
