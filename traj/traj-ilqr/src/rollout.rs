//! Forward rollout with line-search step scaling.
//!
//! Simulates the closed-loop system under the current feedback law,
//! `u_k = u_k + alpha * d_k + K_k * (x_tmp_k (-) x_k)`, writing the candidate
//! trajectory into the scratch buffers. Runaway states or controls abort the
//! rollout early with the matching limit status; the returned cost is then
//! meaningless and must not be used.

use nalgebra::DVector;
use traj_types::SolveStatus;

use crate::solver::IlqrSolver;

/// Simulate the feedback law at step size `alpha`.
///
/// Returns `(cost, aborted)`. On a clean pass the candidate trajectory is in
/// `xs_tmp`/`us_tmp`, the status is reset to [`SolveStatus::Unsolved`], and
/// the caller compares `cost` against
/// [`IlqrSolver::expected_reduction`] to decide acceptance. On abort the
/// return is `(0.0, true)` and the status is [`SolveStatus::StateLimit`] or
/// [`SolveStatus::ControlLimit`].
///
/// At `alpha = 0` with a dynamically consistent live trajectory the rollout
/// reproduces `(xs, us)` exactly up to round-off.
pub fn rollout(s: &mut IlqrSolver, alpha: f64) -> (f64, bool) {
    let num_knots = s.problem.num_knots();
    let ir = s.problem.integrator();
    let mut cost = 0.0;

    s.xs_tmp[0].copy_from(&s.xs[0]);

    for k in 0..num_knots - 1 {
        // Feedback law on the deviation from the reference trajectory.
        s.problem
            .model()
            .state_diff(&mut s.dx_tmp, &s.xs_tmp[k], &s.xs[k]);
        s.us_tmp[k].copy_from(&s.d_ff[k]);
        s.us_tmp[k] *= alpha;
        s.us_tmp[k].gemv(1.0, &s.k_fb[k], &s.dx_tmp, 1.0);
        s.us_tmp[k] += &s.us[k];

        let t = s.problem.times()[k];
        let dt = s.problem.dt(k);
        let (head, tail) = s.xs_tmp.split_at_mut(k + 1);
        s.problem
            .model()
            .discrete_dynamics(&mut tail[0], ir, &head[k], &s.us_tmp[k], t, dt);

        // Runaway guards. The negated comparisons trip on NaN as well.
        let x_norm = inf_norm(&tail[0]);
        if !(x_norm <= s.cfg.max_state_value) {
            s.status = SolveStatus::StateLimit;
            return (0.0, true);
        }
        let u_norm = inf_norm(&s.us_tmp[k]);
        if !(u_norm <= s.cfg.max_control_value) {
            s.status = SolveStatus::ControlLimit;
            return (0.0, true);
        }

        cost += s.problem.objective().stage_cost(&head[k], &s.us_tmp[k], k);
    }

    cost += s.problem.objective().terminal_cost(&s.xs_tmp[num_knots - 1]);
    s.status = SolveStatus::Unsolved;
    (cost, false)
}

/// Infinity norm that poisons on NaN: any NaN component yields NaN, so the
/// caller's `!(norm <= limit)` guard trips.
fn inf_norm(v: &DVector<f64>) -> f64 {
    let mut worst = 0.0_f64;
    for value in v.iter() {
        let a = value.abs();
        if a.is_nan() {
            return f64::NAN;
        }
        if a > worst {
            worst = a;
        }
    }
    worst
}
