//! End-to-end solver behavior on linear-quadratic and nonlinear problems.

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use traj_ilqr::models::{DoubleIntegrator, Pendulum};
use traj_ilqr::{IlqrSolver, Integrator, Problem, QuadraticCost, SolveStatus};
use traj_types::IlqrConfig;

/// Double integrator, N = 51, dt = 0.1, Q = I, R = I, Qf = 10 I, from (1, 0).
fn double_integrator_solver(cfg: IlqrConfig) -> IlqrSolver {
    let problem = Problem::with_uniform_step(
        Box::new(DoubleIntegrator::new(1)),
        Box::new(
            QuadraticCost::regulator(
                DMatrix::identity(2, 2),
                DMatrix::identity(1, 1),
                DMatrix::identity(2, 2) * 10.0,
            )
            .unwrap(),
        ),
        Integrator::RungeKutta4,
        51,
        0.1,
        DVector::from_vec(vec![1.0, 0.0]),
    )
    .unwrap();
    let mut solver = IlqrSolver::new(problem, cfg).unwrap();
    // Seed the live trajectory from the zero-control rollout.
    let (_, aborted) = solver.rollout(0.0);
    assert!(!aborted);
    solver.accept_rollout();
    solver
}

#[test]
fn one_step_solves_the_lqr_problem() {
    let mut solver = double_integrator_solver(IlqrConfig::default());
    let j0 = solver.cost();
    assert_relative_eq!(j0, 30.0, max_relative = 1e-12);

    let dv = solver.backward_pass().unwrap();
    let (j1, aborted) = solver.rollout(1.0);
    assert!(!aborted);

    // Linear dynamics + quadratic cost: the quadratic model is exact, so
    // the predicted and actual reductions agree to round-off.
    let actual = j1 - j0;
    let predicted = dv[0] + dv[1];
    assert!((actual - predicted).abs() <= 1e-6 * j0);
    assert_relative_eq!(predicted, solver.expected_reduction(1.0), max_relative = 1e-12);

    // The feedback drives the state near the origin by the final knot.
    solver.accept_rollout();
    let x_n = &solver.xs[50];
    assert!(x_n.norm() <= 2.5e-2, "terminal state too large: {}", x_n.norm());
    assert!(j1 < j0);

    // A second backward pass finds nothing left to gain: the first step
    // landed on the LQR optimum.
    let dv2 = solver.backward_pass().unwrap();
    assert!(
        (dv2[0] + dv2[1]).abs() <= 1e-9,
        "still predicting reduction at the optimum: {dv2:?}"
    );
    let (j2, aborted) = solver.rollout(1.0);
    assert!(!aborted);
    assert_relative_eq!(j2, j1, max_relative = 1e-9);
}

#[test]
fn predicted_reduction_matches_actual_along_the_line_search() {
    let mut solver = double_integrator_solver(IlqrConfig::default());
    let j0 = solver.cost();
    solver.backward_pass().unwrap();

    for alpha in [0.25, 0.5, 0.75, 1.0] {
        let (j, aborted) = solver.rollout(alpha);
        assert!(!aborted);
        assert_relative_eq!(j - j0, solver.expected_reduction(alpha), max_relative = 1e-9);
    }
}

#[test]
fn alpha_zero_rollout_reproduces_the_live_trajectory() {
    let mut solver = double_integrator_solver(IlqrConfig::default());
    let j0 = solver.cost();
    solver.backward_pass().unwrap();

    // Even with the freshly computed (nonzero) gains in place.
    let (j, aborted) = solver.rollout(0.0);
    assert!(!aborted);
    assert_relative_eq!(j, j0, max_relative = 1e-12);
    for k in 0..51 {
        assert_relative_eq!(solver.xs_tmp[k][0], solver.xs[k][0], epsilon = 1e-12);
        assert_relative_eq!(solver.xs_tmp[k][1], solver.xs[k][1], epsilon = 1e-12);
    }
}

#[test]
fn gains_satisfy_the_factorized_equations() {
    let mut solver = double_integrator_solver(IlqrConfig::default());
    solver.backward_pass().unwrap();

    for k in 0..50 {
        let kk = &solver.quu_reg[k] * &solver.k_fb[k];
        let dd = &solver.quu_reg[k] * &solver.d_ff[k];
        for j in 0..2 {
            assert_relative_eq!(
                kk[(0, j)],
                -solver.qux_reg[k][(0, j)],
                epsilon = 1e-10,
                max_relative = 1e-8
            );
        }
        assert_relative_eq!(dd[0], -solver.qu[k][0], epsilon = 1e-10, max_relative = 1e-8);
    }
}

#[test]
fn expected_reduction_recomputes_from_persisted_state() {
    let mut solver = double_integrator_solver(IlqrConfig::default().with_saved_ctg());
    let dv = solver.backward_pass().unwrap();

    // Recompute both parts from the persisted per-knot expansions.
    let mut dv1 = 0.0;
    let mut dv2 = 0.0;
    for k in 0..50 {
        dv1 += solver.d_ff[k].dot(&solver.qu[k]);
        dv2 += 0.5 * solver.d_ff[k].dot(&(&solver.quu[k] * &solver.d_ff[k]));
    }
    assert_relative_eq!(dv[0], dv1, max_relative = 1e-12);
    assert_relative_eq!(dv[1], dv2, max_relative = 1e-12);

    // And from the per-knot contributions the pass recorded.
    let saved = solver.saved.as_ref().unwrap();
    let sum1: f64 = saved.dv.iter().map(|c| c[0]).sum();
    let sum2: f64 = saved.dv.iter().map(|c| c[1]).sum();
    assert_relative_eq!(dv[0], sum1, max_relative = 1e-12);
    assert_relative_eq!(dv[1], sum2, max_relative = 1e-12);

    // Persisted cost-to-go Hessians stay symmetric.
    for p in &saved.hess {
        assert!((p - p.transpose()).norm() <= 1e-12);
    }
}

#[test]
fn control_limit_aborts_the_aggressive_first_step() {
    // The unconstrained LQR step wants |u_0| ~ 0.92, so a 0.5 cap trips.
    let mut solver = double_integrator_solver(IlqrConfig::default().max_control_value(0.5));
    solver.backward_pass().unwrap();

    let (j, aborted) = solver.rollout(1.0);
    assert!(aborted);
    assert_eq!(j, 0.0);
    assert_eq!(solver.status(), SolveStatus::ControlLimit);

    // A small enough step stays under the cap and still improves.
    let j0 = solver.cost();
    let (j_small, aborted) = solver.rollout(0.25);
    assert!(!aborted);
    assert!(j_small < j0);
    assert_eq!(solver.status(), SolveStatus::Unsolved);
}

#[test]
fn state_limit_below_initial_state_aborts_immediately() {
    let mut solver = double_integrator_solver(IlqrConfig::default().max_state_value(0.5));
    let (j, aborted) = solver.rollout(1.0);
    assert!(aborted);
    assert_eq!(j, 0.0);
    assert_eq!(solver.status(), SolveStatus::StateLimit);
}

#[test]
fn indefinite_quu_restarts_within_bounded_attempts() {
    // A negative control weight makes Quu indefinite at rho = 0. With the
    // floor at 1.0 the compounding rate repairs it in very few restarts.
    let problem = Problem::with_uniform_step(
        Box::new(DoubleIntegrator::new(1)),
        Box::new(
            QuadraticCost::regulator(
                DMatrix::identity(2, 2),
                DMatrix::identity(1, 1) * -1.0,
                DMatrix::identity(2, 2) * 10.0,
            )
            .unwrap(),
        ),
        Integrator::RungeKutta4,
        51,
        0.1,
        DVector::from_vec(vec![1.0, 0.0]),
    )
    .unwrap();
    let cfg = IlqrConfig::default()
        .with_bp_reg()
        .regularization(0.0, 1.0, 1e8, 1.6);
    let mut solver = IlqrSolver::new(problem, cfg).unwrap();
    solver.rollout(0.0);
    solver.accept_rollout();

    solver.backward_pass().unwrap();
    assert!(solver.rho() > 0.0);
    // The adaptive rate grows once per restart: at most five of them.
    assert!(
        solver.regularization().rate() <= 1.6_f64.powi(5) + 1e-9,
        "too many restarts: rate = {}",
        solver.regularization().rate()
    );

    // Invariant: the gains still solve the regularized systems.
    for k in 0..50 {
        let dd = &solver.quu_reg[k] * &solver.d_ff[k];
        assert_relative_eq!(dd[0], -solver.qu[k][0], epsilon = 1e-9, max_relative = 1e-7);
        let kk = &solver.quu_reg[k] * &solver.k_fb[k];
        for j in 0..2 {
            assert_relative_eq!(
                kk[(0, j)],
                -solver.qux_reg[k][(0, j)],
                epsilon = 1e-9,
                max_relative = 1e-7
            );
        }
    }
}

#[test]
fn pendulum_regulation_converges_with_line_search() {
    // Nonlinear smoke test: drive a damped pendulum from 0.5 rad to rest.
    let problem = Problem::with_uniform_step(
        Box::new(Pendulum::default()),
        Box::new(
            QuadraticCost::regulator(
                DMatrix::identity(2, 2),
                DMatrix::identity(1, 1) * 0.1,
                DMatrix::identity(2, 2) * 100.0,
            )
            .unwrap(),
        ),
        Integrator::RungeKutta3,
        41,
        0.05,
        DVector::from_vec(vec![0.5, 0.0]),
    )
    .unwrap();
    let mut solver = IlqrSolver::new(problem, IlqrConfig::default()).unwrap();
    solver.rollout(0.0);
    solver.accept_rollout();

    let j_initial = solver.cost();
    let mut j_prev = j_initial;
    for _ in 0..20 {
        let dv = solver.backward_pass().unwrap();
        if (dv[0] + dv[1]).abs() < 1e-10 {
            break;
        }
        // Backtracking line search driven by the expected reduction.
        let mut alpha = 1.0;
        let mut accepted = false;
        for _ in 0..10 {
            let (j, aborted) = solver.rollout(alpha);
            if !aborted && j < j_prev {
                solver.accept_rollout();
                j_prev = j;
                accepted = true;
                break;
            }
            alpha *= 0.5;
        }
        assert!(accepted, "line search failed to find a decreasing step");
    }

    assert!(
        j_prev < 0.1 * j_initial,
        "pendulum cost barely improved: {j_prev} vs {j_initial}"
    );
    let x_n = &solver.xs[40];
    assert!(x_n.norm() < 0.1, "pendulum not regulated: {x_n}");
}
