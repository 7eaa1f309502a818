//! Integration tests for gradient tapes.
//!
//! Covers the watch policies, persistence, multi-path accumulation and
//! nesting, with numerical gradient checks for the elementary operations.

use approx::assert_relative_eq;
use gradtape::autodiff::{GradientContext, TapeGraph, TapeOptions, TrackedValue, WatchPolicy};
use gradtape::{TapeError, Tensor};
use proptest::prelude::*;

/// Compute numerical gradient using central difference.
///
/// grad_i ≈ (f(x + eps*e_i) - f(x - eps*e_i)) / (2*eps)
fn numerical_gradient<F>(f: F, x: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + eps;
        x_minus[i] = x[i] - eps;

        grad[i] = (f(&x_plus) - f(&x_minus)) / (2.0 * eps);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }
    grad
}

fn scalar_grad(
    tape: &mut gradtape::Tape<f64>,
    output: &TrackedValue<f64>,
    input: &TrackedValue<f64>,
) -> f64 {
    let grad = tape.gradient(output, input).unwrap().expect("gradient");
    grad.item().expect("single element gradient")
}

#[test]
fn test_square_gradient() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| ctx.pow(&x, 2.0))
        .unwrap();

    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0);
}

#[test]
fn test_cube_gradient() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let (mut tape, h) = ctx
        .record(TapeOptions::default(), |ctx, _| ctx.pow(&x, 3.0))
        .unwrap();

    assert_relative_eq!(scalar_grad(&mut tape, &h, &x), 12.0);
}

#[test]
fn test_unwatched_constant_has_no_gradient() {
    let mut ctx = GradientContext::new();
    let x = ctx.constant(Tensor::from_slice(&[2.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| ctx.pow(&x, 2.0))
        .unwrap();

    assert!(tape.is_empty());
    assert_eq!(tape.gradient(&f, &x).unwrap(), None);
}

#[test]
fn test_explicitly_watched_constant() {
    let mut ctx = GradientContext::new();
    let x = ctx.constant(Tensor::from_slice(&[2.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, id| {
            ctx.watch(id, &x).unwrap();
            ctx.pow(&x, 2.0)
        })
        .unwrap();

    assert!(tape.is_watched(&x));
    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0);
}

#[test]
fn test_manual_policy_requires_watch() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));
    let manual = TapeOptions::new().with_watch_policy(WatchPolicy::Manual);

    let (mut tape, f) = ctx.record(manual, |ctx, _| ctx.pow(&x, 2.0)).unwrap();
    assert_eq!(tape.gradient(&f, &x).unwrap(), None);

    let (mut tape, f) = ctx
        .record(manual, |ctx, id| {
            ctx.watch(id, &x).unwrap();
            ctx.pow(&x, 2.0)
        })
        .unwrap();
    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0);
}

#[test]
fn test_watch_is_idempotent() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, id| {
            ctx.watch(id, &x).unwrap();
            ctx.watch(id, &x).unwrap();
            let f = ctx.pow(&x, 2.0);
            ctx.watch(id, &x).unwrap();
            f
        })
        .unwrap();

    assert_eq!(tape.watched().count(), 1);
    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0);
}

#[test]
fn test_persistent_tape_answers_many_queries() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let (mut tape, (f, h)) = ctx
        .record(TapeOptions::persistent_tape(), |ctx, _| {
            (ctx.pow(&x, 2.0), ctx.pow(&x, 3.0))
        })
        .unwrap();

    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0);
    assert_relative_eq!(scalar_grad(&mut tape, &h, &x), 12.0);
    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0);
    assert!(!tape.is_exhausted());
    assert_eq!(tape.len(), 2);
    tape.dispose();
}

#[test]
fn test_non_persistent_tape_is_exhausted_after_one_query() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let (mut tape, (f, h)) = ctx
        .record(TapeOptions::default(), |ctx, _| {
            (ctx.pow(&x, 2.0), ctx.pow(&x, 3.0))
        })
        .unwrap();

    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0);
    assert!(tape.is_empty());
    assert_eq!(
        tape.gradient(&h, &x).unwrap_err(),
        TapeError::TapeExhausted { tape: tape.id() }
    );
}

#[test]
fn test_unanswerable_query_still_uses_up_tape() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));
    let c = ctx.constant(Tensor::from_slice(&[1.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| ctx.pow(&x, 2.0))
        .unwrap();

    assert_eq!(tape.gradient(&f, &c).unwrap(), None);
    assert!(matches!(
        tape.gradient(&f, &x),
        Err(TapeError::TapeExhausted { .. })
    ));
}

#[test]
fn test_multi_path_gradients_are_summed() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| {
            let square = ctx.pow(&x, 2.0);
            let cube = ctx.pow(&x, 3.0);
            ctx.add(&square, &cube)
        })
        .unwrap();
    let f = f.unwrap();

    assert_relative_eq!(f.item().unwrap(), 12.0);
    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 16.0);
}

#[test]
fn test_same_operand_twice() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[3.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| ctx.mul(&x, &x))
        .unwrap();

    assert_relative_eq!(scalar_grad(&mut tape, &f.unwrap(), &x), 6.0);
}

#[test]
fn test_disconnected_values_have_no_gradient() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));
    let y = ctx.variable(Tensor::from_slice(&[5.0]));

    let (mut tape, (f, _g)) = ctx
        .record(TapeOptions::persistent_tape(), |ctx, _| {
            (ctx.pow(&x, 2.0), ctx.exp(&y))
        })
        .unwrap();

    assert!(tape.is_watched(&y));
    assert_eq!(tape.gradient(&f, &y).unwrap(), None);
    assert!(tape.gradient(&f, &x).unwrap().is_some());
}

#[test]
fn test_gradient_of_watched_leaf_is_identity() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0, 3.0]));

    let id = ctx.open(TapeOptions::default());
    ctx.watch(id, &x).unwrap();
    let mut tape = ctx.close(id).unwrap();

    let grad = tape.gradient(&x, &x).unwrap().unwrap();
    assert_eq!(grad.data(), &[1.0, 1.0]);
}

#[test]
fn test_gradient_with_respect_to_intermediate() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let (mut tape, (square, f)) = ctx
        .record(TapeOptions::persistent_tape(), |ctx, _| {
            let square = ctx.pow(&x, 2.0);
            let f = ctx.sin(&square);
            (square, f)
        })
        .unwrap();

    // df/d(x²) = cos(x²), df/dx = cos(x²) * 2x
    assert_relative_eq!(scalar_grad(&mut tape, &f, &square), 4.0f64.cos());
    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 4.0f64.cos() * 4.0);
}

#[test]
fn test_vector_gradient_sums_output() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[1.0, 2.0, 3.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| ctx.pow(&x, 2.0))
        .unwrap();

    let grad = tape.gradient(&f, &x).unwrap().unwrap();
    assert_eq!(grad.shape(), &[3]);
    assert_eq!(grad.data(), &[2.0, 4.0, 6.0]);
}

#[test]
fn test_gradient_with_seed() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[1.0, 2.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::persistent_tape(), |ctx, _| ctx.pow(&x, 2.0))
        .unwrap();

    let seed = Tensor::from_slice(&[10.0, 0.5]);
    let grad = tape.gradient_with_seed(&f, &x, seed).unwrap().unwrap();
    assert_eq!(grad.data(), &[20.0, 2.0]);

    let bad = tape.gradient_with_seed(&f, &x, Tensor::scalar(1.0));
    assert!(matches!(bad, Err(TapeError::IncompatibleShapes { .. })));
}

#[test]
fn test_gradients_for_several_inputs_in_one_query() {
    let mut ctx = GradientContext::new();
    let a = ctx.variable(Tensor::from_slice(&[3.0]));
    let b = ctx.variable(Tensor::from_slice(&[4.0]));
    let c = ctx.constant(Tensor::from_slice(&[5.0]));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| {
            let ab = ctx.mul(&a, &b)?;
            ctx.add(&ab, &c)
        })
        .unwrap();
    let f = f.unwrap();

    let grads = tape.gradients(&f, &[&a, &b, &c]).unwrap();
    assert_eq!(grads[0].as_ref().unwrap().item(), Some(4.0));
    assert_eq!(grads[1].as_ref().unwrap().item(), Some(3.0));
    assert!(grads[2].is_none());
    assert!(tape.is_exhausted());
}

#[test]
fn test_broadcast_scalar_operand() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[1.0, 2.0, 3.0]));
    let w = ctx.variable(Tensor::scalar(2.0));

    let (mut tape, loss) = ctx
        .record(TapeOptions::persistent_tape(), |ctx, _| {
            let y = ctx.mul(&x, &w)?;
            Ok::<_, TapeError>(ctx.sum(&y))
        })
        .unwrap();
    let loss = loss.unwrap();

    assert_relative_eq!(loss.item().unwrap(), 12.0);
    assert_relative_eq!(scalar_grad(&mut tape, &loss, &w), 6.0);
    let grad_x = tape.gradient(&loss, &x).unwrap().unwrap();
    assert_eq!(grad_x.data(), &[2.0, 2.0, 2.0]);
}

#[test]
fn test_incompatible_shapes_error() {
    let mut ctx = GradientContext::new();
    let a = ctx.variable(Tensor::from_slice(&[1.0, 2.0]));
    let b = ctx.variable(Tensor::from_slice(&[1.0, 2.0, 3.0]));

    let id = ctx.open(TapeOptions::default());
    let err = ctx.add(&a, &b).unwrap_err();
    let tape = ctx.close(id).unwrap();

    assert_eq!(
        err,
        TapeError::IncompatibleShapes {
            lhs: vec![2],
            rhs: vec![3]
        }
    );
    assert!(tape.is_empty());
}

#[test]
fn test_nested_tapes_both_differentiate() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));

    let outer = ctx.open(TapeOptions::default());
    let inner = ctx.open(TapeOptions::default());
    let f = ctx.pow(&x, 3.0);
    let mut inner_tape = ctx.close(inner).unwrap();
    let g = ctx.exp(&f);
    let mut outer_tape = ctx.close(outer).unwrap();

    assert_eq!(inner_tape.len(), 1);
    assert_eq!(outer_tape.len(), 2);
    assert_relative_eq!(scalar_grad(&mut inner_tape, &f, &x), 12.0);
    // dg/dx = e^(x³) * 3x²
    assert_relative_eq!(
        scalar_grad(&mut outer_tape, &g, &x),
        8.0f64.exp() * 12.0,
        max_relative = 1e-12
    );
    assert_eq!(inner_tape.gradient(&g, &x), Err(TapeError::TapeExhausted { tape: inner }));
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn test_value_from_other_context_keeps_its_identity() {
    let mut first = GradientContext::new();
    let mut second = GradientContext::new();
    let x = first.variable(Tensor::scalar(3.0));
    let y = second.variable(Tensor::scalar(5.0));
    assert_ne!(x.id(), y.id());

    let (mut tape, f) = second
        .record(TapeOptions::persistent_tape(), |ctx, _| ctx.pow(&x, 2.0))
        .unwrap();

    assert!(!tape.is_watched(&y));
    assert_eq!(tape.gradient(&f, &y).unwrap(), None);
    assert_relative_eq!(scalar_grad(&mut tape, &f, &x), 6.0);
}

#[test]
fn test_tape_graph_matches_gradient_availability() {
    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&[2.0]));
    let y = ctx.variable(Tensor::from_slice(&[1.0]));

    let (mut tape, (f, g)) = ctx
        .record(TapeOptions::persistent_tape(), |ctx, _| {
            (ctx.cos(&x), ctx.ln(&y))
        })
        .unwrap();

    let graph = TapeGraph::from_tape(&tape);
    for (output, input) in [(&f, &x), (&f, &y), (&g, &x), (&g, &y)] {
        let connected = graph.is_connected(input.id(), output.id());
        let grad = tape.gradient(output, input).unwrap();
        assert_eq!(connected, grad.is_some());
    }
}

#[test]
fn test_numerical_gradient_composite() {
    let eps = 1e-6;
    let data = vec![0.3, 1.2, 2.5];

    // f(x) = sum(sqrt(x) * exp(-x) / (1 + x²)) - sum(cos(x))
    let forward = |x: &[f64]| -> f64 {
        x.iter()
            .map(|&v| v.sqrt() * (-v).exp() / (1.0 + v * v) - v.cos())
            .sum()
    };
    let numerical = numerical_gradient(forward, &data, eps);

    let mut ctx = GradientContext::new();
    let x = ctx.variable(Tensor::from_slice(&data));
    let one = ctx.constant(Tensor::scalar(1.0));

    let (mut tape, loss) = ctx
        .record(TapeOptions::default(), |ctx, _| {
            let root = ctx.sqrt(&x);
            let neg = ctx.neg(&x);
            let decay = ctx.exp(&neg);
            let num = ctx.mul(&root, &decay)?;
            let sq = ctx.pow(&x, 2.0);
            let den = ctx.add(&one, &sq)?;
            let ratio = ctx.div(&num, &den)?;
            let cos = ctx.cos(&x);
            let diff = ctx.sub(&ratio, &cos)?;
            Ok::<_, TapeError>(ctx.sum(&diff))
        })
        .unwrap();
    let loss = loss.unwrap();
    assert_relative_eq!(loss.item().unwrap(), forward(&data), epsilon = 1e-12);

    let analytical = tape.gradient(&loss, &x).unwrap().unwrap();
    for (a, n) in analytical.data().iter().zip(numerical.iter()) {
        assert_relative_eq!(*a, *n, epsilon = 1e-6);
    }
}

#[test]
fn test_f32_gradients() {
    let mut ctx: GradientContext<f32> = GradientContext::new();
    let x = ctx.variable(Tensor::scalar(2.0f32));

    let (mut tape, f) = ctx
        .record(TapeOptions::default(), |ctx, _| ctx.pow(&x, 2.0))
        .unwrap();

    let grad = tape.gradient(&f, &x).unwrap().unwrap();
    assert_relative_eq!(grad.item().unwrap(), 4.0f32);
}

proptest! {
    #[test]
    fn prop_power_rule(x in 0.1f64..10.0, n in 1u32..6) {
        let n = f64::from(n);
        let mut ctx = GradientContext::new();
        let v = ctx.variable(Tensor::scalar(x));

        let (mut tape, f) = ctx
            .record(TapeOptions::default(), |ctx, _| ctx.pow(&v, n))
            .unwrap();

        let grad = tape.gradient(&f, &v).unwrap().unwrap().item().unwrap();
        let expected = n * x.powf(n - 1.0);
        prop_assert!((grad - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }

    #[test]
    fn prop_repeated_watch_does_not_change_gradient(x in -5.0f64..5.0, watches in 1usize..5) {
        let mut ctx = GradientContext::new();
        let v = ctx.constant(Tensor::scalar(x));

        let (mut tape, f) = ctx
            .record(TapeOptions::default(), |ctx, id| {
                for _ in 0..watches {
                    ctx.watch(id, &v).unwrap();
                }
                ctx.pow(&v, 2.0)
            })
            .unwrap();

        let grad = tape.gradient(&f, &v).unwrap().unwrap().item().unwrap();
        prop_assert!((grad - 2.0 * x).abs() < 1e-12);
    }

    #[test]
    fn prop_paths_sum(x in -3.0f64..3.0) {
        let mut ctx = GradientContext::new();
        let v = ctx.variable(Tensor::scalar(x));

        let (mut tape, f) = ctx
            .record(TapeOptions::default(), |ctx, _| {
                let a = ctx.pow(&v, 2.0);
                let b = ctx.pow(&v, 3.0);
                ctx.add(&a, &b)
            })
            .unwrap();

        let grad = tape.gradient(&f.unwrap(), &v).unwrap().unwrap().item().unwrap();
        let expected = 2.0 * x + 3.0 * x * x;
        prop_assert!((grad - expected).abs() < 1e-9);
    }
}
