use std::{cell::Cell, rc::Rc};

use approx::assert_abs_diff_eq;
use lensograd::{ops, Graph, GraphError, LensError, Node, Operation, Phase, Variables, Visit};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// f = x1 * exp(-0.5 * (x1^2 + x2^2))
fn gaussian(graph: &Graph) -> Node {
    let x1 = graph.scalar("x1");
    let x2 = graph.scalar("x2");
    let x1sq = ops::constpow(x1, 2.);
    let x2sq = ops::constpow(x2, 2.);
    let sum = ops::add(x1sq, x2sq);
    let minhalf = ops::constmult(-0.5, sum);
    ops::mult(x1, ops::exp(minhalf))
}

fn gaussian_vars() -> Variables {
    Variables::new().with_scalar("x1", 2.).with_scalar("x2", 0.5)
}

#[test]
fn forward_mode() {
    init_logger();
    let graph = Graph::new();
    let f = gaussian(&graph);
    let vars = gaussian_vars();

    let dx1 = f.forward("x1", &vars).unwrap();
    assert_abs_diff_eq!(dx1.value, 0.24, epsilon = 0.003);
    assert_abs_diff_eq!(dx1.derivative, -0.36, epsilon = 0.003);

    let dx2 = f.forward("x2", &vars).unwrap();
    assert_abs_diff_eq!(dx2.value, 0.24, epsilon = 0.003);
    assert_abs_diff_eq!(dx2.derivative, -0.12, epsilon = 0.003);
}

#[test]
fn reverse_mode() {
    init_logger();
    let graph = Graph::new();
    let f = gaussian(&graph);
    let (value, grads) = f.reverse(&gaussian_vars()).unwrap();
    assert_abs_diff_eq!(value, 0.24, epsilon = 0.003);
    assert_abs_diff_eq!(grads.scalar("x1").unwrap(), -0.36, epsilon = 0.003);
    assert_abs_diff_eq!(grads.scalar("x2").unwrap(), -0.12, epsilon = 0.003);
}

#[test]
fn modes_agree() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let y = graph.scalar("y");
    let z = graph.scalar("z");
    let xy = x * y;
    let f = (xy / (z + 4.)).exp() + (xy * z).ln() - 2. / (x - y) + xy.powf(3.);
    let vars = Variables::new()
        .with_scalar("x", 1.3)
        .with_scalar("y", 0.7)
        .with_scalar("z", 2.1);

    let (value, grads) = f.reverse(&vars).unwrap();
    for name in ["x", "y", "z"] {
        let tangent = f.forward(name, &vars).unwrap();
        assert_abs_diff_eq!(tangent.value, value, epsilon = 1e-12);
        assert_abs_diff_eq!(tangent.derivative, grads.scalar(name).unwrap(), epsilon = 1e-9);
    }
}

#[test]
fn identity() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let vars = Variables::new().with_scalar("x", 42.);
    let (value, grads) = x.reverse(&vars).unwrap();
    assert_eq!(value, 42.);
    assert_eq!(grads.scalar("x"), Some(1.));
    let tangent = x.forward("x", &vars).unwrap();
    assert_eq!(tangent.value, 42.);
    assert_eq!(tangent.derivative, 1.);
}

struct CountingMul {
    calls: Rc<Cell<usize>>,
}

impl Operation for CountingMul {
    fn name(&self) -> String {
        "counting_mul".to_string()
    }
    fn value(&self, inputs: &[f64]) -> f64 {
        self.calls.set(self.calls.get() + 1);
        inputs[0] * inputs[1]
    }
    fn deriv(&self, inputs: &[f64]) -> Vec<f64> {
        vec![inputs[1], inputs[0]]
    }
}

#[test]
fn shared_subexpression_evaluated_once() {
    let graph = Graph::new();
    let calls = Rc::new(Cell::new(0));
    let x = graph.scalar("x");
    let y = graph.scalar("y");
    let counted = graph.custom(
        CountingMul {
            calls: calls.clone(),
        },
        &[x, y],
    );
    let f = (counted + 1.) * (counted * 2.);
    let vars = Variables::new().with_scalar("x", 2.).with_scalar("y", 3.);

    let (value, grads) = f.reverse(&vars).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(value, 7. * 12.);
    // d/dp (p + 1) * 2p = 4p + 2 = 26
    assert_eq!(grads.scalar("x"), Some(26. * 3.));
    assert_eq!(grads.scalar("y"), Some(26. * 2.));

    calls.set(0);
    f.forward("x", &vars).unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn stateless() {
    let graph = Graph::new();
    let f = gaussian(&graph);
    let vars = gaussian_vars();
    let (v1, g1) = f.reverse(&vars).unwrap();
    let (v2, g2) = f.reverse(&vars).unwrap();
    assert_eq!(v1.to_bits(), v2.to_bits());
    for name in ["x1", "x2"] {
        assert_eq!(
            g1.scalar(name).unwrap().to_bits(),
            g2.scalar(name).unwrap().to_bits()
        );
    }
}

#[test]
fn duplicate_leaves_accumulate() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let x_again = graph.scalar("x");
    let f = x * 3. + x_again * 4.;
    let vars = Variables::new().with_scalar("x", 1.);
    let (_, grads) = f.reverse(&vars).unwrap();
    assert_eq!(grads.scalar("x"), Some(7.));
    assert_eq!(f.forward("x", &vars).unwrap().derivative, 7.);
}

#[test]
fn unbound_variable() {
    let graph = Graph::new();
    let f = graph.scalar("x") + graph.scalar("missing");
    let vars = Variables::new().with_scalar("x", 1.);
    let expected = GraphError::UnboundVariable {
        name: "missing".to_string(),
    };
    assert_eq!(f.reverse(&vars).unwrap_err(), expected);
    assert_eq!(f.forward("x", &vars).unwrap_err(), expected);
}

#[test]
fn storage_mismatch() {
    let graph = Graph::new();
    let f = graph.scalar("w") * 2.;
    let vars = Variables::new().with_matrix("w", lensograd::Matrix::zeros(2, 2));
    assert_eq!(
        f.reverse(&vars).unwrap_err(),
        GraphError::StorageMismatch {
            name: "w".to_string(),
            source: LensError::WrongKind {
                expected: "scalar",
                found: "matrix",
            },
        }
    );
}

#[test]
fn derivative_arity() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let bad = graph.operation("bad", &[x, x], |v| v[0] + v[1], |_| vec![1.]);
    let vars = Variables::new().with_scalar("x", 1.);
    assert_eq!(
        bad.reverse(&vars).unwrap_err(),
        GraphError::DerivativeArity {
            name: "bad".to_string(),
            expected: 2,
            actual: 1,
        }
    );
    assert!(bad.forward("x", &vars).is_err());
}

#[test]
fn failed_update_leaves_variables_untouched() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let y = graph.scalar("y");
    let bad = graph.operation("bad", &[y, y], |v| v[0] * v[1], |_| vec![1.]);
    let f = bad + x * 2.;
    let mut vars = Variables::new().with_scalar("x", 1.).with_scalar("y", 3.);
    let before = vars.clone();

    let err = f
        .reverse_update(&mut vars, |_, current, grad| current - 0.5 * grad)
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::DerivativeArity {
            name: "bad".to_string(),
            expected: 2,
            actual: 1,
        }
    );
    assert_eq!(vars, before);
}

#[test]
fn non_finite_values_propagate() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let f = 1. / x;
    let vars = Variables::new().with_scalar("x", 0.);
    let (value, grads) = f.reverse(&vars).unwrap();
    assert!(value.is_infinite());
    assert!(!grads.scalar("x").unwrap().is_finite());
    let (value, _) = x.ln().reverse(&Variables::new().with_scalar("x", -1.)).unwrap();
    assert!(value.is_nan());
}

#[test]
fn observer_sees_both_phases() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let y = graph.scalar("y");
    let f = x * y;
    let vars = Variables::new().with_scalar("x", 2.).with_scalar("y", 3.);
    let visits = std::cell::RefCell::new(vec![]);
    f.reverse_cb(&vars, &|visit: &Visit| {
        visits
            .borrow_mut()
            .push((visit.phase, visit.name.to_string(), visit.number))
    })
    .unwrap();
    let visits = visits.into_inner();
    assert_eq!(visits.len(), 6);
    assert_eq!(visits[2].0, Phase::Value);
    assert_eq!(visits[2].2, 6.);
    assert_eq!(visits[3], (Phase::Adjoint, f.name(), 1.));
    let adjoints: Vec<_> = visits[4..]
        .iter()
        .map(|(_, name, number)| (name.as_str(), *number))
        .collect();
    assert!(adjoints.contains(&("x", 3.)));
    assert!(adjoints.contains(&("y", 2.)));
}
