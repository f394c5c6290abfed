//! Forward mode: one pass carrying each node's value together with its
//! derivative with respect to a single variable.

use crate::{
    error::GraphError,
    graph::{partials, read_variable, traverse, GraphNode, Node, NodeKind},
    storage::Variables,
    trace::{noop, Phase, Visit},
};

/// A value and its directional derivative.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tangent {
    pub value: f64,
    pub derivative: f64,
}

impl<'a> Node<'a> {
    /// Evaluate this node and its derivative with respect to the variable `wrt`.
    /// Every leaf bound to `wrt` is seeded with 1, so for a matrix variable the
    /// result is the derivative along the all-ones direction.
    pub fn forward(&self, wrt: &str, vars: &Variables) -> Result<Tangent, GraphError> {
        self.forward_cb(wrt, vars, &noop)
    }

    /// Same as [`Node::forward`], calling `callback` with the derivative of every
    /// node as it settles.
    pub fn forward_cb(
        &self,
        wrt: &str,
        vars: &Variables,
        callback: &impl Fn(&Visit),
    ) -> Result<Tangent, GraphError> {
        let nodes = self.graph.nodes();
        let ret = forward_pass(&nodes, self.idx, wrt, vars, callback)?;
        log::debug!(
            "forward a{} wrt {wrt}: value {}, derivative {}",
            self.idx,
            ret.value,
            ret.derivative
        );
        Ok(ret)
    }
}

/// Free-function form of [`Node::forward`].
pub fn forward(node: Node, wrt: &str, vars: &Variables) -> Result<Tangent, GraphError> {
    node.forward(wrt, vars)
}

fn forward_pass(
    nodes: &[GraphNode],
    root: u32,
    wrt: &str,
    vars: &Variables,
    callback: &dyn Fn(&Visit),
) -> Result<Tangent, GraphError> {
    let mut memo = vec![Tangent::default(); nodes.len()];
    traverse(
        nodes,
        root,
        |_| (),
        |idx, node| {
            let tangent = match &node.kind {
                NodeKind::Variable { var, lens } => Tangent {
                    value: read_variable(vars, var, lens.as_ref())?,
                    derivative: if var == wrt { 1. } else { 0. },
                },
                NodeKind::Operation { inputs, op } => {
                    let args: Vec<f64> = inputs.iter().map(|&i| memo[i as usize].value).collect();
                    let derivs = partials(&node.name, op.as_ref(), &args)?;
                    let derivative = inputs
                        .iter()
                        .zip(derivs)
                        .map(|(&i, d)| memo[i as usize].derivative * d)
                        .sum();
                    Tangent {
                        value: op.value(&args),
                        derivative,
                    }
                }
            };
            log::trace!("forward a{idx} {}: {tangent:?}", node.name);
            callback(&Visit {
                phase: Phase::Forward,
                idx,
                name: &node.name,
                number: tangent.derivative,
            });
            memo[idx as usize] = tangent;
            Ok(())
        },
    )?;
    Ok(memo[root as usize])
}

#[test]
fn test_forward_chain() {
    let graph = crate::Graph::new();
    let x = graph.scalar("x");
    let y = graph.scalar("y");
    let f = x * x * y + 3. * y;
    let vars = Variables::new().with_scalar("x", 2.).with_scalar("y", 5.);
    let dx = f.forward("x", &vars).unwrap();
    assert_eq!(dx.value, 35.);
    assert_eq!(dx.derivative, 20.);
    let dy = f.forward("y", &vars).unwrap();
    assert_eq!(dy.derivative, 7.);
    let dz = f.forward("z", &vars).unwrap();
    assert_eq!(dz.derivative, 0.);
}

#[test]
fn test_forward_callback() {
    let graph = crate::Graph::new();
    let x = graph.scalar("x");
    let f = (x + x).exp();
    let vars = Variables::new().with_scalar("x", 0.);
    let visited = std::cell::RefCell::new(vec![]);
    f.forward_cb("x", &vars, &|visit: &Visit| visited.borrow_mut().push(visit.idx))
        .unwrap();
    assert_eq!(*visited.borrow(), vec![x.index(), 1, f.index()]);
}
