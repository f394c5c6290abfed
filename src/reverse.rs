//! Reverse mode, aka backpropagation.
//! See https://rufflewind.com/2016-12-30/reverse-mode-automatic-differentiation
//!
//! The first pass computes every node value and local partial derivatives once
//! and counts the parent edges (fan-in) into each node. The second pass releases
//! a node's adjoint to its inputs only after all of its parents have contributed,
//! which keeps the gradient correct when subexpressions are shared.
//!
//! Everything that can fail happens in the first pass, so an update rule never
//! leaves the environment half-written.

use crate::{
    error::GraphError,
    graph::{lens_error, partials, read_variable, traverse, GraphNode, Node, NodeKind},
    storage::Variables,
    trace::{noop, Phase, Visit},
};

/// An in-place update applied to every leaf as its gradient settles.
/// Arguments are `(loss, current, gradient)`; the return value replaces the current value.
pub type UpdateFn<'f> = dyn FnMut(f64, f64, f64) -> f64 + 'f;

struct ValuePass {
    values: Vec<f64>,
    /// Partials of each operation with respect to its inputs; empty for leaves.
    partials: Vec<Vec<f64>>,
    fan_in: Vec<u32>,
}

struct Update<'e, 'f> {
    vars: &'e mut Variables,
    rule: &'e mut UpdateFn<'f>,
}

impl<'a> Node<'a> {
    /// Evaluate this node and the gradient of it with respect to every variable
    /// it depends on. The gradient map has the same shape as the environment.
    pub fn reverse(&self, vars: &Variables) -> Result<(f64, Variables), GraphError> {
        self.reverse_cb(vars, &noop)
    }

    pub fn reverse_cb(
        &self,
        vars: &Variables,
        callback: &impl Fn(&Visit),
    ) -> Result<(f64, Variables), GraphError> {
        let nodes = self.graph.nodes();
        let pass = value_pass(&nodes, self.idx, vars, callback)?;
        let gradients = adjoint_pass(&nodes, self.idx, &pass, None, callback)?;
        let value = pass.values[self.idx as usize];
        log::debug!("reverse a{}: value {value}", self.idx);
        Ok((value, gradients))
    }

    /// Like [`Node::reverse`], but also overwrites every leaf's cell in `vars`
    /// with `rule(loss, current, gradient)` as soon as its gradient is final.
    ///
    /// Neither `rule` nor a callback may add nodes to the graph being evaluated.
    pub fn reverse_update(
        &self,
        vars: &mut Variables,
        mut rule: impl FnMut(f64, f64, f64) -> f64,
    ) -> Result<(f64, Variables), GraphError> {
        self.reverse_update_cb(vars, &mut rule, &noop)
    }

    pub fn reverse_update_cb(
        &self,
        vars: &mut Variables,
        rule: &mut UpdateFn<'_>,
        callback: &impl Fn(&Visit),
    ) -> Result<(f64, Variables), GraphError> {
        let nodes = self.graph.nodes();
        let pass = value_pass(&nodes, self.idx, vars, callback)?;
        let update = Update { vars, rule };
        let gradients = adjoint_pass(&nodes, self.idx, &pass, Some(update), callback)?;
        let value = pass.values[self.idx as usize];
        log::debug!("reverse a{} with update: value {value}", self.idx);
        Ok((value, gradients))
    }
}

/// Free-function form of [`Node::reverse`].
pub fn reverse(node: Node, vars: &Variables) -> Result<(f64, Variables), GraphError> {
    node.reverse(vars)
}

/// Free-function form of [`Node::reverse_update`].
pub fn reverse_update(
    node: Node,
    vars: &mut Variables,
    rule: impl FnMut(f64, f64, f64) -> f64,
) -> Result<(f64, Variables), GraphError> {
    node.reverse_update(vars, rule)
}

fn value_pass(
    nodes: &[GraphNode],
    root: u32,
    vars: &Variables,
    callback: &dyn Fn(&Visit),
) -> Result<ValuePass, GraphError> {
    let mut values = vec![0.; nodes.len()];
    let mut derivs = vec![vec![]; nodes.len()];
    let mut fan_in = vec![0u32; nodes.len()];
    // The root is its own single parent.
    fan_in[root as usize] = 1;
    traverse(
        nodes,
        root,
        |input| fan_in[input as usize] += 1,
        |idx, node| {
            let value = match &node.kind {
                NodeKind::Variable { var, lens } => read_variable(vars, var, lens.as_ref())?,
                NodeKind::Operation { inputs, op } => {
                    let args: Vec<f64> = inputs.iter().map(|&i| values[i as usize]).collect();
                    derivs[idx as usize] = partials(&node.name, op.as_ref(), &args)?;
                    op.value(&args)
                }
            };
            log::trace!("value a{idx} {}: {value}", node.name);
            callback(&Visit {
                phase: Phase::Value,
                idx,
                name: &node.name,
                number: value,
            });
            values[idx as usize] = value;
            Ok(())
        },
    )?;
    Ok(ValuePass {
        values,
        partials: derivs,
        fan_in,
    })
}

fn adjoint_pass(
    nodes: &[GraphNode],
    root: u32,
    pass: &ValuePass,
    mut update: Option<Update<'_, '_>>,
    callback: &dyn Fn(&Visit),
) -> Result<Variables, GraphError> {
    let loss = pass.values[root as usize];
    let mut adjoints = vec![0.; nodes.len()];
    let mut visits = vec![0u32; nodes.len()];
    let mut gradients = Variables::new();

    adjoints[root as usize] = 1.;
    visits[root as usize] = 1;
    let mut ready = vec![root];

    while let Some(idx) = ready.pop() {
        let node = &nodes[idx as usize];
        let adjoint = adjoints[idx as usize];
        log::trace!("adjoint a{idx} {}: {adjoint}", node.name);
        callback(&Visit {
            phase: Phase::Adjoint,
            idx,
            name: &node.name,
            number: adjoint,
        });

        match &node.kind {
            NodeKind::Variable { var, lens } => {
                // Several leaves may address the same cell, so accumulate.
                let grad = gradients
                    .entry(var)
                    .or_insert_with(|| lens.init());
                let acc = lens.get(grad).map_err(lens_error(var))?;
                lens.set(grad, acc + adjoint).map_err(lens_error(var))?;

                if let Some(update) = update.as_mut() {
                    let storage = update.vars.get_mut(var).ok_or_else(|| {
                        GraphError::UnboundVariable {
                            name: var.to_string(),
                        }
                    })?;
                    let current = lens.get(storage).map_err(lens_error(var))?;
                    let new_value = (update.rule)(loss, current, adjoint);
                    lens.set(storage, new_value).map_err(lens_error(var))?;
                }
            }
            NodeKind::Operation { inputs, .. } => {
                for (&input, &deriv) in inputs.iter().zip(&pass.partials[idx as usize]) {
                    let input_idx = input as usize;
                    adjoints[input_idx] += adjoint * deriv;
                    visits[input_idx] += 1;
                    if visits[input_idx] == pass.fan_in[input_idx] {
                        ready.push(input);
                    }
                }
            }
        }
    }

    Ok(gradients)
}

#[test]
fn test_fan_in() {
    let graph = crate::Graph::new();
    let x = graph.scalar("x");
    let y = graph.scalar("y");
    let xy = x * y;
    let f = xy * xy + x;
    let vars = Variables::new().with_scalar("x", 1.).with_scalar("y", 1.);
    let nodes = graph.nodes();
    let pass = value_pass(&nodes, f.index(), &vars, &noop).unwrap();
    assert_eq!(pass.fan_in[x.index() as usize], 2);
    assert_eq!(pass.fan_in[y.index() as usize], 1);
    assert_eq!(pass.fan_in[xy.index() as usize], 2);
    assert_eq!(pass.fan_in[f.index() as usize], 1);
}

#[test]
fn test_unreachable_nodes_are_skipped() {
    let graph = crate::Graph::new();
    let x = graph.scalar("x");
    let _unused = graph.scalar("unbound") * x;
    let f = x * 2.;
    let vars = Variables::new().with_scalar("x", 3.);
    let (value, grads) = f.reverse(&vars).unwrap();
    assert_eq!(value, 6.);
    assert_eq!(grads.scalar("x"), Some(2.));
    assert!(grads.get("unbound").is_none());
}

#[test]
fn test_update_rule_sees_loss() {
    let graph = crate::Graph::new();
    let x = graph.scalar("x");
    let f = x * x;
    let mut vars = Variables::new().with_scalar("x", 3.);
    let mut seen = vec![];
    f.reverse_update(&mut vars, |loss, current, grad| {
        seen.push((loss, current, grad));
        current - 0.5 * grad
    })
    .unwrap();
    assert_eq!(seen, vec![(9., 3., 6.)]);
    assert_eq!(vars.scalar("x"), Some(0.));
}
