//! Shared memory arena for the expression nodes.
//! Nodes are appended once and never modified, so an index into the arena is a
//! stable identity for a node.

use std::{cell::RefCell, collections::HashSet, io::Write};

use crate::{
    error::{GraphError, LensError},
    lens::{Lens, ScalarLens},
    operation::{FnOperation, Operation, PtrUnaryFn},
    storage::{Storage, Variables},
};

#[derive(Default)]
pub struct Graph {
    nodes: RefCell<Vec<GraphNode>>,
}

pub(crate) struct GraphNode {
    pub name: String,
    pub kind: NodeKind,
}

pub(crate) enum NodeKind {
    Variable {
        var: String,
        lens: Box<dyn Lens>,
    },
    Operation {
        inputs: Vec<u32>,
        op: Box<dyn Operation>,
    },
}

impl GraphNode {
    pub fn inputs(&self) -> &[u32] {
        match &self.kind {
            NodeKind::Variable { .. } => &[],
            NodeKind::Operation { inputs, .. } => inputs.as_slice(),
        }
    }
}

pub(crate) fn lens_error(var: &str) -> impl Fn(LensError) -> GraphError + '_ {
    move |source| GraphError::storage_mismatch(var, source)
}

/// Read the value a leaf addresses, failing if its variable is unbound.
pub(crate) fn read_variable(vars: &Variables, var: &str, lens: &dyn Lens) -> Result<f64, GraphError> {
    let storage: &Storage = vars
        .get(var)
        .ok_or_else(|| GraphError::UnboundVariable {
            name: var.to_string(),
        })?;
    lens.get(storage).map_err(lens_error(var))
}

/// Call `op.deriv` and check that it returned one partial per input.
pub(crate) fn partials(
    name: &str,
    op: &dyn Operation,
    args: &[f64],
) -> Result<Vec<f64>, GraphError> {
    let derivs = op.deriv(args);
    if derivs.len() != args.len() {
        return Err(GraphError::DerivativeArity {
            name: name.to_string(),
            expected: args.len(),
            actual: derivs.len(),
        });
    }
    Ok(derivs)
}

/// Depth-first post-order traversal from `root` with an explicit stack.
///
/// `on_edge` is called once for every parent-to-input edge of every reachable
/// operation, so a node referenced twice by one parent sees two edges.
/// `visit` is called exactly once per reachable node, after all of its inputs.
pub(crate) fn traverse(
    nodes: &[GraphNode],
    root: u32,
    mut on_edge: impl FnMut(u32),
    mut visit: impl FnMut(u32, &GraphNode) -> Result<(), GraphError>,
) -> Result<(), GraphError> {
    enum Step {
        Enter(u32),
        Exit(u32),
    }
    let mut entered = vec![false; nodes.len()];
    let mut stack = vec![Step::Enter(root)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(idx) => {
                if entered[idx as usize] {
                    continue;
                }
                entered[idx as usize] = true;
                stack.push(Step::Exit(idx));
                // An input that is entered but not yet exited would be an ancestor,
                // which the append-only arena rules out.
                for &input in nodes[idx as usize].inputs().iter().rev() {
                    on_edge(input);
                    if !entered[input as usize] {
                        stack.push(Step::Enter(input));
                    }
                }
            }
            Step::Exit(idx) => visit(idx, &nodes[idx as usize])?,
        }
    }
    Ok(())
}

/// A handle to a node in a [`Graph`]. Copying the handle shares the node; two
/// parents built from the same handle share one subexpression.
#[derive(Copy, Clone)]
pub struct Node<'a> {
    pub(crate) graph: &'a Graph,
    pub(crate) idx: u32,
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("idx", &self.idx)
            .field("name", &self.name())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Declare a scalar variable bound to `name` in the environment.
    pub fn scalar<'a>(&'a self, name: impl Into<String>) -> Node<'a> {
        let name = name.into();
        self.variable(name.clone(), name, ScalarLens)
    }

    /// Declare a leaf reading `var` from the environment through `lens`.
    /// `name` is the display name of the node.
    pub fn variable<'a>(
        &'a self,
        name: impl Into<String>,
        var: impl Into<String>,
        lens: impl Lens + 'static,
    ) -> Node<'a> {
        self.push(GraphNode {
            name: name.into(),
            kind: NodeKind::Variable {
                var: var.into(),
                lens: Box::new(lens),
            },
        })
    }

    /// Build an operation node from a pair of closures computing the value and
    /// the partial derivatives with respect to each input.
    pub fn operation<'a, F, D>(
        &'a self,
        name: impl Into<String>,
        inputs: &[Node<'a>],
        value: F,
        deriv: D,
    ) -> Node<'a>
    where
        F: Fn(&[f64]) -> f64 + 'static,
        D: Fn(&[f64]) -> Vec<f64> + 'static,
    {
        let name = name.into();
        self.op_node(
            name.clone(),
            inputs,
            Box::new(FnOperation { name, value, deriv }),
        )
    }

    /// Build an operation node from any [`Operation`] implementation.
    pub fn custom<'a>(&'a self, op: impl Operation + 'static, inputs: &[Node<'a>]) -> Node<'a> {
        self.op_node(op.name(), inputs, Box::new(op))
    }

    pub(crate) fn op_node<'a>(
        &'a self,
        name: String,
        inputs: &[Node<'a>],
        op: Box<dyn Operation>,
    ) -> Node<'a> {
        let inputs = inputs
            .iter()
            .map(|input| {
                assert!(
                    std::ptr::eq(input.graph, self),
                    "Cannot combine nodes from different graphs"
                );
                input.idx
            })
            .collect();
        self.push(GraphNode {
            name,
            kind: NodeKind::Operation { inputs, op },
        })
    }

    fn push<'a>(&'a self, node: GraphNode) -> Node<'a> {
        let mut nodes = self.nodes.borrow_mut();
        let idx = nodes.len();
        nodes.push(node);
        Node {
            graph: self,
            idx: idx as u32,
        }
    }

    pub(crate) fn nodes(&self) -> std::cell::Ref<'_, Vec<GraphNode>> {
        self.nodes.borrow()
    }
}

impl<'a> Node<'a> {
    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// The index of this node in its graph, which is its identity.
    pub fn index(&self) -> u32 {
        self.idx
    }

    pub fn name(&self) -> String {
        self.graph.nodes()[self.idx as usize].name.clone()
    }

    pub fn inputs(&self) -> Vec<Node<'a>> {
        self.graph.nodes()[self.idx as usize]
            .inputs()
            .iter()
            .map(|&idx| Node {
                graph: self.graph,
                idx,
            })
            .collect()
    }

    /// Apply a unary function with its derivative given as plain functions.
    pub fn apply(
        &self,
        name: &(impl AsRef<str> + ?Sized),
        f: fn(f64) -> f64,
        grad: fn(f64) -> f64,
    ) -> Self {
        let name = name.as_ref();
        #[cfg(feature = "expr_name")]
        let label = format!("{}({})", name, self.name());
        #[cfg(not(feature = "expr_name"))]
        let label = name.to_string();
        self.graph.op_node(
            label,
            &[*self],
            Box::new(PtrUnaryFn {
                name: name.to_string(),
                f,
                grad,
            }),
        )
    }

    /// Write graphviz dot file of the nodes reachable from this one to the given writer.
    pub fn dot(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let nodes = self.graph.nodes();
        let reachable = reachable(&nodes, self.idx);
        writeln!(writer, "digraph G {{\nrankdir=\"LR\";")?;
        for &idx in &reachable {
            let node = &nodes[idx as usize];
            let shape = match node.kind {
                NodeKind::Variable { .. } => "box",
                NodeKind::Operation { .. } => "ellipse",
            };
            writeln!(
                writer,
                "a{} [label=\"{}\" shape={}];",
                idx,
                node.name.replace('"', "\\\""),
                shape
            )?;
        }
        for &idx in &reachable {
            for input in nodes[idx as usize].inputs() {
                writeln!(writer, "a{} -> a{};", input, idx)?;
            }
        }
        writeln!(writer, "}}")?;
        Ok(())
    }
}

/// Indices of all nodes reachable from `root`, in ascending order.
pub(crate) fn reachable(nodes: &[GraphNode], root: u32) -> Vec<u32> {
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(idx) = stack.pop() {
        if visited.insert(idx) {
            stack.extend_from_slice(nodes[idx as usize].inputs());
        }
    }
    let mut ret: Vec<_> = visited.into_iter().collect();
    ret.sort_unstable();
    ret
}

#[test]
fn test_shared_node_identity() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let x2 = graph.scalar("x");
    assert_ne!(x.index(), x2.index());
    let sum = x + x;
    let inputs = sum.inputs();
    assert_eq!(inputs.len(), 2);
    assert!(inputs.iter().all(|input| input.index() == x.index()));
    assert_eq!(graph.len(), 3);
}

#[test]
fn test_apply() {
    let graph = Graph::new();
    let x = graph.scalar("x");
    let sinx = x.apply("sin", f64::sin, f64::cos);
    #[cfg(feature = "expr_name")]
    assert_eq!(sinx.name(), "sin(x)");
    #[cfg(not(feature = "expr_name"))]
    assert_eq!(sinx.name(), "sin");

    let vars = Variables::new().with_scalar("x", 0.5);
    let (value, grads) = sinx.reverse(&vars).unwrap();
    assert_eq!(value, 0.5f64.sin());
    assert_eq!(grads.scalar("x"), Some(0.5f64.cos()));
    let tangent = sinx.forward("x", &vars).unwrap();
    assert_eq!(tangent.derivative, 0.5f64.cos());
}

#[test]
fn test_dot() {
    let graph = Graph::new();
    let a = graph.scalar("a");
    let b = graph.scalar("b");
    let ab = a * b;
    let _unused = graph.scalar("c");
    let mut out = vec![];
    ab.dot(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("digraph G {"));
    assert!(out.contains("a0 -> a2;"));
    assert!(out.contains("a1 -> a2;"));
    assert!(!out.contains("a3"));
}

#[test]
#[should_panic]
fn test_mixed_graphs() {
    let g1 = Graph::new();
    let g2 = Graph::new();
    let _ = g1.scalar("x") + g2.scalar("y");
}
