/// The evaluation pass a [`Visit`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Forward mode; `number` is the directional derivative.
    Forward,
    /// Value pass of reverse mode; `number` is the node value.
    Value,
    /// Adjoint pass of reverse mode; `number` is the settled adjoint.
    Adjoint,
}

/// A record handed to the observer callback every time an evaluator settles a node.
#[derive(Clone, Copy, Debug)]
pub struct Visit<'n> {
    pub phase: Phase,
    pub idx: u32,
    pub name: &'n str,
    pub number: f64,
}

pub(crate) fn noop(_: &Visit) {}
