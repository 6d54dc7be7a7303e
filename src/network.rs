//! # Network: the node-graph interface the views and passes consume
//!
//! Nodes are small integer handles owned by the network. A [`Signal`] is a
//! node plus a polarity bit, encoded like an AIGER literal
//! (`node << 1 | complement`).
//!
//! Views observe the network through [`Network::subscribe_node_added`]. Only
//! creations are reported: substitutions and removals leave views stale until
//! they are recomputed explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitXor, Not};

/// Handle of a node inside a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node(pub u32);

impl Node {
    /// The constant-false node every network starts with.
    pub const CONSTANT: Node = Node(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A node reference with polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signal(u32);

impl Signal {
    pub fn new(node: Node, complemented: bool) -> Self {
        Signal(node.0 << 1 | complemented as u32)
    }

    pub fn node(self) -> Node {
        Node(self.0 >> 1)
    }

    pub fn is_complemented(self) -> bool {
        self.0 & 1 == 1
    }

    /// Raw literal value; orders fanins and keys the structural hash.
    pub fn literal(self) -> u32 {
        self.0
    }
}

impl Not for Signal {
    type Output = Signal;

    fn not(self) -> Signal {
        Signal(self.0 ^ 1)
    }
}

impl BitXor<bool> for Signal {
    type Output = Signal;

    fn bitxor(self, complement: bool) -> Signal {
        Signal(self.0 ^ complement as u32)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_complemented() {
            write!(f, "!{}", self.node())
        } else {
            write!(f, "{}", self.node())
        }
    }
}

/// What a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Constant,
    /// Primary input
    Pi,
    /// Register output, a combinational input of a sequential network
    Ro,
    /// Two-input AND gate
    And,
}

/// Where a node reference leads after substitutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The node is still part of the network.
    Live(Node),
    /// The node was substituted; follow the signal.
    Redirect(Signal),
    /// The node lost all consumers and was removed without a replacement.
    Removed,
}

/// Payload of the node-added notification.
#[derive(Debug, Clone, Copy)]
pub struct NodeAdded<'a> {
    pub node: Node,
    pub kind: NodeKind,
    pub fanins: &'a [Signal],
}

/// Callback registered for node-added notifications.
pub type NodeAddedFn = Box<dyn FnMut(&NodeAdded<'_>)>;

/// Ticket returned by [`Network::subscribe_node_added`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub u64);

/// Operations a logic network exposes to views and optimization passes.
///
/// Out-of-range node handles are programming errors and panic.
pub trait Network {
    /// Number of node slots, dead ones included.
    fn size(&self) -> usize;
    fn num_pis(&self) -> usize;
    fn num_pos(&self) -> usize;
    /// Number of register inputs (zero for combinational networks).
    fn num_ris(&self) -> usize;
    /// Number of live AND gates.
    fn num_gates(&self) -> usize;

    fn get_constant(&self, value: bool) -> Signal {
        Signal::new(Node::CONSTANT, value)
    }

    fn get_node(&self, f: Signal) -> Node {
        f.node()
    }

    fn make_signal(&self, n: Node) -> Signal {
        Signal::new(n, false)
    }

    fn is_complemented(&self, f: Signal) -> bool {
        f.is_complemented()
    }

    fn kind(&self, n: Node) -> NodeKind;

    fn is_constant(&self, n: Node) -> bool {
        self.kind(n) == NodeKind::Constant
    }

    fn is_pi(&self, n: Node) -> bool {
        self.kind(n) == NodeKind::Pi
    }

    /// Combinational input: primary input or register output.
    fn is_ci(&self, n: Node) -> bool {
        matches!(self.kind(n), NodeKind::Pi | NodeKind::Ro)
    }

    fn is_and(&self, n: Node) -> bool {
        self.kind(n) == NodeKind::And
    }

    fn is_dead(&self, n: Node) -> bool {
        !matches!(self.resolution(n), Resolution::Live(_))
    }

    /// Number of consumers: gate fanins, primary outputs and register inputs.
    fn fanout_size(&self, n: Node) -> u32;

    fn fanin_size(&self, n: Node) -> usize;

    fn fanin(&self, n: Node, index: usize) -> Signal;

    fn foreach_fanin(&self, n: Node, mut f: impl FnMut(Signal)) {
        for i in 0..self.fanin_size(n) {
            f(self.fanin(n, i));
        }
    }

    /// Live nodes in creation order, constant first.
    fn foreach_node(&self, f: impl FnMut(Node));

    /// Live AND gates in creation order.
    fn foreach_gate(&self, f: impl FnMut(Node));

    fn foreach_pi(&self, f: impl FnMut(Node));

    fn foreach_po(&self, f: impl FnMut(Signal));

    fn foreach_ri(&self, f: impl FnMut(Signal));

    fn po(&self, index: usize) -> Signal;

    fn ri(&self, index: usize) -> Signal;

    fn create_pi(&mut self) -> Signal;

    fn create_po(&mut self, f: Signal);

    fn create_and(&mut self, a: Signal, b: Signal) -> Signal;

    fn create_not(&self, a: Signal) -> Signal {
        !a
    }

    fn create_or(&mut self, a: Signal, b: Signal) -> Signal {
        !self.create_and(!a, !b)
    }

    /// Structural-hash probe: the existing AND of `a` and `b`, if any.
    fn has_and(&self, a: Signal, b: Signal) -> Option<Signal>;

    /// Redirects every consumer of `old` to `new`, simplifying and re-hashing
    /// the consumers, and takes `old` out of the network.
    fn substitute_node(&mut self, old: Node, new: Signal);

    /// Like [`Network::substitute_node`] but leaves the consumers' structure
    /// untouched apart from the redirected fanin.
    ///
    /// Consumers are not simplified: a parent that ends up reading `x & x`,
    /// `x & !x` or a constant stays a gate with those fanins and keeps
    /// computing the right function. A later [`Network::substitute_node`] or a
    /// balancing pass folds it.
    fn substitute_node_no_restrash(&mut self, old: Node, new: Signal);

    fn resolution(&self, n: Node) -> Resolution;

    /// Follows substitution links until a live node is reached, or returns
    /// `None` when the chain ends in a node removed without a replacement.
    fn try_resolve(&self, n: Node) -> Option<Signal> {
        let mut current = self.make_signal(n);
        loop {
            match self.resolution(current.node()) {
                Resolution::Live(_) => return Some(current),
                Resolution::Redirect(next) => current = next ^ current.is_complemented(),
                Resolution::Removed => return None,
            }
        }
    }

    /// Follows substitution links until a live node is reached.
    ///
    /// # Panics
    ///
    /// When `n` was removed without a replacement.
    fn resolve(&self, n: Node) -> Signal {
        match self.try_resolve(n) {
            Some(s) => s,
            None => panic!("{n} was removed without a replacement"),
        }
    }

    fn trav_id(&self) -> u32;

    /// Starts a new traversal and returns its id.
    fn incr_trav_id(&mut self) -> u32;

    fn visited(&self, n: Node) -> u32;

    fn set_visited(&mut self, n: Node, trav_id: u32);

    fn value(&self, n: Node) -> u32;

    fn set_value(&mut self, n: Node, value: u32);

    fn clear_values(&mut self);

    fn subscribe_node_added(&mut self, callback: NodeAddedFn) -> EventHandle;

    fn unsubscribe(&mut self, handle: EventHandle);

    /// Removes every gate without consumers; returns how many were removed.
    fn remove_dangling(&mut self) -> usize;
}
