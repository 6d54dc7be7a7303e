//! # AIG: a structurally hashed and-inverter graph
//!
//! The concrete [`Network`] the views and the balancing pass run on. Every
//! gate is a two-input AND; inversion lives on the edges.
//!
//! ## Example
//!
//! ```rust
//! use aigopt::{Aig, Network};
//!
//! let mut aig = Aig::new();
//! let a = aig.create_pi();
//! let b = aig.create_pi();
//! let ab = aig.create_and(a, b);
//! aig.create_po(ab);
//!
//! assert_eq!(aig.create_and(b, a), ab);
//! assert_eq!(aig.simulate(&[true, true]).unwrap(), vec![true]);
//! assert_eq!(aig.simulate(&[true, false]).unwrap(), vec![false]);
//! ```

use crate::network::{
    EventHandle, Network, Node, NodeAdded, NodeAddedFn, NodeKind, Resolution, Signal,
};
use blake3::Hasher;
use rand::Rng;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Hash of a network's live structure (hex-encoded BLAKE3 of a canonical
/// JSON snapshot).
pub type NetworkHash = String;

/// One truth table, 64 input patterns per word.
pub type TruthTable = Vec<u64>;

/// Largest number of combinational inputs [`Aig::truth_tables`] accepts.
pub const MAX_TRUTH_TABLE_INPUTS: usize = 16;

const PROJECTIONS: [u64; 6] = [
    0xAAAA_AAAA_AAAA_AAAA,
    0xCCCC_CCCC_CCCC_CCCC,
    0xF0F0_F0F0_F0F0_F0F0,
    0xFF00_FF00_FF00_FF00,
    0xFFFF_0000_FFFF_0000,
    0xFFFF_FFFF_0000_0000,
];

#[derive(Serialize)]
struct AigAtom<'a> {
    kind: &'static str,
    version: u32,
    inputs: usize,
    registers: usize,
    gates: &'a [[u32; 2]],
    outputs: &'a [u32],
    register_inputs: &'a [u32],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("input length mismatch: expected {expected}, got {got}")]
    InputMismatch { expected: usize, got: usize },
    #[error("truth tables support at most {limit} inputs, network has {inputs}")]
    TooManyInputs { inputs: usize, limit: usize },
    #[error(
        "interface mismatch: {left_inputs} inputs/{left_outputs} outputs \
         vs {right_inputs} inputs/{right_outputs} outputs"
    )]
    InterfaceMismatch {
        left_inputs: usize,
        left_outputs: usize,
        right_inputs: usize,
        right_outputs: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Live,
    Redirect(Signal),
    Removed,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    fanins: [Signal; 2],
    fanout: u32,
    visited: u32,
    value: u32,
    status: Status,
}

impl NodeData {
    fn new(kind: NodeKind, fanins: [Signal; 2]) -> Self {
        NodeData {
            kind,
            fanins,
            fanout: 0,
            visited: 0,
            value: 0,
            status: Status::Live,
        }
    }

    fn fanins(&self) -> &[Signal] {
        match self.kind {
            NodeKind::And => &self.fanins,
            _ => &[],
        }
    }

    fn is_live_gate(&self) -> bool {
        self.kind == NodeKind::And && self.status == Status::Live
    }
}

/// An and-inverter graph with structural hashing.
///
/// Node slots are never reused: substituted and removed nodes stay in place
/// with a dead status so stale handles can still be resolved.
pub struct Aig {
    nodes: Vec<NodeData>,
    pis: Vec<Node>,
    ros: Vec<Node>,
    pos: Vec<Signal>,
    ris: Vec<Signal>,
    strash: HashMap<(Signal, Signal), Node>,
    trav_id: u32,
    next_handle: u64,
    subscribers: Vec<(EventHandle, NodeAddedFn)>,
}

impl Default for Aig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Aig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aig")
            .field("size", &self.nodes.len())
            .field("pis", &self.pis.len())
            .field("pos", &self.pos.len())
            .field("registers", &self.ros.len())
            .field("gates", &self.num_gates())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Copies the structure; subscriptions stay with the original.
impl Clone for Aig {
    fn clone(&self) -> Self {
        Aig {
            nodes: self.nodes.clone(),
            pis: self.pis.clone(),
            ros: self.ros.clone(),
            pos: self.pos.clone(),
            ris: self.ris.clone(),
            strash: self.strash.clone(),
            trav_id: self.trav_id,
            next_handle: self.next_handle,
            subscribers: Vec::new(),
        }
    }
}

impl Aig {
    pub fn new() -> Self {
        let constant = Signal::new(Node::CONSTANT, false);
        Aig {
            nodes: vec![NodeData::new(NodeKind::Constant, [constant; 2])],
            pis: Vec::new(),
            ros: Vec::new(),
            pos: Vec::new(),
            ris: Vec::new(),
            strash: HashMap::new(),
            trav_id: 0,
            next_handle: 0,
            subscribers: Vec::new(),
        }
    }

    /// Number of combinational inputs (primary inputs and register outputs).
    pub fn num_cis(&self) -> usize {
        self.pis.len() + self.ros.len()
    }

    /// Number of combinational outputs (primary outputs and register inputs).
    pub fn num_cos(&self) -> usize {
        self.pos.len() + self.ris.len()
    }

    pub fn pi(&self, index: usize) -> Signal {
        Signal::new(self.pis[index], false)
    }

    /// Creates a register output; it behaves as a combinational input.
    pub fn create_ro(&mut self) -> Signal {
        let n = self.push_node(NodeKind::Ro, [self.get_constant(false); 2]);
        self.ros.push(n);
        Signal::new(n, false)
    }

    /// Creates a register input; it behaves as a combinational output.
    pub fn create_ri(&mut self, f: Signal) {
        self.nodes[f.node().index()].fanout += 1;
        self.ris.push(f);
    }

    fn data(&self, n: Node) -> &NodeData {
        &self.nodes[n.index()]
    }

    fn push_node(&mut self, kind: NodeKind, fanins: [Signal; 2]) -> Node {
        let node = Node(self.nodes.len() as u32);
        self.nodes.push(NodeData::new(kind, fanins));
        self.notify_node_added(node);
        node
    }

    fn notify_node_added(&mut self, node: Node) {
        let data = &self.nodes[node.index()];
        let event = NodeAdded {
            node,
            kind: data.kind,
            fanins: data.fanins(),
        };
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&event);
        }
    }

    fn resolve_signal(&self, f: Signal) -> Signal {
        self.resolve(f.node()) ^ f.is_complemented()
    }

    /// Detaches a gate: it stops being hashed and its fanins lose a consumer.
    /// Fanins left without consumers are removed as well, except those in
    /// `pending`, which still owe a redirect to a queued substitution.
    fn take_out_node(&mut self, n: Node, replacement: Option<Signal>, pending: &[Node]) {
        if !self.data(n).is_live_gate() {
            return;
        }
        self.nodes[n.index()].status = match replacement {
            Some(s) => Status::Redirect(s),
            None => Status::Removed,
        };
        let mut worklist = vec![n];
        while let Some(current) = worklist.pop() {
            let [a, b] = self.nodes[current.index()].fanins;
            if self.strash.get(&(a, b)) == Some(&current) {
                self.strash.remove(&(a, b));
            }
            for fanin in [a.node(), b.node()] {
                let data = &mut self.nodes[fanin.index()];
                data.fanout = data.fanout.saturating_sub(1);
                if data.fanout == 0 && data.is_live_gate() && !pending.contains(&fanin) {
                    data.status = Status::Removed;
                    worklist.push(fanin);
                }
            }
        }
    }

    /// Rewrites `parent` so that it reads `new` wherever it read `old`.
    ///
    /// Returns the replacement for `parent` when the rewrite makes it trivial
    /// or structurally equal to another node; `parent` is left untouched then.
    fn replace_in_node(&mut self, parent: Node, old: Node, new: Signal) -> Option<(Node, Signal)> {
        let [f0, f1] = self.nodes[parent.index()].fanins;
        let uses = (f0.node() == old) as u32 + (f1.node() == old) as u32;
        if uses == 0 {
            return None;
        }
        let a = if f0.node() == old { new ^ f0.is_complemented() } else { f0 };
        let b = if f1.node() == old { new ^ f1.is_complemented() } else { f1 };
        let (a, b) = ordered(a, b);
        let zero = self.get_constant(false);
        if a.node() == b.node() {
            return Some((parent, if a == b { a } else { zero }));
        }
        if a.node() == Node::CONSTANT {
            return Some((parent, if a.is_complemented() { b } else { zero }));
        }
        if let Some(&existing) = self.strash.get(&(a, b)) {
            if existing != parent {
                return Some((parent, Signal::new(existing, false)));
            }
        }
        if self.strash.get(&(f0, f1)) == Some(&parent) {
            self.strash.remove(&(f0, f1));
        }
        self.nodes[parent.index()].fanins = [a, b];
        self.strash.insert((a, b), parent);
        self.move_consumers(old, new.node(), uses);
        None
    }

    fn replace_in_outputs(&mut self, old: Node, new: Signal) {
        let mut moved = 0;
        for output in self.pos.iter_mut().chain(self.ris.iter_mut()) {
            if output.node() == old {
                *output = new ^ output.is_complemented();
                moved += 1;
            }
        }
        self.move_consumers(old, new.node(), moved);
    }

    fn move_consumers(&mut self, from: Node, to: Node, count: u32) {
        let data = &mut self.nodes[from.index()];
        data.fanout = data.fanout.saturating_sub(count);
        self.nodes[to.index()].fanout += count;
    }

    fn combinational_inputs(&self) -> impl Iterator<Item = Node> + '_ {
        self.pis.iter().chain(self.ros.iter()).copied()
    }

    fn combinational_outputs(&self) -> impl Iterator<Item = Signal> + '_ {
        self.pos.iter().chain(self.ris.iter()).copied()
    }

    /// Gates reachable from the outputs, fanins before fanouts.
    fn topological_gates(&self) -> Vec<Node> {
        const NEW: u8 = 0;
        const OPEN: u8 = 1;
        const DONE: u8 = 2;
        let mut mark = vec![NEW; self.nodes.len()];
        let mut order = Vec::new();
        for root in self.combinational_outputs() {
            let mut stack = vec![(root.node(), false)];
            while let Some((n, expanded)) = stack.pop() {
                if expanded {
                    mark[n.index()] = DONE;
                    order.push(n);
                    continue;
                }
                if mark[n.index()] != NEW {
                    continue;
                }
                if self.data(n).kind != NodeKind::And {
                    mark[n.index()] = DONE;
                    continue;
                }
                mark[n.index()] = OPEN;
                stack.push((n, true));
                for fanin in self.data(n).fanins().iter().rev() {
                    if mark[fanin.node().index()] == NEW {
                        stack.push((fanin.node(), false));
                    }
                }
            }
        }
        order
    }

    /// Evaluates every output (primary outputs, then register inputs) for
    /// one assignment of the inputs (primary inputs, then register outputs).
    pub fn simulate(&self, inputs: &[bool]) -> Result<Vec<bool>, SimulationError> {
        if inputs.len() != self.num_cis() {
            return Err(SimulationError::InputMismatch {
                expected: self.num_cis(),
                got: inputs.len(),
            });
        }
        let mut values = vec![false; self.nodes.len()];
        for (n, value) in self.combinational_inputs().zip(inputs) {
            values[n.index()] = *value;
        }
        let read = |values: &[bool], f: Signal| values[f.node().index()] ^ f.is_complemented();
        for n in self.topological_gates() {
            let [a, b] = self.data(n).fanins;
            values[n.index()] = read(&values, a) && read(&values, b);
        }
        Ok(self
            .combinational_outputs()
            .map(|f| read(&values, f))
            .collect())
    }

    /// Bit-parallel truth table of every output over all input assignments.
    ///
    /// Pattern `p` assigns input `i` the value of bit `i` of `p`.
    pub fn truth_tables(&self) -> Result<Vec<TruthTable>, SimulationError> {
        let inputs = self.num_cis();
        if inputs > MAX_TRUTH_TABLE_INPUTS {
            return Err(SimulationError::TooManyInputs {
                inputs,
                limit: MAX_TRUTH_TABLE_INPUTS,
            });
        }
        let bits = 1usize << inputs;
        let words = bits.div_ceil(64);
        let mask = if bits < 64 { (1u64 << bits) - 1 } else { u64::MAX };
        let mut tables: Vec<TruthTable> = vec![Vec::new(); self.nodes.len()];
        tables[Node::CONSTANT.index()] = vec![0; words];
        for (var, n) in self.combinational_inputs().enumerate() {
            tables[n.index()] = (0..words).map(|w| projection(var, w)).collect();
        }
        let read = |tables: &[TruthTable], f: Signal, w: usize| {
            let word = tables[f.node().index()][w];
            if f.is_complemented() {
                !word
            } else {
                word
            }
        };
        for n in self.topological_gates() {
            let [a, b] = self.data(n).fanins;
            let table = (0..words)
                .map(|w| read(&tables, a, w) & read(&tables, b, w))
                .collect();
            tables[n.index()] = table;
        }
        Ok(self
            .combinational_outputs()
            .map(|f| (0..words).map(|w| read(&tables, f, w) & mask).collect())
            .collect())
    }

    /// True when both networks compute the same function at every output.
    pub fn equivalent(&self, other: &Aig) -> Result<bool, SimulationError> {
        if self.num_cis() != other.num_cis() || self.num_cos() != other.num_cos() {
            return Err(SimulationError::InterfaceMismatch {
                left_inputs: self.num_cis(),
                left_outputs: self.num_cos(),
                right_inputs: other.num_cis(),
                right_outputs: other.num_cos(),
            });
        }
        Ok(self.truth_tables()? == other.truth_tables()?)
    }

    /// Identity of the live structure reachable from the outputs.
    ///
    /// Nodes are renumbered in traversal order, so dead slots and creation
    /// history do not affect the result.
    pub fn fingerprint(&self) -> NetworkHash {
        let mut renumbered = vec![0u32; self.nodes.len()];
        let mut next = 1u32;
        for n in self.combinational_inputs() {
            renumbered[n.index()] = next;
            next += 1;
        }
        let literal = |renumbered: &[u32], f: Signal| {
            renumbered[f.node().index()] << 1 | f.is_complemented() as u32
        };
        let mut gates = Vec::new();
        for n in self.topological_gates() {
            let [a, b] = self.data(n).fanins;
            gates.push([literal(&renumbered, a), literal(&renumbered, b)]);
            renumbered[n.index()] = next;
            next += 1;
        }
        let outputs: Vec<u32> = self.pos.iter().map(|f| literal(&renumbered, *f)).collect();
        let register_inputs: Vec<u32> =
            self.ris.iter().map(|f| literal(&renumbered, *f)).collect();
        let atom = AigAtom {
            kind: "aig",
            version: 0,
            inputs: self.pis.len(),
            registers: self.ros.len(),
            gates: &gates,
            outputs: &outputs,
            register_inputs: &register_inputs,
        };
        let canon = serde_json::to_vec(&atom).expect("aig snapshot serializes");
        let mut hasher = Hasher::new();
        hasher.update(&canon);
        let digest = hasher.finalize();
        hex::encode(digest.as_bytes())
    }
}

impl Network for Aig {
    fn size(&self) -> usize {
        self.nodes.len()
    }

    fn num_pis(&self) -> usize {
        self.pis.len()
    }

    fn num_pos(&self) -> usize {
        self.pos.len()
    }

    fn num_ris(&self) -> usize {
        self.ris.len()
    }

    fn num_gates(&self) -> usize {
        self.nodes.iter().filter(|d| d.is_live_gate()).count()
    }

    fn kind(&self, n: Node) -> NodeKind {
        self.data(n).kind
    }

    fn fanout_size(&self, n: Node) -> u32 {
        self.data(n).fanout
    }

    fn fanin_size(&self, n: Node) -> usize {
        self.data(n).fanins().len()
    }

    fn fanin(&self, n: Node, index: usize) -> Signal {
        self.data(n).fanins()[index]
    }

    fn foreach_node(&self, mut f: impl FnMut(Node)) {
        for (idx, data) in self.nodes.iter().enumerate() {
            if data.status == Status::Live {
                f(Node(idx as u32));
            }
        }
    }

    fn foreach_gate(&self, mut f: impl FnMut(Node)) {
        for (idx, data) in self.nodes.iter().enumerate() {
            if data.is_live_gate() {
                f(Node(idx as u32));
            }
        }
    }

    fn foreach_pi(&self, mut f: impl FnMut(Node)) {
        for n in &self.pis {
            f(*n);
        }
    }

    fn foreach_po(&self, mut f: impl FnMut(Signal)) {
        for s in &self.pos {
            f(*s);
        }
    }

    fn foreach_ri(&self, mut f: impl FnMut(Signal)) {
        for s in &self.ris {
            f(*s);
        }
    }

    fn po(&self, index: usize) -> Signal {
        self.pos[index]
    }

    fn ri(&self, index: usize) -> Signal {
        self.ris[index]
    }

    fn create_pi(&mut self) -> Signal {
        let n = self.push_node(NodeKind::Pi, [self.get_constant(false); 2]);
        self.pis.push(n);
        Signal::new(n, false)
    }

    fn create_po(&mut self, f: Signal) {
        self.nodes[f.node().index()].fanout += 1;
        self.pos.push(f);
    }

    fn create_and(&mut self, a: Signal, b: Signal) -> Signal {
        let (a, b) = ordered(a, b);
        if a.node() == b.node() {
            return if a == b { a } else { self.get_constant(false) };
        }
        if a.node() == Node::CONSTANT {
            return if a.is_complemented() { b } else { a };
        }
        if let Some(&existing) = self.strash.get(&(a, b)) {
            return Signal::new(existing, false);
        }
        self.nodes[a.node().index()].fanout += 1;
        self.nodes[b.node().index()].fanout += 1;
        let n = Node(self.nodes.len() as u32);
        self.strash.insert((a, b), n);
        self.push_node(NodeKind::And, [a, b]);
        Signal::new(n, false)
    }

    fn has_and(&self, a: Signal, b: Signal) -> Option<Signal> {
        let (a, b) = ordered(a, b);
        self.strash
            .get(&(a, b))
            .map(|n| Signal::new(*n, false))
    }

    fn substitute_node(&mut self, old: Node, new: Signal) {
        let mut worklist = vec![(old, new)];
        while let Some((old, new)) = worklist.pop() {
            if self.data(old).status != Status::Live {
                continue;
            }
            let new = self.resolve_signal(new);
            if new.node() == old {
                continue;
            }
            for idx in 1..self.nodes.len() {
                let parent = Node(idx as u32);
                if !self.data(parent).is_live_gate() {
                    continue;
                }
                if let Some(next) = self.replace_in_node(parent, old, new) {
                    worklist.push(next);
                }
            }
            self.replace_in_outputs(old, new);
            let pending: Vec<Node> = worklist
                .iter()
                .flat_map(|(queued, target)| [*queued, target.node()])
                .chain([new.node()])
                .collect();
            self.take_out_node(old, Some(new), &pending);
        }
    }

    fn substitute_node_no_restrash(&mut self, old: Node, new: Signal) {
        let new = self.resolve_signal(new);
        if new.node() == old {
            return;
        }
        for idx in 1..self.nodes.len() {
            let parent = Node(idx as u32);
            if !self.data(parent).is_live_gate() {
                continue;
            }
            let [f0, f1] = self.data(parent).fanins;
            let uses = (f0.node() == old) as u32 + (f1.node() == old) as u32;
            if uses == 0 {
                continue;
            }
            let a = if f0.node() == old { new ^ f0.is_complemented() } else { f0 };
            let b = if f1.node() == old { new ^ f1.is_complemented() } else { f1 };
            let (a, b) = ordered(a, b);
            if self.strash.get(&(f0, f1)) == Some(&parent) {
                self.strash.remove(&(f0, f1));
            }
            self.nodes[parent.index()].fanins = [a, b];
            if let Entry::Vacant(slot) = self.strash.entry((a, b)) {
                slot.insert(parent);
            }
            self.move_consumers(old, new.node(), uses);
        }
        self.replace_in_outputs(old, new);
        self.take_out_node(old, Some(new), &[new.node()]);
    }

    fn resolution(&self, n: Node) -> Resolution {
        match self.data(n).status {
            Status::Live => Resolution::Live(n),
            Status::Redirect(s) => Resolution::Redirect(s),
            Status::Removed => Resolution::Removed,
        }
    }

    fn trav_id(&self) -> u32 {
        self.trav_id
    }

    fn incr_trav_id(&mut self) -> u32 {
        self.trav_id += 1;
        self.trav_id
    }

    fn visited(&self, n: Node) -> u32 {
        self.data(n).visited
    }

    fn set_visited(&mut self, n: Node, trav_id: u32) {
        self.nodes[n.index()].visited = trav_id;
    }

    fn value(&self, n: Node) -> u32 {
        self.data(n).value
    }

    fn set_value(&mut self, n: Node, value: u32) {
        self.nodes[n.index()].value = value;
    }

    fn clear_values(&mut self) {
        for data in &mut self.nodes {
            data.value = 0;
        }
    }

    fn subscribe_node_added(&mut self, callback: NodeAddedFn) -> EventHandle {
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;
        self.subscribers.push((handle, callback));
        handle
    }

    fn unsubscribe(&mut self, handle: EventHandle) {
        self.subscribers.retain(|(h, _)| *h != handle);
    }

    fn remove_dangling(&mut self) -> usize {
        let before = self.num_gates();
        for idx in 1..self.nodes.len() {
            let n = Node(idx as u32);
            if self.data(n).is_live_gate() && self.data(n).fanout == 0 {
                self.take_out_node(n, None, &[]);
            }
        }
        before - self.num_gates()
    }
}

fn ordered(a: Signal, b: Signal) -> (Signal, Signal) {
    if a.literal() > b.literal() {
        (b, a)
    } else {
        (a, b)
    }
}

fn projection(var: usize, word: usize) -> u64 {
    if var < 6 {
        PROJECTIONS[var]
    } else if (word >> (var - 6)) & 1 == 1 {
        u64::MAX
    } else {
        0
    }
}

/// Builds a random network.
///
/// Fanins favour recently created signals so the result contains long
/// AND chains; a quarter of the edges are complemented.
pub fn random_aig<R: Rng>(rng: &mut R, pis: usize, gates: usize, pos: usize) -> Aig {
    assert!(pis > 0, "a random network needs at least one input");
    let mut aig = Aig::new();
    let mut signals: Vec<Signal> = (0..pis).map(|_| aig.create_pi()).collect();
    for _ in 0..gates {
        let a = random_signal(rng, &signals);
        let b = random_signal(rng, &signals);
        let s = aig.create_and(a, b);
        if !aig.is_constant(s.node()) && !signals.contains(&s) {
            signals.push(s);
        }
    }
    for idx in 0..pos {
        let s = signals[signals.len() - 1 - idx % signals.len()];
        aig.create_po(s ^ rng.gen_bool(0.25));
    }
    aig
}

fn random_signal<R: Rng>(rng: &mut R, signals: &[Signal]) -> Signal {
    let recent = signals.len().min(4);
    let idx = if rng.gen_bool(0.5) {
        signals.len() - 1 - rng.gen_range(0..recent)
    } else {
        rng.gen_range(0..signals.len())
    };
    signals[idx] ^ rng.gen_bool(0.25)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn three_inputs() -> (Aig, Signal, Signal, Signal) {
        let mut aig = Aig::new();
        let a = aig.create_pi();
        let b = aig.create_pi();
        let c = aig.create_pi();
        (aig, a, b, c)
    }

    #[test]
    fn create_and_folds_trivial_cases() {
        let (mut aig, a, b, _) = three_inputs();
        let zero = aig.get_constant(false);
        let one = aig.get_constant(true);
        assert_eq!(aig.create_and(a, a), a);
        assert_eq!(aig.create_and(a, !a), zero);
        assert_eq!(aig.create_and(zero, b), zero);
        assert_eq!(aig.create_and(b, one), b);
        assert_eq!(aig.num_gates(), 0);
    }

    #[test]
    fn structural_hashing_reuses_nodes() {
        let (mut aig, a, b, _) = three_inputs();
        let ab = aig.create_and(a, b);
        assert_eq!(aig.create_and(b, a), ab);
        assert_eq!(aig.has_and(b, a), Some(ab));
        assert_eq!(aig.has_and(!a, b), None);
        assert_eq!(aig.num_gates(), 1);
        assert_eq!(aig.fanout_size(a.node()), 1);
    }

    #[test]
    fn eval_or_through_inverters() {
        let (mut aig, a, b, _) = three_inputs();
        let or = aig.create_or(a, b);
        aig.create_po(or);
        assert!(!aig.simulate(&[false, false, false]).unwrap()[0]);
        assert!(aig.simulate(&[true, false, false]).unwrap()[0]);
        assert!(aig.simulate(&[false, true, true]).unwrap()[0]);
    }

    #[test]
    fn simulate_rejects_wrong_input_count() {
        let (aig, _, _, _) = three_inputs();
        assert_eq!(
            aig.simulate(&[true]),
            Err(SimulationError::InputMismatch {
                expected: 3,
                got: 1
            })
        );
    }

    #[test]
    fn truth_tables_match_projections() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let abc = aig.create_and(ab, !c);
        aig.create_po(a);
        aig.create_po(abc);
        aig.create_po(aig.get_constant(true));
        let tables = aig.truth_tables().unwrap();
        assert_eq!(tables[0], vec![0xAA_u64]);
        assert_eq!(tables[1], vec![0xAA_u64 & 0xCC & !0xF0 & 0xFF]);
        assert_eq!(tables[2], vec![0xFF_u64]);
    }

    #[test]
    fn truth_tables_span_words() {
        let mut aig = Aig::new();
        let inputs: Vec<Signal> = (0..8).map(|_| aig.create_pi()).collect();
        aig.create_po(inputs[7]);
        let tables = aig.truth_tables().unwrap();
        assert_eq!(tables[0], vec![0, 0, u64::MAX, u64::MAX]);
    }

    #[test]
    fn substitute_propagates_constants() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let abc = aig.create_and(ab, c);
        aig.create_po(abc);
        aig.substitute_node(ab.node(), aig.get_constant(false));
        assert_eq!(aig.po(0), aig.get_constant(false));
        assert!(aig.is_dead(ab.node()));
        assert!(aig.is_dead(abc.node()));
        assert_eq!(aig.resolve(abc.node()), aig.get_constant(false));
        assert_eq!(aig.num_gates(), 0);
    }

    #[test]
    fn substitute_merges_structural_duplicates() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let ac = aig.create_and(a, c);
        let x = aig.create_and(ab, c);
        let y = aig.create_and(ac, b);
        aig.create_po(x);
        aig.create_po(y);
        aig.substitute_node(c.node(), b);
        // ac turns into a duplicate of ab; y then reads ab & b, which x
        // already computes after its own in-place rewrite.
        assert_eq!(aig.resolve(ac.node()), ab);
        assert_eq!(aig.resolve(y.node()), x);
        assert_eq!(aig.po(0), x);
        assert_eq!(aig.po(1), x);
        assert_eq!(aig.num_gates(), 2);
    }

    #[test]
    fn queued_substitutions_still_leave_a_redirect() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let y = aig.create_and(ab, c);
        let w = aig.create_and(!y, ab);
        aig.create_po(w);
        let zero = aig.get_constant(false);
        aig.substitute_node(ab.node(), zero);
        // w is processed first and drops y's last consumer while y is queued
        assert_eq!(aig.resolution(y.node()), Resolution::Redirect(zero));
        assert_eq!(aig.resolve(y.node()), zero);
        assert_eq!(aig.resolve(w.node()), zero);
        assert_eq!(aig.po(0), zero);
        assert_eq!(aig.num_gates(), 0);
    }

    #[test]
    fn substitute_without_restrash_keeps_parents() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let abc = aig.create_and(ab, c);
        aig.create_po(abc);
        let bc = aig.create_and(b, c);
        aig.substitute_node_no_restrash(ab.node(), !bc);
        assert_eq!(aig.po(0), abc);
        assert!(!aig.is_dead(abc.node()));
        assert_eq!(aig.resolution(ab.node()), Resolution::Redirect(!bc));
        assert_eq!(aig.fanout_size(bc.node()), 1);
        assert_eq!(aig.fanout_size(a.node()), 0);
        assert!(!aig.simulate(&[false, true, true]).unwrap()[0]);
        assert!(aig.simulate(&[false, false, true]).unwrap()[0]);
    }

    #[test]
    fn substitute_without_restrash_leaves_degenerate_parents() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let same = aig.create_and(ab, c);
        let opposite = aig.create_and(ab, !c);
        aig.create_po(same);
        aig.create_po(opposite);
        aig.substitute_node_no_restrash(ab.node(), c);
        assert!(!aig.is_dead(same.node()));
        assert!(!aig.is_dead(opposite.node()));
        assert_eq!(aig.fanin(same.node(), 0), c);
        assert_eq!(aig.fanin(same.node(), 1), c);
        assert_eq!(aig.fanout_size(c.node()), 4);
        for c_value in [false, true] {
            let outputs = aig.simulate(&[true, false, c_value]).unwrap();
            assert_eq!(outputs, vec![c_value, false]);
        }
    }

    #[test]
    fn resolve_chases_redirect_chains() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let bc = aig.create_and(b, c);
        let ac = aig.create_and(a, c);
        aig.create_po(ab);
        aig.create_po(bc);
        aig.create_po(ac);
        aig.substitute_node_no_restrash(ab.node(), !bc);
        aig.substitute_node_no_restrash(bc.node(), ac);
        assert_eq!(aig.resolve(ab.node()), !ac);
        assert_eq!(aig.resolve(ac.node()), ac);
    }

    #[test]
    fn remove_dangling_is_transitive() {
        let (mut aig, a, b, c) = three_inputs();
        let ab = aig.create_and(a, b);
        let abc = aig.create_and(ab, c);
        let keep = aig.create_and(a, c);
        aig.create_po(keep);
        assert_eq!(aig.num_gates(), 3);
        assert_eq!(aig.remove_dangling(), 2);
        assert_eq!(aig.resolution(abc.node()), Resolution::Removed);
        assert_eq!(aig.resolution(ab.node()), Resolution::Removed);
        assert_eq!(aig.has_and(a, b), None);
        assert_eq!(aig.num_gates(), 1);
    }

    #[test]
    fn node_added_events_follow_subscriptions() {
        let (mut aig, a, b, c) = three_inputs();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let handle = aig.subscribe_node_added(Box::new(move |event: &NodeAdded<'_>| {
            sink.borrow_mut().push((event.node, event.kind, event.fanins.len()));
        }));
        let ab = aig.create_and(a, b);
        aig.create_and(b, a);
        let d = aig.create_pi();
        aig.unsubscribe(handle);
        aig.create_and(ab, c);
        assert_eq!(
            *seen.borrow(),
            vec![(ab.node(), NodeKind::And, 2), (d.node(), NodeKind::Pi, 0)]
        );
    }

    #[test]
    fn fingerprint_ignores_dead_slots() {
        let build = |with_garbage: bool| {
            let (mut aig, a, b, c) = three_inputs();
            if with_garbage {
                let junk = aig.create_and(!a, c);
                aig.create_and(junk, b);
            }
            let ab = aig.create_and(a, b);
            let abc = aig.create_and(ab, !c);
            aig.create_po(abc);
            aig.remove_dangling();
            aig
        };
        assert_eq!(build(false).fingerprint(), build(true).fingerprint());
        let (mut other, a, b, _) = three_inputs();
        let ab = other.create_and(a, b);
        other.create_po(ab);
        assert_ne!(build(false).fingerprint(), other.fingerprint());
    }

    #[test]
    fn registers_are_combinational_boundaries() {
        let mut aig = Aig::new();
        let a = aig.create_pi();
        let q = aig.create_ro();
        let next = aig.create_and(a, !q);
        aig.create_ri(next);
        aig.create_po(q);
        assert!(aig.is_ci(q.node()));
        assert!(!aig.is_pi(q.node()));
        assert_eq!(aig.simulate(&[true, false]).unwrap(), vec![false, true]);
        assert_eq!(aig.simulate(&[true, true]).unwrap(), vec![true, false]);
    }

    #[test]
    fn equivalent_checks_interface() {
        let (aig, _, _, _) = three_inputs();
        let other = Aig::new();
        assert!(matches!(
            aig.equivalent(&other),
            Err(SimulationError::InterfaceMismatch { .. })
        ));
    }

    #[test]
    fn random_aig_is_reproducible() {
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(42);
        let a = random_aig(&mut rng, 5, 30, 3);
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(42);
        let b = random_aig(&mut rng, 5, 30, 3);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.num_pos(), 3);
        assert!(a.num_gates() > 0);
    }
}
