//! # AND-tree balancing
//!
//! Rebuilds every maximal AND tree of a network so that its depth shrinks
//! (level mode) or so that existing gates are reused (area mode).
//!
//! A tree is collected from its root through AND gates that have a single
//! consumer and are reached through a plain edge. Everything else becomes a
//! leaf: inputs, constants, complemented edges and shared gates. Leaves are
//! balanced first, then combined two at a time:
//!
//! - level mode sorts the leaves by descending level and joins the two
//!   shallowest, preferring a pair whose AND already exists among leaves of
//!   the same level;
//! - area mode joins any pair whose AND already exists, falling back to the
//!   two shallowest leaves.
//!
//! Gates inside the tree being rebuilt are never reused: they are about to
//! disappear. Duplicate leaves are merged, and a leaf appearing in both
//! polarities collapses the whole tree to constant false.
//!
//! ```rust
//! use aigopt::{aig_balance, Aig, BalancingParams, DepthView, Network};
//!
//! let mut aig = Aig::new();
//! let pis: Vec<_> = (0..4).map(|_| aig.create_pi()).collect();
//! let chain = pis[1..].iter().fold(pis[0], |acc, pi| aig.create_and(acc, *pi));
//! aig.create_po(chain);
//!
//! let stats = aig_balance(&mut aig, &BalancingParams::default());
//! assert_eq!((stats.depth_before, stats.depth_after), (3, 2));
//! assert_eq!(DepthView::new(&mut aig).depth(), 2);
//! ```

use crate::depth_view::DepthView;
use crate::network::{Network, Node, Signal};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::mem;
use tracing::{debug, trace};

/// Balancing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancingParams {
    /// Minimize levels; when false, minimize the number of gates instead.
    pub minimize_levels: bool,
    /// Narrow the search for reusable gates to the most promising leaf.
    pub fast_mode: bool,
}

impl Default for BalancingParams {
    fn default() -> Self {
        BalancingParams {
            minimize_levels: true,
            fast_mode: true,
        }
    }
}

/// What a balancing run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancingStats {
    pub gates_before: usize,
    pub gates_after: usize,
    pub depth_before: u32,
    pub depth_after: u32,
    /// Trees whose root was replaced by a new one.
    pub trees_rebuilt: usize,
    /// Pairs joined through an existing gate found by the sharing search.
    pub shared_reuses: usize,
    /// Trees that folded to a constant.
    pub constant_trees: usize,
    pub dangling_removed: usize,
}

/// Upper bound on balancing rounds in one call.
const MAX_ROUNDS: usize = 32;

/// Balances every AND tree reachable from the primary outputs and the
/// register inputs, then removes the gates left without consumers.
///
/// Rebuilding a tree can release a shared gate into its consumer's tree, so
/// rounds repeat until one rebuilds nothing. Running the pass again on its
/// own result then changes nothing.
pub fn aig_balance<N: Network>(ntk: &mut N, params: &BalancingParams) -> BalancingStats {
    let mut view = DepthView::new(ntk);
    let mut stats = BalancingStats {
        gates_before: view.num_gates(),
        depth_before: view.depth(),
        ..BalancingStats::default()
    };

    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut round = BalancingStats::default();
        let mut balancer = AigBalance {
            ntk: &mut view,
            params: *params,
            storage: Vec::new(),
            stats: &mut round,
        };
        balancer.run();

        stats.dangling_removed += view.remove_dangling();
        view.update_levels();
        stats.trees_rebuilt += round.trees_rebuilt;
        stats.shared_reuses += round.shared_reuses;
        stats.constant_trees += round.constant_trees;
        trace!(
            round = rounds,
            trees = round.trees_rebuilt,
            constants = round.constant_trees,
            depth = view.depth(),
            "balancing round"
        );
        if round.trees_rebuilt == 0 && round.constant_trees == 0 {
            break;
        }
        if rounds == MAX_ROUNDS {
            debug!(rounds, "balancing stopped before reaching a fixpoint");
            break;
        }
    }

    stats.gates_after = view.num_gates();
    stats.depth_after = view.depth();
    debug!(
        gates_before = stats.gates_before,
        gates_after = stats.gates_after,
        depth_before = stats.depth_before,
        depth_after = stats.depth_after,
        trees = stats.trees_rebuilt,
        reuses = stats.shared_reuses,
        rounds,
        "balancing finished"
    );
    stats
}

/// Outcome of gathering or combining leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leaves {
    Collected,
    /// Some leaf met its own complement: the tree is constant false.
    Contradiction,
    /// A substitution triggered by a leaf reshaped the tree; collect again.
    Stale,
}

struct AigBalance<'v, 'a, N: Network> {
    ntk: &'v mut DepthView<'a, N>,
    params: BalancingParams,
    /// Leaf buffers, one per recursion depth.
    storage: Vec<Vec<Signal>>,
    stats: &'v mut BalancingStats,
}

impl<'v, 'a, N: Network> AigBalance<'v, 'a, N> {
    fn run(&mut self) {
        self.ntk.clear_values();
        for i in 0..self.ntk.num_pos() {
            let n = self.ntk.po(i).node();
            self.balance_rec(n, 0);
        }
        for i in 0..self.ntk.num_ris() {
            let n = self.ntk.ri(i).node();
            self.balance_rec(n, 0);
        }
    }

    /// Balances the tree rooted at `n` and returns what now stands for it, or
    /// `None` when `n` was removed without a replacement.
    fn balance_rec(&mut self, n: Node, depth: usize) -> Option<Signal> {
        if self.ntk.is_ci(n) || self.ntk.is_constant(n) {
            return Some(self.ntk.make_signal(n));
        }
        if self.ntk.is_dead(n) {
            return self.ntk.try_resolve(n);
        }
        if self.ntk.value(n) != 0 {
            return Some(self.ntk.make_signal(n));
        }

        if self.storage.len() <= depth {
            self.storage.resize_with(depth + 1, Vec::new);
        }
        let mut leaves = mem::take(&mut self.storage[depth]);
        let root = self.rebuild_tree(n, depth, &mut leaves);
        leaves.clear();
        self.storage[depth] = leaves;
        root
    }

    fn rebuild_tree(&mut self, n: Node, depth: usize, leaves: &mut Vec<Signal>) -> Option<Signal> {
        let zero = self.ntk.get_constant(false);
        let root = self.ntk.make_signal(n);
        loop {
            // constant propagation from a leaf can swallow the tree itself
            if self.ntk.is_dead(n) {
                trace!(node = %n, "tree absorbed while balancing its leaves");
                return self.ntk.try_resolve(n);
            }
            leaves.clear();
            if self.collect_leaves(root, leaves, true) == Leaves::Contradiction {
                return Some(self.replace_with_constant(n, zero));
            }
            if leaves.is_empty() {
                return Some(self.replace_with_constant(n, !zero));
            }
            trace!(node = %n, leaves = leaves.len(), "rebuilding and-tree");
            match self.balance_leaves(n, depth, leaves) {
                Leaves::Collected => break,
                Leaves::Contradiction => return Some(self.replace_with_constant(n, zero)),
                Leaves::Stale => trace!(node = %n, "leaves changed, collecting again"),
            }
        }
        if leaves.is_empty() {
            return Some(self.replace_with_constant(n, !zero));
        }

        leaves.sort_by_key(|s| (Reverse(self.ntk.level(s.node())), s.literal()));
        let trav_id = self.ntk.incr_trav_id();
        for leaf in leaves.iter() {
            self.ntk.set_visited(leaf.node(), trav_id);
        }
        self.mark_cone(root, trav_id, true);

        if self.assemble(leaves) == Leaves::Contradiction {
            return Some(self.replace_with_constant(n, zero));
        }

        let new_root = leaves[0];
        if self.ntk.is_constant(new_root.node()) {
            return Some(self.replace_with_constant(n, new_root));
        }
        if new_root.node() != n {
            self.ntk.substitute_node_no_restrash(n, new_root);
            self.stats.trees_rebuilt += 1;
        }
        self.ntk.set_value(new_root.node(), 1);
        Some(new_root)
    }

    /// Balances each leaf in place, then normalizes the list.
    fn balance_leaves(&mut self, n: Node, depth: usize, leaves: &mut Vec<Signal>) -> Leaves {
        for i in 0..leaves.len() {
            let leaf = leaves[i];
            match self.balance_rec(leaf.node(), depth + 1) {
                Some(balanced) => leaves[i] = balanced ^ leaf.is_complemented(),
                None => return Leaves::Stale,
            }
            if self.ntk.is_dead(n) {
                return Leaves::Stale;
            }
        }
        self.normalize_leaves(leaves)
    }

    fn replace_with_constant(&mut self, n: Node, constant: Signal) -> Signal {
        trace!(node = %n, value = constant.is_complemented(), "tree folds to a constant");
        self.ntk.substitute_node(n, constant);
        self.stats.constant_trees += 1;
        constant
    }

    fn is_leaf(&self, f: Signal, root: bool) -> bool {
        let n = f.node();
        !root && (f.is_complemented() || !self.ntk.is_and(n) || self.ntk.fanout_size(n) > 1)
    }

    fn collect_leaves(&self, f: Signal, leaves: &mut Vec<Signal>, root: bool) -> Leaves {
        if self.is_leaf(f, root) {
            if self.ntk.is_constant(f.node()) {
                // true drops out of an AND, false decides it
                return if f.is_complemented() {
                    Leaves::Collected
                } else {
                    Leaves::Contradiction
                };
            }
            if leaves.contains(&!f) {
                return Leaves::Contradiction;
            }
            if !leaves.contains(&f) {
                leaves.push(f);
            }
            return Leaves::Collected;
        }
        let n = f.node();
        for i in 0..self.ntk.fanin_size(n) {
            let fanin = self.ntk.fanin(n, i);
            if self.collect_leaves(fanin, leaves, false) == Leaves::Contradiction {
                return Leaves::Contradiction;
            }
        }
        Leaves::Collected
    }

    /// Re-resolves leaves replaced while balancing them, then merges
    /// duplicates and drops constant-true leaves. A leaf removed outright
    /// means the tree changed shape under it.
    fn normalize_leaves(&self, leaves: &mut Vec<Signal>) -> Leaves {
        let mut kept = 0;
        for i in 0..leaves.len() {
            let mut leaf = leaves[i];
            if self.ntk.is_dead(leaf.node()) {
                match self.ntk.try_resolve(leaf.node()) {
                    Some(s) => leaf = s ^ leaf.is_complemented(),
                    None => return Leaves::Stale,
                }
            }
            if self.ntk.is_constant(leaf.node()) {
                if leaf.is_complemented() {
                    continue;
                }
                return Leaves::Contradiction;
            }
            if leaves[..kept].contains(&!leaf) {
                return Leaves::Contradiction;
            }
            if leaves[..kept].contains(&leaf) {
                continue;
            }
            leaves[kept] = leaf;
            kept += 1;
        }
        leaves.truncate(kept);
        Leaves::Collected
    }

    fn mark_cone(&mut self, f: Signal, trav_id: u32, root: bool) {
        let n = f.node();
        if !root && (self.ntk.visited(n) == trav_id || self.is_leaf(f, false)) {
            return;
        }
        self.ntk.set_visited(n, trav_id);
        for i in 0..self.ntk.fanin_size(n) {
            let fanin = self.ntk.fanin(n, i);
            self.mark_cone(fanin, trav_id, false);
        }
    }

    /// Whether the existing AND of `a` and `b`, if any, may stand in for a
    /// new gate.
    fn reusable(&self, a: Signal, b: Signal) -> bool {
        match self.ntk.has_and(a, b) {
            Some(s) => self.ntk.visited(s.node()) != self.ntk.trav_id(),
            None => false,
        }
    }

    /// Combines the sorted leaves pairwise until a single signal remains.
    fn assemble(&mut self, leaves: &mut Vec<Signal>) -> Leaves {
        let mut recent = None;
        while leaves.len() > 1 {
            let shared = if self.params.minimize_levels {
                self.pick_for_depth(leaves)
            } else {
                self.pick_for_area(leaves, recent)
            };
            if shared {
                self.stats.shared_reuses += 1;
            }

            let len = leaves.len();
            let (a, b) = (leaves[len - 2], leaves[len - 1]);
            leaves.truncate(len - 2);
            let s = self.ntk.create_and(a, b);
            if self.ntk.is_and(s.node()) {
                let level = 1 + self.ntk.signal_level(a).max(self.ntk.signal_level(b));
                self.ntk.set_level(s.node(), level);
            }
            trace!(%a, %b, result = %s, shared, "joined leaves");
            if self.insert_sorted(leaves, s) == Leaves::Contradiction {
                return Leaves::Contradiction;
            }
            recent = Some(s);
        }
        Leaves::Collected
    }

    /// Moves a reusable pair among the shallowest leaves to the end of the
    /// list without disturbing the level order.
    fn pick_for_depth(&self, leaves: &mut [Signal]) -> bool {
        let right = leaves.len() - 1;
        let window_level = self.ntk.level(leaves[right - 1].node());
        let mut left = right - 1;
        while left > 0 && self.ntk.level(leaves[left - 1].node()) == window_level {
            left -= 1;
        }

        for j in (left..right).rev() {
            if self.reusable(leaves[right], leaves[j]) {
                leaves.swap(j, right - 1);
                return true;
            }
        }
        if self.params.fast_mode || self.ntk.level(leaves[right].node()) != window_level {
            return false;
        }
        for i in (left + 1..right).rev() {
            for j in (left..i).rev() {
                if self.reusable(leaves[i], leaves[j]) {
                    leaves.swap(i, right);
                    leaves.swap(j, right - 1);
                    return true;
                }
            }
        }
        false
    }

    /// Moves any reusable pair to the end of the list. Fast mode only pairs
    /// the most recently created leaf with the others.
    fn pick_for_area(&self, leaves: &mut Vec<Signal>, recent: Option<Signal>) -> bool {
        let last = leaves.len() - 1;
        if self.params.fast_mode {
            let i = recent
                .and_then(|s| leaves.iter().position(|l| *l == s))
                .unwrap_or(last);
            for j in (0..leaves.len()).rev() {
                if j != i && self.reusable(leaves[i], leaves[j]) {
                    move_pair_to_end(leaves, i, j);
                    return true;
                }
            }
            return false;
        }
        for i in (1..=last).rev() {
            for j in (0..i).rev() {
                if self.reusable(leaves[i], leaves[j]) {
                    move_pair_to_end(leaves, i, j);
                    return true;
                }
            }
        }
        false
    }

    /// Inserts a freshly combined signal, keeping the leaves sorted by
    /// descending level and free of duplicates.
    fn insert_sorted(&self, leaves: &mut Vec<Signal>, s: Signal) -> Leaves {
        if self.ntk.is_constant(s.node()) {
            if !s.is_complemented() {
                return Leaves::Contradiction;
            }
            if leaves.is_empty() {
                leaves.push(s);
            }
            return Leaves::Collected;
        }
        if leaves.contains(&!s) {
            return Leaves::Contradiction;
        }
        if leaves.contains(&s) {
            return Leaves::Collected;
        }
        let level = self.ntk.level(s.node());
        let position = leaves
            .iter()
            .position(|l| self.ntk.level(l.node()) < level)
            .unwrap_or(leaves.len());
        leaves.insert(position, s);
        Leaves::Collected
    }
}

fn move_pair_to_end(leaves: &mut Vec<Signal>, i: usize, j: usize) {
    let (hi, lo) = if i > j { (i, j) } else { (j, i) };
    let first = leaves.remove(hi);
    let second = leaves.remove(lo);
    leaves.push(second);
    leaves.push(first);
}
