//! # Depth view: levels, depth and critical path
//!
//! Wraps a mutably borrowed [`Network`] and keeps, for every node, its
//! topological level. The view dereferences to the network, so gates created
//! through it are leveled on the spot by the node-added hook.
//!
//! ## Consistency
//!
//! - After [`DepthView::update_levels`] every live node satisfies
//!   `level(n) = 1 + max(level(f) + edge_cost(f))` over its fanins, and
//!   combinational inputs sit at the configured input cost.
//! - Additions keep levels correct but leave depth and critical-path flags
//!   untouched.
//! - Substitutions and removals are not tracked at all: call
//!   [`DepthView::update_levels`] after them.
//!
//! ## Example
//!
//! ```rust
//! use aigopt::{Aig, DepthView, Network};
//!
//! let mut aig = Aig::new();
//! let a = aig.create_pi();
//! let b = aig.create_pi();
//! let c = aig.create_pi();
//! let ab = aig.create_and(a, b);
//! let abc = aig.create_and(ab, c);
//! aig.create_po(abc);
//!
//! let view = DepthView::new(&mut aig);
//! assert_eq!(view.level(abc.node()), 2);
//! assert_eq!(view.depth(), 2);
//! assert!(view.is_on_critical_path(a.node()));
//! assert!(!view.is_on_critical_path(c.node()));
//! ```

use crate::network::{EventHandle, Network, Node, NodeAdded, NodeKind, Signal};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use tracing::debug;

/// How levels are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthParams {
    /// Count a complemented edge as one extra level.
    pub count_complements: bool,
    /// Level of primary inputs and register outputs.
    pub input_cost: u32,
}

#[derive(Debug)]
pub(crate) struct LevelState {
    params: DepthParams,
    levels: Vec<u32>,
    critical: Vec<bool>,
    depth: u32,
}

impl LevelState {
    fn new(params: DepthParams, size: usize) -> Self {
        LevelState {
            params,
            levels: vec![0; size],
            critical: vec![false; size],
            depth: 0,
        }
    }

    pub(crate) fn level(&self, n: Node) -> u32 {
        self.levels[n.index()]
    }

    fn edge_cost(&self, f: Signal) -> u32 {
        (self.params.count_complements && f.is_complemented()) as u32
    }

    fn signal_level(&self, f: Signal) -> u32 {
        self.level(f.node()) + self.edge_cost(f)
    }

    fn grow(&mut self, size: usize) {
        if self.levels.len() < size {
            self.levels.resize(size, 0);
            self.critical.resize(size, false);
        }
    }

    fn on_node_added(&mut self, event: &NodeAdded<'_>) {
        self.grow(event.node.index() + 1);
        let level = match event.kind {
            NodeKind::Constant => 0,
            NodeKind::Pi | NodeKind::Ro => self.params.input_cost,
            NodeKind::And => {
                1 + event
                    .fanins
                    .iter()
                    .map(|f| self.signal_level(*f))
                    .max()
                    .unwrap_or(0)
            }
        };
        self.levels[event.node.index()] = level;
    }
}

/// Level, depth and critical-path bookkeeping over a borrowed network.
pub struct DepthView<'a, N: Network> {
    ntk: &'a mut N,
    state: Rc<RefCell<LevelState>>,
    handle: EventHandle,
}

impl<'a, N: Network> DepthView<'a, N> {
    pub fn new(ntk: &'a mut N) -> Self {
        Self::with_params(ntk, DepthParams::default())
    }

    pub fn with_params(ntk: &'a mut N, params: DepthParams) -> Self {
        let state = Rc::new(RefCell::new(LevelState::new(params, ntk.size())));
        let hook = Rc::clone(&state);
        let handle = ntk.subscribe_node_added(Box::new(move |event: &NodeAdded<'_>| {
            hook.borrow_mut().on_node_added(event)
        }));
        let mut view = DepthView { ntk, state, handle };
        view.update_levels();
        view
    }

    pub fn params(&self) -> DepthParams {
        self.state.borrow().params
    }

    pub fn level(&self, n: Node) -> u32 {
        self.state.borrow().level(n)
    }

    /// Level seen by a consumer of `f`: the node level plus the edge cost.
    pub fn signal_level(&self, f: Signal) -> u32 {
        self.state.borrow().signal_level(f)
    }

    pub fn depth(&self) -> u32 {
        self.state.borrow().depth
    }

    /// Only meaningful right after [`DepthView::update_levels`].
    pub fn is_on_critical_path(&self, n: Node) -> bool {
        self.state.borrow().critical[n.index()]
    }

    pub fn set_level(&mut self, n: Node, level: u32) {
        let mut state = self.state.borrow_mut();
        state.grow(n.index() + 1);
        state.levels[n.index()] = level;
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.state.borrow_mut().depth = depth;
    }

    /// Recomputes every level, the depth and the critical path.
    pub fn update_levels(&mut self) {
        let trav_id = self.ntk.incr_trav_id();
        let mut state = self.state.borrow_mut();
        state.grow(self.ntk.size());
        state.critical.iter_mut().for_each(|c| *c = false);

        let mut outputs = Vec::with_capacity(self.ntk.num_pos() + self.ntk.num_ris());
        self.ntk.foreach_po(|f| outputs.push(f));
        self.ntk.foreach_ri(|f| outputs.push(f));

        let mut depth = 0;
        for f in &outputs {
            compute_level(&mut *self.ntk, &mut state, f.node(), trav_id);
            depth = depth.max(state.signal_level(*f));
        }
        let mut gates = Vec::new();
        self.ntk.foreach_gate(|n| gates.push(n));
        for n in gates {
            compute_level(&mut *self.ntk, &mut state, n, trav_id);
        }
        state.depth = depth;

        for f in &outputs {
            if state.signal_level(*f) == depth && !state.critical[f.node().index()] {
                mark_critical(&*self.ntk, &mut state, f.node());
            }
        }
        debug!(depth, outputs = outputs.len(), "levels recomputed");
    }

    /// Creates a primary output and raises the depth if the output is deeper.
    pub fn create_po(&mut self, f: Signal) {
        self.ntk.create_po(f);
        let mut state = self.state.borrow_mut();
        let level = state.signal_level(f);
        state.depth = state.depth.max(level);
    }

    pub(crate) fn level_state(&self) -> Rc<RefCell<LevelState>> {
        Rc::clone(&self.state)
    }
}

fn compute_level<N: Network>(ntk: &mut N, state: &mut LevelState, n: Node, trav_id: u32) -> u32 {
    if ntk.visited(n) == trav_id {
        return state.level(n);
    }
    ntk.set_visited(n, trav_id);
    let level = match ntk.kind(n) {
        NodeKind::Constant => 0,
        NodeKind::Pi | NodeKind::Ro => state.params.input_cost,
        NodeKind::And => {
            let mut level = 0;
            for i in 0..ntk.fanin_size(n) {
                let f = ntk.fanin(n, i);
                let fanin_level = compute_level(ntk, state, f.node(), trav_id);
                level = level.max(fanin_level + state.edge_cost(f));
            }
            level + 1
        }
    };
    state.levels[n.index()] = level;
    level
}

fn mark_critical<N: Network>(ntk: &N, state: &mut LevelState, n: Node) {
    state.critical[n.index()] = true;
    if !ntk.is_and(n) {
        return;
    }
    let level = state.level(n);
    for i in 0..ntk.fanin_size(n) {
        let f = ntk.fanin(n, i);
        if state.signal_level(f) + 1 == level && !state.critical[f.node().index()] {
            mark_critical(ntk, state, f.node());
        }
    }
}

impl<'a, N: Network> Deref for DepthView<'a, N> {
    type Target = N;

    fn deref(&self) -> &N {
        &*self.ntk
    }
}

impl<'a, N: Network> DerefMut for DepthView<'a, N> {
    fn deref_mut(&mut self) -> &mut N {
        &mut *self.ntk
    }
}

impl<'a, N: Network> Drop for DepthView<'a, N> {
    fn drop(&mut self) {
        self.ntk.unsubscribe(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::Aig;

    fn assert_levels_consistent<N: Network>(view: &DepthView<'_, N>) {
        view.foreach_node(|n| {
            if view.is_constant(n) {
                assert_eq!(view.level(n), 0);
            } else if view.is_ci(n) {
                assert_eq!(view.level(n), view.params().input_cost);
            } else {
                let mut expected = 0;
                view.foreach_fanin(n, |f| expected = expected.max(view.signal_level(f)));
                assert_eq!(view.level(n), expected + 1, "level of {n}");
            }
        });
    }

    /// `((a & b) & c) & !d` next to a short `e & f`.
    fn sample() -> (Aig, Vec<Signal>, Signal, Signal) {
        let mut aig = Aig::new();
        let pis: Vec<Signal> = (0..6).map(|_| aig.create_pi()).collect();
        let ab = aig.create_and(pis[0], pis[1]);
        let abc = aig.create_and(ab, pis[2]);
        let long = aig.create_and(abc, !pis[3]);
        let short = aig.create_and(pis[4], pis[5]);
        aig.create_po(long);
        aig.create_po(!short);
        (aig, pis, long, short)
    }

    #[test]
    fn levels_follow_longest_path() {
        let (mut aig, pis, long, short) = sample();
        let view = DepthView::new(&mut aig);
        assert_eq!(view.level(pis[0].node()), 0);
        assert_eq!(view.level(long.node()), 3);
        assert_eq!(view.level(short.node()), 1);
        assert_eq!(view.depth(), 3);
        assert_levels_consistent(&view);
    }

    #[test]
    fn critical_path_marks_only_longest_cone() {
        let (mut aig, pis, long, short) = sample();
        let view = DepthView::new(&mut aig);
        assert!(view.is_on_critical_path(long.node()));
        assert!(view.is_on_critical_path(pis[0].node()));
        assert!(view.is_on_critical_path(pis[1].node()));
        // c and d enter the cone above level one
        assert!(!view.is_on_critical_path(pis[2].node()));
        assert!(!view.is_on_critical_path(pis[3].node()));
        assert!(!view.is_on_critical_path(short.node()));
    }

    #[test]
    fn complemented_edges_can_cost_a_level() {
        let (mut aig, pis, long, short) = sample();
        let params = DepthParams {
            count_complements: true,
            input_cost: 0,
        };
        let view = DepthView::with_params(&mut aig, params);
        assert_eq!(view.level(long.node()), 3);
        assert_eq!(view.level(short.node()), 1);
        // the inverted output edge of `short` counts toward depth
        assert_eq!(view.signal_level(!short), 2);
        assert_eq!(view.depth(), 3);
        // !d reaches `long` at level 1, two short of the critical fanin
        assert!(!view.is_on_critical_path(pis[3].node()));
        assert!(view.is_on_critical_path(pis[0].node()));
        assert_levels_consistent(&view);
    }

    #[test]
    fn input_cost_shifts_every_level() {
        let (mut aig, pis, long, _) = sample();
        let params = DepthParams {
            count_complements: false,
            input_cost: 1,
        };
        let view = DepthView::with_params(&mut aig, params);
        assert_eq!(view.level(pis[5].node()), 1);
        assert_eq!(view.level(long.node()), 4);
        assert_eq!(view.depth(), 4);
        assert_levels_consistent(&view);
    }

    #[test]
    fn additions_are_leveled_but_depth_waits_for_recompute() {
        let (mut aig, pis, long, _) = sample();
        let mut view = DepthView::new(&mut aig);
        let deeper = view.create_and(long, pis[4]);
        assert_eq!(view.level(deeper.node()), 4);
        let fresh = view.create_pi();
        assert_eq!(view.level(fresh.node()), 0);
        assert_eq!(view.depth(), 3);

        // outputs added through the view raise the depth immediately
        view.create_po(deeper);
        assert_eq!(view.depth(), 4);
        assert!(!view.is_on_critical_path(deeper.node()));

        view.update_levels();
        assert!(view.is_on_critical_path(deeper.node()));
        assert_levels_consistent(&view);
    }

    #[test]
    fn substitutions_need_an_explicit_recompute() {
        let (mut aig, pis, long, _) = sample();
        let mut view = DepthView::new(&mut aig);
        let shallow = view.create_and(pis[0], !pis[3]);
        view.substitute_node(long.node(), shallow);
        // nothing notices the substitution yet
        assert_eq!(view.depth(), 3);
        view.update_levels();
        assert_eq!(view.depth(), 1);
        assert_levels_consistent(&view);
    }

    #[test]
    fn register_inputs_count_toward_depth() {
        let mut aig = Aig::new();
        let a = aig.create_pi();
        let q = aig.create_ro();
        let x = aig.create_and(a, q);
        let y = aig.create_and(x, !a);
        aig.create_po(a);
        aig.create_ri(y);
        let view = DepthView::new(&mut aig);
        assert_eq!(view.depth(), 2);
        assert!(view.is_on_critical_path(q.node()));
    }

    #[test]
    fn unreachable_gates_are_leveled() {
        let (mut aig, pis, long, _) = sample();
        let dangling = aig.create_and(long, pis[5]);
        let view = DepthView::new(&mut aig);
        assert_eq!(view.level(dangling.node()), 4);
        assert_eq!(view.depth(), 3);
    }

    #[test]
    fn explicit_overrides() {
        let (mut aig, _, long, _) = sample();
        let mut view = DepthView::new(&mut aig);
        view.set_level(long.node(), 7);
        view.set_depth(7);
        assert_eq!(view.level(long.node()), 7);
        assert_eq!(view.depth(), 7);
        view.update_levels();
        assert_eq!(view.level(long.node()), 3);
    }

    #[test]
    fn dropping_the_view_unsubscribes() {
        let (mut aig, pis, _, _) = sample();
        {
            let view = DepthView::new(&mut aig);
            assert!(format!("{:?}", &*view).contains("subscribers: 1"));
        }
        assert!(format!("{aig:?}").contains("subscribers: 0"));
        aig.create_and(pis[0], pis[5]);
    }

    #[test]
    fn params_round_trip_through_json() {
        let params = DepthParams {
            count_complements: true,
            input_cost: 2,
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(serde_json::from_str::<DepthParams>(&json).unwrap(), params);
        assert_eq!(
            serde_json::from_str::<DepthParams>("{}").unwrap(),
            DepthParams::default()
        );
    }
}
