//! # Rank view: nodes grouped by level with a stable order inside each level
//!
//! Built on top of [`DepthView`]: rank `l` lists every node at level `l`,
//! and each node knows its position inside its rank. Nodes created through
//! the view are appended to the end of their rank. Positions can be permuted
//! with [`RankView::swap`] and [`RankView::sort_rank`], which is what
//! rank-aware rewriting and placement passes rely on.
//!
//! Like the depth view, the ranks go stale after substitutions; call
//! [`RankView::update_ranks`] to rebuild them.

use crate::depth_view::{DepthParams, DepthView};
use crate::network::{EventHandle, Network, Node, NodeAdded, Signal};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Default)]
struct RankState {
    ranks: Vec<Vec<Node>>,
    positions: Vec<u32>,
    max_width: usize,
}

impl RankState {
    fn insert(&mut self, n: Node, level: u32) {
        let level = level as usize;
        if self.ranks.len() <= level {
            self.ranks.resize_with(level + 1, Vec::new);
        }
        if self.positions.len() <= n.index() {
            self.positions.resize(n.index() + 1, 0);
        }
        let rank = &mut self.ranks[level];
        self.positions[n.index()] = rank.len() as u32;
        rank.push(n);
        self.max_width = self.max_width.max(rank.len());
    }
}

pub struct RankView<'a, N: Network> {
    view: DepthView<'a, N>,
    ranks: Rc<RefCell<RankState>>,
    handle: EventHandle,
}

impl<'a, N: Network> RankView<'a, N> {
    pub fn new(ntk: &'a mut N) -> Self {
        Self::with_params(ntk, DepthParams::default())
    }

    pub fn with_params(ntk: &'a mut N, params: DepthParams) -> Self {
        let mut view = DepthView::with_params(ntk, params);
        let ranks = Rc::new(RefCell::new(RankState::default()));
        // registered after the depth hook, so the new node is already leveled
        let levels = view.level_state();
        let hook = Rc::clone(&ranks);
        let handle = view.subscribe_node_added(Box::new(move |event: &NodeAdded<'_>| {
            let level = levels.borrow().level(event.node);
            hook.borrow_mut().insert(event.node, level);
        }));
        let mut ranked = RankView { view, ranks, handle };
        ranked.rebuild();
        ranked
    }

    fn rebuild(&mut self) {
        let mut ranks = self.ranks.borrow_mut();
        *ranks = RankState::default();
        ranks.positions.resize(self.view.size(), 0);
        let view = &self.view;
        view.foreach_node(|n| ranks.insert(n, view.level(n)));
        debug!(
            ranks = ranks.ranks.len(),
            width = ranks.max_width,
            "ranks rebuilt"
        );
    }

    /// Position of `n` inside its rank.
    pub fn rank_position(&self, n: Node) -> u32 {
        self.ranks.borrow().positions[n.index()]
    }

    /// Node stored at `position` of rank `level`; panics when out of range.
    pub fn at_rank_position(&self, level: u32, position: u32) -> Node {
        self.ranks.borrow().ranks[level as usize][position as usize]
    }

    /// Largest number of nodes any rank has held since the last rebuild.
    pub fn width(&self) -> usize {
        self.ranks.borrow().max_width
    }

    pub fn rank_width(&self, level: u32) -> usize {
        self.ranks
            .borrow()
            .ranks
            .get(level as usize)
            .map_or(0, Vec::len)
    }

    pub fn num_ranks(&self) -> usize {
        self.ranks.borrow().ranks.len()
    }

    /// Exchanges the rank positions of two nodes on the same level.
    ///
    /// # Panics
    ///
    /// When the nodes sit on different levels.
    pub fn swap(&mut self, n1: Node, n2: Node) {
        let level = self.view.level(n1);
        assert_eq!(
            level,
            self.view.level(n2),
            "cannot swap {n1} and {n2}: they sit on different levels"
        );
        if n1 == n2 {
            return;
        }
        let mut ranks = self.ranks.borrow_mut();
        let state = &mut *ranks;
        let (p1, p2) = (state.positions[n1.index()], state.positions[n2.index()]);
        let rank = &mut state.ranks[level as usize];
        rank.swap(p1 as usize, p2 as usize);
        state.positions.swap(n1.index(), n2.index());
    }

    /// Sorts rank `level` with `cmp` and renumbers its positions.
    pub fn sort_rank(&mut self, level: u32, cmp: impl FnMut(&Node, &Node) -> Ordering) {
        let mut state = self.ranks.borrow_mut();
        let RankState {
            ranks, positions, ..
        } = &mut *state;
        let Some(rank) = ranks.get_mut(level as usize) else {
            return;
        };
        rank.sort_by(cmp);
        for (position, n) in rank.iter().enumerate() {
            positions[n.index()] = position as u32;
        }
    }

    pub fn foreach_node_in_rank(&self, level: u32, mut f: impl FnMut(Node)) {
        if let Some(rank) = self.ranks.borrow().ranks.get(level as usize) {
            rank.iter().for_each(|n| f(*n));
        }
    }

    pub fn foreach_gate_in_rank(&self, level: u32, mut f: impl FnMut(Node)) {
        self.foreach_node_in_rank(level, |n| {
            if self.view.is_and(n) {
                f(n)
            }
        });
    }

    /// Every ranked node, rank by rank in position order.
    pub fn foreach_node(&self, mut f: impl FnMut(Node)) {
        for rank in &self.ranks.borrow().ranks {
            rank.iter().for_each(|n| f(*n));
        }
    }

    pub fn foreach_gate(&self, mut f: impl FnMut(Node)) {
        self.foreach_node(|n| {
            if self.view.is_and(n) {
                f(n)
            }
        });
    }

    pub fn foreach_pi(&self, mut f: impl FnMut(Node)) {
        self.foreach_node(|n| {
            if self.view.is_pi(n) {
                f(n)
            }
        });
    }

    /// Creates a primary input; it lands at the end of the input rank.
    pub fn create_pi(&mut self) -> Signal {
        let s = self.view.create_pi();
        let n = s.node();
        debug_assert_eq!(
            self.at_rank_position(self.view.level(n), self.rank_position(n)),
            n
        );
        s
    }

    /// Recomputes levels, then rebuilds every rank from scratch.
    pub fn update_ranks(&mut self) {
        self.view.update_levels();
        self.rebuild();
    }

    pub fn update_levels(&mut self) {
        self.update_ranks();
    }
}

impl<'a, N: Network> Deref for RankView<'a, N> {
    type Target = DepthView<'a, N>;

    fn deref(&self) -> &DepthView<'a, N> {
        &self.view
    }
}

impl<'a, N: Network> DerefMut for RankView<'a, N> {
    fn deref_mut(&mut self) -> &mut DepthView<'a, N> {
        &mut self.view
    }
}

impl<'a, N: Network> Drop for RankView<'a, N> {
    fn drop(&mut self) {
        self.view.unsubscribe(self.handle);
    }
}
