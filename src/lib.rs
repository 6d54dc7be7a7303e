//! # aigopt
//!
//! **Level-aware views and AND-tree balancing for and-inverter graphs**
//!
//! A small logic-synthesis toolkit: a structurally hashed AIG, a view that
//! tracks the level of every node, a view that orders the nodes of each level,
//! and a pass that rebuilds AND trees to reduce depth or gate count.
//!
//! ## Quick Start
//!
//! ```rust
//! use aigopt::{aig_balance, Aig, BalancingParams, DepthView, Network};
//!
//! let mut aig = Aig::new();
//! let inputs: Vec<_> = (0..8).map(|_| aig.create_pi()).collect();
//! let mut chain = inputs[0];
//! for pi in &inputs[1..] {
//!     chain = aig.create_and(chain, *pi);
//! }
//! aig.create_po(chain);
//! let original = aig.clone();
//!
//! let stats = aig_balance(&mut aig, &BalancingParams::default());
//! assert_eq!(stats.depth_before, 7);
//! assert_eq!(DepthView::new(&mut aig).depth(), 3);
//! assert!(aig.equivalent(&original).unwrap());
//! println!("balanced network: {}", aig.fingerprint());
//! ```
//!
//! ## Key Concepts
//!
//! - **Network**: the node-graph interface every view and pass is written against
//! - **DepthView**: levels, depth and critical path, kept current on additions
//! - **RankView**: nodes grouped by level, with a mutable order inside each level
//! - **Balancing**: rebuilds maximal AND trees for depth or for sharing
//!
//! Views subscribe to node creation only. After substitutions, call
//! `update_levels` (or `update_ranks`) before trusting their answers.

pub mod aig;
pub mod balancing;
pub mod depth_view;
pub mod network;
pub mod rank_view;

pub use aig::{random_aig, Aig, NetworkHash, SimulationError, TruthTable};
pub use balancing::{aig_balance, BalancingParams, BalancingStats};
pub use depth_view::{DepthParams, DepthView};
pub use network::{EventHandle, Network, Node, NodeAdded, NodeKind, Resolution, Signal};
pub use rank_view::RankView;
