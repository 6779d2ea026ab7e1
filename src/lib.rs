//! This library implements the scheduling core of a symbolic execution engine:
//! the bookkeeping that decides which execution state runs next, records how
//! states forked from one another, and recombines states that diverged inside
//! a marked region of the program.
//!
//! Note that this library neither interprets instructions nor reasons about
//! path constraints. It sees an execution state only as a [`state::StateView`],
//! a small summary of counters that the engine provides.
//!
//! # How it Works
//!
//! The core is made of four layers, each depending only on those before it:
//!
//! 1. The [`data::weighted_tree::WeightedTree`] is a discrete probability
//!    distribution over a changing set of items, which backs the weighted
//!    scheduling policies.
//! 2. The [`forest::ForkForest`] records every fork and termination as a forest
//!    of binary trees whose leaves are the live states.
//! 3. The [`scheduler`]s choose the next state to run. The core policies hold
//!    the live states themselves, while decorators such as batching or
//!    iterative deepening change when their inner scheduler is consulted.
//! 4. The [`merge::MergingScheduler`] tracks merge regions, parks states that
//!    reach a close-merge, and merges them through engine callbacks.
//!
//! # Basic Usage
//!
//! The engine builds a scheduler, reports the initial state, and then
//! alternates between selecting a state and reporting what happened to it.
//!
//! ```
//! use fork_scheduler::{
//!     clock::SystemClock,
//!     scheduler::{self, Config, SchedulerKind},
//!     state::{StateId, StateView},
//! };
//!
//! let config = Config::default()
//!     .with_core(vec![SchedulerKind::DepthFirst])
//!     .with_batching(None);
//! let mut scheduler = scheduler::build(&config, None, SystemClock::new().in_rc()).unwrap();
//!
//! scheduler.update(None, &[StateView::new(0, 0, 0)], &[]).unwrap();
//! assert_eq!(scheduler.select_state().unwrap(), StateId(0));
//!
//! // State 0 ran for a while and then forked off state 1.
//! scheduler
//!     .update(Some(StateView::new(0, 1, 25)), &[StateView::new(1, 1, 25)], &[])
//!     .unwrap();
//! assert_eq!(scheduler.select_state().unwrap(), StateId(1));
//!
//! // State 1 then terminated.
//! scheduler
//!     .update(Some(StateView::new(1, 1, 30)), &[], &[StateId(1)])
//!     .unwrap();
//! assert_eq!(scheduler.select_state().unwrap(), StateId(0));
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod clock;
pub mod constant;
pub mod data;
pub mod error;
pub mod forest;
pub mod merge;
pub mod scheduler;
pub mod state;

// Re-exports to provide the library interface.
pub use forest::{ForkForest, SharedForest};
pub use merge::{MergeExecutor, MergingScheduler};
pub use scheduler::{build, Config, DynScheduler, Scheduler};
pub use state::{StateId, StateView};
