//! This module contains constants that are needed throughout the codebase.

use std::time::Duration;

/// The default seed used to derive the random sources handed to randomised
/// schedulers.
pub const DEFAULT_SEED: u64 = 5489;

/// The default wall-clock budget for which the batching scheduler keeps
/// returning the same state.
pub const DEFAULT_BATCH_TIME: Duration = Duration::from_secs(5);

/// The default number of executed instructions for which the batching
/// scheduler keeps returning the same state.
pub const DEFAULT_BATCH_INSTRUCTIONS: u64 = 10_000;

/// The factor by which a batch may overrun its time budget before the budget
/// is grown to match the observed batch duration.
pub const BATCH_TIME_TOLERANCE: f64 = 1.1;

/// The initial time budget that the iterative deepening scheduler grants to a
/// state before pausing it.
pub const DEFAULT_ITERATIVE_DEEPENING_TIME: Duration = Duration::from_secs(1);

/// The default value for whether merging should give up on regions whose
/// states run too far past the open point.
pub const DEFAULT_BOUNDED_MERGE_ENABLED: bool = false;

/// A state is only prioritized for finishing a merge region while its distance
/// from the open point is below this multiple of the mean closing distance.
pub const MERGE_PRIORITY_DISTANCE_FACTOR: f64 = 2.0;

/// Query costs below this number of seconds are all treated as equally cheap
/// by the query cost weight metric.
pub const MINIMUM_QUERY_COST_SECONDS: f64 = 0.1;

/// The distance to an uncovered instruction assumed when no distance is known.
pub const UNKNOWN_UNCOVERED_DISTANCE: u64 = 10_000;

/// The number of instructions a state may execute after covering new code
/// before the covering-new weight metric starts to decay.
pub const COVERING_NEW_GRACE_INSTRUCTIONS: u64 = 1000;

/// The maximum number of random path schedulers that can observe a single
/// fork-history forest at once.
pub const MAXIMUM_FOREST_OBSERVERS: usize = 8;
