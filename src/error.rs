//! Error taxonomy for the graph engine.
//!
//! Construction-time invariant violations (a lowering calling `add_wait` out of order, reusing a
//! stale TEMP token, over-allocating a STATIC token) are code bugs in a lowering, not recoverable
//! runtime conditions, and are reported by panicking through [`invariant!`]. Dispatch and backend
//! errors are recoverable and are returned through `Result` from [`crate::dispatch::run`] and
//! [`crate::graph::Graph::submit`].

use crate::types::CollectiveOp;
use thiserror::Error;

/// Errors surfaced through the recoverable `Result` channel.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A graph-construction invariant was violated. Only reachable through the standalone
    /// `BufferTokenGenerator` API; lowerings hit the panicking [`invariant!`] path instead.
    #[error("invariant violated: {what}{}", prim_idx.map(|i| format!(" (primitive {i})")).unwrap_or_default())]
    Invariant {
        what: &'static str,
        prim_idx: Option<u32>,
    },

    /// `op` has no registered lowering, or is disabled by the primitive-collective mask.
    #[error("collective {op:?} is not implemented with primitives")]
    NotImplemented { op: CollectiveOp },

    /// A backend callback returned failure during submission.
    #[error("backend reported failure: {0}")]
    Backend(String),

    /// `count` does not divide evenly across the communicator, required for all-reduce and
    /// reduce-scatter.
    #[error("count {count} is not divisible by communicator size {comm_size}")]
    CountNotDivisible { count: u64, comm_size: u32 },
}

/// Panics with a diagnostic naming the violated invariant and, where known, the offending
/// primitive index. Construction-time invariant violations are programmer errors in a lowering,
/// not recoverable conditions, so they use the fail-fast channel rather than `Result`.
macro_rules! invariant {
    ($cond:expr, $what:expr) => {
        if !($cond) {
            panic!("graph invariant violated: {}", $what);
        }
    };
    ($cond:expr, $what:expr, $prim_idx:expr) => {
        if !($cond) {
            panic!(
                "graph invariant violated: {} (primitive {:?})",
                $what, $prim_idx
            );
        }
    };
}

pub(crate) use invariant;
