//! Maps a [`CollectiveOp`] to the lowering function that implements it.
//!
//! Two registries, matching the layering described in §4.5: a built-in `graph_methods` table that
//! is always available, and an overlay `primitive_methods` table, gated by
//! [`GraphConfig::primitive_collective_mask`], that a caller can extend at process start via
//! [`init_primitive_impl`]. A collective enabled by the mask and present in the overlay is routed
//! there instead of the built-in table.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::backend::Backend;
use crate::collectives::{all_gather, all_reduce, broadcast, reduce_scatter};
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::types::{CollectiveOp, CollectiveParams};

type LoweringFn = fn(&mut dyn Backend, &CollectiveParams) -> Result<(), GraphError>;

fn graph_methods(op: CollectiveOp) -> Option<LoweringFn> {
    match op {
        CollectiveOp::AllGather => Some(all_gather::run_ring),
        CollectiveOp::ReduceScatter => Some(reduce_scatter::run_pairwise),
        CollectiveOp::Broadcast => Some(broadcast::run_pairwise),
        // All-reduce has no built-in graph_methods entry: the reference registry only ever
        // installs it into the primitive overlay, never the built-in table.
        CollectiveOp::AllReduce => None,
    }
}

fn default_primitive_methods() -> HashMap<CollectiveOp, LoweringFn> {
    let mut m = HashMap::new();
    m.insert(CollectiveOp::AllReduce, all_reduce::run_pairwise as LoweringFn);
    m.insert(CollectiveOp::AllGather, all_gather::run_pairwise as LoweringFn);
    m
}

static PRIMITIVE_METHODS: OnceLock<Mutex<HashMap<CollectiveOp, LoweringFn>>> = OnceLock::new();

/// Lazily installs the default primitive-overlay registry on first call. Entries passed in
/// `extra` are merged in without overwriting any collective the default table (or an earlier
/// caller) already registered, matching the original registry's first-registration-wins
/// semantics.
pub fn init_primitive_impl(extra: &[(CollectiveOp, LoweringFn)]) {
    let registry = PRIMITIVE_METHODS.get_or_init(|| Mutex::new(default_primitive_methods()));
    let mut guard = registry.lock().expect("primitive method registry poisoned");
    for &(op, f) in extra {
        guard.entry(op).or_insert(f);
    }
}

fn check_primitive_impl(op: CollectiveOp, config: &GraphConfig) -> Option<LoweringFn> {
    let registry = PRIMITIVE_METHODS.get_or_init(|| Mutex::new(default_primitive_methods()));
    let bit = 1u32 << (op as u32);
    if !config.allows(bit) {
        return None;
    }
    let guard = registry.lock().expect("primitive method registry poisoned");
    guard.get(&op).copied()
}

/// Single entry point: selects a lowering for `params.collective_op` and runs it.
///
/// The primitive overlay is consulted first when the configured mask enables it for this
/// collective; otherwise (or if the overlay has no entry) the built-in `graph_methods` table is
/// used. A collective present in neither is reported as [`GraphError::NotImplemented`].
pub fn run(backend: &mut dyn Backend, params: &CollectiveParams, config: &GraphConfig) -> Result<(), GraphError> {
    let op = params.collective_op;
    let _span = tracing::info_span!("dispatch.run", ?op, comm_size = params.comm.comm_size()).entered();

    let lowering = check_primitive_impl(op, config).or_else(|| graph_methods(op));

    match lowering {
        Some(f) => f(backend, params),
        None => {
            tracing::error!(?op, "collective has no registered lowering");
            Err(GraphError::NotImplemented { op })
        }
    }
}
