//! The backend contract: what the graph expects from the component that turns primitives into
//! hardware commands.
//!
//! A `Backend` is treated as an opaque external collaborator. This crate never talks to hardware,
//! a network fabric, or a device memory allocator itself — it only calls back into whichever
//! `Backend` implementation the embedder supplies, in an order determined by [`crate::graph::Graph::submit`].

use crate::error::GraphError;
use crate::graph::Graph;
use crate::primitive::PrimIdx;

/// Callback contract invoked during [`Graph::submit`].
///
/// Method order per submission: `init_graph` once, then for each execution set (in index order)
/// `init_exec`, one `process_*` call per head primitive in the set (in type-tag order), then
/// `finalize_exec`; finally `finalize_graph` once. The first method to return `Err` aborts
/// submission; the backend is expected to have no partial effect when it fails before
/// `finalize_graph` runs.
///
/// Every callback takes the graph mutably: a `process_*` implementation needs to mint `Gpso` wait
/// slots through [`crate::primitive::Primitive::wait_resource`], which itself calls back into
/// [`Graph::get_waits`] and therefore requires `&mut Graph`, not just a read-only view.
pub trait Backend {
    /// Called once before any execution set is processed. The returned value is threaded back
    /// into `finalize_graph` unchanged (the reference implementation uses it as a start-of-graph
    /// ordering token).
    fn init_graph(&mut self, graph: &mut Graph) -> Result<u64, GraphError>;

    /// Called once after every execution set has been processed (or a prior callback has already
    /// failed — in which case this is not called).
    fn finalize_graph(&mut self, graph: &mut Graph, start_target: u64) -> Result<(), GraphError>;

    /// Called before processing the first primitive of execution set `set_idx`.
    fn init_exec(&mut self, graph: &mut Graph, set_idx: usize) -> Result<(), GraphError>;

    /// Called after the last primitive of execution set `set_idx` has been processed.
    fn finalize_exec(&mut self, graph: &mut Graph, set_idx: usize) -> Result<(), GraphError>;

    fn process_all_gather(&mut self, graph: &mut Graph, prim: PrimIdx) -> Result<(), GraphError>;
    fn process_broadcast(&mut self, graph: &mut Graph, prim: PrimIdx) -> Result<(), GraphError>;
    fn process_reduce_scatter(&mut self, graph: &mut Graph, prim: PrimIdx) -> Result<(), GraphError>;
    fn process_send(&mut self, graph: &mut Graph, prim: PrimIdx) -> Result<(), GraphError>;
    fn process_recv(&mut self, graph: &mut Graph, prim: PrimIdx) -> Result<(), GraphError>;
    fn process_reduction(&mut self, graph: &mut Graph, prim: PrimIdx) -> Result<(), GraphError>;
}
