//! The graph: primitive arena, sync edges, execution-set partitioning, and submission.

use std::collections::BTreeMap;

use crate::backend::Backend;
use crate::error::{invariant, GraphError};
use crate::operand::Operand;
use crate::primitive::{EdgeIdx, Primitive, PrimitiveBody, PrimitiveKind, PrimIdx, SyncEdge, WaitMethod};
use crate::token::{BufferClass, BufferToken, BufferTokenGenerator};

/// One stage of the partitioned graph: for each primitive type present in the stage, the head
/// primitive of that type. Stages execute in index order; within a stage, primitives of different
/// types may run concurrently.
#[derive(Debug, Default, Clone)]
pub struct ExecutionSet {
    heads: BTreeMap<PrimitiveKind, PrimIdx>,
    members: Vec<PrimIdx>,
}

impl ExecutionSet {
    /// Heads in type-tag order, the order the backend processes a stage.
    pub fn heads(&self) -> impl Iterator<Item = (PrimitiveKind, PrimIdx)> + '_ {
        self.heads.iter().map(|(&k, &v)| (k, v))
    }

    pub fn members(&self) -> &[PrimIdx] {
        &self.members
    }
}

/// Owns a collection of primitives and sync edges for a single collective invocation.
///
/// A `Graph` is constructed by a lowering, populated with primitives and waits, partitioned into
/// execution sets, and submitted to a backend. It is not `Send`: a collective call runs on a
/// single caller thread from start to finish.
pub struct Graph {
    prims: Vec<Primitive>,
    edges: Vec<SyncEdge>,
    buffer_gen: BufferTokenGenerator,
    exec_sets: Vec<ExecutionSet>,
    strong_order_start: bool,
    requested_waits: u32,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            prims: Vec::new(),
            edges: Vec::new(),
            buffer_gen: BufferTokenGenerator::new(),
            exec_sets: Vec::new(),
            strong_order_start: false,
            requested_waits: 0,
        }
    }

    pub fn strong_order_start(&self) -> bool {
        self.strong_order_start
    }

    pub fn set_strong_order_start(&mut self, value: bool) {
        self.strong_order_start = value;
    }

    pub fn prim(&self, idx: PrimIdx) -> &Primitive {
        &self.prims[idx.0 as usize]
    }

    pub fn edge(&self, idx: EdgeIdx) -> &SyncEdge {
        &self.edges[idx.0 as usize]
    }

    pub fn prims(&self) -> &[Primitive] {
        &self.prims
    }

    pub fn edges(&self) -> &[SyncEdge] {
        &self.edges
    }

    pub fn execution_sets(&self) -> &[ExecutionSet] {
        &self.exec_sets
    }

    /// Appends a primitive, stamping it with the next monotonic index.
    ///
    /// If the body carries an [`Operand`], it is verified immediately so a stale TEMP token trips
    /// as close as possible to the lowering call that produced it.
    pub fn create_primitive(&mut self, body: PrimitiveBody) -> PrimIdx {
        let idx = PrimIdx(self.prims.len() as u32);
        if let Some(operand) = body.operand() {
            if let Operand::Token(token) = operand {
                if let Err(err) = self.buffer_gen.verify(token) {
                    panic!(
                        "graph invariant violated while creating primitive {}: {err}",
                        idx.0
                    );
                }
            }
        }
        tracing::trace!(prim_idx = idx.0, kind = ?body.kind(), "created primitive");
        self.prims.push(Primitive::new(idx, body));
        idx
    }

    /// Records a dependency: `waiter` may not be processed until `signaler` completes.
    ///
    /// Panics (invariant 1) if either index is out of range or if `signaler.0 >= waiter.0`: sync
    /// edges only ever point forward in creation order.
    pub fn add_wait(&mut self, signaler: PrimIdx, waiter: PrimIdx) -> EdgeIdx {
        invariant!(
            (signaler.0 as usize) < self.prims.len() && (waiter.0 as usize) < self.prims.len(),
            "add_wait endpoints must reference primitives already created in this graph"
        );
        invariant!(
            signaler.0 < waiter.0,
            "sync edges must point forward in creation order",
            waiter.0
        );
        let edge_idx = EdgeIdx(self.edges.len() as u32);
        self.edges.push(SyncEdge {
            signaler,
            waiter,
            wait_method: WaitMethod::Unset,
        });
        self.prims[signaler.0 as usize].push_signaling_edge(edge_idx);
        self.prims[waiter.0 as usize].push_waiting_edge(edge_idx);
        tracing::trace!(signaler = signaler.0, waiter = waiter.0, "added wait");
        edge_idx
    }

    pub fn generate_buffer_token(&self, class: BufferClass) -> BufferToken {
        self.buffer_gen.generate(class)
    }

    pub fn verify_operand(&self, operand: Operand) -> Result<(), GraphError> {
        match operand {
            Operand::Token(token) => self.buffer_gen.verify(token),
            Operand::Addr(_) => Ok(()),
        }
    }

    pub fn has_allocation(&self, class: BufferClass) -> bool {
        self.buffer_gen.has_allocated(class)
    }

    /// Returns the current count of wait resources requested in the execution set being
    /// processed, post-incrementing it when `inc` is set. Reset to 0 at the start of each set by
    /// [`Graph::submit`].
    pub fn get_waits(&mut self, inc: bool) -> u32 {
        let current = self.requested_waits;
        if inc {
            self.requested_waits += 1;
        }
        current
    }

    /// Partitions `self.prims` into execution sets.
    ///
    /// Traverses primitives in creation order; for each primitive not yet assigned to a set, runs
    /// a BFS over its *signaling* edges (i.e. forward through the graph). `type_mask` accumulates
    /// every primitive kind seen so far across the *entire* scan — it is never reset between
    /// rounds, only ever cleared of the previous set's kinds on a collision — while
    /// `prev_type_mask` holds the kinds that closed the most recently opened set. A primitive
    /// whose kind already appears in `prev_type_mask` ends the current BFS round: the kinds
    /// carried over from that set are cleared out of `type_mask`, a new execution set is opened,
    /// and if the colliding primitive is itself a head (no incoming waits) it seeds that new set;
    /// otherwise it is left unassigned for the moment, to be picked up by this same outer scan once
    /// its own signaler closes a set ahead of it. A round that runs to completion with no collision
    /// contributes its entire subgraph to whichever set is currently open — so consecutive
    /// non-colliding rounds merge into one stage rather than each opening its own.
    pub fn setup_exec_sets(&mut self) {
        self.exec_sets.push(ExecutionSet::default());
        let mut prev_type_mask: u32 = 0;
        let mut type_mask: u32 = 0;

        let mut i = 0;
        while i < self.prims.len() {
            if self.prims[i].exec_set().is_some() {
                i += 1;
                continue;
            }

            let mut subgraph: Vec<PrimIdx> = Vec::new();
            let mut queue: std::collections::VecDeque<PrimIdx> = std::collections::VecDeque::new();
            queue.push_back(PrimIdx(i as u32));

            while let Some(q) = queue.pop_front() {
                let kind_bit = self.prims[q.0 as usize].kind().bit();
                type_mask |= kind_bit;
                for &edge_idx in self.prims[q.0 as usize].signaling_edges().to_vec().iter() {
                    let waiter = self.edges[edge_idx.0 as usize].waiter;
                    queue.push_back(waiter);
                }

                if (prev_type_mask & kind_bit) == 0 {
                    subgraph.push(q);
                } else {
                    type_mask &= !prev_type_mask;
                    if self.prims[q.0 as usize].is_head() {
                        subgraph.push(q);
                    }
                    self.exec_sets.push(ExecutionSet::default());
                    break;
                }
            }

            prev_type_mask = type_mask;

            let set_idx = self.exec_sets.len() - 1;
            for &member in &subgraph {
                let kind = self.prims[member.0 as usize].kind();
                self.exec_sets[set_idx].heads.entry(kind).or_insert(member);
                self.exec_sets[set_idx].members.push(member);
                self.prims[member.0 as usize].set_exec_set(set_idx);
            }
            if !subgraph.is_empty() {
                tracing::debug!(set_idx, members = ?subgraph, "closed execution set");
            }

            i += 1;
        }
    }

    /// Partitions into execution sets (if not already done) and dispatches to the backend.
    pub fn submit(&mut self, backend: &mut dyn Backend) -> Result<(), GraphError> {
        if self.exec_sets.is_empty() && !self.prims.is_empty() {
            self.setup_exec_sets();
        }

        let span = tracing::info_span!("graph.submit", num_prims = self.prims.len(), num_sets = self.exec_sets.len());
        let _guard = span.enter();

        let start_val = backend.init_graph(self)?;

        for set_idx in 0..self.exec_sets.len() {
            backend.init_exec(self, set_idx)?;
            self.requested_waits = 0;

            let heads: Vec<PrimIdx> = self.exec_sets[set_idx].heads().map(|(_, idx)| idx).collect();
            for head in heads {
                self.process_primitive(backend, head)?;
            }

            backend.finalize_exec(self, set_idx)?;
        }

        backend.finalize_graph(self, start_val)?;
        Ok(())
    }

    fn process_primitive(&mut self, backend: &mut dyn Backend, idx: PrimIdx) -> Result<(), GraphError> {
        let body = *self.prim(idx).body();
        let result = match body {
            PrimitiveBody::AllGather { .. } => backend.process_all_gather(self, idx),
            PrimitiveBody::Broadcast { .. } => backend.process_broadcast(self, idx),
            PrimitiveBody::ReduceScatter { .. } => backend.process_reduce_scatter(self, idx),
            PrimitiveBody::Send { .. } => backend.process_send(self, idx),
            PrimitiveBody::Recv { .. } => backend.process_recv(self, idx),
            PrimitiveBody::Reduction { .. } => backend.process_reduction(self, idx),
        };
        if let Err(ref err) = result {
            tracing::error!(prim_idx = idx.0, %err, "backend reported failure processing primitive");
        }
        result
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ag(g: &mut Graph, src: u64, dst: u64, count: u64) -> PrimIdx {
        g.create_primitive(PrimitiveBody::AllGather {
            src_addr: src,
            dst_addr: dst,
            count,
        })
    }

    fn send(g: &mut Graph, peer: u32, count: u64) -> PrimIdx {
        g.create_primitive(PrimitiveBody::Send {
            peer_rank: peer,
            src: Operand::Addr(0),
            count,
            do_reduction: false,
        })
    }

    #[test]
    fn add_wait_rejects_backward_edges() {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut g = Graph::new();
            let a = ag(&mut g, 0, 0, 8);
            let b = ag(&mut g, 0, 8, 8);
            g.add_wait(b, a);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn single_primitive_graph_gets_one_set() {
        let mut g = Graph::new();
        let _a = ag(&mut g, 0, 0, 8);
        g.setup_exec_sets();
        assert_eq!(g.execution_sets().len(), 1);
        assert_eq!(g.prim(_a).exec_set(), Some(0));
    }

    #[test]
    fn chained_same_type_primitives_share_a_fresh_round() {
        // prev_type_mask only updates once a round fully closes, so two primitives of the same
        // type chained together within one fresh BFS round do not split: the collision check has
        // nothing to compare against yet.
        let mut g = Graph::new();
        let a = ag(&mut g, 0, 0, 8);
        let b = ag(&mut g, 0, 8, 8);
        g.add_wait(a, b);
        g.setup_exec_sets();
        assert_eq!(g.prim(a).exec_set(), Some(0));
        assert_eq!(g.prim(b).exec_set(), Some(0));
        assert_eq!(g.execution_sets().len(), 1);
    }

    #[test]
    fn distinct_types_share_a_set() {
        let mut g = Graph::new();
        let a = ag(&mut g, 0, 0, 8);
        let s = send(&mut g, 1, 8);
        g.add_wait(a, s);
        g.setup_exec_sets();
        assert_eq!(g.prim(a).exec_set(), Some(0));
        assert_eq!(g.prim(s).exec_set(), Some(0));
        assert_eq!(g.execution_sets().len(), 1);
    }

    #[test]
    fn collision_head_opens_a_set_that_later_rounds_keep_filling() {
        // Round 1 is a lone Scaleup primitive, priming prev_type_mask with the Scaleup bit and
        // leaving `type_mask` at that same value (it is never reset between rounds).
        // Round 2 starts at `a` (a head, since nothing signals it): `a` collides immediately
        // against the primed mask, so this round closes with just `a`, and a new execution set is
        // opened with `a` (a head) as its sole member so far.
        // Round 3 (s, c) does not collide with anything (prev_type_mask was cleared to empty by
        // `a`'s round), so it runs to completion without opening a new set, and its entire
        // subgraph joins the set `a` just opened.
        let mut g = Graph::new();
        let prime = ag(&mut g, 0, 0, 8);
        let a = ag(&mut g, 0, 8, 8);
        let s = send(&mut g, 1, 8);
        let c = ag(&mut g, 0, 16, 8);
        g.add_wait(a, s);
        g.add_wait(s, c);
        g.setup_exec_sets();

        assert_eq!(g.prim(prime).exec_set(), Some(0));
        assert_eq!(g.prim(a).exec_set(), Some(1));
        assert_eq!(g.prim(s).exec_set(), Some(1));
        assert_eq!(g.prim(c).exec_set(), Some(1));
        assert_eq!(g.execution_sets().len(), 2);
    }

    #[test]
    fn stale_temp_operand_panics_on_create() {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut g = Graph::new();
            let t1 = g.generate_buffer_token(BufferClass::Temp);
            let _t2 = g.generate_buffer_token(BufferClass::Temp);
            g.create_primitive(PrimitiveBody::Reduction {
                src: Operand::Token(t1),
                dst_addr: 0,
                count: 8,
                cast_down: false,
            });
        }));
        assert!(result.is_err());
    }
}
