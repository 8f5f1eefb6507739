//! Graph node types: primitive payloads, their type tags, and cross-primitive sync edges.

use crate::graph::Graph;
use crate::operand::Operand;
use crate::types::Rank;

/// Index of a [`Primitive`] within a [`Graph`]'s arena. Dense, monotonic, creation-ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimIdx(pub u32);

/// Index of a [`SyncEdge`] within a [`Graph`]'s edge list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeIdx(pub u32);

/// Coarse type tag used by the execution-set partitioning algorithm.
///
/// The numeric value is the bit position used when building `type_mask`/`prev_type_mask`, so it
/// must not be reordered without re-checking [`crate::graph::Graph::setup_exec_sets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind {
    Scaleup = 0,
    ScaleoutSend = 1,
    ScaleoutRecv = 2,
    Reduction = 3,
}

impl PrimitiveKind {
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// A resolved or not-yet-resolved wait resource handed out by the backend's event/semaphore pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMethod {
    Unset,
    /// A general-purpose semaphore-like object, numbered sequentially per execution set.
    Gpso(u32),
}

/// The kind of completion signal a primitive raises once processed, consulted by the backend when
/// it resolves a [`WaitMethod`] into hardware wait instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    ScaleupComplete,
    ScaleoutSendComplete,
    ScaleoutRecvComplete,
    ReductionComplete,
}

/// Directed dependency: `waiter` may not begin processing until `signaler` has completed.
///
/// Invariant: `signaler.0 < waiter.0` — edges only ever point forward in creation order. A
/// [`crate::graph::Graph`] never constructs a `SyncEdge` that violates this; see
/// [`crate::graph::Graph::add_wait`].
#[derive(Debug, Clone, Copy)]
pub struct SyncEdge {
    pub signaler: PrimIdx,
    pub waiter: PrimIdx,
    pub wait_method: WaitMethod,
}

impl SyncEdge {
    /// Whether this edge crosses an execution-set boundary, given each endpoint's assigned set.
    pub fn is_cross_exec(&self, signaler_set: usize, waiter_set: usize) -> bool {
        signaler_set != waiter_set
    }
}

/// Type-specific payload of a [`Primitive`].
#[derive(Debug, Clone, Copy)]
pub enum PrimitiveBody {
    /// Scaleup all-gather of `count` elements from `src_addr` into `dst_addr`.
    AllGather {
        src_addr: u64,
        dst_addr: u64,
        count: u64,
    },
    /// Scaleup broadcast of `count` elements from `src` to `dst`, rooted at `root`.
    Broadcast {
        root: Rank,
        src: u64,
        dst: u64,
        count: u64,
    },
    /// Scaleup reduce-scatter of `count` elements from `src_addr` into `dst`.
    ReduceScatter {
        src_addr: u64,
        dst: Operand,
        count: u64,
    },
    /// Scaleout send of `count` elements from `src` to `peer_rank`.
    Send {
        peer_rank: Rank,
        src: Operand,
        count: u64,
        do_reduction: bool,
    },
    /// Scaleout receive of `count` elements from `peer_rank` into `dst`.
    Recv {
        peer_rank: Rank,
        dst: Operand,
        count: u64,
        do_reduction: bool,
        cast_up: bool,
    },
    /// Local reduction of `count` elements from `src` into `dst_addr`.
    Reduction {
        src: Operand,
        dst_addr: u64,
        count: u64,
        cast_down: bool,
    },
}

impl PrimitiveBody {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveBody::AllGather { .. }
            | PrimitiveBody::Broadcast { .. }
            | PrimitiveBody::ReduceScatter { .. } => PrimitiveKind::Scaleup,
            PrimitiveBody::Send { .. } => PrimitiveKind::ScaleoutSend,
            PrimitiveBody::Recv { .. } => PrimitiveKind::ScaleoutRecv,
            PrimitiveBody::Reduction { .. } => PrimitiveKind::Reduction,
        }
    }

    pub fn wait_event(&self) -> WaitEvent {
        match self {
            PrimitiveBody::AllGather { .. }
            | PrimitiveBody::Broadcast { .. }
            | PrimitiveBody::ReduceScatter { .. } => WaitEvent::ScaleupComplete,
            PrimitiveBody::Send { .. } => WaitEvent::ScaleoutSendComplete,
            PrimitiveBody::Recv { .. } => WaitEvent::ScaleoutRecvComplete,
            PrimitiveBody::Reduction { .. } => WaitEvent::ReductionComplete,
        }
    }

    /// The operand this body carries, if any, so the graph can verify it immediately on
    /// `Graph::create_primitive`.
    pub fn operand(&self) -> Option<Operand> {
        match self {
            PrimitiveBody::ReduceScatter { dst, .. } => Some(*dst),
            PrimitiveBody::Send { src, .. } => Some(*src),
            PrimitiveBody::Recv { dst, .. } => Some(*dst),
            PrimitiveBody::Reduction { src, .. } => Some(*src),
            PrimitiveBody::AllGather { .. } | PrimitiveBody::Broadcast { .. } => None,
        }
    }
}

/// A single node of the collective-operations graph.
#[derive(Debug, Clone)]
pub struct Primitive {
    idx: PrimIdx,
    exec_set: Option<usize>,
    signaling_edges: Vec<EdgeIdx>,
    waiting_edges: Vec<EdgeIdx>,
    body: PrimitiveBody,
}

impl Primitive {
    pub(crate) fn new(idx: PrimIdx, body: PrimitiveBody) -> Self {
        Primitive {
            idx,
            exec_set: None,
            signaling_edges: Vec::new(),
            waiting_edges: Vec::new(),
            body,
        }
    }

    pub fn idx(&self) -> PrimIdx {
        self.idx
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.body.kind()
    }

    pub fn wait_event(&self) -> WaitEvent {
        self.body.wait_event()
    }

    pub fn body(&self) -> &PrimitiveBody {
        &self.body
    }

    pub fn exec_set(&self) -> Option<usize> {
        self.exec_set
    }

    pub(crate) fn set_exec_set(&mut self, set: usize) {
        self.exec_set = Some(set);
    }

    pub fn signaling_edges(&self) -> &[EdgeIdx] {
        &self.signaling_edges
    }

    pub fn waiting_edges(&self) -> &[EdgeIdx] {
        &self.waiting_edges
    }

    pub(crate) fn push_signaling_edge(&mut self, e: EdgeIdx) {
        self.signaling_edges.push(e);
    }

    pub(crate) fn push_waiting_edge(&mut self, e: EdgeIdx) {
        self.waiting_edges.push(e);
    }

    /// True iff this primitive has no incoming waits, i.e. it can be the head of an execution set.
    pub fn is_head(&self) -> bool {
        self.waiting_edges.is_empty()
    }

    pub fn has_wait(&self) -> bool {
        !self.waiting_edges.is_empty()
    }

    pub fn is_signaling(&self) -> bool {
        !self.signaling_edges.is_empty()
    }

    /// True iff any edge this primitive *waits on* crosses an execution-set boundary, requiring
    /// the backend to emit an ordering fence rather than a same-set semaphore wait.
    ///
    /// Checked against `waiting_edges` (incoming: edges where this primitive is the waiter), not
    /// `signaling_edges` — the backend needs to fence the waiter side of a cross-exec dependency,
    /// not the signaler side.
    pub fn is_strong_order_required(&self, graph: &Graph) -> bool {
        self.waiting_edges.iter().any(|&e| {
            let edge = graph.edge(e);
            match (graph.prim(edge.signaler).exec_set(), graph.prim(edge.waiter).exec_set()) {
                (Some(s), Some(w)) => s != w,
                _ => false,
            }
        })
    }

    /// Returns this primitive's assigned wait resource, allocating the next sequential one from
    /// the graph if none is assigned yet.
    ///
    /// Mirrors the teacher's two-phase accessor: if this primitive has a waiting edge and its
    /// first one already carries a resolved `WaitMethod`, that wins; otherwise a fresh `Gpso` slot
    /// is minted via `graph.get_waits`.
    pub fn wait_resource(&self, graph: &mut Graph, inc_request: bool) -> WaitMethod {
        if self.has_wait() {
            let method = graph.edge(self.waiting_edges[0]).wait_method;
            if method != WaitMethod::Unset {
                return method;
            }
        }
        WaitMethod::Gpso(graph.get_waits(inc_request))
    }
}
