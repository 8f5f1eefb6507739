//! Integration scenarios against a mock backend: primitive/edge counts for the all-gather
//! lowerings, phase counts for all-reduce, and boundary behaviors at `box_count == 1`.

use std::collections::HashMap;
use std::sync::Arc;

use collective_graph::backend::Backend;
use collective_graph::error::GraphError;
use collective_graph::graph::Graph;
use collective_graph::primitive::{PrimIdx, PrimitiveKind};
use collective_graph::types::{CollectiveOp, CollectiveParams, CommunicatorView, DataType, GroupId, Rank};
use collective_graph::{collectives::all_gather, collectives::all_reduce, collectives::reduce_scatter};

#[derive(Debug, Clone, Copy)]
struct FakeComm {
    my_rank: Rank,
    comm_size: u32,
    scaleup_group_size: u32,
}

impl CommunicatorView for FakeComm {
    fn my_rank(&self) -> Rank {
        self.my_rank
    }
    fn comm_size(&self) -> u32 {
        self.comm_size
    }
    fn scaleup_group_size(&self) -> u32 {
        self.scaleup_group_size
    }
    fn my_scaleup_group(&self) -> GroupId {
        self.my_rank / self.scaleup_group_size
    }
    fn rank_in_scaleup_group(&self) -> u32 {
        self.my_rank % self.scaleup_group_size
    }
    fn rank_to_scaleup_group(&self, rank: Rank) -> GroupId {
        rank / self.scaleup_group_size
    }
}

fn params(op: CollectiveOp, comm_size: u32, scaleup_group_size: u32, my_rank: Rank, count: u64) -> CollectiveParams {
    let comm = Arc::new(FakeComm {
        my_rank,
        comm_size,
        scaleup_group_size,
    });
    CollectiveParams::new(op, 0x1000, 0x2000, count, DataType::Float32, comm)
}

/// Records every graph submitted to it: total primitive/edge counts, per-kind primitive counts,
/// and how many times each backend callback fired. Every callback succeeds.
#[derive(Default)]
struct MockBackend {
    submissions: Vec<Snapshot>,
}

#[derive(Default, Debug)]
struct Snapshot {
    num_prims: usize,
    num_edges: usize,
    num_sets: usize,
    kind_counts: HashMap<PrimitiveKind, u32>,
    processed: u32,
}

impl MockBackend {
    fn last(&self) -> &Snapshot {
        self.submissions.last().expect("no graph submitted yet")
    }
}

impl Backend for MockBackend {
    fn init_graph(&mut self, graph: &mut Graph) -> Result<u64, GraphError> {
        let mut kind_counts = HashMap::new();
        for p in graph.prims() {
            *kind_counts.entry(p.kind()).or_insert(0) += 1;
        }
        self.submissions.push(Snapshot {
            num_prims: graph.prims().len(),
            num_edges: graph.edges().len(),
            num_sets: graph.execution_sets().len(),
            kind_counts,
            processed: 0,
        });
        Ok(0)
    }

    fn finalize_graph(&mut self, _graph: &mut Graph, _start_target: u64) -> Result<(), GraphError> {
        Ok(())
    }

    fn init_exec(&mut self, _graph: &mut Graph, _set_idx: usize) -> Result<(), GraphError> {
        Ok(())
    }

    fn finalize_exec(&mut self, _graph: &mut Graph, _set_idx: usize) -> Result<(), GraphError> {
        Ok(())
    }

    fn process_all_gather(&mut self, _graph: &mut Graph, _prim: PrimIdx) -> Result<(), GraphError> {
        self.submissions.last_mut().unwrap().processed += 1;
        Ok(())
    }
    fn process_broadcast(&mut self, _graph: &mut Graph, _prim: PrimIdx) -> Result<(), GraphError> {
        self.submissions.last_mut().unwrap().processed += 1;
        Ok(())
    }
    fn process_reduce_scatter(&mut self, _graph: &mut Graph, _prim: PrimIdx) -> Result<(), GraphError> {
        self.submissions.last_mut().unwrap().processed += 1;
        Ok(())
    }
    fn process_send(&mut self, _graph: &mut Graph, _prim: PrimIdx) -> Result<(), GraphError> {
        self.submissions.last_mut().unwrap().processed += 1;
        Ok(())
    }
    fn process_recv(&mut self, _graph: &mut Graph, _prim: PrimIdx) -> Result<(), GraphError> {
        self.submissions.last_mut().unwrap().processed += 1;
        Ok(())
    }
    fn process_reduction(&mut self, _graph: &mut Graph, _prim: PrimIdx) -> Result<(), GraphError> {
        self.submissions.last_mut().unwrap().processed += 1;
        Ok(())
    }
}

#[test]
fn all_gather_pairwise_counts_one_wait_per_foreign_box() {
    // comm_size 8, scaleup_group_size 4 -> box_count 2: one foreign-box exchange.
    let p = params(CollectiveOp::AllGather, 8, 4, 0, 16);
    let mut backend = MockBackend::default();
    all_gather::run_pairwise(&mut backend, &p).unwrap();

    let snap = backend.last();
    assert_eq!(snap.num_prims, 4); // ag, recv, ag, send
    assert_eq!(snap.num_edges, 1);
    assert_eq!(snap.kind_counts[&PrimitiveKind::Scaleup], 2);
    assert_eq!(snap.kind_counts[&PrimitiveKind::ScaleoutRecv], 1);
    assert_eq!(snap.kind_counts[&PrimitiveKind::ScaleoutSend], 1);
}

#[test]
fn all_gather_ring_counts_two_waits_for_two_boxes() {
    let p = params(CollectiveOp::AllGather, 8, 4, 0, 16);
    let mut backend = MockBackend::default();
    all_gather::run_ring(&mut backend, &p).unwrap();

    let snap = backend.last();
    assert_eq!(snap.num_prims, 4); // ag, send, recv, ag
    assert_eq!(snap.num_edges, 2);
}

#[test]
fn all_gather_pairwise_with_a_single_box_has_no_scaleout_traffic() {
    let p = params(CollectiveOp::AllGather, 4, 4, 0, 16);
    let mut backend = MockBackend::default();
    all_gather::run_pairwise(&mut backend, &p).unwrap();

    let snap = backend.last();
    assert_eq!(snap.num_prims, 1);
    assert_eq!(snap.num_edges, 0);
    assert!(!snap.kind_counts.contains_key(&PrimitiveKind::ScaleoutSend));
    assert!(!snap.kind_counts.contains_key(&PrimitiveKind::ScaleoutRecv));
}

#[test]
fn all_reduce_pairwise_submits_two_phases() {
    // box_count == comm_size: purely scaleout, scaleup group of size 1.
    let p = params(CollectiveOp::AllReduce, 4, 1, 0, 16);
    let mut backend = MockBackend::default();
    all_reduce::run_pairwise(&mut backend, &p).unwrap();

    assert_eq!(backend.submissions.len(), 2, "reduce-scatter phase then all-gather phase");
    // Phase 1 (reduce-scatter) has a ReduceScatter head plus scaleout traffic for each of the
    // other 3 boxes, culminating in a Reduction on the last iteration.
    let phase1 = &backend.submissions[0];
    assert!(phase1.kind_counts.contains_key(&PrimitiveKind::Reduction));
    // Phase 2 (all-gather) looks like the pairwise all-gather shape.
    let phase2 = &backend.submissions[1];
    assert!(phase2.kind_counts.contains_key(&PrimitiveKind::Scaleup));
}

#[test]
fn all_reduce_rejects_counts_not_divisible_by_comm_size() {
    let p = params(CollectiveOp::AllReduce, 8, 4, 0, 15);
    let mut backend = MockBackend::default();
    let err = all_reduce::run_pairwise(&mut backend, &p).unwrap_err();
    assert!(matches!(err, GraphError::CountNotDivisible { count: 15, comm_size: 8 }));
    assert!(backend.submissions.is_empty(), "must short-circuit before building any graph");
}

#[test]
fn reduce_scatter_with_a_single_box_writes_directly_with_no_reduction_tail() {
    let p = params(CollectiveOp::ReduceScatter, 4, 4, 0, 16);
    let mut backend = MockBackend::default();
    reduce_scatter::run_pairwise(&mut backend, &p).unwrap();

    let snap = backend.last();
    assert_eq!(snap.num_prims, 1);
    assert!(!snap.kind_counts.contains_key(&PrimitiveKind::Reduction));
}

#[test]
fn every_primitive_lands_in_a_valid_execution_set() {
    // Only the head of each (type, set) pair is handed to the backend directly, so `processed`
    // is bounded by `num_prims`, not necessarily equal to it — but every primitive still gets a
    // set assignment, and at least one head is processed per set.
    let p = params(CollectiveOp::AllGather, 8, 4, 0, 16);
    let mut backend = MockBackend::default();
    all_gather::run_ring(&mut backend, &p).unwrap();
    let snap = backend.last();
    assert!(snap.num_sets >= 1);
    assert!(snap.processed >= snap.num_sets as u32);
    assert!(snap.processed as usize <= snap.num_prims);
}
