//! Request descriptors and communicator accessors consumed by collective lowerings.
//!
//! None of the types here talk to hardware or a network fabric: a [`CommunicatorView`] is a
//! read-only accessor over whatever topology information the embedder's communicator already
//! tracks, and [`CollectiveParams`] is an immutable snapshot of a single collective call.

use std::cell::Cell;
use std::sync::Arc;

/// Rank of a participant in a collective operation, zero-based.
pub type Rank = u32;

/// Identifier of a scaleup group (a "box") within the communicator.
pub type GroupId = u32;

/// Element datatype carried by a collective operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32,
    Float16,
    BFloat16,
    Int32,
    Int8,
}

impl DataType {
    /// Size in bytes of one element of this type.
    pub fn size_in_bytes(self) -> u64 {
        match self {
            DataType::Float32 => 4,
            DataType::Float16 => 2,
            DataType::BFloat16 => 2,
            DataType::Int32 => 4,
            DataType::Int8 => 1,
        }
    }
}

/// Reduction operator applied by `Reduction`, `ReduceScatter`, and reducing `Send`/`Recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    None,
    Sum,
    Max,
    Min,
    Prod,
}

/// High-level collective requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectiveOp {
    AllGather,
    AllReduce,
    ReduceScatter,
    Broadcast,
}

/// Read-only view of the communicator a collective call runs over.
///
/// Implementers may assume `comm_size() % scaleup_group_size() == 0`; lowerings rely on this to
/// compute `box_count` without a remainder check.
pub trait CommunicatorView: Send + Sync {
    /// This process's rank within the communicator.
    fn my_rank(&self) -> Rank;
    /// Total number of ranks in the communicator.
    fn comm_size(&self) -> u32;
    /// Number of ranks per scaleup group ("box").
    fn scaleup_group_size(&self) -> u32;
    /// Id of the scaleup group this rank belongs to.
    fn my_scaleup_group(&self) -> GroupId;
    /// This rank's index within its own scaleup group.
    fn rank_in_scaleup_group(&self) -> u32;
    /// Maps an arbitrary rank to the scaleup group it belongs to.
    fn rank_to_scaleup_group(&self, rank: Rank) -> GroupId;

    /// Number of scaleup groups ("boxes") in the communicator.
    fn box_count(&self) -> u32 {
        self.comm_size() / self.scaleup_group_size()
    }
}

/// Immutable request descriptor for one collective invocation.
///
/// `current_op` is the one field that mutates during a multi-phase lowering (e.g. all-reduce
/// lowers first to a reduce-scatter phase, then to an all-gather phase); it exists purely so the
/// two phases can log which sub-operation they represent, and is not read by the partitioning
/// algorithm or the backend contract.
#[derive(Clone)]
pub struct CollectiveParams {
    pub collective_op: CollectiveOp,
    current_op: Cell<CollectiveOp>,
    pub send_buffer_addr: u64,
    pub recv_buffer_addr: u64,
    pub count: u64,
    pub data_type: DataType,
    pub reduce_op: ReduceOp,
    pub root: Option<Rank>,
    pub user_flags: u32,
    pub api_id: u8,
    pub comm: Arc<dyn CommunicatorView>,
}

impl CollectiveParams {
    pub fn new(
        collective_op: CollectiveOp,
        send_buffer_addr: u64,
        recv_buffer_addr: u64,
        count: u64,
        data_type: DataType,
        comm: Arc<dyn CommunicatorView>,
    ) -> Self {
        CollectiveParams {
            collective_op,
            current_op: Cell::new(collective_op),
            send_buffer_addr,
            recv_buffer_addr,
            count,
            data_type,
            reduce_op: ReduceOp::None,
            root: None,
            user_flags: 0,
            api_id: 0,
            comm,
        }
    }

    pub fn with_reduce_op(mut self, op: ReduceOp) -> Self {
        self.reduce_op = op;
        self
    }

    pub fn with_root(mut self, root: Rank) -> Self {
        self.root = Some(root);
        self
    }

    /// The sub-operation currently being lowered, for logging during multi-phase lowerings.
    pub fn current_op(&self) -> CollectiveOp {
        self.current_op.get()
    }

    pub fn set_current_op(&self, op: CollectiveOp) {
        self.current_op.set(op);
    }
}
