//! All-reduce, pairwise: reduce-scatter followed by all-gather, as two independently submitted
//! graphs.

use tracing::info_span;

use crate::backend::Backend;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::primitive::PrimitiveBody;
use crate::types::{CollectiveOp, CollectiveParams};

use super::reduce_scatter::build_pairwise_reduce_scatter;

/// Two sub-graphs submitted in sequence: a reduce-scatter phase followed by an all-gather phase
/// marked `strong_order_start`, so the backend can fence the two.
///
/// Unlike the implementation this lowering is grounded on, which discards the reduce-scatter
/// phase's submission result, this lowering propagates it and short-circuits before building the
/// all-gather phase, since a failed first phase leaves no valid reduced data for the second phase
/// to gather.
pub fn run_pairwise(backend: &mut dyn Backend, params: &CollectiveParams) -> Result<(), GraphError> {
    let comm_size = params.comm.comm_size();
    if params.count % comm_size as u64 != 0 {
        return Err(GraphError::CountNotDivisible {
            count: params.count,
            comm_size,
        });
    }

    {
        let _span = info_span!("all_reduce.pairwise.reduce_scatter", comm_size).entered();
        params.set_current_op(CollectiveOp::ReduceScatter);
        let mut graph = Graph::new();
        build_pairwise_reduce_scatter(&mut graph, params);
        graph.submit(backend)?;
    }

    {
        let _span = info_span!("all_reduce.pairwise.all_gather", comm_size).entered();
        params.set_current_op(CollectiveOp::AllGather);
        run_all_gather_phase(backend, params)
    }
}

fn run_all_gather_phase(backend: &mut dyn Backend, params: &CollectiveParams) -> Result<(), GraphError> {
    let my_rank = params.comm.my_rank();
    let my_box = params.comm.my_scaleup_group();
    let comm_size = params.comm.comm_size();
    let scaleup_group_size = params.comm.scaleup_group_size();
    let box_count = params.comm.box_count();
    let count_per_rank = params.count / comm_size as u64;
    let rank_addr_offset = count_per_rank * params.data_type.size_in_bytes();

    let mut graph = Graph::new();
    graph.set_strong_order_start(true);

    let own_box_addr = params.recv_buffer_addr + (my_box * scaleup_group_size) as u64 * rank_addr_offset;
    graph.create_primitive(PrimitiveBody::AllGather {
        src_addr: own_box_addr,
        dst_addr: own_box_addr,
        count: count_per_rank,
    });

    for i in 1..box_count {
        let send_rank = (my_rank + i * scaleup_group_size) % comm_size;
        let recv_rank = (my_rank + comm_size - i * scaleup_group_size) % comm_size;

        let recv_addr = params.recv_buffer_addr + recv_rank as u64 * rank_addr_offset;
        let recv_box = params.comm.rank_to_scaleup_group(recv_rank);
        let box_offset = (recv_box * scaleup_group_size) as u64 * rank_addr_offset;
        let ag_in_out_addr = params.recv_buffer_addr + box_offset;

        let recv = graph.create_primitive(PrimitiveBody::Recv {
            peer_rank: recv_rank,
            dst: recv_addr.into(),
            count: count_per_rank,
            do_reduction: false,
            cast_up: false,
        });
        let ag = graph.create_primitive(PrimitiveBody::AllGather {
            src_addr: ag_in_out_addr,
            dst_addr: ag_in_out_addr,
            count: count_per_rank,
        });
        graph.add_wait(recv, ag);

        graph.create_primitive(PrimitiveBody::Send {
            peer_rank: send_rank,
            src: (params.recv_buffer_addr + my_rank as u64 * rank_addr_offset).into(),
            count: count_per_rank,
            do_reduction: false,
        });
    }

    graph.submit(backend)
}
