//! Reduce-scatter, pairwise: each rank ends up with its own slice of the globally reduced result.
//!
//! This is exactly phase 1 of [`super::all_reduce::run_pairwise`]; the builder is shared so the
//! two lowerings cannot drift apart, and is exposed as its own entry point for callers that only
//! need the scatter half.

use tracing::info_span;

use crate::backend::Backend;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::primitive::PrimitiveBody;
use crate::token::BufferClass;
use crate::types::CollectiveParams;

pub fn run_pairwise(backend: &mut dyn Backend, params: &CollectiveParams) -> Result<(), GraphError> {
    let comm_size = params.comm.comm_size();
    if params.count % comm_size as u64 != 0 {
        return Err(GraphError::CountNotDivisible {
            count: params.count,
            comm_size,
        });
    }

    let _span = info_span!("reduce_scatter.pairwise", comm_size).entered();
    let mut graph = Graph::new();
    build_pairwise_reduce_scatter(&mut graph, params);
    graph.submit(backend)
}

/// Builds the reduce-scatter sub-graph into `graph`, without submitting it.
///
/// When there is more than one box, each foreign box's slice is reduce-scattered into a fresh TEMP
/// scratch, sent with the reduction flag to the forward peer, and accumulated into a shared STATIC
/// scratch on the receiving side; the final iteration's receive is followed by a local reduction
/// into this rank's slot of the destination buffer. With a single box the reduce-scatter writes
/// directly into that slot and no scaleout traffic or reduction tail is needed.
pub(super) fn build_pairwise_reduce_scatter(graph: &mut Graph, params: &CollectiveParams) {
    let my_rank = params.comm.my_rank();
    let my_box = params.comm.my_scaleup_group();
    let comm_size = params.comm.comm_size();
    let scaleup_group_size = params.comm.scaleup_group_size();
    let box_count = params.comm.box_count();
    let count_per_rank = params.count / comm_size as u64;
    let rank_addr_offset = count_per_rank * params.data_type.size_in_bytes();

    let final_dst_addr = params.recv_buffer_addr
        + (my_box * scaleup_group_size) as u64 * rank_addr_offset
        + params.comm.rank_in_scaleup_group() as u64 * rank_addr_offset;

    let own_box_src = params.send_buffer_addr + (my_box * scaleup_group_size) as u64 * rank_addr_offset;

    if box_count > 1 {
        let scaleout_buff = graph.generate_buffer_token(BufferClass::Static);
        graph.create_primitive(PrimitiveBody::ReduceScatter {
            src_addr: own_box_src,
            dst: scaleout_buff.into(),
            count: count_per_rank * scaleup_group_size as u64,
        });

        for i in 1..box_count {
            let send_rank = (my_rank + i * scaleup_group_size) % comm_size;
            let recv_rank = (my_rank + comm_size - i * scaleup_group_size) % comm_size;

            let send_box = params.comm.rank_to_scaleup_group(send_rank);
            let box_offset = (send_box * scaleup_group_size) as u64 * rank_addr_offset;
            let rs_input_addr = params.send_buffer_addr + box_offset;

            let scaleup_buff = graph.generate_buffer_token(BufferClass::Temp);

            let rs = graph.create_primitive(PrimitiveBody::ReduceScatter {
                src_addr: rs_input_addr,
                dst: scaleup_buff.into(),
                count: count_per_rank * scaleup_group_size as u64,
            });

            let send = graph.create_primitive(PrimitiveBody::Send {
                peer_rank: send_rank,
                src: scaleup_buff.into(),
                count: count_per_rank,
                do_reduction: true,
            });
            graph.add_wait(rs, send);

            let recv = graph.create_primitive(PrimitiveBody::Recv {
                peer_rank: recv_rank,
                dst: scaleout_buff.into(),
                count: count_per_rank,
                do_reduction: true,
                cast_up: false,
            });

            if i == box_count - 1 {
                let reduction = graph.create_primitive(PrimitiveBody::Reduction {
                    src: scaleout_buff.into(),
                    dst_addr: final_dst_addr,
                    count: count_per_rank,
                    cast_down: false,
                });
                graph.add_wait(recv, reduction);
            }
        }
    } else {
        graph.create_primitive(PrimitiveBody::ReduceScatter {
            src_addr: own_box_src,
            dst: final_dst_addr.into(),
            count: count_per_rank * scaleup_group_size as u64,
        });
    }
}
