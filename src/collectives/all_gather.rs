//! All-gather lowerings: pairwise (box-by-box exchange) and ring (fixed neighbor chain).

use tracing::info_span;

use crate::backend::Backend;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::primitive::PrimitiveBody;
use crate::types::CollectiveParams;

/// Each rank first all-gathers its input within its own box, then for every other box exchanges
/// one slice directly with the peer rank offset by `i * scaleup_group_size`: receive that box's
/// slice over scaleout, all-gather it locally, and concurrently send this rank's own input to the
/// corresponding forward peer.
pub fn run_pairwise(backend: &mut dyn Backend, params: &CollectiveParams) -> Result<(), GraphError> {
    let _span = info_span!("all_gather.pairwise", comm_size = params.comm.comm_size()).entered();

    let my_rank = params.comm.my_rank();
    let my_box = params.comm.my_scaleup_group();
    let comm_size = params.comm.comm_size();
    let scaleup_group_size = params.comm.scaleup_group_size();
    let box_count = params.comm.box_count();
    let input_count = params.count;
    let offset = input_count * params.data_type.size_in_bytes();

    let mut graph = Graph::new();

    graph.create_primitive(PrimitiveBody::AllGather {
        src_addr: params.send_buffer_addr,
        dst_addr: params.recv_buffer_addr + (my_box * scaleup_group_size) as u64 * offset,
        count: input_count,
    });

    for i in 1..box_count {
        let send_rank = (my_rank + i * scaleup_group_size) % comm_size;
        let recv_rank = (my_rank + comm_size - i * scaleup_group_size) % comm_size;

        let so_recv_addr = params.recv_buffer_addr + recv_rank as u64 * offset;
        let recv_box = params.comm.rank_to_scaleup_group(recv_rank);
        let box_offset = (recv_box * scaleup_group_size) as u64 * offset;
        let ag_out_addr = params.recv_buffer_addr + box_offset;

        let so_recv = graph.create_primitive(PrimitiveBody::Recv {
            peer_rank: recv_rank,
            dst: so_recv_addr.into(),
            count: input_count,
            do_reduction: false,
            cast_up: false,
        });
        let ag = graph.create_primitive(PrimitiveBody::AllGather {
            src_addr: so_recv_addr,
            dst_addr: ag_out_addr,
            count: input_count,
        });
        graph.add_wait(so_recv, ag);

        graph.create_primitive(PrimitiveBody::Send {
            peer_rank: send_rank,
            src: params.send_buffer_addr.into(),
            count: input_count,
            do_reduction: false,
        });
    }

    graph.submit(backend)
}

/// Fixed-neighbor ring: data is relayed one box-hop at a time around the ring formed by boxes,
/// rather than exchanged directly between arbitrary box pairs as in the pairwise variant.
pub fn run_ring(backend: &mut dyn Backend, params: &CollectiveParams) -> Result<(), GraphError> {
    let _span = info_span!("all_gather.ring", comm_size = params.comm.comm_size()).entered();

    let my_rank = params.comm.my_rank();
    let my_box = params.comm.my_scaleup_group();
    let comm_size = params.comm.comm_size();
    let scaleup_group_size = params.comm.scaleup_group_size();
    let box_count = params.comm.box_count();
    let input_count = params.count;
    let offset = input_count * params.data_type.size_in_bytes();

    let mut graph = Graph::new();

    let send_rank = (my_rank + scaleup_group_size) % comm_size;
    let recv_rank = (my_rank + comm_size - scaleup_group_size) % comm_size;

    let mut ag = graph.create_primitive(PrimitiveBody::AllGather {
        src_addr: params.send_buffer_addr,
        dst_addr: params.recv_buffer_addr + (my_box * scaleup_group_size) as u64 * offset,
        count: input_count,
    });

    if box_count > 1 {
        let so_send = graph.create_primitive(PrimitiveBody::Send {
            peer_rank: send_rank,
            src: params.send_buffer_addr.into(),
            count: input_count,
            do_reduction: false,
        });
        graph.add_wait(ag, so_send);
    }

    for i in 1..box_count {
        let peer_slot = (my_rank + comm_size - scaleup_group_size * i) % comm_size;
        let so_recv_addr = params.recv_buffer_addr + peer_slot as u64 * offset;
        let ag_send_addr = so_recv_addr;
        let ag_recv_addr = ag_send_addr - params.comm.rank_in_scaleup_group() as u64 * offset;

        let so_recv = graph.create_primitive(PrimitiveBody::Recv {
            peer_rank: recv_rank,
            dst: so_recv_addr.into(),
            count: input_count,
            do_reduction: false,
            cast_up: false,
        });
        ag = graph.create_primitive(PrimitiveBody::AllGather {
            src_addr: ag_send_addr,
            dst_addr: ag_recv_addr,
            count: input_count,
        });
        graph.add_wait(so_recv, ag);

        if i < box_count - 1 {
            let so_send = graph.create_primitive(PrimitiveBody::Send {
                peer_rank: send_rank,
                src: so_recv_addr.into(),
                count: input_count,
                do_reduction: false,
            });
            graph.add_wait(so_recv, so_send);
        }
    }

    graph.submit(backend)
}
