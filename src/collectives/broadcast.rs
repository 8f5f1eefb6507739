//! Broadcast, pairwise: the broadcast analogue of all-gather pairwise with a single root instead
//! of per-rank inputs.
//!
//! Not present in the reference this crate is otherwise grounded on — `CollectiveOp::Broadcast`
//! still needs a lowering for the dispatcher to be total over `CollectiveOp`, so this one is built
//! from the same pairwise box-exchange shape as [`super::all_gather::run_pairwise`].

use tracing::info_span;

use crate::backend::Backend;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::primitive::PrimitiveBody;
use crate::types::CollectiveParams;

pub fn run_pairwise(backend: &mut dyn Backend, params: &CollectiveParams) -> Result<(), GraphError> {
    let root = params
        .root
        .expect("broadcast requires CollectiveParams::with_root");

    let _span = info_span!("broadcast.pairwise", comm_size = params.comm.comm_size(), root).entered();

    let my_rank = params.comm.my_rank();
    let my_box = params.comm.my_scaleup_group();
    let comm_size = params.comm.comm_size();
    let scaleup_group_size = params.comm.scaleup_group_size();
    let box_count = params.comm.box_count();
    let root_box = params.comm.rank_to_scaleup_group(root);
    let count = params.count;

    let mut graph = Graph::new();

    if my_box == root_box {
        graph.create_primitive(PrimitiveBody::Broadcast {
            root,
            src: params.send_buffer_addr,
            dst: params.recv_buffer_addr,
            count,
        });

        if my_rank == root {
            for i in 1..box_count {
                let target = (root + i * scaleup_group_size) % comm_size;
                graph.create_primitive(PrimitiveBody::Send {
                    peer_rank: target,
                    src: params.send_buffer_addr.into(),
                    count,
                    do_reduction: false,
                });
            }
        }
    } else {
        let target = (1..box_count)
            .map(|i| (root + i * scaleup_group_size) % comm_size)
            .find(|&candidate| params.comm.rank_to_scaleup_group(candidate) == my_box)
            .expect("every non-root box has exactly one designated receiving rank");

        if my_rank == target {
            let recv = graph.create_primitive(PrimitiveBody::Recv {
                peer_rank: root,
                dst: params.recv_buffer_addr.into(),
                count,
                do_reduction: false,
                cast_up: false,
            });
            let bc = graph.create_primitive(PrimitiveBody::Broadcast {
                root: target,
                src: params.recv_buffer_addr,
                dst: params.recv_buffer_addr,
                count,
            });
            graph.add_wait(recv, bc);
        } else {
            graph.create_primitive(PrimitiveBody::Broadcast {
                root: target,
                src: params.recv_buffer_addr,
                dst: params.recv_buffer_addr,
                count,
            });
        }
    }

    graph.submit(backend)
}
