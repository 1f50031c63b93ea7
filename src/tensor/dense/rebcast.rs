use log::debug;
use mpi::traits::{Communicator, Destination, Source};
use mpi::Tag;
use num_complex::Complex64;

use crate::error::Result;
use crate::placement::{Layout, Placement};
use crate::tensor::dense::DenseTensor;
use crate::tensor::frame::TensorFrame;
use crate::types::PlacementParams;
use crate::utils::coords::size;

const REBCAST_TAG: Tag = 0x7262;

/// Changes the replication scheme, keeping dims and the distributed/local split.
///
/// The primary holder of every shard under the old scheme sends its buffer to
/// all holders of that shard under the new scheme; every newly active process
/// receives once from the old primary of its shard.
pub(super) fn rebcast<'env>(
    tensor: DenseTensor<'env>,
    params: PlacementParams,
) -> Result<DenseTensor<'env>> {
    let env = tensor.env();
    let old = *tensor.placement().layout();
    let new = Layout::new(old.base(), params);
    new.validate(env.size())?;
    if new == old {
        return Ok(tensor);
    }

    let rank = env.rank();
    debug!(rank, old:? = old.params(), new:? = params; "Rebroadcasting");
    let (frame, data) = tensor.into_parts();
    let (dis_dims, loc_dims, old_placement) = frame.into_parts();
    drop(old_placement);
    let placement = Placement::new(env, old.base(), params)?;

    let targets = match old.shard_of(rank) {
        Some(shard) if old.primary(shard) == rank => new.holders(shard),
        _ => Vec::new(),
    };
    let source = new.shard_of(rank).map(|shard| old.primary(shard));

    let world = env.world();
    let mut received = if source.is_some() {
        vec![Complex64::default(); size(&loc_dims)]
    } else {
        Vec::new()
    };
    mpi::request::scope(|scope| {
        let requests = targets
            .iter()
            .map(|&target| {
                world
                    .process_at_rank(target as i32)
                    .immediate_send_with_tag(scope, &data[..], REBCAST_TAG)
            })
            .collect::<Vec<_>>();
        if let Some(source) = source {
            world
                .process_at_rank(source as i32)
                .receive_into_with_tag(&mut received[..], REBCAST_TAG);
        }
        for request in requests {
            request.wait();
        }
    });

    let frame = TensorFrame::with_placement(dis_dims, loc_dims, placement);
    Ok(DenseTensor::from_parts(frame, received))
}
