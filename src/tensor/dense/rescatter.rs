use log::debug;
use mpi::topology::Color;
use mpi::traits::Communicator;

use crate::error::{ensure, Result};
use crate::mpi::communication::all_gather;
use crate::placement::{Layout, Placement};
use crate::tensor::dense::DenseTensor;
use crate::tensor::frame::TensorFrame;
use crate::tensor::Primitives;
use crate::types::PlacementParams;
use crate::utils::coords::size;

/// Moves the boundary between distributed and local axes by `offset` positions.
///
/// A negative offset gathers the trailing `-offset` distributed axes into the
/// front of the local axes; a positive one scatters the leading `offset` local
/// axes onto the end of the distributed axes.
pub(super) fn rescatter(tensor: DenseTensor, offset: isize) -> Result<DenseTensor> {
    let n_dis = tensor.dis_dims().len();
    let n_loc = tensor.loc_dims().len();
    match offset {
        0 => Ok(tensor),
        o if o < 0 => {
            let k = o.unsigned_abs();
            ensure!(
                k <= n_dis,
                "cannot gather {k} axes of a tensor with {n_dis} distributed axes"
            );
            gather(tensor, k)
        }
        o => {
            let k = o.unsigned_abs();
            ensure!(
                k <= n_loc,
                "cannot scatter {k} axes of a tensor with {n_loc} local axes"
            );
            scatter(tensor, k)
        }
    }
}

fn gather(tensor: DenseTensor, k: usize) -> Result<DenseTensor> {
    let env = tensor.env();
    let n_dis = tensor.dis_dims().len();
    let shift = size(&tensor.dis_dims()[n_dis - k..]);
    let PlacementParams {
        stretch,
        cycles,
        offset,
    } = tensor.placement().params();
    let params = PlacementParams::new(stretch * shift, cycles, offset);
    debug!(rank = env.rank(), k, shift, dims:? = tensor.total_dims(); "Gathering distributed axes");

    let (frame, data) = tensor.into_parts();
    let data = match (frame.placement().group(), frame.placement().shard()) {
        (Some(group), Some(shard)) => {
            let sub = group
                .split_by_color_with_key(Color::with_value((shard / shift) as i32), shard as i32)
                .expect("every group member picks a colour");
            all_gather(&data, &sub)
        }
        _ => Vec::new(),
    };

    let (mut dis_dims, loc_dims, old_placement) = frame.into_parts();
    drop(old_placement);
    let mut moved = dis_dims.split_off(n_dis - k);
    moved.extend(loc_dims);
    let placement = Placement::new(env, size(&dis_dims), params)?;
    let frame = TensorFrame::with_placement(dis_dims, moved, placement);
    Ok(DenseTensor::from_parts(frame, data))
}

fn scatter(tensor: DenseTensor, k: usize) -> Result<DenseTensor> {
    let env = tensor.env();
    let shift = size(&tensor.loc_dims()[..k]);
    let base = tensor.placement().base();
    let PlacementParams {
        stretch,
        cycles,
        offset,
    } = tensor.placement().params();

    // The stretch must split evenly into `shift` slices.
    let aligned = PlacementParams::new(shift.max((stretch / shift) * shift), cycles, offset);
    Layout::new(base, aligned).validate(env.size())?;
    let params = PlacementParams::new(aligned.stretch / shift, cycles, offset);
    debug!(rank = env.rank(), k, shift, aligned:?; "Scattering local axes");

    let tensor = tensor.rebcast(aligned)?;
    let (frame, data) = tensor.into_parts();
    let chunk = frame.loc_size() / shift;
    let data = match frame.placement().layout().position_of(env.rank()) {
        Some((_, _, slot)) => {
            let t = slot / params.stretch;
            data[t * chunk..(t + 1) * chunk].to_vec()
        }
        None => Vec::new(),
    };

    let (mut dis_dims, mut loc_dims, old_placement) = frame.into_parts();
    drop(old_placement);
    let rest = loc_dims.split_off(k);
    dis_dims.extend(loc_dims);
    let placement = Placement::new(env, base * shift, params)?;
    let frame = TensorFrame::with_placement(dis_dims, rest, placement);
    Ok(DenseTensor::from_parts(frame, data))
}
