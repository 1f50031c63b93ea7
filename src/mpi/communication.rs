use log::trace;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::point_to_point::send_receive_replace_into;
use mpi::topology::{Process, SimpleCommunicator};
use mpi::traits::{BufferMut, Communicator, CommunicatorCollectives, Root};
use mpi::Count;
use num_complex::Complex64;

use crate::mpi::serialization::{deserialize, serialize};

/// Broadcasts a vector of `data` from `root` to all processes in its communicator.
/// For the receivers, `data` can just be an empty vector.
pub fn broadcast_vec<T>(data: &mut Vec<T>, root: &Process)
where
    T: Clone + Default,
    Vec<T>: BufferMut,
{
    // Broadcast length
    let mut len = if root.is_self() { data.len() } else { 0 };
    root.broadcast_into(&mut len);

    // Broadcast data
    if !root.is_self() {
        data.resize(len, Default::default());
    }
    root.broadcast_into(data);
}

/// Broadcast a value by serializing it and sending it as byte array.
pub fn broadcast_serializing<T>(data: T, root: &Process) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut raw_value = if root.is_self() {
        serialize(&data)
    } else {
        Vec::new()
    };

    broadcast_vec(&mut raw_value, root);

    if root.is_self() {
        data
    } else {
        deserialize(&raw_value)
    }
}

/// Replaces `data` with the element-wise sum of `data` over all members of `comm`.
pub(crate) fn all_reduce_sum(data: &mut [Complex64], comm: &SimpleCommunicator) {
    trace!(len = data.len(), members = comm.size(); "All-reducing buffer");
    let partial = data.to_vec();
    comm.all_reduce_into(&partial[..], data, SystemOperation::sum());
}

/// Concatenates the equally sized `data` of all members of `comm`, ordered by rank.
pub(crate) fn all_gather(data: &[Complex64], comm: &SimpleCommunicator) -> Vec<Complex64> {
    let mut gathered = vec![Complex64::default(); data.len() * comm.size() as usize];
    comm.all_gather_into(data, &mut gathered[..]);
    gathered
}

/// Splits `send` into one equally sized chunk per member of `comm` and sends chunk
/// `i` to member `i`. The chunk received from member `i` lands at chunk position `i`
/// of the result.
pub(crate) fn all_to_all_chunks(send: &[Complex64], comm: &SimpleCommunicator) -> Vec<Complex64> {
    let mut recv = vec![Complex64::default(); send.len()];
    comm.all_to_all_into(send, &mut recv[..]);
    recv
}

/// Variable-size all-to-all. `send` holds consecutive blocks of `send_counts[i]`
/// elements destined for member `i`; the result holds consecutive blocks of
/// `recv_counts[i]` elements received from member `i`.
pub(crate) fn all_to_all_varcount(
    send: &[Complex64],
    send_counts: &[Count],
    recv_counts: &[Count],
    comm: &SimpleCommunicator,
) -> Vec<Complex64> {
    let send_displs = displacements(send_counts);
    let recv_displs = displacements(recv_counts);
    let total = recv_counts.iter().sum::<Count>() as usize;
    let mut recv = vec![Complex64::default(); total];
    {
        let send_partition = Partition::new(send, send_counts, &send_displs[..]);
        let mut recv_partition = PartitionMut::new(&mut recv[..], recv_counts, &recv_displs[..]);
        comm.all_to_all_varcount_into(&send_partition, &mut recv_partition);
    }
    recv
}

/// Swaps the contents of `data` with the equally sized buffer of `partner`.
pub(crate) fn exchange_with(data: &mut [Complex64], partner: &Process) {
    send_receive_replace_into(data, partner, partner);
}

/// Exclusive prefix sums of `counts`.
fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &count| {
            let displ = *acc;
            *acc += count;
            Some(displ)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::displacements;

    #[test]
    fn test_displacements() {
        assert_eq!(displacements(&[2, 0, 3, 1]), vec![0, 2, 2, 5]);
        assert!(displacements(&[]).is_empty());
    }
}
