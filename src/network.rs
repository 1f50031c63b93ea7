//! Bookkeeping of many distributed tensors and the bonds between them.
//!
//! A [`TensorNetwork`] owns its tensors and hands out [`TensorId`] and [`BondId`]
//! handles. Contracting a bond replaces both of its tensors by the result and
//! rewires every other bond that touched them. Since contractions are
//! collective, every process must perform the same network operations in the
//! same order.

use std::ptr;

use log::debug;
use mpi::traits::Communicator;
use serde::{Deserialize, Serialize};

use crate::contraction::{check_contraction, contract, validate};
use crate::environment::Environment;
use crate::error::{ensure, Error, Result};
use crate::mpi::communication::broadcast_serializing;
use crate::tensor::Tensor;
use crate::types::{BondId, TensorId, Wire};
use crate::utils::arena::Arena;

/// A contraction request between two tensors of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    left: TensorId,
    right: TensorId,
    /// Axis of `left` paired with an axis of `right`.
    wires: Vec<Wire>,
}

impl Bond {
    #[inline]
    pub fn tensors(&self) -> (TensorId, TensorId) {
        (self.left, self.right)
    }

    #[inline]
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    fn touches(&self, tensor: TensorId) -> bool {
        self.left == tensor || self.right == tensor
    }

    fn joins(&self, left: TensorId, right: TensorId) -> bool {
        (self.left, self.right) == (left, right) || (self.left, self.right) == (right, left)
    }

    /// The wires seen from `left`.
    fn oriented(&self, left: TensorId) -> impl Iterator<Item = Wire> + '_ {
        let flip = self.left != left;
        self.wires
            .iter()
            .map(move |&(i, j)| if flip { (j, i) } else { (i, j) })
    }
}

/// Where the axes of both operands end up in a contraction result: the open
/// distributed axes of the left operand, then those of the right, then the open
/// local axes in the same order. Contracted axes map to `None`.
pub(crate) fn result_positions(
    left: (usize, usize),
    right: (usize, usize),
    wires: &[Wire],
) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    let (left_dis, left_order) = left;
    let (right_dis, right_order) = right;
    let left_open = |k: usize| wires.iter().all(|w| w.0 != k);
    let right_open = |k: usize| wires.iter().all(|w| w.1 != k);

    let mut left_map = vec![None; left_order];
    let mut right_map = vec![None; right_order];
    let mut next = 0;
    let mut assign = |map: &mut Vec<Option<usize>>, axes: &mut dyn Iterator<Item = usize>| {
        for k in axes {
            map[k] = Some(next);
            next += 1;
        }
    };
    assign(&mut left_map, &mut (0..left_dis).filter(|&k| left_open(k)));
    assign(&mut right_map, &mut (0..right_dis).filter(|&k| right_open(k)));
    assign(&mut left_map, &mut (left_dis..left_order).filter(|&k| left_open(k)));
    assign(&mut right_map, &mut (right_dis..right_order).filter(|&k| right_open(k)));
    (left_map, right_map)
}

pub struct TensorNetwork<'env> {
    env: &'env Environment,
    tensors: Arena<Tensor<'env>>,
    bonds: Arena<Bond>,
}

impl<'env> TensorNetwork<'env> {
    #[must_use]
    pub fn new(env: &'env Environment) -> Self {
        Self {
            env,
            tensors: Arena::default(),
            bonds: Arena::default(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Handles of all stored tensors, in ascending order.
    pub fn tensor_ids(&self) -> Vec<TensorId> {
        self.tensors.keys()
    }

    /// Handles of all pending bonds, in ascending order.
    pub fn bond_ids(&self) -> Vec<BondId> {
        self.bonds.keys()
    }

    pub fn insert_tensor(&mut self, tensor: Tensor<'env>) -> Result<TensorId> {
        ensure!(
            ptr::eq(self.env, tensor.env()),
            "tensor belongs to a different environment"
        );
        Ok(self.tensors.issue(tensor))
    }

    pub fn tensor(&self, id: TensorId) -> Result<&Tensor<'env>> {
        self.tensors
            .get(id)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown tensor {id}")))
    }

    /// Removes a tensor from the network, together with all bonds touching it.
    pub fn take_tensor(&mut self, id: TensorId) -> Result<Tensor<'env>> {
        let tensor = self
            .tensors
            .remove(id)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown tensor {id}")))?;
        self.bonds.retain(|bond| !bond.touches(id));
        Ok(tensor)
    }

    pub fn bond(&self, id: BondId) -> Result<&Bond> {
        self.bonds
            .get(id)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown bond {id}")))
    }

    /// Requests the contraction of `wires` between two distinct tensors. Every
    /// axis can take part in at most one bond.
    pub fn create_bond(&mut self, left: TensorId, right: TensorId, wires: Vec<Wire>) -> Result<BondId> {
        ensure!(left != right, "tensor {left} cannot be bonded to itself");
        validate(self.tensor(left)?.frame(), self.tensor(right)?.frame(), &wires)?;
        for bond in self.bonds.values() {
            for (side, tensor) in [(0, left), (1, right)] {
                if !bond.touches(tensor) {
                    continue;
                }
                let taken = bond
                    .oriented(tensor)
                    .map(|w| w.0)
                    .collect::<Vec<_>>();
                for wire in &wires {
                    let axis = if side == 0 { wire.0 } else { wire.1 };
                    ensure!(
                        !taken.contains(&axis),
                        "axis {axis} of tensor {tensor} is already bonded"
                    );
                }
            }
        }
        Ok(self.bonds.issue(Bond { left, right, wires }))
    }

    /// Contracts the tensors joined by bond `id`, along with every other bond
    /// joining the same pair. Returns the handle of the result. Collective over
    /// the world group. If the contraction cannot run, the network is left as it
    /// was.
    pub fn contract_bond(&mut self, id: BondId) -> Result<TensorId> {
        let (left, right) = self.bond(id)?.tensors();
        let merged = self.bonds.keys_where(|bond| bond.joins(left, right));
        let wires = merged
            .iter()
            .filter_map(|&bond_id| self.bonds.get(bond_id))
            .flat_map(|bond| bond.oriented(left))
            .collect::<Vec<_>>();
        // Nothing is removed until the contraction is known to run.
        check_contraction(self.tensor(left)?, self.tensor(right)?, &wires)?;
        for bond_id in &merged {
            self.bonds.remove(*bond_id);
        }

        let a = self.take_raw(left)?;
        let b = self.take_raw(right)?;
        let (left_map, right_map) = result_positions(
            (a.dis_dims().len(), a.frame().order()),
            (b.dis_dims().len(), b.frame().order()),
            &wires,
        );
        debug!(rank = self.env.rank(), bonds:? = merged, left, right; "Contracting bonds");
        let result = contract(a, b, &wires)?;
        let result_id = self.insert_tensor(result)?;

        for bond in self.bonds.values_mut() {
            for on_left in [true, false] {
                let tensor = if on_left { bond.left } else { bond.right };
                let map = if tensor == left {
                    &left_map
                } else if tensor == right {
                    &right_map
                } else {
                    continue;
                };
                for wire in &mut bond.wires {
                    let axis = if on_left { &mut wire.0 } else { &mut wire.1 };
                    // Axes of other bonds always stay open.
                    if let Some(position) = map[*axis] {
                        *axis = position;
                    }
                }
                if on_left {
                    bond.left = result_id;
                } else {
                    bond.right = result_id;
                }
            }
        }
        Ok(result_id)
    }

    /// Contracts the given bonds in order. Bonds already merged into an earlier
    /// contraction are skipped. Collective over the world group.
    pub fn contract_all_in_order(&mut self, order: &[BondId]) -> Result<()> {
        for id in order {
            self.bond(*id)?;
        }
        for id in order {
            if self.bonds.contains(*id) {
                self.contract_bond(*id)?;
            }
        }
        Ok(())
    }

    /// Contracts every pending bond, in the order of their handles on rank 0.
    /// Collective over the world group.
    pub fn contract_all(&mut self) -> Result<()> {
        let world = self.env.world();
        let order = broadcast_serializing(self.bond_ids(), &world.process_at_rank(0));
        self.contract_all_in_order(&order)
    }

    fn take_raw(&mut self, id: TensorId) -> Result<Tensor<'env>> {
        self.tensors
            .remove(id)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown tensor {id}")))
    }
}

impl std::fmt::Debug for TensorNetwork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorNetwork")
            .field("tensors", &self.tensor_ids())
            .field("bonds", &self.bonds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_positions_local() {
        // a: (i, j) local, b: (j, k) local
        let (a, b) = result_positions((0, 2), (0, 2), &[(1, 0)]);
        assert_eq!(a, vec![Some(0), None]);
        assert_eq!(b, vec![None, Some(1)]);
    }

    #[test]
    fn test_result_positions_mixed() {
        // a: [d0, d1 | l2, l3], b: [d0 | l1, l2]
        let (a, b) = result_positions((2, 4), (1, 3), &[(1, 0), (3, 2)]);
        assert_eq!(a, vec![Some(0), None, Some(1), None]);
        assert_eq!(b, vec![None, Some(2), None]);
    }

    #[test]
    fn test_result_positions_outer() {
        let (a, b) = result_positions((1, 2), (1, 2), &[]);
        assert_eq!(a, vec![Some(0), Some(2)]);
        assert_eq!(b, vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_bond_orientation() {
        let bond = Bond {
            left: 3,
            right: 7,
            wires: vec![(0, 2), (1, 1)],
        };
        assert!(bond.joins(7, 3));
        assert!(!bond.joins(3, 4));
        assert_eq!(bond.oriented(3).collect::<Vec<_>>(), vec![(0, 2), (1, 1)]);
        assert_eq!(bond.oriented(7).collect::<Vec<_>>(), vec![(2, 0), (1, 1)]);
    }
}
