//! Shared parameter storage with one lock per embedding slot.
//!
//! A slot holds a point and its momentum accumulator. Both can only be
//! reached through [`ParameterStore::lock`], so every read-modify-write of a
//! slot happens under that slot's mutex.
//!
//! Gradients are not shared: each worker owns a [`GradientBuffer`] covering
//! the whole vocabulary and is responsible for zeroing the entries it used.

use hyperembed_core::{DVector, OptimizerError, OptimizerResult};
use hyperembed_manifolds::{EmbeddingTable, Space, VectorSpace};
use parking_lot::{Mutex, MutexGuard};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Point and momentum of one embedding slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// Current coordinates
    pub param: DVector<f64>,
    /// Momentum accumulator, same shape as `param`
    pub momentum: DVector<f64>,
}

/// Guard giving exclusive access to one slot.
pub type SlotGuard<'a> = MutexGuard<'a, Slot>;

/// Array of independently locked slots sharing one vector space.
#[derive(Debug)]
pub struct ParameterStore {
    space: Space,
    slots: Vec<Mutex<Slot>>,
}

impl ParameterStore {
    /// Creates a store with zero momentum.
    pub fn new(space: Space, params: Vec<DVector<f64>>) -> OptimizerResult<Self> {
        let momenta = params.iter().map(|_| space.zeros()).collect();
        Self::with_momentum(space, params, momenta)
    }

    /// Creates a store from parameters and previously saved momenta.
    pub fn with_momentum(
        space: Space,
        params: Vec<DVector<f64>>,
        momenta: Vec<DVector<f64>>,
    ) -> OptimizerResult<Self> {
        if params.len() != momenta.len() {
            return Err(OptimizerError::invalid_configuration(
                "momentum count must match parameter count",
                "momenta",
                momenta.len(),
            ));
        }
        let mut slots = Vec::with_capacity(params.len());
        for (param, momentum) in params.into_iter().zip(momenta) {
            space.check_len(&param)?;
            space.check_len(&momentum)?;
            slots.push(Mutex::new(Slot { param, momentum }));
        }
        Ok(Self { space, slots })
    }

    /// Creates a store holding a copy of the table's vectors.
    pub fn from_table(table: &EmbeddingTable) -> Self {
        let space = *table.space();
        let slots = table
            .vectors()
            .iter()
            .map(|param| {
                Mutex::new(Slot {
                    param: param.clone(),
                    momentum: space.zeros(),
                })
            })
            .collect();
        Self { space, slots }
    }

    /// Vector space of every slot.
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Locks slot `index`.
    pub fn lock(&self, index: usize) -> OptimizerResult<SlotGuard<'_>> {
        self.slots
            .get(index)
            .map(|slot| slot.lock())
            .ok_or(OptimizerError::IndexOutOfBounds {
                index,
                len: self.slots.len(),
            })
    }

    /// Copy of the point stored at `index`.
    pub fn param(&self, index: usize) -> OptimizerResult<DVector<f64>> {
        Ok(self.lock(index)?.param.clone())
    }

    /// Copy of every point, slot by slot.
    pub fn snapshot(&self) -> Vec<DVector<f64>> {
        self.collect(|slot| slot.param.clone())
    }

    /// Copy of every momentum accumulator, slot by slot.
    pub fn momentum_snapshot(&self) -> Vec<DVector<f64>> {
        self.collect(|slot| slot.momentum.clone())
    }

    fn collect<F>(&self, f: F) -> Vec<DVector<f64>>
    where
        F: Fn(&Slot) -> DVector<f64> + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            self.slots.par_iter().map(|m| f(&m.lock())).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.slots.iter().map(|m| f(&m.lock())).collect()
        }
    }

    /// Consumes the store, returning points and momenta.
    pub fn into_parts(self) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
        self.slots
            .into_iter()
            .map(|m| {
                let slot = m.into_inner();
                (slot.param, slot.momentum)
            })
            .unzip()
    }
}

/// Per-worker Euclidean gradients, one entry per slot.
#[derive(Debug, Clone)]
pub struct GradientBuffer {
    grads: Vec<DVector<f64>>,
}

impl GradientBuffer {
    /// Zeroed buffer of `len` entries of `coordinate_len` coordinates.
    pub fn new(len: usize, coordinate_len: usize) -> Self {
        Self {
            grads: vec![DVector::zeros(coordinate_len); len],
        }
    }

    /// Zeroed buffer matching a store.
    pub fn for_store(store: &ParameterStore) -> Self {
        Self::new(store.len(), store.space().coordinate_len())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.grads.len()
    }

    /// Whether the buffer has no entries.
    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Gradient of slot `index`.
    pub fn get(&self, index: usize) -> Option<&DVector<f64>> {
        self.grads.get(index)
    }

    /// Mutable gradient of slot `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut DVector<f64>> {
        self.grads.get_mut(index)
    }

    /// Mutable gradients of two distinct slots.
    pub fn pair_mut(
        &mut self,
        first: usize,
        second: usize,
    ) -> Option<(&mut DVector<f64>, &mut DVector<f64>)> {
        if first == second || first.max(second) >= self.grads.len() {
            return None;
        }
        if first < second {
            let (left, right) = self.grads.split_at_mut(second);
            Some((&mut left[first], &mut right[0]))
        } else {
            let (left, right) = self.grads.split_at_mut(first);
            Some((&mut right[0], &mut left[second]))
        }
    }

    /// Resets the gradient of slot `index`.
    pub fn zero(&mut self, index: usize) {
        if let Some(g) = self.grads.get_mut(index) {
            g.fill(0.0);
        }
    }
}
