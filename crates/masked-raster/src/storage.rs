//! Layered value storage indexed by compacted position and layer.
//!
//! Each layer is a contiguous plane of `cells` values, so layer `l` (1-based)
//! occupies `values[(l - 1) * cells .. l * cells]`. Keeping planes contiguous
//! lets per-layer statistics run over disjoint slices.

use crate::error::{RasterError, Result};
use crate::types::RasterValue;

/// Flat `cells x layers` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredStorage<T> {
    values: Vec<T>,
    cells: usize,
    layers: usize,
}

impl<T: RasterValue> LayeredStorage<T> {
    /// Reserve storage for `cells x layers` values, all set to `fill`.
    pub fn allocate(cells: usize, layers: usize, fill: T) -> Result<Self> {
        if cells == 0 {
            return Err(RasterError::allocation("valid cell count must be > 0"));
        }
        if layers == 0 {
            return Err(RasterError::allocation("layer count must be > 0"));
        }
        let total = cells
            .checked_mul(layers)
            .ok_or_else(|| RasterError::allocation(format!("{} x {} overflows", cells, layers)))?;

        let mut values = Vec::new();
        values
            .try_reserve_exact(total)
            .map_err(|e| RasterError::allocation(format!("{} values: {}", total, e)))?;
        values.resize(total, fill);

        Ok(Self {
            values,
            cells,
            layers,
        })
    }

    /// Copy per-layer planes into freshly allocated storage.
    ///
    /// Every plane must hold as many values as the first; sizing goes
    /// through [`allocate`](Self::allocate).
    pub fn from_layers(layers: Vec<Vec<T>>) -> Result<Self> {
        let Some(&fill) = layers.first().and_then(|plane| plane.first()) else {
            return Err(RasterError::allocation("valid cell count must be > 0"));
        };
        let cells = layers[0].len();
        if let Some(bad) = layers.iter().find(|plane| plane.len() != cells) {
            return Err(RasterError::ValueLengthMismatch {
                expected: cells,
                actual: bad.len(),
            });
        }

        let mut storage = Self::allocate(cells, layers.len(), fill)?;
        for (slot, plane) in storage.values.chunks_exact_mut(cells).zip(&layers) {
            slot.copy_from_slice(plane);
        }
        Ok(storage)
    }

    pub fn cells(&self) -> usize {
        self.cells
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    #[inline]
    fn offset(&self, index: usize, layer: usize) -> Result<usize> {
        if index >= self.cells || layer == 0 || layer > self.layers {
            return Err(RasterError::IndexOutOfRange {
                index,
                layer,
                cells: self.cells,
                layers: self.layers,
            });
        }
        Ok((layer - 1) * self.cells + index)
    }

    /// Value at compacted slot `index` of 1-based `layer`.
    pub fn get(&self, index: usize, layer: usize) -> Result<T> {
        let offset = self.offset(index, layer)?;
        Ok(self.values[offset])
    }

    /// Overwrite the value at compacted slot `index` of 1-based `layer`.
    pub fn set(&mut self, index: usize, layer: usize, value: T) -> Result<()> {
        let offset = self.offset(index, layer)?;
        self.values[offset] = value;
        Ok(())
    }

    /// All values of one layer, in slot order.
    pub fn layer(&self, layer: usize) -> Result<&[T]> {
        if layer == 0 || layer > self.layers {
            return Err(RasterError::LayerOutOfRange {
                layer,
                layers: self.layers,
            });
        }
        let start = (layer - 1) * self.cells;
        Ok(&self.values[start..start + self.cells])
    }

    pub fn layer_mut(&mut self, layer: usize) -> Result<&mut [T]> {
        if layer == 0 || layer > self.layers {
            return Err(RasterError::LayerOutOfRange {
                layer,
                layers: self.layers,
            });
        }
        let start = (layer - 1) * self.cells;
        Ok(&mut self.values[start..start + self.cells])
    }

    /// Iterate over layer planes in layer order.
    pub fn planes(&self) -> std::slice::Chunks<'_, T> {
        self.values.chunks(self.cells)
    }

    /// One value per layer at compacted slot `index`.
    pub fn values_at(&self, index: usize) -> Result<Vec<T>> {
        (1..=self.layers).map(|layer| self.get(index, layer)).collect()
    }

    /// Append a plane as a new last layer.
    pub fn push_layer(&mut self, plane: Vec<T>) -> Result<()> {
        if plane.len() != self.cells {
            return Err(RasterError::ValueLengthMismatch {
                expected: self.cells,
                actual: plane.len(),
            });
        }
        self.values
            .try_reserve_exact(self.cells)
            .map_err(|e| RasterError::allocation(e.to_string()))?;
        self.values.extend(plane);
        self.layers += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_rejects_zero_cells() {
        assert!(matches!(
            LayeredStorage::<f32>::allocate(0, 1, 0.0),
            Err(RasterError::AllocationError(_))
        ));
        assert!(matches!(
            LayeredStorage::<f32>::allocate(4, 0, 0.0),
            Err(RasterError::AllocationError(_))
        ));
    }

    #[test]
    fn test_get_set_by_layer() {
        let mut storage = LayeredStorage::allocate(3, 2, -1i32).unwrap();
        storage.set(2, 2, 42).unwrap();
        assert_eq!(storage.get(2, 2).unwrap(), 42);
        assert_eq!(storage.get(2, 1).unwrap(), -1);
        assert_eq!(storage.layer(2).unwrap(), &[-1, -1, 42]);
    }

    #[test]
    fn test_out_of_range_access() {
        let storage = LayeredStorage::allocate(3, 2, 0.0f64).unwrap();
        assert!(matches!(
            storage.get(3, 1),
            Err(RasterError::IndexOutOfRange { index: 3, .. })
        ));
        assert!(matches!(
            storage.get(0, 0),
            Err(RasterError::IndexOutOfRange { layer: 0, .. })
        ));
        assert!(storage.get(0, 3).is_err());
    }

    #[test]
    fn test_from_layers_checks_lengths() {
        let storage = LayeredStorage::from_layers(vec![vec![1u8, 2], vec![3, 4]]).unwrap();
        assert_eq!(storage.values_at(1).unwrap(), vec![2, 4]);

        let bad = LayeredStorage::from_layers(vec![vec![1u8, 2], vec![3]]);
        assert!(matches!(
            bad,
            Err(RasterError::ValueLengthMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_from_layers_rejects_empty_planes() {
        assert!(matches!(
            LayeredStorage::<f64>::from_layers(Vec::new()),
            Err(RasterError::AllocationError(_))
        ));
        assert!(matches!(
            LayeredStorage::<f64>::from_layers(vec![Vec::new(), vec![1.0]]),
            Err(RasterError::AllocationError(_))
        ));
    }

    #[test]
    fn test_push_layer() {
        let mut storage = LayeredStorage::allocate(2, 1, 0.0f32).unwrap();
        storage.push_layer(vec![5.0, 6.0]).unwrap();
        assert_eq!(storage.layers(), 2);
        assert_eq!(storage.get(1, 2).unwrap(), 6.0);
        assert!(storage.push_layer(vec![1.0]).is_err());
        assert_eq!(storage.layers(), 2);
        assert_eq!(storage.planes().count(), 2);
    }
}
