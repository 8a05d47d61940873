//! Reconciliation of a subject grid against an optional mask.
//!
//! Produces the final header, the valid-cell position index and the
//! compacted value planes of a raster. The mode is chosen once from the
//! options and stored on the raster:
//!
//! ```text
//! calc_positions = false                      -> Uncompacted
//! calc_positions = true, no mask / extent off -> CompactSelf
//! calc_positions = true, mask + extent on     -> CompactToMask
//! ```
//!
//! In `CompactToMask` each valid mask cell is located in the subject grid by
//! going through world coordinates (mask row/col -> x/y -> subject row/col),
//! so the two grids may differ in cell size, extent and alignment.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::RawGrid;
use crate::config::RasterConfig;
use crate::error::{RasterError, Result};
use crate::header::{
    GridGeometry, HeaderTable, HEADER_CELLSNUM, HEADER_LAYERS, HEADER_NODATA,
};
use crate::positions::PositionIndex;
use crate::raster::MaskedRaster;
use crate::storage::LayeredStorage;
use crate::types::{RasterValue, ReconcileMode, RowCol};

/// How a raw grid is turned into raster storage.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions<T> {
    /// Compact storage to valid cells.
    pub calc_positions: bool,
    /// Impose the mask's extent and footprint when a mask is given.
    pub use_mask_extent: bool,
    /// Value for mask cells that fall outside the subject grid.
    /// `None` means the subject's NODATA.
    pub default_value: Option<T>,
}

impl<T> Default for ReconcileOptions<T> {
    fn default() -> Self {
        Self {
            calc_positions: true,
            use_mask_extent: true,
            default_value: None,
        }
    }
}

impl<T> ReconcileOptions<T> {
    /// Keep every cell of the rectangular grid.
    pub fn uncompacted() -> Self {
        Self {
            calc_positions: false,
            ..Self::default()
        }
    }

    /// Compact to the subject's own footprint even if a mask is supplied.
    pub fn ignore_mask_extent(mut self) -> Self {
        self.use_mask_extent = false;
        self
    }

    pub fn with_default_value(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Everything a raster needs after reconciliation.
#[derive(Debug)]
pub(crate) struct Reconciled<T> {
    pub header: HeaderTable,
    pub geometry: GridGeometry,
    pub index: Arc<PositionIndex>,
    pub shares_mask_index: bool,
    pub storage: LayeredStorage<T>,
    pub mode: ReconcileMode,
    pub nodata: T,
    pub default_value: T,
    pub filled_cells: usize,
}

/// Fill in optional header keys and check the raw planes.
fn normalize_raw<T: RasterValue>(
    raw: &RawGrid<T>,
    config: &RasterConfig,
) -> Result<(HeaderTable, GridGeometry)> {
    let mut header = raw.header.clone();
    if !header.contains_key(HEADER_NODATA) {
        debug!(nodata = config.default_nodata, "Source header has no NODATA, using default");
        header.set(HEADER_NODATA, config.default_nodata);
    }
    header.set(HEADER_LAYERS, raw.layers.len() as f64);
    raw.validate()?;
    header.validate()?;
    let geometry = header.geometry()?;
    Ok((header, geometry))
}

/// Reconcile `raw` against `mask` according to `options`.
///
/// Either the whole reconciliation succeeds or nothing is produced.
pub(crate) fn reconcile<T, M>(
    raw: RawGrid<T>,
    mask: Option<&MaskedRaster<M>>,
    options: &ReconcileOptions<T>,
    config: &RasterConfig,
) -> Result<Reconciled<T>>
where
    T: RasterValue,
    M: RasterValue,
{
    let (mut header, geometry) = normalize_raw(&raw, config)?;
    let nodata = T::from_f64(header.nodata()?);
    let default_value = options.default_value.unwrap_or(nodata);
    let layer_count = raw.layers.len();

    let mode = ReconcileMode::from_flags(options.calc_positions, options.use_mask_extent, mask.is_some());
    if mask.is_some() && mode != ReconcileMode::CompactToMask {
        debug!(%mode, "Mask supplied but not imposed");
    }

    let reconciled = match (mode, mask) {
        (ReconcileMode::CompactToMask, Some(mask)) => {
            compact_to_mask(raw, &geometry, mask, nodata, default_value, config)?
        }
        (ReconcileMode::Uncompacted, _) => {
            let index = PositionIndex::full(geometry.rows, geometry.cols);
            let storage = LayeredStorage::from_layers(raw.layers)?;
            header.set(HEADER_CELLSNUM, index.len() as f64);
            Reconciled {
                header,
                geometry,
                index: Arc::new(index),
                shares_mask_index: false,
                storage,
                mode,
                nodata,
                default_value,
                filled_cells: 0,
            }
        }
        _ => {
            let index = scan_subject(&raw, &geometry, nodata, config.nodata_epsilon);
            if index.is_empty() {
                return Err(RasterError::allocation(
                    "subject grid has no cells different from NODATA",
                ));
            }
            let planes = raw
                .layers
                .iter()
                .map(|plane| gather(&index, &geometry, plane))
                .collect();
            let storage = LayeredStorage::from_layers(planes)?;
            header.set(HEADER_CELLSNUM, index.len() as f64);
            Reconciled {
                header,
                geometry,
                index: Arc::new(index),
                shares_mask_index: false,
                storage,
                mode: ReconcileMode::CompactSelf,
                nodata,
                default_value,
                filled_cells: 0,
            }
        }
    };

    info!(
        mode = %reconciled.mode,
        cells = reconciled.index.len(),
        layers = layer_count,
        filled = reconciled.filled_cells,
        shared_index = reconciled.shares_mask_index,
        "Reconciled raster"
    );
    Ok(reconciled)
}

/// A cell is valid when at least one layer differs from NODATA.
fn scan_subject<T: RasterValue>(
    raw: &RawGrid<T>,
    geometry: &GridGeometry,
    nodata: T,
    epsilon: f64,
) -> PositionIndex {
    PositionIndex::scan(geometry.rows, geometry.cols, |row, col| {
        let offset = geometry.flat_index(row, col);
        raw.layers
            .iter()
            .any(|plane| !plane[offset].matches(nodata, epsilon))
    })
}

/// Pick the indexed cells out of a full-grid plane of the same geometry.
fn gather<T: RasterValue>(index: &PositionIndex, geometry: &GridGeometry, plane: &[T]) -> Vec<T> {
    index
        .iter()
        .map(|cell| plane[geometry.flat_index(cell.row, cell.col)])
        .collect()
}

/// For each cell of `cells` (addressed in `target`), the flat offset of the
/// same world location in `source`, or `None` when it falls outside.
///
/// Lattices equal within `tolerance` are matched cell for cell.
fn locate_in(
    cells: &[RowCol],
    target: &GridGeometry,
    source: &GridGeometry,
    tolerance: f64,
) -> Vec<Option<usize>> {
    if target.same_as(source, tolerance) {
        return cells
            .iter()
            .map(|cell| Some(source.flat_index(cell.row, cell.col)))
            .collect();
    }
    cells
        .iter()
        .map(|cell| {
            let (x, y) = target.row_col_to_xy(cell.row, cell.col);
            source
                .cell_at(x, y)
                .map(|found| source.flat_index(found.row, found.col))
        })
        .collect()
}

fn sample<T: Copy>(offsets: &[Option<usize>], plane: &[T], default_value: T) -> Vec<T> {
    offsets
        .iter()
        .map(|offset| offset.map_or(default_value, |o| plane[o]))
        .collect()
}

fn compact_to_mask<T, M>(
    raw: RawGrid<T>,
    geometry: &GridGeometry,
    mask: &MaskedRaster<M>,
    nodata: T,
    default_value: T,
    config: &RasterConfig,
) -> Result<Reconciled<T>>
where
    T: RasterValue,
    M: RasterValue,
{
    let mask_geometry = *mask.geometry();
    let mask_index = mask.index_handle();
    let mask_nodata = mask.nodata();
    let mask_values = mask.storage().layer(1)?;

    let cells: Vec<RowCol> = mask_index
        .iter()
        .zip(mask_values)
        .filter(|(_, value)| !value.matches(mask_nodata, config.nodata_epsilon))
        .map(|(cell, _)| cell)
        .collect();

    if cells.is_empty() {
        warn!("No valid mask cells, aborting reconciliation");
        return Err(RasterError::EmptyMaskIntersection);
    }

    let offsets = locate_in(&cells, &mask_geometry, geometry, config.geometry_tolerance);
    let filled_cells = offsets.iter().filter(|o| o.is_none()).count();
    if filled_cells == offsets.len() {
        warn!(
            cells = cells.len(),
            "Subject grid does not overlap the mask, every cell takes the default value"
        );
    }

    let planes: Vec<Vec<T>> = raw
        .layers
        .iter()
        .map(|plane| sample(&offsets, plane, default_value))
        .collect();
    let layer_count = planes.len();
    let storage = LayeredStorage::from_layers(planes)?;

    // Identical footprint: point at the mask's index instead of copying it.
    let (index, shares_mask_index) = if cells.len() == mask_index.len() {
        (Arc::clone(mask_index), true)
    } else {
        let (rows, cols) = mask_index.dims();
        (Arc::new(PositionIndex::from_cells(rows, cols, cells)?), false)
    };

    let mut header = mask.header().clone();
    header.set(HEADER_NODATA, nodata.to_f64());
    header.set(HEADER_LAYERS, layer_count as f64);
    header.set(HEADER_CELLSNUM, index.len() as f64);

    Ok(Reconciled {
        header,
        geometry: mask_geometry,
        index,
        shares_mask_index,
        storage,
        mode: ReconcileMode::CompactToMask,
        nodata,
        default_value,
        filled_cells,
    })
}

/// Map a new layer's full-grid plane onto an existing footprint.
///
/// Returns the compacted plane and the number of cells that took
/// `default_value` because they fall outside the layer's grid.
pub(crate) fn map_layer<T: RasterValue>(
    index: &PositionIndex,
    geometry: &GridGeometry,
    layer_header: &HeaderTable,
    values: &[T],
    default_value: T,
    tolerance: f64,
) -> Result<(Vec<T>, usize)> {
    let layer_geometry = layer_header
        .geometry()
        .map_err(|e| RasterError::layer_mismatch(e.to_string()))?;
    if values.len() != layer_geometry.cell_count() {
        return Err(RasterError::ValueLengthMismatch {
            expected: layer_geometry.cell_count(),
            actual: values.len(),
        });
    }

    let offsets = locate_in(index.cells(), geometry, &layer_geometry, tolerance);
    let filled = offsets.iter().filter(|o| o.is_none()).count();
    if filled == offsets.len() {
        return Err(RasterError::layer_mismatch(format!(
            "layer extent {:?} does not overlap any of the {} valid cells",
            layer_geometry.extent(),
            index.len()
        )));
    }

    Ok((sample(&offsets, values, default_value), filled))
}
