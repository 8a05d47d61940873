//! The masked multi-layer raster.
//!
//! A [`MaskedRaster`] owns its header, its layered storage and its
//! statistics cache. Its valid-cell index is either its own or, when it was
//! reconciled against a mask with an identical footprint, a shared immutable
//! handle to the mask's index. The index is never mutated after
//! construction, so sharing it is safe and dropping a dependent raster never
//! frees the mask's index.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::codec::{GridCodec, RawGrid};
use crate::config::RasterConfig;
use crate::error::{RasterError, Result};
use crate::header::{GridGeometry, HeaderTable, HEADER_CELLSNUM, HEADER_LAYERS, HEADER_NODATA};
use crate::positions::PositionIndex;
use crate::reconcile::{self, ReconcileOptions, Reconciled};
use crate::stats::{LayerStatistics, Statistic, StatisticsCache, StatsFilter};
use crate::storage::LayeredStorage;
use crate::types::{RasterValue, ReconcileMode, RowCol};

/// In-memory raster with compacted storage.
#[derive(Debug, Clone)]
pub struct MaskedRaster<T: RasterValue> {
    name: Option<String>,
    header: HeaderTable,
    geometry: GridGeometry,
    srs: String,
    mode: ReconcileMode,
    index: Arc<PositionIndex>,
    shares_mask_index: bool,
    storage: LayeredStorage<T>,
    stats: StatisticsCache,
    nodata: T,
    default_value: T,
    /// Default-filled cells per layer.
    filled_cells: Vec<usize>,
    config: RasterConfig,
}

impl<T: RasterValue> MaskedRaster<T> {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Build from a raw grid without a mask.
    pub fn from_grid(raw: RawGrid<T>, options: ReconcileOptions<T>) -> Result<Self> {
        Self::build::<T>(raw, None, options, RasterConfig::default())
    }

    /// Build from a raw grid reconciled against `mask`.
    pub fn from_grid_with_mask<M: RasterValue>(
        raw: RawGrid<T>,
        mask: &MaskedRaster<M>,
        options: ReconcileOptions<T>,
    ) -> Result<Self> {
        Self::build(raw, Some(mask), options, RasterConfig::default())
    }

    /// Build with an explicit configuration.
    #[instrument(skip_all, fields(layers = raw.layers.len(), masked = mask.is_some()))]
    pub fn build<M: RasterValue>(
        raw: RawGrid<T>,
        mask: Option<&MaskedRaster<M>>,
        options: ReconcileOptions<T>,
        config: RasterConfig,
    ) -> Result<Self> {
        config.validate().map_err(RasterError::Config)?;
        let srs = raw.srs.clone();
        let reconciled = reconcile::reconcile(raw, mask, &options, &config)?;
        Ok(Self::assemble(reconciled, srs, config))
    }

    fn assemble(reconciled: Reconciled<T>, srs: String, config: RasterConfig) -> Self {
        let Reconciled {
            header,
            geometry,
            index,
            shares_mask_index,
            storage,
            mode,
            nodata,
            default_value,
            filled_cells,
        } = reconciled;

        Self {
            name: None,
            stats: StatisticsCache::new(storage.layers()),
            filled_cells: vec![filled_cells; storage.layers()],
            header,
            geometry,
            srs,
            mode,
            index,
            shares_mask_index,
            storage,
            nodata,
            default_value,
            config,
        }
    }

    /// Single-layer raster whose values are aligned with `mask`'s index.
    pub fn from_mask_values<M: RasterValue>(mask: &MaskedRaster<M>, values: Vec<T>) -> Result<Self> {
        Self::from_mask_layers(mask, vec![values])
    }

    /// Multi-layer raster whose planes are aligned with `mask`'s index.
    ///
    /// The header, spatial reference and index come from the mask; the index
    /// is shared, not copied.
    pub fn from_mask_layers<M: RasterValue>(mask: &MaskedRaster<M>, layers: Vec<Vec<T>>) -> Result<Self> {
        let expected = mask.cell_count();
        if let Some(plane) = layers.iter().find(|plane| plane.len() != expected) {
            return Err(RasterError::ValueLengthMismatch {
                expected,
                actual: plane.len(),
            });
        }
        let storage = LayeredStorage::from_layers(layers)?;
        let layer_count = storage.layers();

        let mut header = mask.header().clone();
        header.set(HEADER_LAYERS, storage.layers() as f64);
        header.set(HEADER_CELLSNUM, storage.cells() as f64);
        let nodata = T::from_f64(header.nodata()?);

        debug!(cells = expected, layers = storage.layers(), "Built raster from mask-aligned values");

        Ok(Self {
            name: None,
            header,
            geometry: *mask.geometry(),
            srs: mask.srs().to_string(),
            mode: mask.mode(),
            index: Arc::clone(mask.index_handle()),
            shares_mask_index: true,
            stats: StatisticsCache::new(storage.layers()),
            storage,
            nodata,
            default_value: nodata,
            filled_cells: vec![0; layer_count],
            config: mask.config().clone(),
        })
    }

    /// Load through a codec without a mask.
    pub fn load<C: GridCodec + ?Sized>(
        codec: &C,
        source: &str,
        options: ReconcileOptions<T>,
    ) -> Result<Self> {
        Self::load_with::<C, T>(codec, source, None, options, RasterConfig::default())
    }

    /// Load through a codec and reconcile against `mask`.
    pub fn load_with_mask<C: GridCodec + ?Sized, M: RasterValue>(
        codec: &C,
        source: &str,
        mask: &MaskedRaster<M>,
        options: ReconcileOptions<T>,
    ) -> Result<Self> {
        Self::load_with(codec, source, Some(mask), options, RasterConfig::default())
    }

    /// Load through a codec with every knob exposed.
    #[instrument(skip(codec, mask, options, config))]
    pub fn load_with<C: GridCodec + ?Sized, M: RasterValue>(
        codec: &C,
        source: &str,
        mask: Option<&MaskedRaster<M>>,
        options: ReconcileOptions<T>,
        config: RasterConfig,
    ) -> Result<Self> {
        let raw = codec.load_grid(source)?.convert::<T>();
        let mut raster = Self::build(raw, mask, options, config)?;
        raster.name = Path::new(source)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        Ok(raster)
    }

    /// Load one layer per source and reconcile them as a single stack.
    ///
    /// Every source must share the first one's lattice within the
    /// configured geometry tolerance; a source holding several layers
    /// contributes all of them. NODATA and the name come from the first
    /// source.
    #[instrument(skip(codec, mask, options, config))]
    pub fn load_layers<C: GridCodec + ?Sized, M: RasterValue>(
        codec: &C,
        sources: &[&str],
        mask: Option<&MaskedRaster<M>>,
        options: ReconcileOptions<T>,
        config: RasterConfig,
    ) -> Result<Self> {
        let Some((first, rest)) = sources.split_first() else {
            return Err(RasterError::allocation("no layer sources given"));
        };

        let mut stack = codec.load_grid(first)?;
        for source in rest {
            let raw = codec.load_grid(source)?;
            if !raw.header.same_geometry(&stack.header, config.geometry_tolerance) {
                return Err(RasterError::layer_mismatch(format!(
                    "{} does not share the lattice of {}",
                    source, first
                )));
            }
            stack.layers.extend(raw.layers);
        }
        debug!(sources = sources.len(), layers = stack.layers.len(), "Stacked layer sources");

        let mut raster = Self::build(stack.convert::<T>(), mask, options, config)?;
        raster.name = Path::new(first)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        Ok(raster)
    }

    /// Expand to full grids and hand them to a codec.
    #[instrument(skip(self, codec), fields(name = ?self.name))]
    pub fn store<C: GridCodec + ?Sized>(&self, codec: &mut C, destination: &str) -> Result<()> {
        codec.store_grid(destination, &self.to_raw_grid())
    }

    /// Replace this raster with a copy of `other`.
    pub fn copy_from(&mut self, other: &MaskedRaster<T>) {
        *self = other.clone();
    }

    // ------------------------------------------------------------------
    // Header and geometry
    // ------------------------------------------------------------------

    pub fn header(&self) -> &HeaderTable {
        &self.header
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    pub fn cell_size(&self) -> f64 {
        self.geometry.cell_size
    }

    pub fn xll(&self) -> f64 {
        self.geometry.xll
    }

    pub fn yll(&self) -> f64 {
        self.geometry.yll
    }

    pub fn nodata(&self) -> T {
        self.nodata
    }

    pub fn default_value(&self) -> T {
        self.default_value
    }

    pub fn layers(&self) -> usize {
        self.storage.layers()
    }

    /// Number of storage slots (valid cells).
    pub fn cell_count(&self) -> usize {
        self.storage.cells()
    }

    pub fn srs(&self) -> &str {
        &self.srs
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    pub fn index(&self) -> &PositionIndex {
        &self.index
    }

    pub fn index_handle(&self) -> &Arc<PositionIndex> {
        &self.index
    }

    /// Whether the index is borrowed from a mask rather than built here.
    pub fn shares_mask_index(&self) -> bool {
        self.shares_mask_index
    }

    /// Whether this raster and `other` point at the same index allocation.
    pub fn shares_index_with<M: RasterValue>(&self, other: &MaskedRaster<M>) -> bool {
        Arc::ptr_eq(&self.index, other.index_handle())
    }

    pub fn storage(&self) -> &LayeredStorage<T> {
        &self.storage
    }

    /// Replace header entries with those of `refers`.
    ///
    /// `LAYERS` and `CELLSNUM` keep describing the existing storage, and the
    /// lattice dimensions must not change because the index is tied to them.
    pub fn copy_header(&mut self, refers: &HeaderTable) -> Result<()> {
        let mut header = self.header.clone();
        header.copy_from(refers);
        header.set(HEADER_LAYERS, self.storage.layers() as f64);
        header.set(HEADER_CELLSNUM, self.storage.cells() as f64);
        header.validate()?;

        let geometry = header.geometry()?;
        if (geometry.rows, geometry.cols) != self.index.dims() {
            return Err(RasterError::invalid_header(format!(
                "header describes a {} x {} grid but the index covers {} x {}",
                geometry.rows,
                geometry.cols,
                self.index.dims().0,
                self.index.dims().1
            )));
        }

        self.nodata = T::from_f64(header.nodata()?);
        self.header = header;
        self.geometry = geometry;
        self.stats.invalidate_all();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Coordinates and positions
    // ------------------------------------------------------------------

    /// Cell-centre world coordinate of `(row, col)`.
    pub fn row_col_to_xy(&self, row: usize, col: usize) -> (f64, f64) {
        self.geometry.row_col_to_xy(row, col)
    }

    /// Grid cell containing `(x, y)`, resolved against `header` when given
    /// and against this raster otherwise. Out-of-extent results are the
    /// [`OUT_OF_EXTENT`](crate::header::OUT_OF_EXTENT) sentinel.
    pub fn xy_to_row_col(&self, x: f64, y: f64, header: Option<&HeaderTable>) -> Result<(isize, isize)> {
        match header {
            Some(foreign) => foreign.xy_to_row_col(x, y),
            None => Ok(self.geometry.xy_to_row_col(x, y)),
        }
    }

    /// Grid cell containing `(x, y)`, or [`RasterError::OutOfExtent`].
    pub fn cell_at(&self, x: f64, y: f64) -> Result<RowCol> {
        self.geometry
            .cell_at(x, y)
            .ok_or(RasterError::OutOfExtent { x, y })
    }

    /// Compacted slot of `(row, col)`, if it is a valid cell.
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        self.index.position(row, col)
    }

    /// Compacted slot of the cell containing `(x, y)`.
    pub fn position_by_xy(&self, x: f64, y: f64) -> Option<usize> {
        let cell = self.geometry.cell_at(x, y)?;
        self.position(cell.row, cell.col)
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    fn check_layer(&self, layer: usize) -> Result<()> {
        if layer == 0 || layer > self.storage.layers() {
            return Err(RasterError::LayerOutOfRange {
                layer,
                layers: self.storage.layers(),
            });
        }
        Ok(())
    }

    /// Value at compacted slot `index` of `layer`.
    pub fn value(&self, index: usize, layer: usize) -> Result<T> {
        self.storage.get(index, layer)
    }

    /// Value at `(row, col)` of `layer`; NODATA outside the valid footprint.
    pub fn value_at(&self, row: usize, col: usize, layer: usize) -> Result<T> {
        self.check_layer(layer)?;
        match self.position(row, col) {
            Some(index) => self.storage.get(index, layer),
            None => Ok(self.nodata),
        }
    }

    /// One value per layer at compacted slot `index`.
    pub fn values_at(&self, index: usize) -> Result<Vec<T>> {
        self.storage.values_at(index)
    }

    /// One value per layer at `(row, col)`; NODATA outside the footprint.
    pub fn values_at_cell(&self, row: usize, col: usize) -> Vec<T> {
        match self.position(row, col) {
            Some(index) => self
                .storage
                .planes()
                .map(|plane| plane[index])
                .collect(),
            None => vec![self.nodata; self.storage.layers()],
        }
    }

    pub fn is_nodata(&self, row: usize, col: usize, layer: usize) -> Result<bool> {
        let value = self.value_at(row, col, layer)?;
        Ok(value.matches(self.nodata, self.config.nodata_epsilon))
    }

    /// Write `value` at `(row, col)` of `layer`.
    ///
    /// Cells outside the valid footprint are left alone and `false` is
    /// returned; the footprint is fixed at construction and a write never
    /// extends it. A successful write marks the layer's statistics dirty.
    pub fn set_value(&mut self, row: usize, col: usize, value: T, layer: usize) -> Result<bool> {
        self.check_layer(layer)?;
        let Some(index) = self.position(row, col) else {
            debug!(row, col, "Ignoring write outside the valid footprint");
            return Ok(false);
        };
        self.storage.set(index, layer, value)?;
        self.stats.invalidate(layer)?;
        Ok(true)
    }

    /// Append a layer given as a full grid with its own header.
    ///
    /// The plane is mapped onto the existing footprint through world
    /// coordinates; footprint cells outside the layer's grid take the
    /// default value and layer cells outside the footprint are dropped. On
    /// error the raster is unchanged.
    #[instrument(skip(self, layer_header, values), fields(layers = self.layers()))]
    pub fn add_layer(&mut self, layer_header: &HeaderTable, values: &[T]) -> Result<()> {
        let (plane, filled) = reconcile::map_layer(
            &self.index,
            &self.geometry,
            layer_header,
            values,
            self.default_value,
            self.config.geometry_tolerance,
        )?;
        self.storage.push_layer(plane)?;
        self.stats.push_layer();
        self.filled_cells.push(filled);
        self.header.set(HEADER_LAYERS, self.storage.layers() as f64);
        debug!(layers = self.storage.layers(), filled, "Appended layer");
        Ok(())
    }

    /// Rewrite every NODATA cell to `new_nodata` and adopt it as NODATA.
    ///
    /// Returns the number of values rewritten.
    pub fn replace_nodata(&mut self, new_nodata: T) -> usize {
        let old = self.nodata;
        let epsilon = self.config.nodata_epsilon;
        let mut replaced = 0;
        for layer in 1..=self.storage.layers() {
            if let Ok(plane) = self.storage.layer_mut(layer) {
                for value in plane.iter_mut().filter(|v| v.matches(old, epsilon)) {
                    *value = new_nodata;
                    replaced += 1;
                }
            }
        }
        self.nodata = new_nodata;
        self.header.set(HEADER_NODATA, new_nodata.to_f64());
        self.stats.invalidate_all();
        replaced
    }

    /// Map every value through an integer class table.
    ///
    /// Values are truncated to `i64` to look up their class; values with no
    /// entry become NODATA, and NODATA cells are left as they are.
    pub fn reclassify(&mut self, classes: &HashMap<i64, T>) {
        let nodata = self.nodata;
        let epsilon = self.config.nodata_epsilon;
        for layer in 1..=self.storage.layers() {
            if let Ok(plane) = self.storage.layer_mut(layer) {
                for value in plane.iter_mut() {
                    if value.matches(nodata, epsilon) {
                        continue;
                    }
                    let class = value.to_f64() as i64;
                    *value = classes.get(&class).copied().unwrap_or(nodata);
                }
            }
        }
        self.stats.invalidate_all();
    }

    /// Expand one layer to the rectangular grid, NODATA outside the footprint.
    pub fn to_full_grid(&self, layer: usize) -> Result<Vec<T>> {
        let plane = self.storage.layer(layer)?;
        let mut grid = vec![self.nodata; self.geometry.cell_count()];
        for (cell, value) in self.index.iter().zip(plane) {
            grid[self.geometry.flat_index(cell.row, cell.col)] = *value;
        }
        Ok(grid)
    }

    /// Full-grid representation handed to codecs.
    pub fn to_raw_grid(&self) -> RawGrid<f64> {
        let mut header = self.header.clone();
        header.set(HEADER_CELLSNUM, self.geometry.cell_count() as f64);
        let layers = (1..=self.storage.layers())
            .filter_map(|layer| self.to_full_grid(layer).ok())
            .map(|plane| plane.into_iter().map(RasterValue::to_f64).collect())
            .collect();
        RawGrid::with_layers(header, layers, self.srs.clone())
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Filter for `layer`; the fill value is skipped only in layers that
    /// actually received it.
    fn stats_filter(&self, layer: usize) -> StatsFilter<T> {
        let filled = layer
            .checked_sub(1)
            .and_then(|slot| self.filled_cells.get(slot))
            .copied()
            .unwrap_or(0);
        let fill_is_distinct = filled > 0
            && !self
                .default_value
                .matches(self.nodata, self.config.nodata_epsilon);
        StatsFilter {
            nodata: self.nodata,
            fill: fill_is_distinct.then_some(self.default_value),
            epsilon: self.config.nodata_epsilon,
        }
    }

    fn stats_filters(&self) -> Vec<StatsFilter<T>> {
        (1..=self.storage.layers())
            .map(|layer| self.stats_filter(layer))
            .collect()
    }

    /// Compute statistics of every dirty layer.
    pub fn calculate_statistics(&mut self) {
        let filters = self.stats_filters();
        self.stats
            .refresh(&self.storage, &filters, false, self.config.parallel_statistics);
    }

    /// Recompute statistics of every layer regardless of the dirty flags.
    pub fn update_statistics(&mut self) {
        let filters = self.stats_filters();
        self.stats
            .refresh(&self.storage, &filters, true, self.config.parallel_statistics);
    }

    /// Number of default-filled cells in `layer`.
    pub fn filled_cells(&self, layer: usize) -> Result<usize> {
        self.check_layer(layer)?;
        Ok(self.filled_cells.get(layer - 1).copied().unwrap_or(0))
    }

    /// Whether `layer` will be recomputed on the next statistics read.
    pub fn statistics_dirty(&self, layer: usize) -> Result<bool> {
        self.stats.is_dirty(layer)
    }

    /// Whether statistics have been computed for any layer.
    pub fn statistics_calculated(&self) -> bool {
        self.stats.is_calculated()
    }

    /// Metric by case-insensitive name.
    pub fn statistic(&mut self, name: &str, layer: usize) -> Result<f64> {
        let statistic: Statistic = name.parse()?;
        self.statistic_of(statistic, layer)
    }

    pub fn statistic_of(&mut self, statistic: Statistic, layer: usize) -> Result<f64> {
        let filter = self.stats_filter(layer);
        self.stats.get(statistic, layer, &self.storage, &filter)
    }

    /// One value of the metric per layer, in layer order.
    pub fn statistic_all_layers(&mut self, name: &str) -> Result<Vec<f64>> {
        let statistic: Statistic = name.parse()?;
        self.calculate_statistics();
        (1..=self.storage.layers())
            .map(|layer| self.statistic_of(statistic, layer))
            .collect()
    }

    /// All metrics of `layer`.
    pub fn layer_statistics(&mut self, layer: usize) -> Result<LayerStatistics> {
        let filter = self.stats_filter(layer);
        self.stats.layer(layer, &self.storage, &filter)
    }

    pub fn average(&mut self, layer: usize) -> Result<f64> {
        self.statistic_of(Statistic::Mean, layer)
    }

    pub fn maximum(&mut self, layer: usize) -> Result<f64> {
        self.statistic_of(Statistic::Max, layer)
    }

    pub fn minimum(&mut self, layer: usize) -> Result<f64> {
        self.statistic_of(Statistic::Min, layer)
    }

    pub fn std_dev(&mut self, layer: usize) -> Result<f64> {
        self.statistic_of(Statistic::Std, layer)
    }

    pub fn range(&mut self, layer: usize) -> Result<f64> {
        self.statistic_of(Statistic::Range, layer)
    }

    /// Number of values counted by the statistics of `layer`.
    pub fn valid_number(&mut self, layer: usize) -> Result<usize> {
        Ok(self.statistic_of(Statistic::ValidCount, layer)? as usize)
    }
}
