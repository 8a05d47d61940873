//! Masked multi-layer raster grids.
//!
//! A raster is a georeferenced rectangular lattice of cells carrying one or
//! more layers of numeric values. Only the cells that matter are stored:
//! either the cells of the raster's own grid that hold data, or the cells
//! that are valid in a mask raster. This crate provides:
//!
//! - **Header and coordinates**: a numeric key/value header and the
//!   cell-centre mapping between grid cells and world coordinates
//! - **Reconciliation**: three modes deciding which cells get storage
//! - **Compacted storage**: layer-major planes addressed through a
//!   valid-cell position index, shareable with a mask
//! - **Statistics**: per-layer metrics computed lazily with dirty tracking
//!
//! # Architecture
//!
//! ```text
//! GridCodec::load_grid(source)
//!      │
//!      ▼
//! RawGrid (header + full planes)
//!      │
//!      ├─► ReconcileMode::from_flags(calc_positions, use_mask_extent, mask)
//!      │         │
//!      │         ├─► Uncompacted:   every cell
//!      │         ├─► CompactSelf:   cells differing from NODATA
//!      │         └─► CompactToMask: valid mask cells, sampled via x/y
//!      │
//!      └─► MaskedRaster
//!               │
//!               ├─► PositionIndex (own, or Arc shared with the mask)
//!               ├─► LayeredStorage (one contiguous plane per layer)
//!               └─► StatisticsCache (lazy, per-layer dirty flags)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use masked_raster::{HeaderTable, MaskedRaster, RawGrid, ReconcileOptions};
//!
//! let header = HeaderTable::new(3, 3, 1.0, 0.0, 0.0, -9999.0);
//! let values = vec![1.0, 2.0, 3.0, 4.0, -9999.0, 6.0, 7.0, 8.0, 9.0];
//! let mut raster = MaskedRaster::from_grid(
//!     RawGrid::new(header, values, ""),
//!     ReconcileOptions::default(),
//! )?;
//!
//! assert_eq!(raster.cell_count(), 8);
//! assert_eq!(raster.average(1)?, 5.0);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod positions;
pub mod raster;
pub mod reconcile;
pub mod stats;
pub mod storage;
pub mod types;

// Re-export commonly used types at crate root
pub use codec::{GridCodec, JsonFileCodec, MemoryBlobStore, RawGrid};
pub use config::{RasterConfig, DEFAULT_NODATA};
pub use error::{RasterError, Result};
pub use header::{
    GridGeometry, HeaderTable, HEADER_CELLSIZE, HEADER_CELLSNUM, HEADER_LAYERS, HEADER_NCOLS,
    HEADER_NODATA, HEADER_NROWS, HEADER_XLL, HEADER_YLL, OUT_OF_EXTENT,
};
pub use positions::PositionIndex;
pub use raster::MaskedRaster;
pub use reconcile::ReconcileOptions;
pub use stats::{LayerStatistics, Statistic, StatisticsCache, StatsFilter};
pub use storage::LayeredStorage;
pub use types::{RasterValue, ReconcileMode, RowCol};
