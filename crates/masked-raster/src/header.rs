//! Raster header table and the coordinate mapper derived from it.
//!
//! The header is a small key/value map (values stored as `f64` so corner
//! coordinates are never truncated). Geometry-dependent code works on a
//! [`GridGeometry`] snapshot extracted once, which keeps the coordinate
//! conversions free of map lookups.
//!
//! Grids use a lower-left origin with row-major, top-to-bottom storage:
//! row 0 is the northernmost row and y grows upward.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};
use crate::types::RowCol;

pub const HEADER_NROWS: &str = "NROWS";
pub const HEADER_NCOLS: &str = "NCOLS";
pub const HEADER_CELLSIZE: &str = "CELLSIZE";
pub const HEADER_XLL: &str = "XLLCORNER";
pub const HEADER_YLL: &str = "YLLCORNER";
pub const HEADER_NODATA: &str = "NODATA_VALUE";
pub const HEADER_LAYERS: &str = "LAYERS";
pub const HEADER_CELLSNUM: &str = "CELLSNUM";

/// Returned by coordinate lookups that land outside the grid.
pub const OUT_OF_EXTENT: (isize, isize) = (-1, -1);

/// Geometry and metadata of a raster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderTable {
    entries: BTreeMap<String, f64>,
}

impl HeaderTable {
    /// Create a single-layer header.
    pub fn new(rows: usize, cols: usize, cell_size: f64, xll: f64, yll: f64, nodata: f64) -> Self {
        let mut header = Self::default();
        header.set(HEADER_NROWS, rows as f64);
        header.set(HEADER_NCOLS, cols as f64);
        header.set(HEADER_CELLSIZE, cell_size);
        header.set(HEADER_XLL, xll);
        header.set(HEADER_YLL, yll);
        header.set(HEADER_NODATA, nodata);
        header.set(HEADER_LAYERS, 1.0);
        header.set(HEADER_CELLSNUM, rows.saturating_mul(cols) as f64);
        header
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Result<f64> {
        self.entries
            .get(key)
            .copied()
            .ok_or_else(|| RasterError::missing_key(key))
    }

    /// Insert or replace a key.
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Copy every entry of `other` into this header, overwriting duplicates.
    pub fn copy_from(&mut self, other: &HeaderTable) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    /// A count-valued key: a non-negative whole number that fits `usize`.
    fn count(&self, key: &str) -> Result<usize> {
        let value = self.get(key)?;
        if !(value >= 0.0) || value.fract() != 0.0 || value >= usize::MAX as f64 {
            return Err(RasterError::invalid_header(format!(
                "{} must be a non-negative whole number, got {}",
                key, value
            )));
        }
        Ok(value as usize)
    }

    pub fn rows(&self) -> Result<usize> {
        self.count(HEADER_NROWS)
    }

    pub fn cols(&self) -> Result<usize> {
        self.count(HEADER_NCOLS)
    }

    pub fn cell_size(&self) -> Result<f64> {
        self.get(HEADER_CELLSIZE)
    }

    pub fn xll(&self) -> Result<f64> {
        self.get(HEADER_XLL)
    }

    pub fn yll(&self) -> Result<f64> {
        self.get(HEADER_YLL)
    }

    pub fn nodata(&self) -> Result<f64> {
        self.get(HEADER_NODATA)
    }

    pub fn layers(&self) -> Result<usize> {
        self.count(HEADER_LAYERS)
    }

    pub fn cell_count(&self) -> Result<usize> {
        self.count(HEADER_CELLSNUM)
    }

    /// Extract the grid geometry, checking that it is usable.
    pub fn geometry(&self) -> Result<GridGeometry> {
        let rows = self.rows()?;
        let cols = self.cols()?;
        let cell_size = self.get(HEADER_CELLSIZE)?;
        let xll = self.get(HEADER_XLL)?;
        let yll = self.get(HEADER_YLL)?;

        if rows == 0 || cols == 0 {
            return Err(RasterError::invalid_header(format!(
                "grid must have at least one row and column, got {} x {}",
                rows, cols
            )));
        }
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(RasterError::invalid_header(format!(
                "cell size must be positive and finite, got {}",
                cell_size
            )));
        }
        if !xll.is_finite() || !yll.is_finite() {
            return Err(RasterError::invalid_header(format!(
                "lower-left corner must be finite, got ({}, {})",
                xll, yll
            )));
        }

        if rows.checked_mul(cols).is_none() {
            return Err(RasterError::invalid_header(format!(
                "{} x {} cells overflow the cell count",
                rows, cols
            )));
        }

        Ok(GridGeometry {
            rows,
            cols,
            cell_size,
            xll,
            yll,
        })
    }

    /// Check that every mandatory key is present and positive.
    pub fn validate(&self) -> Result<()> {
        self.geometry()?;
        self.nodata()?;
        let layers = self.get(HEADER_LAYERS)?;
        if !(layers >= 1.0) {
            return Err(RasterError::invalid_header(format!(
                "layer count must be at least 1, got {}",
                layers
            )));
        }
        Ok(())
    }

    /// Cell-centre world coordinate of `(row, col)`.
    pub fn row_col_to_xy(&self, row: usize, col: usize) -> Result<(f64, f64)> {
        Ok(self.geometry()?.row_col_to_xy(row, col))
    }

    /// Grid cell containing `(x, y)`, or [`OUT_OF_EXTENT`].
    pub fn xy_to_row_col(&self, x: f64, y: f64) -> Result<(isize, isize)> {
        Ok(self.geometry()?.xy_to_row_col(x, y))
    }

    /// Whether both headers describe the same lattice within `tolerance`.
    ///
    /// Headers with unusable geometry are never compatible.
    pub fn same_geometry(&self, other: &HeaderTable, tolerance: f64) -> bool {
        match (self.geometry(), other.geometry()) {
            (Ok(a), Ok(b)) => a.same_as(&b, tolerance),
            _ => false,
        }
    }
}

/// Rectangular lattice derived from a header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    pub xll: f64,
    pub yll: f64,
}

impl GridGeometry {
    /// Number of cells in the rectangular grid.
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether a signed row/col lies inside `[0, rows) x [0, cols)`.
    #[inline]
    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows && (col as usize) < self.cols
    }

    /// Row-major offset of a cell in a full-grid plane.
    #[inline]
    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Cell-centre world coordinate of `(row, col)`.
    #[inline]
    pub fn row_col_to_xy(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.xll + (col as f64 + 0.5) * self.cell_size;
        let y = self.yll + (self.rows as f64 - row as f64 - 0.5) * self.cell_size;
        (x, y)
    }

    /// Grid cell containing `(x, y)`, floored; [`OUT_OF_EXTENT`] when outside.
    #[inline]
    pub fn xy_to_row_col(&self, x: f64, y: f64) -> (isize, isize) {
        let col = ((x - self.xll) / self.cell_size).floor();
        let row = ((self.yll + self.rows as f64 * self.cell_size - y) / self.cell_size).floor();

        if !row.is_finite() || !col.is_finite() {
            return OUT_OF_EXTENT;
        }
        let (row, col) = (row as isize, col as isize);
        if self.contains(row, col) {
            (row, col)
        } else {
            OUT_OF_EXTENT
        }
    }

    /// Option-returning variant of [`xy_to_row_col`](Self::xy_to_row_col).
    pub fn cell_at(&self, x: f64, y: f64) -> Option<RowCol> {
        let (row, col) = self.xy_to_row_col(x, y);
        if row < 0 {
            None
        } else {
            Some(RowCol::new(row as usize, col as usize))
        }
    }

    /// World extent as `(min_x, min_y, max_x, max_y)`.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        (
            self.xll,
            self.yll,
            self.xll + self.cols as f64 * self.cell_size,
            self.yll + self.rows as f64 * self.cell_size,
        )
    }

    /// Geometry compatibility within `tolerance`.
    pub fn same_as(&self, other: &GridGeometry, tolerance: f64) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && (self.cell_size - other.cell_size).abs() <= tolerance
            && (self.xll - other.xll).abs() <= tolerance
            && (self.yll - other.yll).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_3x3() -> HeaderTable {
        HeaderTable::new(3, 3, 1.0, 0.0, 0.0, -9999.0)
    }

    #[test]
    fn test_get_missing_key() {
        let header = HeaderTable::default();
        match header.get(HEADER_NROWS) {
            Err(RasterError::MissingHeaderKey(key)) => assert_eq!(key, HEADER_NROWS),
            other => panic!("expected MissingHeaderKey, got {:?}", other),
        }
    }

    #[test]
    fn test_new_header_is_valid() {
        let header = header_3x3();
        assert!(header.validate().is_ok());
        assert_eq!(header.rows().unwrap(), 3);
        assert_eq!(header.layers().unwrap(), 1);
        assert_eq!(header.cell_count().unwrap(), 9);
    }

    #[test]
    fn test_validate_rejects_degenerate_cell_size() {
        let mut header = header_3x3();
        header.set(HEADER_CELLSIZE, 0.0);
        assert!(matches!(header.validate(), Err(RasterError::InvalidHeader(_))));

        header.set(HEADER_CELLSIZE, f64::NAN);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_geometry_rejects_overflowing_dimensions() {
        let mut header = header_3x3();
        header.set(HEADER_NROWS, 1e10);
        header.set(HEADER_NCOLS, 1e10);
        assert!(matches!(header.geometry(), Err(RasterError::InvalidHeader(_))));

        header.set(HEADER_NROWS, f64::INFINITY);
        header.set(HEADER_NCOLS, 1.0);
        assert!(matches!(header.geometry(), Err(RasterError::InvalidHeader(_))));
    }

    #[test]
    fn test_geometry_rejects_fractional_dimensions() {
        let mut header = header_3x3();
        header.set(HEADER_NROWS, 2.5);
        assert!(matches!(header.geometry(), Err(RasterError::InvalidHeader(_))));
        assert!(header.rows().is_err());

        header.set(HEADER_NROWS, -3.0);
        assert!(header.validate().is_err());

        header.set(HEADER_NROWS, 0.0);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_layers() {
        let mut header = header_3x3();
        header.set(HEADER_LAYERS, 0.0);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_row_col_to_xy_uses_cell_centres() {
        let geometry = header_3x3().geometry().unwrap();
        assert_eq!(geometry.row_col_to_xy(0, 0), (0.5, 2.5));
        assert_eq!(geometry.row_col_to_xy(2, 2), (2.5, 0.5));
    }

    #[test]
    fn test_round_trip_every_cell() {
        let header = HeaderTable::new(7, 5, 30.0, 500_000.0, 4_100_000.0, -9999.0);
        let geometry = header.geometry().unwrap();
        for row in 0..7 {
            for col in 0..5 {
                let (x, y) = geometry.row_col_to_xy(row, col);
                assert_eq!(
                    geometry.xy_to_row_col(x, y),
                    (row as isize, col as isize)
                );
            }
        }
    }

    #[test]
    fn test_xy_outside_extent_returns_sentinel() {
        let geometry = header_3x3().geometry().unwrap();
        assert_eq!(geometry.xy_to_row_col(-0.5, 1.0), OUT_OF_EXTENT);
        assert_eq!(geometry.xy_to_row_col(1.0, 3.5), OUT_OF_EXTENT);
        assert_eq!(geometry.xy_to_row_col(3.0, 1.0), OUT_OF_EXTENT);
        assert_eq!(geometry.xy_to_row_col(f64::NAN, 1.0), OUT_OF_EXTENT);
        assert_eq!(geometry.cell_at(10.0, 10.0), None);
    }

    #[test]
    fn test_same_geometry_tolerance() {
        let a = header_3x3();
        let mut b = header_3x3();
        b.set(HEADER_XLL, 1e-9);
        assert!(a.same_geometry(&b, 1e-6));

        b.set(HEADER_XLL, 0.5);
        assert!(!a.same_geometry(&b, 1e-6));
    }

    #[test]
    fn test_copy_from_overwrites() {
        let mut a = header_3x3();
        let mut b = HeaderTable::default();
        b.set(HEADER_NODATA, -1.0);
        b.set("SRS_EPSG", 4326.0);
        a.copy_from(&b);
        assert_eq!(a.nodata().unwrap(), -1.0);
        assert_eq!(a.get("SRS_EPSG").unwrap(), 4326.0);
        assert_eq!(a.rows().unwrap(), 3);
    }

    #[test]
    fn test_header_serializes_as_map() {
        let json = serde_json::to_value(header_3x3()).unwrap();
        assert_eq!(json["NROWS"], serde_json::json!(3.0));
        let back: HeaderTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, header_3x3());
    }
}
