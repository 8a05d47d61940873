//! Common test fixtures for raster tests.
//!
//! This module provides pre-defined grids and masks that represent the
//! scenarios exercised across the test suite.

/// Common grid specifications for testing.
pub mod grid {
    /// Grid specification for testing.
    #[derive(Debug, Clone, Copy)]
    pub struct GridSpec {
        pub rows: usize,
        pub cols: usize,
        pub cell_size: f64,
        pub xll: f64,
        pub yll: f64,
        pub nodata: f64,
    }

    impl GridSpec {
        /// Returns the total number of grid cells.
        pub fn size(&self) -> usize {
            self.rows * self.cols
        }

        /// Returns the extent as (min_x, min_y, max_x, max_y).
        pub fn extent(&self) -> (f64, f64, f64, f64) {
            (
                self.xll,
                self.yll,
                self.xll + self.cols as f64 * self.cell_size,
                self.yll + self.rows as f64 * self.cell_size,
            )
        }

        /// Cell-centre coordinate of `(row, col)`.
        pub fn center(&self, row: usize, col: usize) -> (f64, f64) {
            (
                self.xll + (col as f64 + 0.5) * self.cell_size,
                self.yll + (self.rows as f64 - row as f64 - 0.5) * self.cell_size,
            )
        }
    }

    /// 3x3 unit grid anchored at the origin.
    pub const UNIT_3X3: GridSpec = GridSpec {
        rows: 3,
        cols: 3,
        cell_size: 1.0,
        xll: 0.0,
        yll: 0.0,
        nodata: -9999.0,
    };

    /// 2x2 unit grid whose lower-left corner sits at (1, 1), inside
    /// [`UNIT_3X3`].
    pub const INNER_2X2: GridSpec = GridSpec {
        rows: 2,
        cols: 2,
        cell_size: 1.0,
        xll: 1.0,
        yll: 1.0,
        nodata: -9999.0,
    };

    /// Projected 30 m grid, typical of a DEM tile.
    pub const DEM_30M: GridSpec = GridSpec {
        rows: 40,
        cols: 50,
        cell_size: 30.0,
        xll: 500_000.0,
        yll: 4_200_000.0,
        nodata: -9999.0,
    };

    /// Same extent as [`DEM_30M`] at 60 m.
    pub const DEM_60M: GridSpec = GridSpec {
        rows: 20,
        cols: 25,
        cell_size: 60.0,
        xll: 500_000.0,
        yll: 4_200_000.0,
        nodata: -9999.0,
    };

    /// Grid far away from every other fixture.
    pub const FAR_AWAY: GridSpec = GridSpec {
        rows: 3,
        cols: 3,
        cell_size: 1.0,
        xll: 1.0e6,
        yll: 1.0e6,
        nodata: -9999.0,
    };
}

/// Canonical 3x3 scenario: one NODATA hole in the centre.
pub mod scenario {
    /// Values of [`super::grid::UNIT_3X3`], row-major.
    pub const VALUES_3X3: [f64; 9] = [1.0, 2.0, 3.0, 4.0, -9999.0, 6.0, 7.0, 8.0, 9.0];

    /// Valid cells of [`VALUES_3X3`].
    pub const VALID_COUNT: usize = 8;

    pub const MEAN: f64 = 5.0;
    pub const MIN: f64 = 1.0;
    pub const MAX: f64 = 9.0;

    /// Population standard deviation of the valid values: sqrt(7.5).
    pub fn std_dev() -> f64 {
        7.5f64.sqrt()
    }

    /// All-valid mask over [`super::grid::INNER_2X2`].
    pub const MASK_2X2: [f64; 4] = [1.0, 1.0, 1.0, 1.0];

    /// [`VALUES_3X3`] sampled at the cells of [`MASK_2X2`].
    pub const MASKED_VALUES: [f64; 4] = [2.0, 3.0, -9999.0, 6.0];
}

/// Spatial reference strings.
pub mod srs {
    /// Geographic WGS 84
    pub const EPSG_4326: &str = "EPSG:4326";

    /// UTM zone 50N
    pub const EPSG_32650: &str = "EPSG:32650";
}
