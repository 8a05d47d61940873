//! Test data generators for synthetic raster planes.
//!
//! Every generator returns a row-major `Vec<f64>` (row 0 first, then row 1,
//! etc.) so planes can be handed straight to a grid document.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Creates an elevation-like surface rising from the lower-left corner.
///
/// Values range from `base` to roughly `base + 100`.
pub fn create_elevation_grid(width: usize, height: usize, base: f64) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f64 / width.max(1) as f64;
            // Row 0 is the northern edge, so invert it.
            let y_factor = (height - 1 - row) as f64 / height.max(1) as f64;
            data.push(base + x_factor * 50.0 + y_factor * 50.0);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f64) -> Vec<f64> {
    vec![value; width * height]
}

/// Creates a test grid with NODATA at specified positions.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
/// * `nodata` - The NODATA sentinel
/// * `holes` - List of (col, row) positions that should be NODATA
///
/// Other cells follow [`create_test_grid`].
pub fn create_grid_with_holes(
    width: usize,
    height: usize,
    nodata: f64,
    holes: &[(usize, usize)],
) -> Vec<f64> {
    let mut data = create_test_grid(width, height);
    for &(col, row) in holes {
        if col < width && row < height {
            data[row * width + col] = nodata;
        }
    }
    data
}

/// Creates a 0/1 style mask: `value` inside the rectangle
/// `[col0, col1) x [row0, row1)`, NODATA elsewhere.
pub fn create_rect_mask(
    width: usize,
    height: usize,
    (col0, row0): (usize, usize),
    (col1, row1): (usize, usize),
    value: f64,
    nodata: f64,
) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let inside = (col0..col1).contains(&col) && (row0..row1).contains(&row);
            data.push(if inside { value } else { nodata });
        }
    }
    data
}

/// Creates a checkerboard of `value` and NODATA starting with `value`
/// at (0, 0).
pub fn create_checkerboard_grid(width: usize, height: usize, value: f64, nodata: f64) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(if (row + col) % 2 == 0 { value } else { nodata });
        }
    }
    data
}

/// Counts values that do not equal `nodata`.
pub fn count_valid(values: &[f64], nodata: f64) -> usize {
    values.iter().filter(|v| **v != nodata).count()
}
