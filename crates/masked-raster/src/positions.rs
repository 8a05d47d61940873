//! Valid-cell position index.
//!
//! Maps a compacted storage slot to its `(row, col)` and back. Slots are
//! always in row-major order (increasing row, then increasing column), so
//! two indexes built from the same footprint compare equal element-wise.

use std::sync::OnceLock;

use crate::error::{RasterError, Result};
use crate::types::RowCol;

const ABSENT: usize = usize::MAX;

/// Ordered list of valid cells plus a lazily built inverse lookup.
#[derive(Debug, Clone)]
pub struct PositionIndex {
    rows: usize,
    cols: usize,
    cells: Vec<RowCol>,
    /// Dense `rows * cols` table of slot numbers, built on first lookup.
    inverse: OnceLock<Vec<usize>>,
}

impl PositionIndex {
    /// Index covering every cell of a `rows x cols` grid.
    pub fn full(rows: usize, cols: usize) -> Self {
        let cells = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| RowCol::new(row, col)))
            .collect();
        Self::from_ordered(rows, cols, cells)
    }

    /// Row-major scan keeping the cells for which `is_valid` returns true.
    pub fn scan<F>(rows: usize, cols: usize, mut is_valid: F) -> Self
    where
        F: FnMut(usize, usize) -> bool,
    {
        let mut cells = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                if is_valid(row, col) {
                    cells.push(RowCol::new(row, col));
                }
            }
        }
        Self::from_ordered(rows, cols, cells)
    }

    /// Build from an explicit cell list, which must be strictly row-major
    /// and inside the grid.
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<RowCol>) -> Result<Self> {
        if let Some(bad) = cells.iter().find(|c| c.row >= rows || c.col >= cols) {
            return Err(RasterError::invalid_header(format!(
                "cell ({}, {}) lies outside a {} x {} grid",
                bad.row, bad.col, rows, cols
            )));
        }
        if cells.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(RasterError::invalid_header(
                "position cells must be unique and in row-major order",
            ));
        }
        Ok(Self::from_ordered(rows, cols, cells))
    }

    fn from_ordered(rows: usize, cols: usize, cells: Vec<RowCol>) -> Self {
        debug_assert!(cells.windows(2).all(|pair| pair[0] < pair[1]));
        Self {
            rows,
            cols,
            cells,
            inverse: OnceLock::new(),
        }
    }

    /// Number of storage slots.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Grid dimensions `(rows, cols)` this index was built for.
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Whether every grid cell has a slot.
    pub fn covers_full_grid(&self) -> bool {
        self.cells.len() == self.rows * self.cols
    }

    pub fn cells(&self) -> &[RowCol] {
        &self.cells
    }

    /// Cell stored at compacted slot `index`.
    pub fn get(&self, index: usize) -> Option<RowCol> {
        self.cells.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowCol> + '_ {
        self.cells.iter().copied()
    }

    /// Compacted slot holding `(row, col)`, if that cell is valid.
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let slot = self.inverse()[row * self.cols + col];
        (slot != ABSENT).then_some(slot)
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.position(row, col).is_some()
    }

    fn inverse(&self) -> &[usize] {
        self.inverse.get_or_init(|| {
            let mut table = vec![ABSENT; self.rows * self.cols];
            for (slot, cell) in self.cells.iter().enumerate() {
                table[cell.row * self.cols + cell.col] = slot;
            }
            table
        })
    }
}

impl PartialEq for PositionIndex {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.cells == other.cells
    }
}
