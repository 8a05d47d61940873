//! Core types shared by the raster components.

use std::fmt::Debug;

use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

/// Scalar type that can be stored in a raster layer.
///
/// Conversions go through `f64` with Rust `as` semantics: floating values
/// truncate toward zero and saturate at the bounds of integral targets, and
/// NaN becomes zero. Callers mixing floating and integral grids accept that
/// precision loss.
pub trait RasterValue: Copy + PartialOrd + Debug + Send + Sync + 'static {
    /// Whether NODATA comparison is exact for this type.
    const INTEGRAL: bool;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;

    /// Narrow from `f64`.
    fn from_f64(value: f64) -> Self;

    /// Compare against a sentinel, using `epsilon` for floating types.
    fn matches(self, other: Self, epsilon: f64) -> bool {
        if Self::INTEGRAL {
            return self == other;
        }
        let (a, b) = (self.to_f64(), other.to_f64());
        if a.is_nan() || b.is_nan() {
            return a.is_nan() && b.is_nan();
        }
        (a - b).abs() < epsilon
    }
}

macro_rules! impl_raster_value {
    ($($t:ty => $integral:expr),* $(,)?) => {
        $(
            impl RasterValue for $t {
                const INTEGRAL: bool = $integral;

                #[inline]
                fn to_f64(self) -> f64 {
                    self.as_()
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value.as_()
                }
            }
        )*
    };
}

impl_raster_value! {
    u8 => true,
    i8 => true,
    u16 => true,
    i16 => true,
    u32 => true,
    i32 => true,
    u64 => true,
    i64 => true,
    f32 => false,
    f64 => false,
}

/// A grid cell address. Row 0 is the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowCol {
    pub row: usize,
    pub col: usize,
}

impl RowCol {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl From<(usize, usize)> for RowCol {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// How a raster lays out its storage relative to the source grid and mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReconcileMode {
    /// Every cell of the rectangular grid is a storage slot.
    Uncompacted,
    /// Only cells that are not NODATA in the subject grid are stored.
    #[default]
    CompactSelf,
    /// The mask's geometry and valid footprint are imposed on the subject.
    CompactToMask,
}

impl ReconcileMode {
    /// Select a mode from the `calc_positions` / `use_mask_extent` pair.
    ///
    /// `use_mask_extent` only takes effect when a mask is actually supplied.
    pub fn from_flags(calc_positions: bool, use_mask_extent: bool, has_mask: bool) -> Self {
        match (calc_positions, use_mask_extent && has_mask) {
            (false, _) => Self::Uncompacted,
            (true, false) => Self::CompactSelf,
            (true, true) => Self::CompactToMask,
        }
    }

    /// Whether storage only holds a subset of the rectangular grid.
    pub fn is_compacted(&self) -> bool {
        !matches!(self, Self::Uncompacted)
    }
}

impl std::fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uncompacted => write!(f, "uncompacted"),
            Self::CompactSelf => write!(f, "compact_self"),
            Self::CompactToMask => write!(f, "compact_to_mask"),
        }
    }
}
