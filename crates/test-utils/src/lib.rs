//! Shared test utilities for the masked-raster workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Raster plane generators
//! - Common grid and scenario fixtures
//! - Approximate comparison macros
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{assert_approx_eq, fixtures, create_test_grid};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Creates a scratch directory that is removed when dropped.
///
/// Panics if the directory cannot be created; only meant for tests.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create scratch directory")
}

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for approximate equality of coordinate pairs.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_coords_approx_eq;
///
/// assert_coords_approx_eq!((1.0001, 2.0001), (1.0, 2.0), 0.001);
/// ```
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($x1:expr, $y1:expr), ($x2:expr, $y2:expr), $epsilon:expr) => {{
        $crate::assert_approx_eq!($x1, $x2, $epsilon);
        $crate::assert_approx_eq!($y1, $y2, $epsilon);
    }};
    ($left:expr, ($x2:expr, $y2:expr), $epsilon:expr) => {{
        let (x1, y1) = $left;
        $crate::assert_approx_eq!(x1, $x2, $epsilon);
        $crate::assert_approx_eq!(y1, $y2, $epsilon);
    }};
}

/// Macro asserting that two value planes agree element-wise within
/// `epsilon`.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_planes_approx_eq;
///
/// assert_planes_approx_eq!(&[1.0, 2.0], &[1.0, 2.0000001], 1e-6);
/// ```
#[macro_export]
macro_rules! assert_planes_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        assert_eq!(left.len(), right.len(), "plane lengths differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let diff = ((*l as f64) - (*r as f64)).abs();
            if diff > $epsilon as f64 {
                panic!(
                    "assertion failed: planes differ at {}\n  left: `{:?}`,\n right: `{:?}`",
                    i, l, r
                );
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_assert_coords_approx_eq_passes() {
        assert_coords_approx_eq!((1.0001, 2.0001), (1.0, 2.0), 0.001);
    }

    #[test]
    fn test_scratch_dir_is_removed_on_drop() {
        let dir = super::scratch_dir();
        let path = dir.path().to_path_buf();
        assert!(path.exists());
        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn test_assert_planes_approx_eq_passes() {
        assert_planes_approx_eq!(vec![1.0f32, 2.0], vec![1.0f32, 2.0000001], 1e-6);
    }

    #[test]
    #[should_panic(expected = "planes differ at 1")]
    fn test_assert_planes_approx_eq_fails() {
        assert_planes_approx_eq!(vec![1.0, 2.0], vec![1.0, 3.0], 1e-6);
    }
}
