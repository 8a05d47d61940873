//! Configuration for raster reconciliation and statistics.

use serde::{Deserialize, Serialize};

/// Default NODATA used when a source header does not carry one.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Tunables shared by every raster built with this configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Tolerance for comparing floating values against NODATA.
    pub nodata_epsilon: f64,

    /// Tolerance for comparing cell sizes and corner coordinates.
    pub geometry_tolerance: f64,

    /// NODATA assumed for sources whose header omits it.
    pub default_nodata: f64,

    /// Compute statistics of independent layers on the rayon pool.
    pub parallel_statistics: bool,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            nodata_epsilon: 1e-6,
            geometry_tolerance: 1e-6,
            default_nodata: DEFAULT_NODATA,
            parallel_statistics: true,
        }
    }
}

impl RasterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RASTER_NODATA_EPSILON") {
            if let Ok(eps) = val.parse() {
                config.nodata_epsilon = eps;
            }
        }

        if let Ok(val) = std::env::var("RASTER_GEOMETRY_TOLERANCE") {
            if let Ok(tol) = val.parse() {
                config.geometry_tolerance = tol;
            }
        }

        if let Ok(val) = std::env::var("RASTER_DEFAULT_NODATA") {
            if let Ok(nodata) = val.parse() {
                config.default_nodata = nodata;
            }
        }

        if let Ok(val) = std::env::var("RASTER_PARALLEL_STATS") {
            config.parallel_statistics = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.nodata_epsilon.is_finite() || self.nodata_epsilon <= 0.0 {
            return Err("nodata_epsilon must be a positive finite number".to_string());
        }

        if !self.geometry_tolerance.is_finite() || self.geometry_tolerance < 0.0 {
            return Err("geometry_tolerance must be >= 0".to_string());
        }

        if !self.default_nodata.is_finite() {
            return Err("default_nodata must be finite".to_string());
        }

        Ok(())
    }
}
