//! Summary of a reconciled raster, printable as text or JSON.

use std::fmt;

use masked_raster::{HeaderTable, LayerStatistics, MaskedRaster, Result, Statistic};
use serde::Serialize;

/// Statistics of one layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub layer: usize,
    #[serde(flatten)]
    pub stats: LayerStatistics,
}

/// Everything the binary reports about a raster.
#[derive(Debug, Clone, Serialize)]
pub struct RasterReport {
    pub name: Option<String>,
    pub mode: String,
    pub srs: String,
    pub valid_cells: usize,
    pub shares_mask_index: bool,
    pub header: HeaderTable,
    pub layers: Vec<LayerReport>,
}

impl RasterReport {
    /// Compute every dirty layer and collect the results.
    pub fn collect(raster: &mut MaskedRaster<f64>) -> Result<Self> {
        raster.calculate_statistics();
        let layers = (1..=raster.layers())
            .map(|layer| {
                Ok(LayerReport {
                    layer,
                    stats: raster.layer_statistics(layer)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: raster.name().map(str::to_string),
            mode: raster.mode().to_string(),
            srs: raster.srs().to_string(),
            valid_cells: raster.cell_count(),
            shares_mask_index: raster.shares_mask_index(),
            header: raster.header().clone(),
            layers,
        })
    }
}

impl fmt::Display for RasterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name: {}", self.name.as_deref().unwrap_or("-"))?;
        writeln!(f, "mode: {} ({} valid cells)", self.mode, self.valid_cells)?;
        if self.shares_mask_index {
            writeln!(f, "index: shared with mask")?;
        }
        if !self.srs.is_empty() {
            writeln!(f, "srs: {}", self.srs)?;
        }
        writeln!(f, "header:")?;
        for (key, value) in self.header.iter() {
            writeln!(f, "  {:<14} {}", key, value)?;
        }
        for layer in &self.layers {
            write!(f, "layer {}:", layer.layer)?;
            for statistic in Statistic::ALL {
                write!(f, " {}={}", statistic, layer.stats.get(statistic))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
