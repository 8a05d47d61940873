//! Per-layer statistics with lazy recomputation.

use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RasterError, Result};
use crate::storage::LayeredStorage;
use crate::types::RasterValue;

pub const STATS_VALID_NUMBER: &str = "VALID_CELLNUMBER";
pub const STATS_MEAN: &str = "MEAN";
pub const STATS_MIN: &str = "MIN";
pub const STATS_MAX: &str = "MAX";
pub const STATS_STD: &str = "STD";
pub const STATS_RANGE: &str = "RANGE";

/// Metrics tracked for every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    ValidCount,
    Mean,
    Min,
    Max,
    Std,
    Range,
}

impl Statistic {
    pub const ALL: [Statistic; 6] = [
        Self::ValidCount,
        Self::Mean,
        Self::Min,
        Self::Max,
        Self::Std,
        Self::Range,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidCount => STATS_VALID_NUMBER,
            Self::Mean => STATS_MEAN,
            Self::Min => STATS_MIN,
            Self::Max => STATS_MAX,
            Self::Std => STATS_STD,
            Self::Range => STATS_RANGE,
        }
    }
}

impl FromStr for Statistic {
    type Err = RasterError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            STATS_VALID_NUMBER | "VALIDNUM" => Ok(Self::ValidCount),
            STATS_MEAN | "AVERAGE" => Ok(Self::Mean),
            STATS_MIN | "MINIMUM" => Ok(Self::Min),
            STATS_MAX | "MAXIMUM" => Ok(Self::Max),
            STATS_STD | "STDDEV" => Ok(Self::Std),
            STATS_RANGE => Ok(Self::Range),
            _ => Err(RasterError::UnknownMetric(s.to_string())),
        }
    }
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which values a statistics scan skips.
#[derive(Debug, Clone, Copy)]
pub struct StatsFilter<T> {
    pub nodata: T,
    /// Default-fill value, only set when it differs from NODATA and was used.
    pub fill: Option<T>,
    pub epsilon: f64,
}

impl<T: RasterValue> StatsFilter<T> {
    #[inline]
    fn excludes(&self, value: T) -> bool {
        value.matches(self.nodata, self.epsilon)
            || self.fill.is_some_and(|fill| value.matches(fill, self.epsilon))
    }
}

/// Aggregates of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerStatistics {
    pub valid_count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
    pub range: f64,
}

impl LayerStatistics {
    /// Single pass over `values`.
    ///
    /// With no countable values every derived metric is the NODATA value.
    pub fn compute<T: RasterValue>(values: &[T], filter: &StatsFilter<T>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for &value in values {
            if filter.excludes(value) {
                continue;
            }
            let v = value.to_f64();
            count += 1;
            sum += v;
            sum_sq += v * v;
            min = min.min(v);
            max = max.max(v);
        }

        if count == 0 {
            let nodata = filter.nodata.to_f64();
            return Self {
                valid_count: 0,
                mean: nodata,
                min: nodata,
                max: nodata,
                std: nodata,
                range: nodata,
            };
        }

        let n = count as f64;
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);

        Self {
            valid_count: count,
            mean,
            min,
            max,
            std: variance.sqrt(),
            range: max - min,
        }
    }

    pub fn get(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::ValidCount => self.valid_count as f64,
            Statistic::Mean => self.mean,
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Std => self.std,
            Statistic::Range => self.range,
        }
    }
}

/// Cached statistics, one slot per layer. An empty slot is dirty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsCache {
    slots: Vec<Option<LayerStatistics>>,
}

impl StatisticsCache {
    /// Empty cache for `layers` layers; every layer starts dirty.
    pub fn new(layers: usize) -> Self {
        Self {
            slots: vec![None; layers],
        }
    }

    pub fn layers(&self) -> usize {
        self.slots.len()
    }

    fn check_layer(&self, layer: usize) -> Result<usize> {
        if layer == 0 || layer > self.slots.len() {
            return Err(RasterError::LayerOutOfRange {
                layer,
                layers: self.slots.len(),
            });
        }
        Ok(layer - 1)
    }

    /// Whether `layer` needs recomputation before it can be read.
    pub fn is_dirty(&self, layer: usize) -> Result<bool> {
        let slot = self.check_layer(layer)?;
        Ok(self.slots[slot].is_none())
    }

    /// Whether any layer has been computed.
    pub fn is_calculated(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    pub fn invalidate(&mut self, layer: usize) -> Result<()> {
        let slot = self.check_layer(layer)?;
        self.slots[slot] = None;
        Ok(())
    }

    pub fn invalidate_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Track a newly appended layer.
    pub fn push_layer(&mut self) {
        self.slots.push(None);
    }

    /// Recompute the dirty layers, or every layer when `force` is set.
    ///
    /// `filters` holds one filter per layer; layers without one are left
    /// untouched. Layers touch disjoint slices, so with `parallel` they are
    /// scanned on the rayon pool and each slot is written once afterwards.
    pub fn refresh<T: RasterValue>(
        &mut self,
        storage: &LayeredStorage<T>,
        filters: &[StatsFilter<T>],
        force: bool,
        parallel: bool,
    ) {
        if self.slots.len() != storage.layers() {
            self.slots.resize(storage.layers(), None);
        }

        let targets: Vec<(usize, &[T], &StatsFilter<T>)> = storage
            .planes()
            .enumerate()
            .filter(|(slot, _)| force || self.slots[*slot].is_none())
            .filter_map(|(slot, plane)| filters.get(slot).map(|filter| (slot, plane, filter)))
            .collect();
        if targets.is_empty() {
            return;
        }

        debug!(layers = targets.len(), force, parallel, "Computing raster statistics");

        let computed: Vec<(usize, LayerStatistics)> = if parallel && targets.len() > 1 {
            targets
                .par_iter()
                .map(|(slot, plane, filter)| (*slot, LayerStatistics::compute(plane, filter)))
                .collect()
        } else {
            targets
                .iter()
                .map(|(slot, plane, filter)| (*slot, LayerStatistics::compute(plane, filter)))
                .collect()
        };

        for (slot, stats) in computed {
            self.slots[slot] = Some(stats);
        }
    }

    /// All metrics of `layer`, recomputing it first if it is dirty.
    pub fn layer<T: RasterValue>(
        &mut self,
        layer: usize,
        storage: &LayeredStorage<T>,
        filter: &StatsFilter<T>,
    ) -> Result<LayerStatistics> {
        let slot = self.check_layer(layer)?;
        if let Some(stats) = self.slots[slot] {
            return Ok(stats);
        }
        let stats = LayerStatistics::compute(storage.layer(layer)?, filter);
        self.slots[slot] = Some(stats);
        Ok(stats)
    }

    /// Read one metric, recomputing the layer first if it is dirty.
    pub fn get<T: RasterValue>(
        &mut self,
        statistic: Statistic,
        layer: usize,
        storage: &LayeredStorage<T>,
        filter: &StatsFilter<T>,
    ) -> Result<f64> {
        Ok(self.layer(layer, storage, filter)?.get(statistic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(nodata: f64) -> StatsFilter<f64> {
        StatsFilter {
            nodata,
            fill: None,
            epsilon: 1e-6,
        }
    }

    #[test]
    fn test_statistic_from_str_case_insensitive() {
        assert_eq!("mean".parse::<Statistic>().unwrap(), Statistic::Mean);
        assert_eq!("Valid_CellNumber".parse::<Statistic>().unwrap(), Statistic::ValidCount);
        assert_eq!("STD".parse::<Statistic>().unwrap(), Statistic::Std);
        assert!(matches!(
            "median".parse::<Statistic>(),
            Err(RasterError::UnknownMetric(name)) if name == "median"
        ));
    }

    #[test]
    fn test_compute_excludes_nodata() {
        let values = [1.0, 2.0, 3.0, 4.0, -9999.0, 6.0, 7.0, 8.0, 9.0];
        let stats = LayerStatistics::compute(&values, &filter(-9999.0));
        assert_eq!(stats.valid_count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.range, 8.0);
        assert!((stats.std - 7.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_compute_excludes_fill_when_set() {
        let values = [0.0, 10.0, 20.0, -9999.0];
        let f = StatsFilter {
            nodata: -9999.0,
            fill: Some(0.0),
            epsilon: 1e-6,
        };
        let stats = LayerStatistics::compute(&values, &f);
        assert_eq!(stats.valid_count, 2);
        assert_eq!(stats.mean, 15.0);
    }

    #[test]
    fn test_compute_empty_reports_nodata() {
        let values = [-9999.0, -9999.0];
        let stats = LayerStatistics::compute(&values, &filter(-9999.0));
        assert_eq!(stats.valid_count, 0);
        assert_eq!(stats.mean, -9999.0);
        assert_eq!(stats.std, -9999.0);
        assert_eq!(stats.range, -9999.0);
    }

    #[test]
    fn test_constant_layer_has_zero_std() {
        let values = [0.1f32; 1000];
        let f = StatsFilter {
            nodata: -9999.0f32,
            fill: None,
            epsilon: 1e-6,
        };
        let stats = LayerStatistics::compute(&values, &f);
        assert!(stats.std >= 0.0);
        assert!(stats.std < 1e-6);
    }

    #[test]
    fn test_cache_lazy_and_dirty() {
        let storage = LayeredStorage::from_layers(vec![vec![1.0, 3.0], vec![10.0, 30.0]]).unwrap();
        let mut cache = StatisticsCache::new(2);
        let f = filter(-9999.0);

        assert!(cache.is_dirty(1).unwrap());
        assert_eq!(cache.get(Statistic::Mean, 2, &storage, &f).unwrap(), 20.0);
        assert!(cache.is_dirty(1).unwrap());
        assert!(!cache.is_dirty(2).unwrap());

        cache.invalidate(2).unwrap();
        assert!(cache.is_dirty(2).unwrap());
    }

    #[test]
    fn test_cache_layer_out_of_range() {
        let storage = LayeredStorage::from_layers(vec![vec![1.0]]).unwrap();
        let mut cache = StatisticsCache::new(1);
        assert!(matches!(
            cache.get(Statistic::Max, 2, &storage, &filter(-9999.0)),
            Err(RasterError::LayerOutOfRange { layer: 2, layers: 1 })
        ));
        assert!(cache.is_dirty(0).is_err());
    }

    #[test]
    fn test_refresh_parallel_matches_serial() {
        let planes: Vec<Vec<f64>> = (0..8)
            .map(|l| (0..500).map(|i| (i * (l + 1)) as f64).collect())
            .collect();
        let storage = LayeredStorage::from_layers(planes).unwrap();
        let f = filter(-9999.0);

        let mut serial = StatisticsCache::new(8);
        serial.refresh(&storage, &[f; 8], false, false);
        let mut parallel = StatisticsCache::new(8);
        parallel.refresh(&storage, &[f; 8], false, true);

        assert_eq!(serial, parallel);
        assert!((1..=8).all(|l| !parallel.is_dirty(l).unwrap()));
    }

    #[test]
    fn test_refresh_applies_filter_per_layer() {
        let storage = LayeredStorage::from_layers(vec![vec![0.0, 10.0], vec![0.0, 10.0]]).unwrap();
        let filled = StatsFilter {
            nodata: -9999.0,
            fill: Some(0.0),
            epsilon: 1e-6,
        };
        let mut cache = StatisticsCache::new(2);
        cache.refresh(&storage, &[filter(-9999.0), filled], true, false);

        assert_eq!(cache.get(Statistic::ValidCount, 1, &storage, &filled).unwrap(), 2.0);
        assert_eq!(cache.get(Statistic::ValidCount, 2, &storage, &filled).unwrap(), 1.0);
    }
}
