//! Boundary with the file / blob codec collaborators.
//!
//! The core never parses raster byte formats. A codec hands it a
//! [`RawGrid`] (header, one full rectangular plane per layer, opaque spatial
//! reference string) and takes one back when storing. Two stores are
//! provided: an in-memory blob store and a directory of JSON grid documents.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{RasterError, Result};
use crate::header::{GridGeometry, HeaderTable, HEADER_LAYERS};
use crate::types::RasterValue;

/// A rectangular grid as produced or consumed by a codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGrid<T> {
    pub header: HeaderTable,
    /// One row-major `rows * cols` plane per layer.
    pub layers: Vec<Vec<T>>,
    /// Spatial reference, passed through untouched.
    #[serde(default)]
    pub srs: String,
}

impl<T: RasterValue> RawGrid<T> {
    /// Single-layer grid.
    pub fn new(header: HeaderTable, values: Vec<T>, srs: impl Into<String>) -> Self {
        Self::with_layers(header, vec![values], srs)
    }

    /// Multi-layer grid. `LAYERS` is set from the number of planes.
    pub fn with_layers(mut header: HeaderTable, layers: Vec<Vec<T>>, srs: impl Into<String>) -> Self {
        header.set(HEADER_LAYERS, layers.len() as f64);
        Self {
            header,
            layers,
            srs: srs.into(),
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Check the planes against the header geometry.
    pub fn validate(&self) -> Result<GridGeometry> {
        let geometry = self.header.geometry()?;
        if self.layers.is_empty() {
            return Err(RasterError::allocation("grid has no layers"));
        }
        let expected = geometry.cell_count();
        if let Some(plane) = self.layers.iter().find(|p| p.len() != expected) {
            return Err(RasterError::ValueLengthMismatch {
                expected,
                actual: plane.len(),
            });
        }
        Ok(geometry)
    }

    /// Convert every value to another scalar type.
    pub fn convert<U: RasterValue>(self) -> RawGrid<U> {
        RawGrid {
            header: self.header,
            layers: self
                .layers
                .into_iter()
                .map(|plane| plane.into_iter().map(|v| U::from_f64(v.to_f64())).collect())
                .collect(),
            srs: self.srs,
        }
    }
}

/// Loads and stores raw grids. `source` / `destination` may be a path or a
/// remote blob identifier; the core does not care which.
pub trait GridCodec {
    fn load_grid(&self, source: &str) -> Result<RawGrid<f64>>;

    fn store_grid(&mut self, destination: &str, grid: &RawGrid<f64>) -> Result<()>;
}

/// Blob store keeping serialized grid documents in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Bytes>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw document bytes stored under `name`.
    pub fn blob(&self, name: &str) -> Option<&Bytes> {
        self.blobs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Bytes> {
        self.blobs.remove(name)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl GridCodec for MemoryBlobStore {
    #[instrument(skip(self))]
    fn load_grid(&self, source: &str) -> Result<RawGrid<f64>> {
        let blob = self
            .blobs
            .get(source)
            .ok_or_else(|| RasterError::codec(format!("blob not found: {}", source)))?;
        let grid: RawGrid<f64> = serde_json::from_slice(blob)?;
        debug!(size = blob.len(), layers = grid.layers.len(), "Loaded grid blob");
        Ok(grid)
    }

    #[instrument(skip(self, grid))]
    fn store_grid(&mut self, destination: &str, grid: &RawGrid<f64>) -> Result<()> {
        let data = Bytes::from(serde_json::to_vec(grid)?);
        debug!(size = data.len(), "Storing grid blob");
        // Replace wholesale, like a GridFS delete-then-put.
        self.blobs.insert(destination.to_string(), data);
        Ok(())
    }
}

/// Grid documents stored as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct JsonFileCodec {
    root: PathBuf,
}

impl JsonFileCodec {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl GridCodec for JsonFileCodec {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn load_grid(&self, source: &str) -> Result<RawGrid<f64>> {
        let path = self.resolve(source);
        let file = File::open(&path)
            .map_err(|e| RasterError::codec(format!("failed to open {}: {}", path.display(), e)))?;
        let grid: RawGrid<f64> = serde_json::from_reader(BufReader::new(file))?;
        debug!(layers = grid.layers.len(), "Loaded grid document");
        Ok(grid)
    }

    #[instrument(skip(self, grid), fields(root = %self.root.display()))]
    fn store_grid(&mut self, destination: &str, grid: &RawGrid<f64>) -> Result<()> {
        let path = self.resolve(destination);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        serde_json::to_writer(BufWriter::new(file), grid)?;
        debug!(path = %path.display(), "Stored grid document");
        Ok(())
    }
}
