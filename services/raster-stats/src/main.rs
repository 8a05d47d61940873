//! Raster statistics tool.
//!
//! Loads a grid document from a directory of JSON grids, optionally
//! reconciles it against a mask document, and reports:
//! - Header entries and reconciliation mode
//! - Per-layer statistics (valid count, mean, min, max, std, range)
//! - Values of every layer at a probed coordinate
//!
//! The reconciled raster can be written back out as a full grid.

mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use masked_raster::{
    JsonFileCodec, MaskedRaster, RasterConfig, RasterError, ReconcileMode, ReconcileOptions,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use report::RasterReport;

#[derive(Parser, Debug)]
#[command(name = "raster-stats")]
#[command(about = "Reconcile a grid against an optional mask and report per-layer statistics")]
struct Args {
    /// Grid document to load, relative to --root
    input: String,

    /// Further grid documents stacked as extra layers of the input
    #[arg(long = "layer")]
    layers: Vec<String>,

    /// Mask grid document, relative to --root
    #[arg(short, long)]
    mask: Option<String>,

    /// Directory holding grid documents
    #[arg(long, env = "RASTER_DATA_DIR", default_value = ".")]
    root: PathBuf,

    /// Storage mode
    #[arg(long, value_enum, default_value = "compact_to_mask")]
    mode: Mode,

    /// Value for mask cells outside the input grid (default: input NODATA)
    #[arg(long)]
    default_value: Option<f64>,

    /// Override the NODATA comparison tolerance
    #[arg(long)]
    epsilon: Option<f64>,

    /// Print the values of every layer at "x,y"
    #[arg(long)]
    probe: Option<String>,

    /// Write the reconciled raster to this document, relative to --root
    #[arg(short, long)]
    output: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
enum Mode {
    Uncompacted,
    CompactSelf,
    CompactToMask,
}

impl From<Mode> for ReconcileMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Uncompacted => Self::Uncompacted,
            Mode::CompactSelf => Self::CompactSelf,
            Mode::CompactToMask => Self::CompactToMask,
        }
    }
}

/// Reconcile options for a mode.
///
/// `compact_to_mask` only imposes the mask when one is given.
fn options_for(mode: ReconcileMode, default_value: Option<f64>) -> ReconcileOptions<f64> {
    let options = match mode {
        ReconcileMode::Uncompacted => ReconcileOptions::uncompacted(),
        ReconcileMode::CompactSelf => ReconcileOptions::default().ignore_mask_extent(),
        ReconcileMode::CompactToMask => ReconcileOptions::default(),
    };
    match default_value {
        Some(value) => options.with_default_value(value),
        None => options,
    }
}

/// Parse an `x,y` coordinate pair.
fn parse_point(s: &str) -> Result<(f64, f64)> {
    let (x, y) = s
        .split_once(',')
        .with_context(|| format!("expected \"x,y\", got {:?}", s))?;
    let x = x.trim().parse().with_context(|| format!("invalid x in {:?}", s))?;
    let y = y.trim().parse().with_context(|| format!("invalid y in {:?}", s))?;
    Ok((x, y))
}

fn run(args: &Args, config: RasterConfig) -> Result<()> {
    let mut codec = JsonFileCodec::new(&args.root);
    let options = options_for(args.mode.into(), args.default_value);

    let mask = args
        .mask
        .as_deref()
        .map(|source| {
            MaskedRaster::<f64>::load_with::<_, f64>(
                &codec,
                source,
                None,
                ReconcileOptions::default(),
                config.clone(),
            )
            .with_context(|| format!("failed to load mask {}", source))
        })
        .transpose()?;

    let mut sources = vec![args.input.as_str()];
    sources.extend(args.layers.iter().map(String::as_str));
    let mut raster =
        MaskedRaster::<f64>::load_layers(&codec, &sources, mask.as_ref(), options, config)
            .with_context(|| format!("failed to load {}", sources.join(", ")))?;

    let report = RasterReport::collect(&mut raster)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    if let Some(probe) = &args.probe {
        let (x, y) = parse_point(probe)?;
        let cell = raster.cell_at(x, y)?;
        let values = raster.values_at_cell(cell.row, cell.col);
        println!("probe ({}, {}) -> row {} col {}: {:?}", x, y, cell.row, cell.col, values);
    }

    if let Some(output) = &args.output {
        raster.store(&mut codec, output)?;
        info!(output = %output, root = %codec.root().display(), "Wrote reconciled raster");
    }

    Ok(())
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let mut config = RasterConfig::from_env();
    if let Some(epsilon) = args.epsilon {
        config.nodata_epsilon = epsilon;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    info!(input = %args.input, layers = args.layers.len(), mask = ?args.mask, mode = ?args.mode, "Starting raster-stats");

    if let Err(err) = run(&args, config) {
        if let Some(raster_err) = err.downcast_ref::<RasterError>() {
            if raster_err.is_geometry_fatal() {
                error!(error = %raster_err, "Input and mask do not line up");
                std::process::exit(2);
            }
        }
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use masked_raster::{GridCodec, HeaderTable, RawGrid};
    use test_utils::scenario::{MASKED_VALUES, MASK_2X2, VALUES_3X3};

    fn args(input: &str, root: PathBuf) -> Args {
        Args::parse_from(["raster-stats", input, "--root", root.to_str().unwrap()])
    }

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("1.5, -2").unwrap(), (1.5, -2.0));
        assert!(parse_point("1.5").is_err());
        assert!(parse_point("a,1").is_err());
    }

    #[test]
    fn test_options_for_modes() {
        assert!(!options_for(ReconcileMode::Uncompacted, None).calc_positions);
        assert!(!options_for(ReconcileMode::CompactSelf, None).use_mask_extent);
        let options = options_for(ReconcileMode::CompactToMask, Some(0.0));
        assert!(options.use_mask_extent);
        assert_eq!(options.default_value, Some(0.0));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["raster-stats", "dem.json"]);
        assert_eq!(args.input, "dem.json");
        assert_eq!(ReconcileMode::from(args.mode), ReconcileMode::CompactToMask);
        assert!(args.mask.is_none());
        assert!(args.layers.is_empty());
        assert!(!args.json);
    }

    #[test]
    fn test_args_reject_unknown_mode() {
        let parsed = Args::try_parse_from(["raster-stats", "dem.json", "--mode", "compact_to_msk"]);
        assert!(parsed.is_err());

        let args = Args::parse_from(["raster-stats", "dem.json", "--mode", "uncompacted"]);
        assert_eq!(args.mode, Mode::Uncompacted);
    }

    #[test]
    fn test_run_stacks_extra_layers() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = JsonFileCodec::new(dir.path());
        let header = HeaderTable::new(3, 3, 1.0, 0.0, 0.0, -9999.0);
        codec
            .store_grid("a.json", &RawGrid::new(header.clone(), VALUES_3X3.to_vec(), ""))
            .unwrap();
        codec
            .store_grid("b.json", &RawGrid::new(header, vec![1.0; 9], ""))
            .unwrap();

        let mut args = args("a.json", dir.path().to_path_buf());
        args.layers = vec!["b.json".to_string()];
        args.output = Some("stack.json".to_string());
        run(&args, RasterConfig::default()).unwrap();

        let written = codec.load_grid("stack.json").unwrap();
        assert_eq!(written.layers.len(), 2);
        assert_eq!(written.layers[1], vec![1.0; 9]);
    }

    #[test]
    fn test_run_writes_masked_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = JsonFileCodec::new(dir.path());
        let grid = RawGrid::new(HeaderTable::new(3, 3, 1.0, 0.0, 0.0, -9999.0), VALUES_3X3.to_vec(), "");
        let mask = RawGrid::new(HeaderTable::new(2, 2, 1.0, 1.0, 1.0, -9999.0), MASK_2X2.to_vec(), "");
        codec.store_grid("dem.json", &grid).unwrap();
        codec.store_grid("mask.json", &mask).unwrap();

        let mut args = args("dem.json", dir.path().to_path_buf());
        args.mask = Some("mask.json".to_string());
        args.output = Some("out/dem_masked.json".to_string());
        args.probe = Some("2.5,1.5".to_string());
        run(&args, RasterConfig::default()).unwrap();

        let written = codec.load_grid("out/dem_masked.json").unwrap();
        assert_eq!(written.layers, vec![MASKED_VALUES.to_vec()]);
    }

    #[test]
    fn test_run_rejects_point_outside_extent() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = JsonFileCodec::new(dir.path());
        let grid = RawGrid::new(HeaderTable::new(3, 3, 1.0, 0.0, 0.0, -9999.0), VALUES_3X3.to_vec(), "");
        codec.store_grid("dem.json", &grid).unwrap();

        let mut args = args("dem.json", dir.path().to_path_buf());
        args.probe = Some("50,50".to_string());
        let err = run(&args, RasterConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RasterError>(),
            Some(RasterError::OutOfExtent { .. })
        ));
    }
}
