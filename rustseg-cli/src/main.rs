//! rustseg: inspect cell identifiers and evaluate readout segmentations.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{debug, info};
use rustseg_core::{BitFieldCoder, CellId, Vector3D};
use rustseg_segmentation::{registry, Segmentation, SegmentationConfig};
use serde_json::json;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] rustseg_core::Error),

    #[error("Segmentation error: {0}")]
    Segmentation(#[from] rustseg_segmentation::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),
}

/// Cell identifier codec and segmentation tool.
#[derive(Parser)]
#[command(name = "rustseg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the fields of a bit-field descriptor
    Describe {
        /// Descriptor, e.g. "system:8,layer:8,x:32:-16,y:-16"
        descriptor: String,
    },

    /// Decode a cell identifier
    Decode {
        /// Bit-field descriptor
        descriptor: String,

        /// Cell identifier (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_cell_id)]
        cell_id: CellId,
    },

    /// Encode field values into a cell identifier
    Encode {
        /// Bit-field descriptor
        descriptor: String,

        /// Field assignments, e.g. layer=3 x=-2
        #[arg(value_parser = parse_assignment)]
        values: Vec<(String, i64)>,
    },

    /// List the registered segmentation types
    Types,

    /// Show the parameters of a configured segmentation
    Parameters {
        /// Segmentation configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Compute the cell centre of a cell identifier
    Position {
        /// Segmentation configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Cell identifier (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_cell_id)]
        cell_id: CellId,
    },

    /// Compute the cell identifier of a hit
    CellId {
        /// Segmentation configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Local position "x,y,z" in mm
        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        local: Vector3D,

        /// Global position "x,y,z" in mm (defaults to the local position)
        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        global: Option<Vector3D>,

        /// Volume identifier providing the placement bits
        #[arg(long, value_parser = parse_cell_id, default_value = "0")]
        volume_id: CellId,
    },
}

fn parse_cell_id(s: &str) -> std::result::Result<CellId, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => CellId::from_str_radix(hex, 16),
        None => s.parse::<CellId>(),
    };
    parsed.map_err(|e| format!("invalid cell identifier '{s}': {e}"))
}

fn parse_assignment(s: &str) -> std::result::Result<(String, i64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{s}'"))?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid value for '{name}': {e}"))?;
    Ok((name.trim().to_string(), value))
}

fn parse_vector(s: &str) -> std::result::Result<Vector3D, String> {
    let components = s
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid position '{s}': {e}"))?;
    match components[..] {
        [x, y, z] => Ok(Vector3D::new(x, y, z)),
        [x, y] => Ok(Vector3D::new(x, y, 0.0)),
        _ => Err(format!("expected 2 or 3 components, got '{s}'")),
    }
}

fn load(path: &Path) -> Result<Box<dyn Segmentation>> {
    let text = fs::read_to_string(path)?;
    let config = SegmentationConfig::from_json(&text)?;
    debug!(
        "building {} on descriptor '{}'",
        config.type_name, config.descriptor
    );
    Ok(config.build()?)
}

fn print_fields(coder: &BitFieldCoder, cell_id: CellId, as_json: bool) {
    if as_json {
        let fields: serde_json::Map<String, serde_json::Value> = coder
            .decode(cell_id)
            .into_iter()
            .map(|(name, value)| (name.to_string(), json!(value)))
            .collect();
        println!(
            "{}",
            json!({ "cell_id": cell_id, "hex": format!("{cell_id:#018x}"), "fields": fields })
        );
    } else {
        println!("Cell ID: {} ({:#018x})", cell_id, cell_id);
        println!("{}", coder.value_string(cell_id));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level),
    );
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::Describe { descriptor } => {
            let coder = BitFieldCoder::new(&descriptor)?;
            if cli.json {
                let fields: Vec<_> = coder
                    .fields()
                    .iter()
                    .map(|f| {
                        json!({
                            "name": f.name(),
                            "offset": f.offset(),
                            "width": f.signed_width(),
                            "min": f.min_value(),
                            "max": f.max_value(),
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    json!({ "descriptor": coder.field_description(), "fields": fields })
                );
            } else {
                println!("Descriptor: {}", coder.field_description());
                println!("Highest bit: {}", coder.highest_bit());
                println!(
                    "{:<16} | {:>6} | {:>6} | {:>6} | {:>20} | {:>20}",
                    "Field", "Offset", "Width", "Signed", "Min", "Max"
                );
                println!("{:-<91}", "");
                for f in coder.fields() {
                    println!(
                        "{:<16} | {:>6} | {:>6} | {:>6} | {:>20} | {:>20}",
                        f.name(),
                        f.offset(),
                        f.width(),
                        f.is_signed(),
                        f.min_value(),
                        f.max_value()
                    );
                }
            }
        }

        Commands::Decode {
            descriptor,
            cell_id,
        } => {
            let coder = BitFieldCoder::new(&descriptor)?;
            print_fields(&coder, cell_id, cli.json);
        }

        Commands::Encode { descriptor, values } => {
            if values.is_empty() {
                return Err(CliError::Argument(
                    "encode needs at least one field=value".to_string(),
                ));
            }
            let coder = BitFieldCoder::new(&descriptor)?;
            let pairs: Vec<(&str, i64)> = values.iter().map(|(n, v)| (n.as_str(), *v)).collect();
            let cell_id = coder.encode(0, &pairs)?;
            print_fields(&coder, cell_id, cli.json);
        }

        Commands::Types => {
            let registry = registry::global();
            if cli.json {
                let types: Vec<_> = registry
                    .types()
                    .map(|t| json!({ "type": t.type_name(), "description": t.description() }))
                    .collect();
                println!("{}", json!(types));
            } else {
                for t in registry.types() {
                    println!("{:<22} {}", t.type_name(), t.description());
                }
            }
        }

        Commands::Parameters { config } => {
            let seg = load(&config)?;
            println!("{} ({})", seg.name(), seg.type_name());
            println!("Descriptor: {}", seg.field_description());
            for p in seg.parameters() {
                let flag = if p.is_identifier() {
                    "identifier"
                } else if p.is_optional() {
                    "optional"
                } else {
                    "required"
                };
                let value = p.value().to_string();
                println!(
                    "  {:<28} = {:<12} [{}, {}] {}",
                    p.name(),
                    value,
                    p.unit(),
                    flag,
                    p.description()
                );
            }
        }

        Commands::Position { config, cell_id } => {
            let seg = load(&config)?;
            let position = seg.position(cell_id)?;
            let dimensions = seg.cell_dimensions(cell_id).ok();
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "cell_id": cell_id,
                        "position": [position.x, position.y, position.z],
                        "cell_dimensions": dimensions,
                    })
                );
            } else {
                println!(
                    "Position: ({:.6}, {:.6}, {:.6})",
                    position.x, position.y, position.z
                );
                if let Some(dims) = dimensions {
                    println!("Cell dimensions: {:?}", dims);
                }
            }
        }

        Commands::CellId {
            config,
            local,
            global,
            volume_id,
        } => {
            let seg = load(&config)?;
            let global = global.unwrap_or(local);
            let cell_id = seg.cell_id(&local, &global, volume_id)?;
            info!("{} -> {:#018x}", seg.name(), cell_id);
            print_fields(seg.decoder(), cell_id, cli.json);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_id() {
        assert_eq!(parse_cell_id("42").unwrap(), 42);
        assert_eq!(parse_cell_id("0xFFE000000000").unwrap(), 0xFFE0_0000_0000);
        assert!(parse_cell_id("-1").is_err());
        assert!(parse_cell_id("0xZZ").is_err());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("x=-32").unwrap(), ("x".to_string(), -32));
        assert!(parse_assignment("x").is_err());
        assert!(parse_assignment("x=1.5").is_err());
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("1,-2.5,3").unwrap(), Vector3D::new(1.0, -2.5, 3.0));
        assert_eq!(parse_vector("1, 2").unwrap(), Vector3D::new(1.0, 2.0, 0.0));
        assert!(parse_vector("1").is_err());
        assert!(parse_vector("a,b,c").is_err());
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(&dir.path().join("segmentation.json"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
