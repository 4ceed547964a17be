//! JSON description of a readout segmentation.
//!
//! ```json
//! {
//!   "type": "CartesianGridXY",
//!   "descriptor": "system:8,layer:8,x:32:-16,y:-16",
//!   "parameters": {
//!     "grid_size_x": { "value": 1.0, "unit": "cm" },
//!     "grid_size_y": 10.0
//!   }
//! }
//! ```
//!
//! Plain numbers are taken in internal units (millimetre, radian). A
//! `{ "value", "unit" }` object is converted with the unit table of the
//! parameter's [`UnitKind`](crate::parameter::UnitKind), and so is every
//! entry of a `{ "values", "unit" }` list.
#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::megatile::{MegatileLayerGridXY, MegatileWafer};
use crate::parameter::{ParameterValue, UnitKind};
use crate::registry::{self, SegmentationRegistry};
use crate::segmentation::Segmentation;
use crate::wafer::WaferGridXY;

/// A parameter value as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Number with an explicit unit.
    Quantity { value: f64, unit: String },
    /// List of numbers sharing one unit.
    Quantities { values: Vec<f64>, unit: String },
    Int(i64),
    Double(f64),
    Text(String),
    IntVec(Vec<i64>),
    DoubleVec(Vec<f64>),
    TextVec(Vec<String>),
}

impl ConfigValue {
    /// Converts to the value stored in a slot of the given unit kind.
    pub fn resolve(&self, name: &str, unit: UnitKind) -> Result<ParameterValue> {
        Ok(match self {
            ConfigValue::Quantity { value, unit: tag } => {
                let factor = unit_factor(name, unit, tag)?;
                ParameterValue::Double(value * factor)
            }
            ConfigValue::Quantities { values, unit: tag } => {
                let factor = unit_factor(name, unit, tag)?;
                ParameterValue::DoubleVec(values.iter().map(|v| v * factor).collect())
            }
            ConfigValue::Int(v) => ParameterValue::Int(*v),
            ConfigValue::Double(v) => ParameterValue::Double(*v),
            ConfigValue::Text(v) => ParameterValue::Text(v.clone()),
            ConfigValue::IntVec(v) => ParameterValue::IntVec(v.clone()),
            ConfigValue::DoubleVec(v) => ParameterValue::DoubleVec(v.clone()),
            ConfigValue::TextVec(v) => ParameterValue::TextVec(v.clone()),
        })
    }
}

fn unit_factor(name: &str, unit: UnitKind, tag: &str) -> Result<f64> {
    unit.factor(tag).ok_or_else(|| {
        Error::Config(format!("unit '{tag}' is not a {unit} unit (parameter '{name}')"))
    })
}

/// Displacement of one `(group, wafer)` of a `WaferGridXY`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaferOffsetEntry {
    pub group: i64,
    pub wafer: i64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Extent of one `(layer, wafer)` of a `MegatileLayerGridXY`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MegatileWaferEntry {
    pub layer: i64,
    pub wafer: i64,
    pub half_x: f64,
    pub half_y: f64,
    #[serde(default)]
    pub regulating: bool,
}

/// Configuration of one segmentation instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Registered type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Bit-field descriptor of the readout.
    pub descriptor: String,
    /// Instance name; defaults to the type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ConfigValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wafer_offsets: Vec<WaferOffsetEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub megatile_wafers: Vec<MegatileWaferEntry>,
}

impl SegmentationConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Load a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Instantiates the segmentation from the process-wide registry.
    pub fn build(&self) -> Result<Box<dyn Segmentation>> {
        self.build_with(registry::global())
    }

    /// Instantiates the segmentation from `registry`.
    ///
    /// All parameters are applied in one transaction, then the offset
    /// tables are filled.
    pub fn build_with(&self, registry: &SegmentationRegistry) -> Result<Box<dyn Segmentation>> {
        let mut segmentation = registry.create(&self.type_name, &self.descriptor)?;
        if let Some(name) = &self.name {
            segmentation.set_name(name);
        }

        let values = self
            .parameters
            .iter()
            .map(|(name, value)| {
                let unit = segmentation.parameter(name)?.unit();
                Ok((name.clone(), value.resolve(name, unit)?))
            })
            .collect::<Result<Vec<_>>>()?;
        segmentation.apply_parameters(values)?;

        if !self.wafer_offsets.is_empty() {
            let grid = downcast::<WaferGridXY>(&mut *segmentation, "wafer_offsets")?;
            for e in &self.wafer_offsets {
                grid.set_wafer_offset_x(e.group, e.wafer, e.x)?;
                grid.set_wafer_offset_y(e.group, e.wafer, e.y)?;
            }
        }

        if !self.megatile_wafers.is_empty() {
            let grid = downcast::<MegatileLayerGridXY>(&mut *segmentation, "megatile_wafers")?;
            for e in &self.megatile_wafers {
                grid.set_wafer(
                    e.layer,
                    e.wafer,
                    MegatileWafer {
                        half_x: e.half_x,
                        half_y: e.half_y,
                        regulating: e.regulating,
                    },
                )?;
            }
        }

        Ok(segmentation)
    }
}

fn downcast<'a, T: 'static>(
    segmentation: &'a mut dyn Segmentation,
    table: &str,
) -> Result<&'a mut T> {
    let type_name = segmentation.type_name();
    segmentation
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| Error::Config(format!("'{table}' does not apply to segmentation type {type_name}")))
}
