//! Self-describing configuration slots of a segmentation.
//!
//! Every segmentation registers its numeric parameters and its field-name
//! identifiers in a [`ParameterTable`]. External loaders discover the slots
//! through the table, convert values according to the slot's [`UnitKind`]
//! and write them back before the segmentation is used.
#![allow(clippy::cast_precision_loss, clippy::missing_errors_doc)]

use std::f64::consts::PI;
use std::fmt;

use crate::error::{Error, Result};

/// Physical dimension of a parameter, selecting the unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Lengths, stored in millimetres.
    Length,
    /// Angles, stored in radians.
    Angle,
    /// Dimensionless numbers, counts and names.
    None,
}

impl UnitKind {
    /// Factor converting a value tagged with `unit` into internal units.
    ///
    /// Returns `None` if the unit does not belong to this kind.
    pub fn factor(self, unit: &str) -> Option<f64> {
        match (self, unit) {
            (UnitKind::Length, "mm") => Some(1.0),
            (UnitKind::Length, "cm") => Some(10.0),
            (UnitKind::Length, "m") => Some(1000.0),
            (UnitKind::Length, "um") => Some(1e-3),
            (UnitKind::Length, "nm") => Some(1e-6),
            (UnitKind::Angle, "rad") => Some(1.0),
            (UnitKind::Angle, "mrad") => Some(1e-3),
            (UnitKind::Angle, "deg") => Some(PI / 180.0),
            _ => None,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitKind::Length => "length",
            UnitKind::Angle => "angle",
            UnitKind::None => "none",
        };
        f.write_str(s)
    }
}

/// Value held by a parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Int(i64),
    Double(f64),
    Text(String),
    IntVec(Vec<i64>),
    DoubleVec(Vec<f64>),
    TextVec(Vec<String>),
}

impl ParameterValue {
    /// Name of the value kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterValue::Int(_) => "int",
            ParameterValue::Double(_) => "double",
            ParameterValue::Text(_) => "string",
            ParameterValue::IntVec(_) => "int vector",
            ParameterValue::DoubleVec(_) => "double vector",
            ParameterValue::TextVec(_) => "string vector",
        }
    }

    /// Converts `self` to the kind of `target`.
    ///
    /// Integers widen to doubles; every other kind must match exactly.
    fn coerce_like(self, target: &ParameterValue, name: &str) -> Result<ParameterValue> {
        match (target, self) {
            (ParameterValue::Int(_), v @ ParameterValue::Int(_))
            | (ParameterValue::Double(_), v @ ParameterValue::Double(_))
            | (ParameterValue::Text(_), v @ ParameterValue::Text(_))
            | (ParameterValue::IntVec(_), v @ ParameterValue::IntVec(_))
            | (ParameterValue::DoubleVec(_), v @ ParameterValue::DoubleVec(_))
            | (ParameterValue::TextVec(_), v @ ParameterValue::TextVec(_)) => Ok(v),
            (ParameterValue::Double(_), ParameterValue::Int(i)) => Ok(ParameterValue::Double(i as f64)),
            (ParameterValue::DoubleVec(_), ParameterValue::IntVec(v)) => Ok(ParameterValue::DoubleVec(
                v.into_iter().map(|i| i as f64).collect(),
            )),
            (target, found) => Err(Error::ParameterType {
                name: name.to_string(),
                expected: target.kind(),
                found: found.kind(),
            }),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(v: &[T]) -> String {
            v.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
        }
        match self {
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::Double(v) => write!(f, "{v}"),
            ParameterValue::Text(v) => f.write_str(v),
            ParameterValue::IntVec(v) => f.write_str(&join(v)),
            ParameterValue::DoubleVec(v) => f.write_str(&join(v)),
            ParameterValue::TextVec(v) => f.write_str(&join(v)),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Double(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Text(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::Text(v)
    }
}

impl From<Vec<i64>> for ParameterValue {
    fn from(v: Vec<i64>) -> Self {
        ParameterValue::IntVec(v)
    }
}

impl From<Vec<f64>> for ParameterValue {
    fn from(v: Vec<f64>) -> Self {
        ParameterValue::DoubleVec(v)
    }
}

impl From<Vec<String>> for ParameterValue {
    fn from(v: Vec<String>) -> Self {
        ParameterValue::TextVec(v)
    }
}

/// A named configuration slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    description: String,
    value: ParameterValue,
    default: ParameterValue,
    unit: UnitKind,
    optional: bool,
    identifier: bool,
}

impl Parameter {
    /// Slot name, e.g. `grid_size_x`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current value.
    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    /// Value assigned at registration.
    pub fn default_value(&self) -> &ParameterValue {
        &self.default
    }

    /// Unit kind of the slot.
    pub fn unit(&self) -> UnitKind {
        self.unit
    }

    /// True if a configuration may omit this slot.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// True if the slot names a bit field of the cell identifier.
    pub fn is_identifier(&self) -> bool {
        self.identifier
    }
}

/// Ordered table of parameter slots.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    slots: Vec<Parameter>,
}

impl ParameterTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a numeric or textual slot initialised with `default`.
    ///
    /// Registering a name twice replaces the earlier slot.
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        default: impl Into<ParameterValue>,
        unit: UnitKind,
        optional: bool,
    ) {
        let default = default.into();
        self.insert(Parameter {
            name: name.to_string(),
            description: description.to_string(),
            value: default.clone(),
            default,
            unit,
            optional,
            identifier: false,
        });
    }

    /// Declares a slot whose value is the name of a bit field.
    pub fn register_identifier(&mut self, name: &str, description: &str, default_field: &str) {
        self.insert(Parameter {
            name: name.to_string(),
            description: description.to_string(),
            value: ParameterValue::Text(default_field.to_string()),
            default: ParameterValue::Text(default_field.to_string()),
            unit: UnitKind::None,
            optional: true,
            identifier: true,
        });
    }

    fn insert(&mut self, parameter: Parameter) {
        if let Some(slot) = self.slots.iter_mut().find(|p| p.name == parameter.name) {
            *slot = parameter;
        } else {
            self.slots.push(parameter);
        }
    }

    /// Slot called `name`, if registered.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.slots.iter().find(|p| p.name == name)
    }

    /// Writes `value` into the slot called `name`, returning the previous value.
    ///
    /// Returns `Ok(None)` if no such slot exists.
    pub fn set(&mut self, name: &str, value: ParameterValue) -> Result<Option<ParameterValue>> {
        let Some(slot) = self.slots.iter_mut().find(|p| p.name == name) else {
            return Ok(None);
        };
        let value = value.coerce_like(&slot.default, name)?;
        Ok(Some(std::mem::replace(&mut slot.value, value)))
    }

    /// All slots in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.slots.iter()
    }

    /// All slots as a slice.
    pub fn as_slice(&self) -> &[Parameter] {
        &self.slots
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Field names held by identifier slots.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().filter(|p| p.identifier).filter_map(|p| match &p.value {
            ParameterValue::Text(field) => Some(field.as_str()),
            _ => None,
        })
    }

    fn slot(&self, name: &str) -> Result<&Parameter> {
        self.get(name).ok_or_else(|| Error::Config(format!("parameter '{name}' is not registered")))
    }

    /// Current value of an integer slot.
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.slot(name)?.value {
            ParameterValue::Int(v) => Ok(v),
            ref other => Err(type_error(name, "int", other)),
        }
    }

    /// Current value of a floating point slot.
    pub fn double(&self, name: &str) -> Result<f64> {
        match self.slot(name)?.value {
            ParameterValue::Double(v) => Ok(v),
            ref other => Err(type_error(name, "double", other)),
        }
    }

    /// Current value of a floating point vector slot.
    pub fn doubles(&self, name: &str) -> Result<&[f64]> {
        match &self.slot(name)?.value {
            ParameterValue::DoubleVec(v) => Ok(v),
            other => Err(type_error(name, "double vector", other)),
        }
    }

    /// Current value of a text or identifier slot.
    pub fn text(&self, name: &str) -> Result<&str> {
        match &self.slot(name)?.value {
            ParameterValue::Text(v) => Ok(v),
            other => Err(type_error(name, "string", other)),
        }
    }
}

fn type_error(name: &str, expected: &'static str, found: &ParameterValue) -> Error {
    Error::ParameterType {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> ParameterTable {
        let mut t = ParameterTable::new();
        t.register("grid_size_x", "Cell size in X", 1.0, UnitKind::Length, false);
        t.register("phi_bins", "Number of bins in phi", 1i64, UnitKind::None, false);
        t.register_identifier("identifier_x", "Cell ID identifier for X", "x");
        t
    }

    #[test]
    fn test_registration_order_and_defaults() {
        let t = table();
        let names: Vec<&str> = t.iter().map(Parameter::name).collect();
        assert_eq!(names, vec!["grid_size_x", "phi_bins", "identifier_x"]);
        assert_eq!(t.double("grid_size_x").unwrap(), 1.0);
        assert_eq!(t.get("grid_size_x").unwrap().unit(), UnitKind::Length);
        assert!(t.get("identifier_x").unwrap().is_identifier());
        assert!(t.get("identifier_x").unwrap().is_optional());
        assert_eq!(t.identifiers().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn test_set_returns_previous_and_coerces_int() {
        let mut t = table();
        let prev = t.set("grid_size_x", ParameterValue::Int(5)).unwrap();
        assert_eq!(prev, Some(ParameterValue::Double(1.0)));
        assert_eq!(t.double("grid_size_x").unwrap(), 5.0);
        assert_eq!(t.set("missing", 1.0.into()).unwrap(), None);
    }

    #[test]
    fn test_set_rejects_wrong_kind() {
        let mut t = table();
        let err = t.set("phi_bins", ParameterValue::Double(2.5)).unwrap_err();
        assert!(matches!(err, Error::ParameterType { expected: "int", .. }));
        assert_eq!(t.int("phi_bins").unwrap(), 1);
        assert!(t.double("phi_bins").is_err());
    }

    #[test]
    fn test_double_vector_slot() {
        let mut t = table();
        t.register("grid_r_values", "Ring edges", Vec::<f64>::new(), UnitKind::Length, false);
        assert!(t.doubles("grid_r_values").unwrap().is_empty());
        t.set("grid_r_values", vec![1i64, 2, 4].into()).unwrap();
        assert_eq!(t.doubles("grid_r_values").unwrap(), &[1.0, 2.0, 4.0]);
        assert!(t.doubles("grid_size_x").is_err());
    }

    #[test]
    fn test_identifier_retarget() {
        let mut t = table();
        t.set("identifier_x", "cellX".into()).unwrap();
        assert_eq!(t.text("identifier_x").unwrap(), "cellX");
        assert_eq!(t.identifiers().collect::<Vec<_>>(), vec!["cellX"]);
    }

    #[test]
    fn test_unit_factors() {
        assert_relative_eq!(UnitKind::Length.factor("cm").unwrap(), 10.0);
        assert_relative_eq!(UnitKind::Angle.factor("deg").unwrap(), PI / 180.0);
        assert!(UnitKind::Length.factor("deg").is_none());
        assert!(UnitKind::None.factor("mm").is_none());
    }
}
