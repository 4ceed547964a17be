//! The segmentation abstraction shared by all readout variants.
//!
//! A segmentation converts between a hit position and the cell address
//! bits of a [`CellId`]. Each variant composes a [`SegmentationBase`]
//! (coder, name, parameter table) with its own typed state, which is
//! re-derived from the parameter table whenever a parameter changes.
#![allow(clippy::missing_errors_doc)]

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use rustseg_core::{BitFieldCoder, CellId, Vector3D, VolumeId};

use crate::error::{Error, Result};
use crate::parameter::{Parameter, ParameterTable, ParameterValue, UnitKind};

/// The bit-field coder of a segmentation, either owned or shared with
/// other segmentations of the same readout.
#[derive(Debug, Clone)]
pub enum CoderHandle {
    /// Built from a descriptor by the segmentation itself.
    Owned(BitFieldCoder),
    /// Supplied by the caller.
    Shared(Arc<BitFieldCoder>),
}

impl Deref for CoderHandle {
    type Target = BitFieldCoder;

    fn deref(&self) -> &BitFieldCoder {
        match self {
            CoderHandle::Owned(coder) => coder,
            CoderHandle::Shared(coder) => coder.as_ref(),
        }
    }
}

/// State common to every segmentation.
#[derive(Debug, Clone)]
pub struct SegmentationBase {
    name: String,
    type_name: &'static str,
    description: &'static str,
    coder: CoderHandle,
    parameters: ParameterTable,
}

impl SegmentationBase {
    /// Base owning a coder built from `descriptor`.
    pub fn from_descriptor(
        type_name: &'static str,
        description: &'static str,
        descriptor: &str,
    ) -> Result<Self> {
        let coder = BitFieldCoder::new(descriptor)?;
        Ok(Self::with_handle(type_name, description, CoderHandle::Owned(coder)))
    }

    /// Base borrowing an externally owned coder.
    pub fn with_coder(
        type_name: &'static str,
        description: &'static str,
        coder: Arc<BitFieldCoder>,
    ) -> Self {
        Self::with_handle(type_name, description, CoderHandle::Shared(coder))
    }

    fn with_handle(type_name: &'static str, description: &'static str, coder: CoderHandle) -> Self {
        Self {
            name: type_name.to_string(),
            type_name,
            description,
            coder,
            parameters: ParameterTable::new(),
        }
    }

    /// Declares a configuration slot.
    pub fn register_parameter(
        &mut self,
        name: &str,
        description: &str,
        default: impl Into<ParameterValue>,
        unit: UnitKind,
        optional: bool,
    ) {
        self.parameters
            .register(name, description, default, unit, optional);
    }

    /// Declares a slot naming a bit field of the cell identifier.
    pub fn register_identifier(&mut self, name: &str, description: &str, default_field: &str) {
        self.parameters
            .register_identifier(name, description, default_field);
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name under which the variant is registered.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// One-line description of the variant.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// The cell identifier coder.
    pub fn decoder(&self) -> &BitFieldCoder {
        &self.coder
    }

    /// True if the coder was built by this segmentation.
    pub fn owns_decoder(&self) -> bool {
        matches!(self.coder, CoderHandle::Owned(_))
    }

    /// Parameter table.
    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    /// Decodes `field` from `id`.
    #[inline]
    pub fn get(&self, id: u64, field: &str) -> Result<i64> {
        Ok(self.coder.get(id, field)?)
    }

    /// Encodes `value` into `field` of `id`.
    #[inline]
    pub fn set(&self, id: &mut u64, field: &str, value: i64) -> Result<()> {
        Ok(self.coder.set(id, field, value)?)
    }

    /// Clears every identifier field, leaving the placement bits.
    pub fn volume_id(&self, cell_id: CellId) -> Result<VolumeId> {
        let mut volume_id = cell_id;
        for field in self.parameters.identifiers() {
            self.coder.set(&mut volume_id, field, 0)?;
        }
        Ok(volume_id)
    }

    fn unknown_parameter(&self, name: &str) -> Error {
        Error::UnknownParameter {
            name: name.to_string(),
            type_name: self.type_name,
        }
    }
}

/// Conversion between positions and cell identifiers for one readout.
///
/// After configuration a segmentation is only read, so it can be shared
/// between threads.
pub trait Segmentation: Send + Sync + fmt::Debug {
    /// Shared state.
    fn base(&self) -> &SegmentationBase;

    /// Shared state, mutable during configuration.
    fn base_mut(&mut self) -> &mut SegmentationBase;

    /// Re-derives the typed configuration from the parameter table.
    fn refresh(&mut self) -> Result<()>;

    /// Position of the cell centre addressed by `cell_id`.
    fn position(&self, cell_id: CellId) -> Result<Vector3D>;

    /// Cell identifier for a hit.
    ///
    /// The placement bits come from `volume_id`; `global` is needed by
    /// variants binning in absolute angles.
    fn cell_id(&self, local: &Vector3D, global: &Vector3D, volume_id: VolumeId) -> Result<CellId>;

    /// Extent of the cell along its natural axes.
    fn cell_dimensions(&self, _cell_id: CellId) -> Result<Vec<f64>> {
        Err(self.unsupported("cell_dimensions"))
    }

    /// Cells sharing a face with `cell_id`. Empty unless a variant provides it.
    fn neighbours(&self, _cell_id: CellId) -> Result<BTreeSet<CellId>> {
        Ok(BTreeSet::new())
    }

    /// Volume identifier obtained by clearing all cell address fields.
    fn volume_id(&self, cell_id: CellId) -> Result<VolumeId> {
        self.base().volume_id(cell_id)
    }

    /// Adds a sub-segmentation for keys in `[key_min, key_max]`.
    fn add_subsegmentation(
        &mut self,
        _key_min: i64,
        _key_max: i64,
        _entry: Box<dyn Segmentation>,
    ) -> Result<()> {
        Err(self.unsupported("add_subsegmentation"))
    }

    /// Downcasting support for variant specific configuration.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting support for variant specific configuration.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Instance name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Renames this instance.
    fn set_name(&mut self, name: &str) {
        self.base_mut().name = name.to_string();
    }

    /// Registered type name.
    fn type_name(&self) -> &'static str {
        self.base().type_name()
    }

    /// Type description.
    fn description(&self) -> &'static str {
        self.base().description()
    }

    /// Cell identifier coder.
    fn decoder(&self) -> &BitFieldCoder {
        self.base().decoder()
    }

    /// Canonical descriptor of the coder.
    fn field_description(&self) -> String {
        self.decoder().field_description()
    }

    /// Parameter slot called `name`.
    fn parameter(&self, name: &str) -> Result<&Parameter> {
        let base = self.base();
        base.parameters()
            .get(name)
            .ok_or_else(|| base.unknown_parameter(name))
    }

    /// All parameter slots in registration order.
    fn parameters(&self) -> &[Parameter] {
        self.base().parameters().as_slice()
    }

    /// Writes one parameter and re-derives the configuration.
    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        self.apply_parameters(vec![(name.to_string(), value)])
    }

    /// Writes several parameters, then re-derives the configuration once.
    ///
    /// If any value is rejected, every slot keeps its previous value.
    fn apply_parameters(&mut self, values: Vec<(String, ParameterValue)>) -> Result<()> {
        let mut previous = Vec::with_capacity(values.len());
        let mut outcome = Ok(());

        for (name, value) in values {
            match self.base_mut().parameters.set(&name, value) {
                Ok(Some(old)) => previous.push((name, old)),
                Ok(None) => {
                    outcome = Err(self.base().unknown_parameter(&name));
                    break;
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        if outcome.is_ok() {
            outcome = self.refresh();
        }

        if outcome.is_err() {
            for (name, old) in previous.into_iter().rev() {
                self.base_mut().parameters.set(&name, old)?;
            }
            self.refresh()?;
        }
        outcome
    }

    /// Copies the values of matching slots from `parameters`.
    fn set_parameters(&mut self, parameters: &[Parameter]) -> Result<()> {
        let values = parameters
            .iter()
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect();
        self.apply_parameters(values)
    }

    /// Switches to an externally owned coder.
    fn set_decoder(&mut self, coder: Arc<BitFieldCoder>) -> Result<()> {
        let previous = std::mem::replace(&mut self.base_mut().coder, CoderHandle::Shared(coder));
        if let Err(err) = self.refresh() {
            self.base_mut().coder = previous;
            self.refresh()?;
            return Err(err);
        }
        Ok(())
    }

    /// Error for an operation this variant does not provide.
    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            operation,
            type_name: self.type_name(),
        }
    }
}

/// A segmentation variant that can be constructed by type.
pub trait SegmentationType: Segmentation + Sized + 'static {
    /// Registered type name.
    const TYPE_NAME: &'static str;
    /// One-line description.
    const DESCRIPTION: &'static str;

    /// Registers the variant's parameters on `base` and derives its state.
    fn from_base(base: SegmentationBase) -> Result<Self>;

    /// Creates the variant with its own coder built from `descriptor`.
    fn new(descriptor: &str) -> Result<Self> {
        Self::from_base(SegmentationBase::from_descriptor(
            Self::TYPE_NAME,
            Self::DESCRIPTION,
            descriptor,
        )?)
    }

    /// Creates the variant on a shared coder.
    fn with_coder(coder: Arc<BitFieldCoder>) -> Result<Self> {
        Self::from_base(SegmentationBase::with_coder(
            Self::TYPE_NAME,
            Self::DESCRIPTION,
            coder,
        ))
    }
}

/// Neighbours obtained by moving one step along each identifier field.
///
/// Steps that leave a field's representable range are skipped.
pub fn identifier_neighbours(base: &SegmentationBase, cell_id: CellId) -> Result<BTreeSet<CellId>> {
    let coder = base.decoder();
    let mut neighbours = BTreeSet::new();

    for field in base.parameters().identifiers() {
        let element = coder.field(field)?;
        let current = element.value(cell_id);
        for step in [-1, 1] {
            let mut id = cell_id;
            if let Some(value) = current.checked_add(step) {
                if element.set(&mut id, value).is_ok() {
                    neighbours.insert(id);
                }
            }
        }
    }

    Ok(neighbours)
}
