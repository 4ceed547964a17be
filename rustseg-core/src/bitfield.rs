//! Bit-field codec for 64-bit cell identifiers.
//!
//! A [`BitFieldCoder`] partitions a 64-bit key into named, non-overlapping
//! fields. It is built once from a descriptor string such as
//! `"system:8,barrel:3,layer:8,slice:5,x:32:-16,y:-16"` and is read-only
//! afterwards, so a single coder can be shared between threads.
//!
//! Descriptor grammar: `name:[offset:][-]width[,...]`. A negative width
//! marks a signed (two's complement) field. Without an explicit offset a
//! field starts right after the previous one.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One named field inside a 64-bit key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BitFieldElement {
    name: String,
    offset: u32,
    width: u32,
    signed: bool,
    mask: u64,
    min_value: i64,
    max_value: i64,
}

impl BitFieldElement {
    /// Creates a field at `offset` with `signed_width` bits.
    ///
    /// A negative `signed_width` marks a signed field of width
    /// `|signed_width|`.
    pub fn new(name: impl Into<String>, offset: u32, signed_width: i32) -> Result<Self> {
        let name = name.into();
        let signed = signed_width < 0;
        let width = signed_width.unsigned_abs();

        if width == 0 || offset > 63 || offset + width > 64 {
            return Err(Error::FieldOutOfRange {
                name,
                offset,
                width,
            });
        }

        let mask = if width == 64 {
            u64::MAX
        } else {
            ((1u64 << width) - 1) << offset
        };

        let (min_value, max_value) = if signed {
            let half = 1i128 << (width - 1);
            ((-half) as i64, (half - 1) as i64)
        } else {
            // Unsigned fields hold [0, 2^width - 1]. A 64-bit unsigned field is
            // limited to the non-negative i64 range by the value type.
            let max = ((1i128 << width) - 1).min(i128::from(i64::MAX));
            (0, max as i64)
        };

        Ok(Self {
            name,
            offset,
            width,
            signed,
            mask,
            min_value,
            max_value,
        })
    }

    /// Decodes this field from `bitfield`, sign-extending signed fields.
    #[inline]
    pub fn value(&self, bitfield: u64) -> i64 {
        let raw = (bitfield & self.mask) >> self.offset;
        if self.signed && self.width < 64 && raw & (1u64 << (self.width - 1)) != 0 {
            (i128::from(raw) - (1i128 << self.width)) as i64
        } else {
            raw as i64
        }
    }

    /// Writes `value` into this field of `bitfield`, leaving other bits untouched.
    ///
    /// Fails with [`Error::ValueOutOfRange`] if the value is not representable;
    /// `bitfield` is not modified in that case.
    pub fn set(&self, bitfield: &mut u64, value: i64) -> Result<()> {
        if value < self.min_value || value > self.max_value {
            return Err(Error::ValueOutOfRange {
                name: self.name.clone(),
                value,
                min: self.min_value,
                max: self.max_value,
            });
        }
        *bitfield = (*bitfield & !self.mask) | (((value as u64) << self.offset) & self.mask);
        Ok(())
    }

    /// The field's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bit offset of the least significant bit.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Width as written in a descriptor (negative for signed fields).
    pub fn signed_width(&self) -> i32 {
        if self.signed {
            -(self.width as i32)
        } else {
            self.width as i32
        }
    }

    /// True if the field is interpreted as two's complement.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Bits occupied by this field.
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Smallest representable value.
    pub fn min_value(&self) -> i64 {
        self.min_value
    }

    /// Largest representable value.
    pub fn max_value(&self) -> i64 {
        self.max_value
    }
}

impl fmt::Display for BitFieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.offset, self.signed_width())
    }
}

/// Ordered set of non-overlapping bit fields.
///
/// ```
/// use rustseg_core::BitFieldCoder;
///
/// let coder: BitFieldCoder = "layer:7,system:-3,barrel:3,theta:32:11,phi:11".parse()?;
/// let mut id = 0u64;
/// coder.set(&mut id, "layer", 123)?;
/// coder.set(&mut id, "system", -4)?;
/// coder.set(&mut id, "phi", 270)?;
/// assert_eq!(coder.get(id, "system")?, -4);
/// assert_eq!(coder.get(id, "phi")?, 270);
/// # Ok::<(), rustseg_core::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct BitFieldCoder {
    fields: Vec<BitFieldElement>,
    index: HashMap<String, usize>,
    joined: u64,
}

impl BitFieldCoder {
    /// Builds a coder from a descriptor string.
    pub fn new(descriptor: &str) -> Result<Self> {
        let mut coder = Self::default();
        coder.init(descriptor)?;
        Ok(coder)
    }

    /// Appends the fields of `descriptor` to this coder.
    pub fn init(&mut self, descriptor: &str) -> Result<()> {
        let mut cursor: u32 = 0;

        for entry in descriptor.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();

            let (name, offset, width) = match parts.as_slice() {
                [name, width] => (*name, cursor, parse_width(entry, width)?),
                [name, offset, width] => {
                    let offset = offset.parse::<u32>().map_err(|_| Error::InvalidDescriptor {
                        entry: entry.to_string(),
                        reason: format!("invalid offset '{offset}'"),
                    })?;
                    (*name, offset, parse_width(entry, width)?)
                }
                _ => {
                    return Err(Error::InvalidDescriptor {
                        entry: entry.to_string(),
                        reason: "expected name:width or name:offset:width".to_string(),
                    })
                }
            };

            if name.is_empty() {
                return Err(Error::InvalidDescriptor {
                    entry: entry.to_string(),
                    reason: "empty field name".to_string(),
                });
            }

            self.add_field(name, offset, width)?;
            cursor = offset + width.unsigned_abs();
        }

        Ok(())
    }

    /// Adds a single field.
    ///
    /// Fails with [`Error::Overlap`] if any of its bits is already used.
    pub fn add_field(&mut self, name: &str, offset: u32, signed_width: i32) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(Error::InvalidDescriptor {
                entry: name.to_string(),
                reason: "duplicate field name".to_string(),
            });
        }

        let element = BitFieldElement::new(name, offset, signed_width)?;

        if element.mask() & self.joined != 0 {
            return Err(Error::Overlap {
                name: name.to_string(),
                mask: element.mask(),
                used: self.joined,
            });
        }

        self.joined |= element.mask();
        self.index.insert(name.to_string(), self.fields.len());
        self.fields.push(element);
        Ok(())
    }

    /// Position of the field called `name`.
    pub fn index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    /// True if a field called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Field called `name`.
    pub fn field(&self, name: &str) -> Result<&BitFieldElement> {
        Ok(&self.fields[self.index(name)?])
    }

    /// Field at position `index`.
    pub fn field_at(&self, index: usize) -> Result<&BitFieldElement> {
        self.fields.get(index).ok_or(Error::UnknownIndex {
            index,
            len: self.fields.len(),
        })
    }

    /// Decodes the field called `name`.
    #[inline]
    pub fn get(&self, bitfield: u64, name: &str) -> Result<i64> {
        Ok(self.field(name)?.value(bitfield))
    }

    /// Decodes the field at position `index`.
    #[inline]
    pub fn get_at(&self, bitfield: u64, index: usize) -> Result<i64> {
        Ok(self.field_at(index)?.value(bitfield))
    }

    /// Encodes `value` into the field called `name`.
    #[inline]
    pub fn set(&self, bitfield: &mut u64, name: &str, value: i64) -> Result<()> {
        self.field(name)?.set(bitfield, value)
    }

    /// Encodes `value` into the field at position `index`.
    #[inline]
    pub fn set_at(&self, bitfield: &mut u64, index: usize, value: i64) -> Result<()> {
        self.field_at(index)?.set(bitfield, value)
    }

    /// Encodes several named values on top of `base`.
    ///
    /// Either all values are written or an error is returned.
    pub fn encode(&self, base: u64, values: &[(&str, i64)]) -> Result<u64> {
        let mut id = base;
        for (name, value) in values {
            self.set(&mut id, name, *value)?;
        }
        Ok(id)
    }

    /// Decodes every field in insertion order.
    pub fn decode(&self, bitfield: u64) -> Vec<(&str, i64)> {
        self.fields
            .iter()
            .map(|f| (f.name(), f.value(bitfield)))
            .collect()
    }

    /// One past the highest used bit, i.e. `max(offset + width)`.
    pub fn highest_bit(&self) -> u32 {
        self.fields
            .iter()
            .map(|f| f.offset() + f.width())
            .max()
            .unwrap_or(0)
    }

    /// Number of fields.
    pub fn size(&self) -> usize {
        self.fields.len()
    }

    /// True if no field has been defined.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields in insertion order.
    pub fn fields(&self) -> &[BitFieldElement] {
        &self.fields
    }

    /// Union of all field masks.
    pub fn mask(&self) -> u64 {
        self.joined
    }

    /// Comma separated `name:value` list of the decoded fields.
    pub fn value_string(&self, bitfield: u64) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}:{}", f.name(), f.value(bitfield)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Canonical descriptor `name:offset:[-]width,...`; parses back to an equal coder.
    pub fn field_description(&self) -> String {
        self.fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Joins two 32-bit words into a 64-bit key.
    #[inline]
    pub fn to_long(low_word: u32, high_word: u32) -> u64 {
        u64::from(low_word) | (u64::from(high_word) << 32)
    }

    /// Bits 0-31.
    #[inline]
    pub fn low_word(bitfield: u64) -> u32 {
        (bitfield & 0xFFFF_FFFF) as u32
    }

    /// Bits 32-63.
    #[inline]
    pub fn high_word(bitfield: u64) -> u32 {
        (bitfield >> 32) as u32
    }
}

fn parse_width(entry: &str, width: &str) -> Result<i32> {
    width.parse::<i32>().map_err(|_| Error::InvalidDescriptor {
        entry: entry.to_string(),
        reason: format!("invalid width '{width}'"),
    })
}

impl FromStr for BitFieldCoder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for BitFieldCoder {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<BitFieldCoder> for String {
    fn from(coder: BitFieldCoder) -> Self {
        coder.field_description()
    }
}

impl fmt::Display for BitFieldCoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALO: &str = "system:8,barrel:3,layer:8,slice:5,x:-16,y:-16";

    #[test]
    fn test_element_mask_and_range() {
        let e = BitFieldElement::new("x", 8, 4).unwrap();
        assert_eq!(e.mask(), 0xF00);
        assert_eq!(e.min_value(), 0);
        assert_eq!(e.max_value(), 15);

        let s = BitFieldElement::new("s", 0, -4).unwrap();
        assert!(s.is_signed());
        assert_eq!(s.min_value(), -8);
        assert_eq!(s.max_value(), 7);
        assert_eq!(s.signed_width(), -4);
    }

    #[test]
    fn test_element_rejects_bad_placement() {
        assert!(matches!(
            BitFieldElement::new("a", 64, 1),
            Err(Error::FieldOutOfRange { .. })
        ));
        assert!(matches!(
            BitFieldElement::new("a", 60, 5),
            Err(Error::FieldOutOfRange { .. })
        ));
        assert!(matches!(
            BitFieldElement::new("a", 0, 0),
            Err(Error::FieldOutOfRange { .. })
        ));
        assert!(BitFieldElement::new("a", 0, 64).is_ok());
        assert!(BitFieldElement::new("a", 63, -1).is_ok());
    }

    #[test]
    fn test_set_get_roundtrip_at_bounds() {
        for (offset, width) in [(0u32, 1i32), (3, 7), (17, -9), (32, 32), (40, -24), (0, -64)] {
            let e = BitFieldElement::new("f", offset, width).unwrap();
            for v in [e.min_value(), e.min_value() / 2, 0, e.max_value() / 2, e.max_value()] {
                let mut id = 0u64;
                e.set(&mut id, v).unwrap();
                assert_eq!(e.value(id), v, "offset {offset} width {width}");
                assert_eq!(id & !e.mask(), 0);
            }
        }
    }

    #[test]
    fn test_unsigned_upper_bound_is_exclusive_of_two_pow_width() {
        let e = BitFieldElement::new("f", 0, 3).unwrap();
        let mut id = 0;
        assert!(e.set(&mut id, 7).is_ok());
        assert!(matches!(
            e.set(&mut id, 8),
            Err(Error::ValueOutOfRange { max: 7, .. })
        ));
        assert!(e.set(&mut id, -1).is_err());
        assert_eq!(e.value(id), 7, "failed set must not modify the key");
    }

    #[test]
    fn test_set_preserves_other_bits() {
        let coder = BitFieldCoder::new("a:8,b:8,c:8").unwrap();
        let mut id = 0xFF_FF_FF;
        coder.set(&mut id, "b", 0x12).unwrap();
        assert_eq!(id, 0xFF_12_FF);
    }

    #[test]
    fn test_signed_field_boundary() {
        let coder = BitFieldCoder::new(CALO).unwrap();
        let mut id = 0u64;
        coder.set(&mut id, "system", 7).unwrap();
        coder.set(&mut id, "x", -32).unwrap();
        coder.set(&mut id, "y", 32767).unwrap();
        assert_eq!(coder.get(id, "x").unwrap(), -32);
        assert_eq!(coder.get(id, "y").unwrap(), 32767);
        assert_eq!(coder.get(id, "system").unwrap(), 7);
        assert!(coder.set(&mut id, "x", -32769).is_err());
    }

    #[test]
    fn test_descriptor_offsets() {
        let coder = BitFieldCoder::new("layer:7,system:-3,barrel:3,theta:32:11,phi:11").unwrap();
        let offsets: Vec<(u32, u32)> = coder
            .fields()
            .iter()
            .map(|f| (f.offset(), f.width()))
            .collect();
        assert_eq!(offsets, vec![(0, 7), (7, 3), (10, 3), (32, 11), (43, 11)]);
        assert_eq!(coder.highest_bit(), 54);
        assert_eq!(coder.index("theta").unwrap(), 3);
        assert_eq!(
            coder.field_description(),
            "layer:0:7,system:7:-3,barrel:10:3,theta:32:11,phi:43:11"
        );
    }

    #[test]
    fn test_descriptor_round_trip() {
        for d in [CALO, "a:4:4,b:-2,c:40:24", "system:5,side:-2,module:8,stave:4,layer:9,submodule:4,x:32:-16,y:-16"] {
            let coder = BitFieldCoder::new(d).unwrap();
            let again = BitFieldCoder::new(&coder.field_description()).unwrap();
            assert_eq!(again.field_description(), coder.field_description());
            assert_eq!(again, coder);
        }
    }

    #[test]
    fn test_malformed_descriptor() {
        assert!(matches!(
            BitFieldCoder::new("a:1:2:3"),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            BitFieldCoder::new("a"),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            BitFieldCoder::new("a:x"),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            BitFieldCoder::new("a:-1:4"),
            Err(Error::InvalidDescriptor { .. })
        ));
        // empty entries are skipped
        assert_eq!(BitFieldCoder::new("a:2,,b:2,").unwrap().size(), 2);
    }

    #[test]
    fn test_overlap_any_order() {
        assert!(matches!(
            BitFieldCoder::new("a:0:8,b:4:8"),
            Err(Error::Overlap { .. })
        ));
        assert!(matches!(
            BitFieldCoder::new("b:4:8,a:0:8"),
            Err(Error::Overlap { .. })
        ));

        let mut coder = BitFieldCoder::default();
        coder.add_field("hi", 32, 16).unwrap();
        coder.add_field("lo", 0, 16).unwrap();
        assert!(matches!(
            coder.add_field("mid", 15, 2),
            Err(Error::Overlap { .. })
        ));
        assert_eq!(coder.mask(), 0x0000_FFFF_0000_FFFF);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        assert!(BitFieldCoder::new("a:4,a:4").is_err());
    }

    #[test]
    fn test_unknown_field() {
        let coder = BitFieldCoder::new(CALO).unwrap();
        assert_eq!(
            coder.get(0, "nope"),
            Err(Error::UnknownField("nope".to_string()))
        );
        assert!(matches!(
            coder.get_at(0, 42),
            Err(Error::UnknownIndex { index: 42, len: 6 })
        ));
    }

    #[test]
    fn test_value_string_and_encode() {
        let coder = BitFieldCoder::new("system:5,side:-2,layer:9").unwrap();
        let id = coder
            .encode(0, &[("system", 20), ("side", -1), ("layer", 300)])
            .unwrap();
        assert_eq!(coder.value_string(id), "system:20,side:-1,layer:300");
        assert_eq!(
            coder.decode(id),
            vec![("system", 20), ("side", -1), ("layer", 300)]
        );
    }

    #[test]
    fn test_words() {
        let id = BitFieldCoder::to_long(0xDEAD_BEEF, 0x1234_5678);
        assert_eq!(id, 0x1234_5678_DEAD_BEEF);
        assert_eq!(BitFieldCoder::low_word(id), 0xDEAD_BEEF);
        assert_eq!(BitFieldCoder::high_word(id), 0x1234_5678);
    }

    #[test]
    fn test_from_str_and_display() {
        let coder: BitFieldCoder = "a:3,b:-5".parse().unwrap();
        assert_eq!(coder.to_string(), "a:0:3,b:3:-5");
    }
}
