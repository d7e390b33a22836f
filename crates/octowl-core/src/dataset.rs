//! In-memory DICOM data set.
//!
//! The worklist store never interprets record contents; this model only needs
//! to be faithful enough to load, clone and save a data set without loss.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A data element tag, ordered by group then element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const fn group(self) -> u16 {
        self.0
    }

    pub const fn element(self) -> u16 {
        self.1
    }

    pub const fn is_file_meta(self) -> bool {
        self.0 == 0x0002
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

macro_rules! value_representations {
    ($($vr:ident),+ $(,)?) => {
        /// Value representation codes (PS3.5 section 6.2).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Vr {
            $($vr),+
        }

        impl Vr {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$vr => stringify!($vr)),+
                }
            }

            pub fn from_bytes(code: [u8; 2]) -> Result<Self> {
                match &code {
                    $(c if c == stringify!($vr).as_bytes() => Ok(Self::$vr),)+
                    _ => Err(CoreError::UnknownVr(String::from_utf8_lossy(&code).into_owned())),
                }
            }
        }
    };
}

value_representations!(
    AE, AS, AT, CS, DA, DS, DT, FD, FL, IS, LO, LT, OB, OD, OF, OL, OV, OW, PN, SH, SL, SQ, SS,
    ST, SV, TM, UC, UI, UL, UN, UR, US, UT, UV,
);

impl Vr {
    /// VRs encoded with a reserved field and a 32-bit length in explicit VR.
    pub fn has_long_length(self) -> bool {
        matches!(
            self,
            Self::OB
                | Self::OD
                | Self::OF
                | Self::OL
                | Self::OV
                | Self::OW
                | Self::SQ
                | Self::UC
                | Self::UN
                | Self::UR
                | Self::UT
                | Self::SV
                | Self::UV
        )
    }

    /// Character-string VRs, padded with a trailing space.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Self::AE
                | Self::AS
                | Self::CS
                | Self::DA
                | Self::DS
                | Self::DT
                | Self::IS
                | Self::LO
                | Self::LT
                | Self::PN
                | Self::SH
                | Self::ST
                | Self::TM
                | Self::UC
                | Self::UR
                | Self::UT
        )
    }

    /// Byte used to pad odd-length values to even length.
    pub fn padding(self) -> u8 {
        if self.is_text() { b' ' } else { 0 }
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(CoreError::UnknownVr(s.to_string()));
        }
        Self::from_bytes([bytes[0], bytes[1]])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Sequence(Vec<Dataset>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub vr: Vr,
    pub value: Value,
}

impl Element {
    pub fn bytes(vr: Vr, mut bytes: Vec<u8>) -> Self {
        if bytes.len() % 2 == 1 {
            bytes.push(vr.padding());
        }
        Self {
            vr,
            value: Value::Bytes(bytes),
        }
    }

    pub fn sequence(items: Vec<Dataset>) -> Self {
        Self {
            vr: Vr::SQ,
            value: Value::Sequence(items),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Bytes(bytes) => Some(bytes),
            Value::Sequence(_) => None,
        }
    }

    pub fn items(&self) -> Option<&[Dataset]> {
        match &self.value {
            Value::Sequence(items) => Some(items),
            Value::Bytes(_) => None,
        }
    }
}

/// An ordered collection of data elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    elements: BTreeMap<Tag, Element>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn insert(&mut self, tag: Tag, element: Element) -> Option<Element> {
        self.elements.insert(tag, element)
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        self.elements.remove(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Element)> {
        self.elements.iter()
    }

    /// Store a string value. Sequences cannot be written this way.
    pub fn put_str(&mut self, tag: Tag, vr: Vr, value: &str) -> Result<()> {
        if vr == Vr::SQ {
            return Err(CoreError::invalid_value(tag, "SQ element needs put_sequence"));
        }
        self.insert(tag, Element::bytes(vr, value.as_bytes().to_vec()));
        Ok(())
    }

    /// Read a string value with trailing padding removed.
    pub fn get_str(&self, tag: Tag) -> Option<String> {
        let bytes = self.get(tag)?.as_bytes()?;
        let text = String::from_utf8_lossy(bytes);
        Some(text.trim_end_matches([' ', '\0']).to_string())
    }

    pub fn put_sequence(&mut self, tag: Tag, items: Vec<Dataset>) {
        self.insert(tag, Element::sequence(items));
    }

    pub fn items(&self, tag: Tag) -> Option<&[Dataset]> {
        self.get(tag)?.items()
    }
}

impl FromIterator<(Tag, Element)> for Dataset {
    fn from_iter<I: IntoIterator<Item = (Tag, Element)>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}
