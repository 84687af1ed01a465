use std::{fmt, str::FromStr};

use serde::Serialize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjSectionKind {
    /// Code, measured in 4-byte words
    Text,
    /// Uninitialized data, measured in bytes
    Bss,
}

impl ObjSectionKind {
    /// The exact prefix of a unit header line for this section in the map.
    #[inline]
    pub fn header_token(self) -> &'static str {
        match self {
            ObjSectionKind::Text => " .text ",
            ObjSectionKind::Bss => " .bss ",
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            ObjSectionKind::Text => ".text",
            ObjSectionKind::Bss => ".bss",
        }
    }

    /// Number of bytes per size unit.
    #[inline]
    pub fn unit_scale(self) -> u64 {
        match self {
            ObjSectionKind::Text => 4,
            ObjSectionKind::Bss => 1,
        }
    }
}

impl fmt::Display for ObjSectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for ObjSectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.') {
            "text" => Ok(ObjSectionKind::Text),
            "bss" => Ok(ObjSectionKind::Bss),
            _ => Err(format!("Unknown section '{s}' (expected text or bss)")),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ObjSymbol {
    pub name: String,
    pub address: u64,
    /// `None` until inferred, or when inference produced an unusable value.
    pub size: Option<u64>,
}

/// A compilation unit's contribution to a single section.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ObjUnit {
    /// Source-tree relative path, without archive prefix or extension
    pub name: String,
    pub address: u64,
    /// Declared size, in the section's unit
    pub size: u64,
    pub symbols: Vec<ObjSymbol>,
}

impl ObjUnit {
    #[inline]
    pub fn new(name: String, address: u64, size: u64) -> Self {
        Self { name, address, size, symbols: vec![] }
    }
}
