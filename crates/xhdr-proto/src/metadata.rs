//! HDR metadata and capability value types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest luminance the PQ curve can encode, in nits
pub const PQ_MAX_NITS: u32 = 10_000;

/// Electro-optical transfer function selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Eotf {
    /// Traditional gamma (SDR)
    Sdr = 0,
    /// Perceptual quantizer (SMPTE ST.2084)
    Pq = 1,
}

impl Eotf {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Sdr),
            1 => Some(Self::Pq),
            _ => None,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// Static HDR metadata attached to a window
///
/// Field order matches the wire layout. The codec treats `primaries` and
/// `eotf` as opaque bit patterns; [`HdrMetadata::validate`] is applied by the
/// request handler before anything is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HdrMetadata {
    /// Packed chromaticity coordinates of the color primaries
    pub primaries: u32,
    /// Transfer function code, see [`Eotf`]
    pub eotf: u32,
    /// Maximum content light level (MaxCLL), nits
    pub max_cll: u32,
    /// Minimum mastering luminance, 0.0001 nit units
    pub min_lum: u32,
    /// Maximum mastering display luminance, nits. Not MaxFALL.
    pub max_lum: u32,
}

/// Reasons a metadata record is refused by the server
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataError {
    #[error("reserved eotf value {0}")]
    ReservedEotf(u32),

    #[error("min_lum {min_lum} exceeds max_lum {max_lum}")]
    LuminanceOrder { min_lum: u32, max_lum: u32 },

    #[error("{field} of {value} nits is above the PQ ceiling")]
    Implausible { field: &'static str, value: u32 },
}

impl MetadataError {
    /// The offending value, reported back to the client in the error reply
    pub fn bad_value(&self) -> u32 {
        match *self {
            Self::ReservedEotf(v) => v,
            Self::LuminanceOrder { min_lum, .. } => min_lum,
            Self::Implausible { value, .. } => value,
        }
    }
}

impl HdrMetadata {
    pub fn new(primaries: u32, eotf: Eotf, max_cll: u32, min_lum: u32, max_lum: u32) -> Self {
        Self {
            primaries,
            eotf: eotf.to_u32(),
            max_cll,
            min_lum,
            max_lum,
        }
    }

    /// Decoded transfer function, `None` for reserved codes
    pub fn transfer_function(&self) -> Option<Eotf> {
        Eotf::from_u32(self.eotf)
    }

    /// Check the record is something a display could actually be driven with
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.transfer_function().is_none() {
            return Err(MetadataError::ReservedEotf(self.eotf));
        }
        if self.min_lum > self.max_lum {
            return Err(MetadataError::LuminanceOrder {
                min_lum: self.min_lum,
                max_lum: self.max_lum,
            });
        }
        if self.max_lum > PQ_MAX_NITS {
            return Err(MetadataError::Implausible {
                field: "max_lum",
                value: self.max_lum,
            });
        }
        if self.max_cll > PQ_MAX_NITS {
            return Err(MetadataError::Implausible {
                field: "max_cll",
                value: self.max_cll,
            });
        }
        Ok(())
    }

    /// Fields in wire order
    pub fn to_words(&self) -> [u32; 5] {
        [
            self.primaries,
            self.eotf,
            self.max_cll,
            self.min_lum,
            self.max_lum,
        ]
    }

    pub fn from_words(words: [u32; 5]) -> Self {
        let [primaries, eotf, max_cll, min_lum, max_lum] = words;
        Self {
            primaries,
            eotf,
            max_cll,
            min_lum,
            max_lum,
        }
    }
}

/// What a screen can do with HDR content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub supported: bool,
    /// Bits per color channel the output scans out at
    pub max_depth: u8,
    /// Supported transfer function codes, in backend order
    pub eotfs: Vec<u32>,
}

impl CapabilityRecord {
    /// Record reported for screens that cannot do HDR
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            max_depth: 8,
            eotfs: vec![Eotf::Sdr.to_u32()],
        }
    }

    pub fn supports(&self, eotf: Eotf) -> bool {
        self.eotfs.contains(&eotf.to_u32())
    }
}
