//! AFI/SAFI -- address family identifiers carried by MP_REACH/MP_UNREACH and by
//! MRT TABLE_DUMPV2 RIB entries.
//!
//! <https://www.iana.org/assignments/address-family-numbers/address-family-numbers.xhtml>

use crate::error::ParserError;
use crate::report;
use num_enum::TryFromPrimitive;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6 = 2,
}

impl Afi {
    /// Maximum prefix width in bits for this address family (spec §4.3:
    /// "width must be <= afi-max, 32 for v4, 128 for v6").
    pub const fn max_width(&self) -> u8 {
        match self {
            Afi::Ipv4 => 32,
            Afi::Ipv6 => 128,
        }
    }

    pub fn from_wire(v: u16) -> Result<Self, ParserError> {
        Afi::try_from(v).map_err(|_| report!(ParserError::AfiUnsupported(v)))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Safi {
    Unicast = 1,
    Multicast = 2,
    MplsLabel = 4,
    MplsVpn = 128,
}

impl Safi {
    pub fn from_wire(v: u8) -> Result<Self, ParserError> {
        Safi::try_from(v).map_err(|_| report!(ParserError::SafiUnsupported(v)))
    }
}
