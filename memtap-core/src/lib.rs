//! Memtap protocol core definitions
//!
//! This crate provides the wire-level identifiers shared by the agent and by
//! host-side tooling: command and subfunction numbers, response codes, the
//! handshake magic constants and the protocol version. Memtap users should
//! not depend on this crate directly. Use the `memtap::core` reexport
//! instead.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Number of bytes in the software id embedded by the host build.
pub const SOFTWARE_ID_LENGTH: usize = 16;

/// Marker appended to a handshake request proving the sender speaks this
/// protocol. Identical on both endpoints.
pub const DISCOVER_MAGIC: [u8; 4] = [0x7e, 0x18, 0xfc, 0x68];

/// Marker carried by a session-open request. Identical on both endpoints.
pub const CONNECT_MAGIC: [u8; 4] = [0x82, 0x90, 0x22, 0x66];

/// High bit of the command byte, set on every reply.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Wire protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

/// The version implemented by this revision.
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

/// Top-level command of a request frame
///
/// The encoding occupies the low 7 bits of the command byte; the high bit is
/// reserved for [RESPONSE_FLAG].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandId {
    GetInfo = 0x01,
    CommControl = 0x02,
    MemoryControl = 0x03,
    DataLogControl = 0x04,
    UserCommand = 0x05,
}

impl CommandId {
    pub const fn try_from_u8(code: u8) -> Option<CommandId> {
        match code {
            0x01 => Some(CommandId::GetInfo),
            0x02 => Some(CommandId::CommControl),
            0x03 => Some(CommandId::MemoryControl),
            0x04 => Some(CommandId::DataLogControl),
            0x05 => Some(CommandId::UserCommand),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<CommandId> for u8 {
    fn from(value: CommandId) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for CommandId {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// Outcome of a request, carried in byte 3 of every reply
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseCode {
    Ok = 0,
    /// The request payload does not decode under the addressed subfunction.
    InvalidRequest = 1,
    /// The command or subfunction is unknown, or not available in this build.
    UnsupportedFeature = 2,
    /// The response would not fit the transmit buffer, or a supplied length
    /// exceeds its ceiling.
    Overflow = 3,
    /// The agent cannot honor the request in its current state.
    Busy = 4,
    /// An internal invariant was broken while processing.
    FailureToProceed = 5,
    /// The request touches a protected address range.
    Forbidden = 6,
}

impl ResponseCode {
    pub const fn try_from_u8(code: u8) -> Option<ResponseCode> {
        match code {
            0 => Some(ResponseCode::Ok),
            1 => Some(ResponseCode::InvalidRequest),
            2 => Some(ResponseCode::UnsupportedFeature),
            3 => Some(ResponseCode::Overflow),
            4 => Some(ResponseCode::Busy),
            5 => Some(ResponseCode::FailureToProceed),
            6 => Some(ResponseCode::Forbidden),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<ResponseCode> for u8 {
    fn from(value: ResponseCode) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GetInfoSubfunction {
    ProtocolVersion = 1,
    SoftwareId = 2,
    SupportedFeatures = 3,
    SpecialMemoryRegionCount = 4,
    SpecialMemoryRegionLocation = 5,
}

impl GetInfoSubfunction {
    pub const fn try_from_u8(code: u8) -> Option<GetInfoSubfunction> {
        match code {
            1 => Some(GetInfoSubfunction::ProtocolVersion),
            2 => Some(GetInfoSubfunction::SoftwareId),
            3 => Some(GetInfoSubfunction::SupportedFeatures),
            4 => Some(GetInfoSubfunction::SpecialMemoryRegionCount),
            5 => Some(GetInfoSubfunction::SpecialMemoryRegionLocation),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<GetInfoSubfunction> for u8 {
    fn from(value: GetInfoSubfunction) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for GetInfoSubfunction {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommControlSubfunction {
    Discover = 1,
    Heartbeat = 2,
    GetParams = 3,
    Connect = 4,
    Disconnect = 5,
}

impl CommControlSubfunction {
    pub const fn try_from_u8(code: u8) -> Option<CommControlSubfunction> {
        match code {
            1 => Some(CommControlSubfunction::Discover),
            2 => Some(CommControlSubfunction::Heartbeat),
            3 => Some(CommControlSubfunction::GetParams),
            4 => Some(CommControlSubfunction::Connect),
            5 => Some(CommControlSubfunction::Disconnect),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<CommControlSubfunction> for u8 {
    fn from(value: CommControlSubfunction) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for CommControlSubfunction {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MemoryControlSubfunction {
    Read = 1,
    Write = 2,
}

impl MemoryControlSubfunction {
    pub const fn try_from_u8(code: u8) -> Option<MemoryControlSubfunction> {
        match code {
            1 => Some(MemoryControlSubfunction::Read),
            2 => Some(MemoryControlSubfunction::Write),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<MemoryControlSubfunction> for u8 {
    fn from(value: MemoryControlSubfunction) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for MemoryControlSubfunction {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// Kind of a configured special memory region, as reported by GetInfo
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RegionType {
    ReadOnly = 0,
    Forbidden = 1,
}

impl RegionType {
    pub const fn try_from_u8(code: u8) -> Option<RegionType> {
        match code {
            0 => Some(RegionType::ReadOnly),
            1 => Some(RegionType::Forbidden),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<RegionType> for u8 {
    fn from(value: RegionType) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for RegionType {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_round_trip() {
        for code in 0x01..=0x05u8 {
            let cmd = CommandId::try_from_u8(code).unwrap();
            assert_eq!(cmd.into_u8(), code);
        }
        assert!(CommandId::try_from_u8(0x00).is_none());
        assert!(CommandId::try_from_u8(0x06).is_none());
        assert!(CommandId::try_from_u8(0x81).is_none());
    }

    #[test]
    fn test_response_code_round_trip() {
        for code in 0..=6u8 {
            let rc = ResponseCode::try_from_u8(code).unwrap();
            assert_eq!(rc.into_u8(), code);
        }
        assert!(ResponseCode::try_from_u8(7).is_none());
    }

    #[test]
    fn test_subfunction_bounds() {
        assert!(GetInfoSubfunction::try_from_u8(0).is_none());
        assert!(GetInfoSubfunction::try_from_u8(6).is_none());
        assert!(CommControlSubfunction::try_from_u8(6).is_none());
        assert!(MemoryControlSubfunction::try_from_u8(3).is_none());
        assert_eq!(
            GetInfoSubfunction::try_from_u8(5),
            Some(GetInfoSubfunction::SpecialMemoryRegionLocation)
        );
    }

    #[test]
    fn test_magic_constants_distinct() {
        assert_ne!(DISCOVER_MAGIC, CONNECT_MAGIC);
        assert_eq!(DISCOVER_MAGIC.len(), 4);
        assert_eq!(CONNECT_MAGIC.len(), 4);
    }
}
