//! Domain newtypes with validation
//!
//! Folder and device identifiers are owned by the engine; these wrappers
//! only guarantee they are well formed, they do not redefine what an
//! identifier means.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// FolderId
// ============================================================================

/// Identifier of a synchronized folder
///
/// Any non-empty string the engine accepts. Whitespace is significant and
/// preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderId(String);

impl FolderId {
    /// Create a new FolderId
    ///
    /// # Errors
    /// Returns error if the identifier is empty
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidFolderId(
                "folder ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FolderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FolderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FolderId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FolderId> for String {
    fn from(id: FolderId) -> Self {
        id.0
    }
}

// ============================================================================
// DeviceId / ShortId
// ============================================================================

/// Length of a device identifier in bytes
const DEVICE_ID_LEN: usize = 32;

/// Identifier of a peer device (32 raw bytes)
///
/// Rendered as 64 uppercase hex characters. Dashes are accepted and ignored
/// when parsing so grouped forms round-trip.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId([u8; DEVICE_ID_LEN]);

impl DeviceId {
    /// Sentinel for the local device, used by local accounting queries.
    pub const LOCAL: DeviceId = DeviceId([0xff; DEVICE_ID_LEN]);

    /// Sentinel meaning "no particular device".
    pub const EMPTY: DeviceId = DeviceId([0; DEVICE_ID_LEN]);

    /// Create a DeviceId from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DEVICE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DEVICE_ID_LEN] {
        &self.0
    }

    /// Returns true for the [`DeviceId::LOCAL`] sentinel
    #[must_use]
    pub fn is_local(&self) -> bool {
        *self == Self::LOCAL
    }

    /// Short form used as the key in version vectors
    #[must_use]
    pub fn short(&self) -> ShortId {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        ShortId(u64::from_be_bytes(head))
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({self})")
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for DeviceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        if digits.len() != DEVICE_ID_LEN * 2 {
            return Err(DomainError::InvalidDeviceId(format!(
                "expected {} hex digits, got {}: {s}",
                DEVICE_ID_LEN * 2,
                digits.len()
            )));
        }

        let mut bytes = [0u8; DEVICE_ID_LEN];
        hex::decode_to_slice(&digits, &mut bytes)
            .map_err(|e| DomainError::InvalidDeviceId(format!("{e}: {s}")))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

/// Truncated device identifier used in version vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortId(u64);

impl ShortId {
    /// Create a ShortId from its numeric value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Display for ShortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_id_rejects_empty() {
        assert!(FolderId::new("").is_err());
        assert!("".parse::<FolderId>().is_err());
    }

    #[test]
    fn test_folder_id_preserves_input() {
        let id = FolderId::new(" docs ").unwrap();
        assert_eq!(id.as_str(), " docs ");
        assert_eq!(id.to_string(), " docs ");
    }

    #[test]
    fn test_folder_id_serde() {
        let id = FolderId::new("photos").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"photos\"");

        let err = serde_json::from_str::<FolderId>("\"\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_device_id_display_and_parse() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        bytes[31] = 0x01;
        let id = DeviceId::from_bytes(bytes);
        let text = id.to_string();
        assert_eq!(text.len(), 64);
        assert!(text.starts_with("AB"));
        assert!(text.ends_with("01"));

        let parsed: DeviceId = text.to_lowercase().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_device_id_parse_accepts_dashes() {
        let grouped = format!("{}-{}", "0".repeat(32), "F".repeat(32));
        let id: DeviceId = grouped.parse().unwrap();
        assert_eq!(id.as_bytes()[0], 0);
        assert_eq!(id.as_bytes()[31], 0xFF);
    }

    #[test]
    fn test_device_id_parse_rejects_bad_input() {
        assert!("ABC".parse::<DeviceId>().is_err());
        assert!("Z".repeat(64).parse::<DeviceId>().is_err());
        // Right length in bytes, but not all ASCII hex
        let odd = format!("{}é{}", "0".repeat(31), "0".repeat(31));
        assert!(matches!(
            odd.parse::<DeviceId>(),
            Err(DomainError::InvalidDeviceId(_))
        ));
    }

    #[test]
    fn test_device_id_display_is_upper_hex() {
        let id = DeviceId::from_bytes([0xab; 32]);
        assert_eq!(id.to_string(), "AB".repeat(32));
        assert_eq!(format!("{id:?}"), format!("DeviceId({})", "AB".repeat(32)));
        assert_eq!(DeviceId::LOCAL.to_string(), "F".repeat(64));
    }

    #[test]
    fn test_local_sentinel() {
        assert!(DeviceId::LOCAL.is_local());
        assert!(!DeviceId::EMPTY.is_local());
        assert_eq!(DeviceId::LOCAL.short(), ShortId::new(u64::MAX));
    }

    #[test]
    fn test_short_id_uses_leading_bytes() {
        let mut bytes = [0u8; 32];
        bytes[7] = 0x2A;
        bytes[8] = 0xFF;
        assert_eq!(DeviceId::from_bytes(bytes).short().value(), 0x2A);
    }
}
