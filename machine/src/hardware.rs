use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Virtual hardware version, `vmx-NN` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareVersion(u32);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HardwareVersionError {
    #[error("hardware version {0} is out of range (4..=21)")]
    OutOfRange(u32),

    #[error("invalid hardware version id {0:?}, expected vmx-NN")]
    InvalidId(String),
}

impl HardwareVersion {
    pub const MIN: u32 = 4;
    pub const MAX: u32 = 21;

    pub fn new(number: u32) -> Result<Self, HardwareVersionError> {
        if (Self::MIN..=Self::MAX).contains(&number) {
            Ok(Self(number))
        } else {
            Err(HardwareVersionError::OutOfRange(number))
        }
    }

    /// `0` means "not set" in configuration.
    pub fn from_number(number: u32) -> Result<Option<Self>, HardwareVersionError> {
        match number {
            0 => Ok(None),
            n => Self::new(n).map(Some),
        }
    }

    pub fn parse_id(id: &str) -> Result<Self, HardwareVersionError> {
        let number = id
            .strip_prefix("vmx-")
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| HardwareVersionError::InvalidId(id.to_string()))?;
        Self::new(number)
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn id(self) -> String {
        format!("vmx-{:02}", self.0)
    }
}

impl Display for HardwareVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "vmx-{:02}", self.0)
    }
}

impl TryFrom<String> for HardwareVersion {
    type Error = HardwareVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_id(&value)
    }
}

impl From<HardwareVersion> for String {
    fn from(value: HardwareVersion) -> Self {
        value.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip() {
        let version = HardwareVersion::parse_id("vmx-19").unwrap();
        assert_eq!(version.number(), 19);
        assert_eq!(version.id(), "vmx-19");
        assert_eq!(HardwareVersion::new(8).unwrap().id(), "vmx-08");
        assert_eq!(HardwareVersion::parse_id("vmx-08").unwrap().number(), 8);
    }

    #[test]
    fn zero_is_unset() {
        assert_eq!(HardwareVersion::from_number(0), Ok(None));
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        assert_eq!(
            HardwareVersion::new(22),
            Err(HardwareVersionError::OutOfRange(22))
        );
        assert!(matches!(
            HardwareVersion::parse_id("19"),
            Err(HardwareVersionError::InvalidId(_))
        ));
    }
}
