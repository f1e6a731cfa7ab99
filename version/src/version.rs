use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The product version reported by a connected vSphere endpoint.
///
/// Two versions are only ordered against each other when they belong to the
/// same product: an ESXi host and a vCenter server never compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VSphereVersion {
    #[serde(default)]
    pub product: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    #[serde(default)]
    pub build: u64,
}

impl VSphereVersion {
    pub fn new(product: impl Into<String>, major: u32, minor: u32, patch: u32, build: u64) -> Self {
        Self {
            product: product.into(),
            major,
            minor,
            patch,
            build,
        }
    }

    /// A version with the same product as `self`, used to build minimums.
    pub fn with_triple(&self, major: u32, minor: u32, patch: u32) -> Self {
        Self::new(self.product.clone(), major, minor, patch, 0)
    }

    pub fn newer(&self, other: &VSphereVersion) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Greater))
    }

    pub fn at_least(&self, other: &VSphereVersion) -> bool {
        matches!(
            self.partial_cmp(other),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }

    fn key(&self) -> (u32, u32, u32, u64) {
        (self.major, self.minor, self.patch, self.build)
    }
}

impl PartialOrd for VSphereVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.product != other.product {
            return None;
        }
        Some(self.key().cmp(&other.key()))
    }
}

impl Display for VSphereVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.product.is_empty() {
            write!(f, "{} ", self.product)?;
        }
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.build != 0 {
            write!(f, " build-{}", self.build)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseVersionError {
    #[error("expected MAJOR.MINOR.PATCH, got {0:?}")]
    Format(String),

    #[error("invalid version component {component:?} in {input:?}")]
    Component { input: String, component: String },
}

/// Parses `MAJOR.MINOR.PATCH`, optionally followed by `.BUILD` or
/// ` build-BUILD`. The product is left empty.
impl FromStr for VSphereVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (triple, build) = match s.split_once(" build-") {
            Some((triple, build)) => (triple, Some(build)),
            None => (s, None),
        };

        let component = |part: &str| -> Result<u64, ParseVersionError> {
            part.parse::<u64>()
                .map_err(|_| ParseVersionError::Component {
                    input: s.to_string(),
                    component: part.to_string(),
                })
        };

        let parts: Vec<&str> = triple.split('.').collect();
        let (major, minor, patch, dotted_build) = match parts.as_slice() {
            [major, minor, patch] => (*major, *minor, *patch, None),
            [major, minor, patch, build] => (*major, *minor, *patch, Some(*build)),
            _ => return Err(ParseVersionError::Format(s.to_string())),
        };

        let narrow = |part: &str| -> Result<u32, ParseVersionError> {
            u32::try_from(component(part)?).map_err(|_| ParseVersionError::Component {
                input: s.to_string(),
                component: part.to_string(),
            })
        };

        let build = match build.or(dotted_build) {
            Some(build) => component(build)?,
            None => 0,
        };

        Ok(Self {
            product: String::new(),
            major: narrow(major)?,
            minor: narrow(minor)?,
            patch: narrow(patch)?,
            build,
        })
    }
}
