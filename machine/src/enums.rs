use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind} {value:?}, expected one of {allowed:?}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
    pub allowed: &'static [&'static str],
}

/// A closed set of string values as the vSphere API spells them.
macro_rules! string_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALLOWED: &'static [&'static str] = &[$($value),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(UnknownValue {
                        kind: stringify!($name),
                        value: other.to_string(),
                        allowed: Self::ALLOWED,
                    }),
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    pub enum SharesLevel {
        Low = "low",
        Normal = "normal",
        High = "high",
        Custom = "custom",
    }
}

impl Default for SharesLevel {
    fn default() -> Self {
        SharesLevel::Normal
    }
}

string_enum! {
    pub enum LatencySensitivityLevel {
        Low = "low",
        Normal = "normal",
        Medium = "medium",
        High = "high",
    }
}

impl Default for LatencySensitivityLevel {
    fn default() -> Self {
        LatencySensitivityLevel::Normal
    }
}

string_enum! {
    /// Hardware virtualization (non-nested) setting.
    pub enum VirtualExecUsage {
        HvAuto = "hvAuto",
        HvOn = "hvOn",
        HvOff = "hvOff",
    }
}

string_enum! {
    /// EPT/RVI hardware memory virtualization setting.
    pub enum VirtualMmuUsage {
        Automatic = "automatic",
        On = "on",
        Off = "off",
    }
}

string_enum! {
    pub enum SwapPlacement {
        Inherit = "inherit",
        VmDirectory = "vmDirectory",
        HostLocal = "hostLocal",
    }
}

string_enum! {
    pub enum UpgradePolicy {
        Manual = "manual",
        UpgradeAtPowerCycle = "upgradeAtPowerCycle",
    }
}

string_enum! {
    pub enum Firmware {
        Bios = "bios",
        Efi = "efi",
    }
}

string_enum! {
    pub enum PowerState {
        PoweredOn = "poweredOn",
        PoweredOff = "poweredOff",
        Suspended = "suspended",
    }
}

string_enum! {
    pub enum ArrayUpdateOperation {
        Add = "add",
        Remove = "remove",
        Edit = "edit",
    }
}

string_enum! {
    /// Services a host vNIC can be selected for.
    pub enum VnicService {
        Vsan = "vsan",
        Vmotion = "vmotion",
        Management = "management",
    }
}
