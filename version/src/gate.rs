use std::fmt::{self, Display, Formatter};

use crate::VSphereVersion;

/// Configuration fields that only exist on newer vSphere releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatedField {
    EfiSecureBootEnabled,
    VbsEnabled,
    VvtdEnabled,
    /// The split of time sync into "allowed" and "periodic".
    SyncTimeWithHostPeriodically,
}

impl GatedField {
    pub const ALL: [GatedField; 4] = [
        GatedField::EfiSecureBootEnabled,
        GatedField::VbsEnabled,
        GatedField::VvtdEnabled,
        GatedField::SyncTimeWithHostPeriodically,
    ];

    /// Minimum (major, minor, patch).
    pub const fn minimum(self) -> (u32, u32, u32) {
        match self {
            GatedField::EfiSecureBootEnabled => (6, 5, 0),
            GatedField::VbsEnabled | GatedField::VvtdEnabled => (6, 7, 0),
            GatedField::SyncTimeWithHostPeriodically => (7, 0, 1),
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            GatedField::EfiSecureBootEnabled => "efi_secure_boot_enabled",
            GatedField::VbsEnabled => "vbs_enabled",
            GatedField::VvtdEnabled => "vvtd_enabled",
            GatedField::SyncTimeWithHostPeriodically => "sync_time_with_host_periodically",
        }
    }
}

impl Display for GatedField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.minimum();
        write!(f, "{} (>= {}.{}.{})", self.key(), major, minor, patch)
    }
}

/// Whether `field` may be read from or written to an endpoint at `version`.
///
/// The minimum is built with the endpoint's own product, so the gate only
/// compares the numeric parts.
pub fn supported(field: GatedField, version: &VSphereVersion) -> bool {
    let (major, minor, patch) = field.minimum();
    version.at_least(&version.with_triple(major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> VSphereVersion {
        let mut v: VSphereVersion = s.parse().unwrap();
        v.product = "VMware vCenter Server".to_string();
        v
    }

    #[test]
    fn periodic_time_sync_needs_7_0_1() {
        let field = GatedField::SyncTimeWithHostPeriodically;
        assert!(!supported(field, &version("6.7.0")));
        assert!(!supported(field, &version("7.0.0")));
        assert!(supported(field, &version("7.0.1")));
        assert!(supported(field, &version("8.0.2")));
    }

    #[test]
    fn vbs_and_vvtd_need_6_7() {
        for field in [GatedField::VbsEnabled, GatedField::VvtdEnabled] {
            assert!(!supported(field, &version("6.5.0")));
            assert!(supported(field, &version("6.7.0")));
        }
    }

    #[test]
    fn build_number_counts_toward_minimum() {
        let field = GatedField::EfiSecureBootEnabled;
        assert!(supported(field, &version("6.5.0.4564106")));
        assert!(!supported(field, &version("6.0.0.3620759")));
    }
}
