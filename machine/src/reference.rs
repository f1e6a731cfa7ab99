use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

pub const VIRTUAL_MACHINE_TYPE: &str = "VirtualMachine";
pub const DISTRIBUTED_VIRTUAL_SWITCH_TYPE: &str = "VmwareDistributedVirtualSwitch";

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManagedObjectReference {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectReference {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl Display for ManagedObjectReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Objects attached to a single tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachedObjects {
    pub tag_id: String,
    pub object_ids: Vec<ManagedObjectReference>,
}

impl AttachedObjects {
    /// Objects present in both, in `self`'s order.
    pub fn intersection(&self, other: &AttachedObjects) -> AttachedObjects {
        AttachedObjects {
            tag_id: self.tag_id.clone(),
            object_ids: self
                .object_ids
                .iter()
                .filter(|id| other.object_ids.contains(id))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_keeps_left_order() {
        let vm = |v: &str| ManagedObjectReference::new(VIRTUAL_MACHINE_TYPE, v);
        let a = AttachedObjects {
            tag_id: "urn:tag:a".to_string(),
            object_ids: vec![vm("vm-3"), vm("vm-1"), vm("vm-2")],
        };
        let b = AttachedObjects {
            tag_id: "urn:tag:b".to_string(),
            object_ids: vec![vm("vm-2"), vm("vm-3")],
        };
        assert_eq!(a.intersection(&b).object_ids, vec![vm("vm-3"), vm("vm-2")]);
    }
}
