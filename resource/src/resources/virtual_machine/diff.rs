use tracing::debug;
use vsphere_machine::{ConfigInfo, MachineConfig};
use vsphere_store::ResourceData;

use super::codec::{CodecError, expand, flatten};
use super::restart::RestartRequirement;
use crate::Environment;

/// The payload to send, and whether it differs from the live machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Changed {
    pub spec: MachineConfig,
    pub changed: bool,
    pub differences: Vec<&'static str>,
}

/// Compare the desired configuration in `data` against `info`.
///
/// The old side is rebuilt by flattening `info` into a scratch record and
/// expanding it again, so both sides go through the same codec. The hardware
/// version is compared but never sent on update.
pub fn changed(
    data: &ResourceData,
    info: &ConfigInfo,
    env: &Environment,
    restart: &mut RestartRequirement,
) -> Result<Changed, CodecError> {
    let mut scratch = ResourceData::scratch(data.id());
    flatten(&mut scratch, info, env)?;
    let scratch = scratch.settle();
    let old = expand(&scratch, env, Some(info), &mut RestartRequirement::new())?;

    let mut spec = expand(data, env, Some(info), restart)?;
    let differences = old.differences(&spec);
    spec.version = None;

    let changed = !differences.is_empty();
    if changed {
        debug!(uuid = %info.uuid, ?differences, "virtual machine configuration changed");
    }
    Ok(Changed {
        spec,
        changed,
        differences,
    })
}
