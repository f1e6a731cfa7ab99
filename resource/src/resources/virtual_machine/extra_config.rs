use serde_json::{Map, Value};
use vsphere_machine::OptionValue;
use vsphere_store::ResourceData;

use super::codec::{CodecError, opt_bool};
use super::restart::RestartRequirement;

/// The extra-config entries to send: removals for keys dropped from
/// configuration, in recorded order, then new and changed keys.
///
/// Empty when `extra_config` is unchanged. Any change requires a restart
/// unless `extra_config_reboot_required` is false.
pub fn expand_extra_config(
    data: &ResourceData,
    restart: &mut RestartRequirement,
) -> Result<Vec<OptionValue>, CodecError> {
    if !data.has_change("extra_config") {
        return Ok(Vec::new());
    }
    if opt_bool(data, "extra_config_reboot_required")?.unwrap_or(true) {
        restart.require("extra_config");
    }

    let (old, new) = data.get_string_map_change("extra_config")?;
    let removals = old
        .keys()
        .filter(|key| !new.contains_key(*key))
        .map(OptionValue::removal);
    let updates = new
        .iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(key, value)| OptionValue::new(key, value));
    Ok(removals.chain(updates).collect())
}

/// Record only the keys configuration already tracks, so values that the
/// endpoint maintains on its own never show up as drift.
pub fn flatten_extra_config(
    data: &mut ResourceData,
    options: &[OptionValue],
) -> Result<(), CodecError> {
    if options.is_empty() {
        return Ok(());
    }
    let tracked = data.get_string_map("extra_config")?;
    let recorded: Map<String, Value> = options
        .iter()
        .filter(|option| tracked.contains_key(&option.key))
        .map(|option| (option.key.clone(), Value::String(option.value.clone())))
        .collect();
    data.set("extra_config", Value::Object(recorded));
    Ok(())
}
