//! Per-resource configuration and recorded state.
//!
//! A [`ResourceData`] holds three layers of values keyed by field name:
//! the recorded state from the previous cycle, the desired configuration
//! (with schema defaults filled in) and values written during this cycle.
//! Reads see the newest layer that has the key.

use displaydoc::Display;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;
use vsphere_params::{ParamTypes, ParamValues};

#[derive(Debug, Clone, Error, Display, PartialEq)]
pub enum DataError {
    /// Field "{key}" is not a {expected}: {got}
    WrongType {
        key: String,
        expected: &'static str,
        got: Value,
    },
}

pub type ConnectionInfo = IndexMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    id: String,
    state: ParamValues,
    config: ParamValues,
    set: ParamValues,
    conn_info: ConnectionInfo,
}

impl ResourceData {
    /// Desired configuration over schema defaults, against recorded state.
    pub fn new(schema: &ParamTypes, config: ParamValues, state: ParamValues) -> Self {
        let mut merged = schema.defaults();
        for (key, value) in config.iter() {
            if !value.is_null() {
                merged.insert(key.clone(), value.clone());
            }
        }
        Self {
            id: String::new(),
            state,
            config: merged,
            set: ParamValues::new(),
            conn_info: ConnectionInfo::new(),
        }
    }

    /// An empty record to flatten live state into.
    pub fn scratch(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Fold written values into recorded state and configuration, so the
    /// record reports no pending changes.
    pub fn settle(mut self) -> Self {
        let set = std::mem::take(&mut self.set);
        for (key, value) in set.iter() {
            self.state.insert(key.clone(), value.clone());
            self.config.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn conn_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    pub fn set_conn_info(&mut self, conn_info: ConnectionInfo) {
        self.conn_info = conn_info;
    }

    /// Current value at a dotted path such as `ovf_deploy.0.enable_hidden_properties`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.set, path)
            .or_else(|| lookup(&self.config, path))
            .or_else(|| lookup(&self.state, path))
            .filter(|v| !v.is_null())
    }

    /// Recorded and current value.
    pub fn get_change(&self, path: &str) -> (Option<&Value>, Option<&Value>) {
        let old = lookup(&self.state, path).filter(|v| !v.is_null());
        (old, self.get(path))
    }

    pub fn has_change(&self, path: &str) -> bool {
        let (old, new) = self.get_change(path);
        let changed = old != new;
        if changed {
            trace!(field = path, ?old, ?new, "field changed");
        }
        changed
    }

    /// Current value, when set to something other than its zero value.
    pub fn get_ok(&self, path: &str) -> Option<&Value> {
        self.get(path).filter(|v| !is_zero(v))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.set.insert(key, value.into());
    }

    /// Drop a key from every layer.
    pub fn clear(&mut self, key: &str) {
        self.set.insert(key, Value::Null);
        self.config.remove(key);
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, DataError> {
        match self.get(path) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(wrong_type(path, "boolean", other)),
        }
    }

    pub fn get_int(&self, path: &str) -> Result<i64, DataError> {
        match self.get(path) {
            None => Ok(0),
            Some(value @ Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| wrong_type(path, "integer", value)),
            Some(other) => Err(wrong_type(path, "integer", other)),
        }
    }

    pub fn get_str(&self, path: &str) -> Result<&str, DataError> {
        match self.get(path) {
            None => Ok(""),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(wrong_type(path, "string", other)),
        }
    }

    pub fn get_list(&self, path: &str) -> Result<&[Value], DataError> {
        match self.get(path) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(wrong_type(path, "list", other)),
        }
    }

    pub fn get_string_map(&self, path: &str) -> Result<IndexMap<String, String>, DataError> {
        string_map(path, self.get(path))
    }

    /// Recorded and current string maps.
    pub fn get_string_map_change(
        &self,
        path: &str,
    ) -> Result<(IndexMap<String, String>, IndexMap<String, String>), DataError> {
        let (old, new) = self.get_change(path);
        Ok((string_map(path, old)?, string_map(path, new)?))
    }

    /// Recorded state after this cycle's writes.
    pub fn state(&self) -> ParamValues {
        let mut state = self.state.clone();
        for (key, value) in self.set.iter() {
            if value.is_null() {
                state.remove(key);
            } else {
                state.insert(key.clone(), value.clone());
            }
        }
        state
    }
}

fn wrong_type(key: &str, expected: &'static str, got: &Value) -> DataError {
    DataError::WrongType {
        key: key.to_string(),
        expected,
        got: got.clone(),
    }
}

fn string_map(path: &str, value: Option<&Value>) -> Result<IndexMap<String, String>, DataError> {
    match value {
        None => Ok(IndexMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                other => Err(wrong_type(&format!("{path}.{k}"), "string", other)),
            })
            .collect(),
        Some(other) => Err(wrong_type(path, "map", other)),
    }
}

fn lookup<'a>(values: &'a ParamValues, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = values.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vsphere_params::{ParamField, ParamType};

    use super::*;

    fn values(value: Value) -> ParamValues {
        ParamValues::from_value(value).unwrap()
    }

    fn schema() -> ParamTypes {
        ParamTypes::new()
            .field("num_cpus", ParamField::new(ParamType::Integer).default(1))
            .field("firmware", ParamField::new(ParamType::String).default("bios"))
    }

    #[test]
    fn defaults_fill_unset_config() {
        let data = ResourceData::new(&schema(), values(json!({ "num_cpus": 4 })), ParamValues::new());
        assert_eq!(data.get_int("num_cpus").unwrap(), 4);
        assert_eq!(data.get_str("firmware").unwrap(), "bios");
    }

    #[test]
    fn change_compares_recorded_and_current() {
        let data = ResourceData::new(
            &schema(),
            values(json!({ "num_cpus": 4, "firmware": "bios" })),
            values(json!({ "num_cpus": 2, "firmware": "bios" })),
        );
        assert!(data.has_change("num_cpus"));
        assert!(!data.has_change("firmware"));
        assert_eq!(data.get_change("num_cpus"), (Some(&json!(2)), Some(&json!(4))));
    }

    #[test]
    fn nested_paths() {
        let data = ResourceData::new(
            &ParamTypes::new(),
            values(json!({ "ovf_deploy": [{ "enable_hidden_properties": true }] })),
            ParamValues::new(),
        );
        assert!(data.get_bool("ovf_deploy.0.enable_hidden_properties").unwrap());
        assert!(!data.get_bool("ovf_deploy.1.enable_hidden_properties").unwrap());
    }

    #[test]
    fn get_ok_skips_zero_values() {
        let mut data = ResourceData::scratch("vm-1");
        data.set("annotation", "");
        data.set("memory", 0);
        data.set("name", "web");
        assert!(data.get_ok("annotation").is_none());
        assert!(data.get_ok("memory").is_none());
        assert_eq!(data.get_ok("name"), Some(&json!("web")));
    }

    #[test]
    fn settled_scratch_has_no_changes() {
        let mut data = ResourceData::scratch("vm-1");
        data.set("num_cpus", 2);
        assert!(data.has_change("num_cpus"));
        let data = data.settle();
        assert!(!data.has_change("num_cpus"));
        assert_eq!(data.get_int("num_cpus").unwrap(), 2);
    }

    #[test]
    fn wrong_types_are_errors() {
        let mut data = ResourceData::scratch("vm-1");
        data.set("num_cpus", "two");
        assert!(matches!(
            data.get_int("num_cpus"),
            Err(DataError::WrongType { expected: "integer", .. })
        ));
    }

    #[test]
    fn state_applies_writes_and_clears() {
        let mut data = ResourceData::new(
            &ParamTypes::new(),
            ParamValues::new(),
            values(json!({ "uuid": "a", "moid": "vm-1" })),
        );
        data.set("uuid", "b");
        data.clear("moid");
        let state = data.state();
        assert_eq!(state.get("uuid"), Some(&json!("b")));
        assert!(state.get("moid").is_none());
    }
}
