//! Field schemas and values.

use displaydoc::Display;
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Boolean,
    String,
    Integer,
    List {
        item: Box<ParamType>,
        max_items: Option<usize>,
    },
    Map {
        value: Box<ParamType>,
    },
    Object {
        fields: ParamTypes,
    },
}

impl ParamType {
    pub fn list(item: ParamType) -> Self {
        ParamType::List {
            item: Box::new(item),
            max_items: None,
        }
    }

    /// A single nested block, as used for `ovf_deploy` and friends.
    pub fn block(fields: ParamTypes) -> Self {
        ParamType::List {
            item: Box::new(ParamType::Object { fields }),
            max_items: Some(1),
        }
    }

    pub fn map(value: ParamType) -> Self {
        ParamType::Map {
            value: Box::new(value),
        }
    }
}

/// Value constraints checked after the type matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    IntBetween(i64, i64),
    IntAtLeast(i64),
    StringInSlice(&'static [&'static str]),
    StringLenBetween(usize, usize),
}

impl Validation {
    fn check(&self, value: &Value) -> Result<(), ValidateValueError> {
        match (self, value) {
            (Validation::IntBetween(min, max), Value::Number(n)) => match n.as_i64() {
                Some(i) if (*min..=*max).contains(&i) => Ok(()),
                _ => Err(ValidateValueError::OutOfRange {
                    value: value.clone(),
                    min: *min,
                    max: *max,
                }),
            },
            (Validation::IntAtLeast(min), Value::Number(n)) => match n.as_i64() {
                Some(i) if i >= *min => Ok(()),
                _ => Err(ValidateValueError::OutOfRange {
                    value: value.clone(),
                    min: *min,
                    max: i64::MAX,
                }),
            },
            (Validation::StringInSlice(allowed), Value::String(s)) => {
                if allowed.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(ValidateValueError::NotAllowed {
                        value: s.clone(),
                        allowed,
                    })
                }
            }
            (Validation::StringLenBetween(min, max), Value::String(s)) => {
                let len = s.chars().count();
                if (*min..=*max).contains(&len) {
                    Ok(())
                } else {
                    Err(ValidateValueError::BadLength {
                        len,
                        min: *min,
                        max: *max,
                    })
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamField {
    typ: ParamType,
    optional: bool,
    computed: bool,
    configurable: bool,
    force_new: bool,
    default: Option<Value>,
    validation: Option<Validation>,
}

impl ParamField {
    pub const fn new(typ: ParamType) -> Self {
        Self {
            typ,
            optional: false,
            computed: false,
            configurable: true,
            force_new: false,
            default: None,
            validation: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set by reads only. Implies optional.
    pub fn computed(mut self) -> Self {
        self.optional = true;
        self.computed = true;
        self.configurable = false;
        self
    }

    /// Configurable, but filled in by reads when left unset.
    pub fn optional_computed(mut self) -> Self {
        self.optional = true;
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Implies optional.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.optional = true;
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn typ(&self) -> &ParamType {
        &self.typ
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    pub fn is_force_new(&self) -> bool {
        self.force_new
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn validation(&self) -> Option<&Validation> {
        self.validation.as_ref()
    }
}

/// A struct of named fields, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTypes(IndexMap<String, ParamField>);

impl ParamTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, field: ParamField) -> Self {
        self.0.insert(key.into(), field);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamField> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamField)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields that can only be set when the object is created.
    pub fn force_new_keys(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, field)| field.is_force_new())
            .map(|(key, _)| key.as_str())
    }

    /// Top-level defaults, for fields that declare one.
    pub fn defaults(&self) -> ParamValues {
        ParamValues(
            self.0
                .iter()
                .filter_map(|(key, field)| field.default.clone().map(|v| (key.clone(), v)))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues(IndexMap<String, Value>);

#[derive(Debug, Error, Display)]
pub enum ParamValuesFromTypeError {
    /// Failed to serialize value: {0}
    Serialize(#[source] serde_json::Error),
    /// Expected an object mapping parameter names to values
    NotAnObject,
}

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_type<T>(value: T) -> Result<Self, ParamValuesFromTypeError>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(value).map_err(ParamValuesFromTypeError::Serialize)?;
        Self::from_value(value).ok_or(ParamValuesFromTypeError::NotAnObject)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(object) = value else {
            return None;
        };
        Some(ParamValues(object.into_iter().collect()))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0.into_iter().collect())
    }

    pub fn into_type<T>(self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.into_value())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for ParamValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        ParamValues(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Error, Display)]
pub enum ValidateValueError {
    /// Expected {expected:?}, got {got}
    TypeMismatch { expected: Box<ParamType>, got: Value },
    /// Value {value} is not in {min}..={max}
    OutOfRange { value: Value, min: i64, max: i64 },
    /// Value {value:?} is not one of {allowed:?}
    NotAllowed {
        value: String,
        allowed: &'static [&'static str],
    },
    /// Length {len} is not in {min}..={max}
    BadLength { len: usize, min: usize, max: usize },
    /// List has {len} items, at most {max} allowed
    TooManyItems { len: usize, max: usize },
    /// Invalid list item at index {index}: {error}
    ListItem {
        index: usize,
        error: Box<ValidateValueError>,
    },
    /// Invalid map entry for key "{key}": {error}
    MapEntry {
        key: String,
        error: Box<ValidateValueError>,
    },
    /// Invalid object: {0}
    Object(Box<ParamValidationErrors>),
}

#[derive(Debug, Clone, Error, Display)]
pub enum ParamValidationError {
    /// Missing required parameter "{key}"
    MissingParam { key: String },
    /// Unknown parameter "{key}"
    UnknownParam { key: String },
    /// Parameter "{key}" is computed and cannot be set
    ComputedParam { key: String },
    /// Invalid parameter "{key}": {error}
    InvalidParam {
        key: String,
        error: Box<ValidateValueError>,
    },
}

#[derive(Debug, Clone, Error)]
pub struct ParamValidationErrors {
    pub errors: Vec<ParamValidationError>,
}

impl std::fmt::Display for ParamValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parameter validation failed")?;
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl ParamValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

fn mismatch(typ: &ParamType, value: &Value) -> ValidateValueError {
    ValidateValueError::TypeMismatch {
        expected: Box::new(typ.clone()),
        got: value.clone(),
    }
}

fn validate_type(param_type: &ParamType, value: &Value) -> Result<(), ValidateValueError> {
    match param_type {
        ParamType::Boolean => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(mismatch(param_type, value)),
        },

        ParamType::String => match value {
            Value::String(_) => Ok(()),
            _ => Err(mismatch(param_type, value)),
        },

        // Integers are never coerced from strings or floats.
        ParamType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            _ => Err(mismatch(param_type, value)),
        },

        ParamType::List { item, max_items } => {
            let Value::Array(items) = value else {
                return Err(mismatch(param_type, value));
            };

            if let Some(max) = max_items {
                if items.len() > *max {
                    return Err(ValidateValueError::TooManyItems {
                        len: items.len(),
                        max: *max,
                    });
                }
            }

            for (index, item_value) in items.iter().enumerate() {
                if let Err(error) = validate_type(item, item_value) {
                    return Err(ValidateValueError::ListItem {
                        index,
                        error: Box::new(error),
                    });
                }
            }

            Ok(())
        }

        ParamType::Map { value: value_type } => {
            let Value::Object(map) = value else {
                return Err(mismatch(param_type, value));
            };

            for (key, entry_value) in map.iter() {
                if let Err(error) = validate_type(value_type, entry_value) {
                    return Err(ValidateValueError::MapEntry {
                        key: key.clone(),
                        error: Box::new(error),
                    });
                }
            }

            Ok(())
        }

        ParamType::Object { fields } => {
            let Value::Object(map) = value else {
                return Err(mismatch(param_type, value));
            };
            let values: ParamValues = map.clone().into_iter().collect();
            validate(fields, &values).map_err(|errors| ValidateValueError::Object(Box::new(errors)))
        }
    }
}

/// Validate desired configuration values against a schema.
///
/// Null values count as absent. Computed fields may not be configured.
pub fn validate(
    param_types: &ParamTypes,
    param_values: &ParamValues,
) -> Result<(), ParamValidationErrors> {
    let mut errors: Vec<ParamValidationError> = Vec::new();

    for (key, field) in param_types.iter() {
        match param_values.get(key).filter(|v| !v.is_null()) {
            Some(value) => {
                if field.computed && !field.configurable {
                    errors.push(ParamValidationError::ComputedParam { key: key.clone() });
                    continue;
                }
                let result = validate_type(&field.typ, value).and_then(|()| match &field.validation {
                    Some(validation) => validation.check(value),
                    None => Ok(()),
                });
                if let Err(error) = result {
                    errors.push(ParamValidationError::InvalidParam {
                        key: key.clone(),
                        error: Box::new(error),
                    });
                }
            }
            None => {
                if !field.optional {
                    errors.push(ParamValidationError::MissingParam { key: key.clone() });
                }
            }
        }
    }

    for (key, _) in param_values.iter() {
        if param_types.get(key).is_none() {
            errors.push(ParamValidationError::UnknownParam { key: key.clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ParamValidationErrors { errors })
    }
}
