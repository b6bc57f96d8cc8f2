//! Field annotations derived from type-descriptor records
//!
//! A descriptor record is one entry of a descriptor instance's `fields` list,
//! shaped the way the service reports a field. [`promote_field`] projects it
//! onto core annotations with fixed structural rules.

use cairn_core::annotations::{DEFAULT, ENFORCE_VALUE, REQUIRED, RESTRICTION, VALUES};
use cairn_core::{ElemID, Value, Values};
use serde_json::{Map, json};

const FULL_NAME: &str = "fullName";
const TYPE: &str = "type";
const REQUIRED_MEMBER: &str = "required";
const DEFAULT_VALUE: &str = "defaultValue";
const VALUE_SET: &str = "valueSet";
const VALUE_SET_DEFINITION: &str = "valueSetDefinition";
const VALUE_SET_VALUE: &str = "value";
const VALUE_DEFAULT: &str = "default";
const RESTRICTED: &str = "restricted";
const CONTROLLING_FIELD: &str = "controllingField";
const VALUE_SETTINGS: &str = "valueSettings";
const CONTROLLING_FIELD_VALUE: &str = "controllingFieldValue";
const VALUE_NAME: &str = "valueName";
const SUMMARY_FILTER_ITEMS: &str = "summaryFilterItems";
const LOOKUP_FILTER: &str = "lookupFilter";
const FILTER_ITEMS: &str = "filterItems";
const IS_OPTIONAL: &str = "isOptional";
const ERROR_MESSAGE: &str = "errorMessage";

/// Annotation holding the controlling-field map of a dependent picklist.
pub const FIELD_DEPENDENCY: &str = "fieldDependency";

const FILTER_ITEM_KEYS: [&str; 4] = ["field", "operation", "value", "valueField"];
const LOOKUP_FILTER_KEYS: [&str; 5] = ["active", "booleanFilter", ERROR_MESSAGE, "infoMessage", IS_OPTIONAL];
const LOOKUP_FILTER_FLAGS: [&str; 2] = ["active", IS_OPTIONAL];

/// Field types whose default is always a list.
const MULTI_SELECT_TYPES: [&str; 2] = ["multipicklist", "combobox"];

/// A field synthesized from one descriptor record.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotedField {
    pub name: String,
    pub type_id: ElemID,
    pub annotations: Values,
}

/// Booleans as the service writes them: real booleans or `"true"`/`"false"`.
fn boolean_like(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Value {
    boolean_like(value).map(Value::Bool).unwrap_or_else(|| value.clone())
}

/// A member that may be one record or a list of records.
fn records(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(single) => vec![single],
        _ => Vec::new(),
    }
}

fn filter_item(record: &Map<String, Value>) -> Value {
    let item: Map<String, Value> = FILTER_ITEM_KEYS
        .iter()
        .filter_map(|key| record.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect();
    Value::Object(item)
}

fn filter_items(value: &Value) -> Value {
    Value::Array(records(value).into_iter().map(filter_item).collect())
}

fn lookup_filter(value: &Value) -> Option<Value> {
    let record = value.as_object()?;
    let mut filter = Map::new();
    for key in LOOKUP_FILTER_KEYS {
        if let Some(member) = record.get(key) {
            let member = if LOOKUP_FILTER_FLAGS.contains(&key) {
                coerce_bool(member)
            } else {
                member.clone()
            };
            filter.insert(key.to_string(), member);
        }
    }
    // An optional filter never blocks a save, so it carries no error message.
    if filter.get(IS_OPTIONAL) == Some(&Value::Bool(true)) {
        filter.remove(ERROR_MESSAGE);
    }
    if let Some(items) = record.get(FILTER_ITEMS) {
        filter.insert(FILTER_ITEMS.to_string(), filter_items(items));
    }
    Some(Value::Object(filter))
}

fn field_dependency(value_set: &Map<String, Value>) -> Option<Value> {
    let controlling = value_set.get(CONTROLLING_FIELD)?;
    let settings: Vec<Value> = value_set
        .get(VALUE_SETTINGS)
        .map(records)
        .unwrap_or_default()
        .into_iter()
        .map(|setting| {
            let controlling_values = match setting.get(CONTROLLING_FIELD_VALUE) {
                Some(Value::Array(values)) => values.clone(),
                Some(Value::Null) | None => Vec::new(),
                Some(single) => vec![single.clone()],
            };
            let mut projected = Map::new();
            projected.insert(CONTROLLING_FIELD_VALUE.to_string(), Value::Array(controlling_values));
            if let Some(name) = setting.get(VALUE_NAME) {
                projected.insert(VALUE_NAME.to_string(), name.clone());
            }
            Value::Object(projected)
        })
        .collect();
    Some(json!({
        CONTROLLING_FIELD: controlling,
        VALUE_SETTINGS: settings,
    }))
}

fn apply_value_set(value_set: &Map<String, Value>, multi_select: bool, annotations: &mut Values) {
    let definition_values = value_set
        .get(VALUE_SET_DEFINITION)
        .and_then(Value::as_object)
        .and_then(|definition| definition.get(VALUE_SET_VALUE))
        .map(records)
        .unwrap_or_default();

    if !definition_values.is_empty() {
        let names: Vec<Value> = definition_values
            .iter()
            .filter_map(|v| v.get(FULL_NAME).cloned())
            .collect();
        let defaults: Vec<Value> = definition_values
            .iter()
            .filter(|v| v.get(VALUE_DEFAULT).and_then(boolean_like).unwrap_or(false))
            .filter_map(|v| v.get(FULL_NAME).cloned())
            .collect();
        annotations.insert(VALUES.to_string(), Value::Array(names));
        match defaults.len() {
            0 => {}
            1 if !multi_select => {
                annotations.insert(DEFAULT.to_string(), defaults[0].clone());
            }
            _ => {
                annotations.insert(DEFAULT.to_string(), Value::Array(defaults));
            }
        }
    }

    if let Some(restricted) = value_set.get(RESTRICTED).and_then(boolean_like) {
        annotations.insert(RESTRICTION.to_string(), json!({ ENFORCE_VALUE: restricted }));
    }
    if let Some(dependency) = field_dependency(value_set) {
        annotations.insert(FIELD_DEPENDENCY.to_string(), dependency);
    }
}

/// Project one descriptor record onto a field. Records without a string
/// `fullName` describe nothing and yield `None`.
pub fn promote_field(record: &Map<String, Value>, adapter: &str) -> Option<PromotedField> {
    let name = record.get(FULL_NAME)?.as_str()?.to_string();
    let service_type = record
        .get(TYPE)
        .and_then(Value::as_str)
        .map(str::to_lowercase);
    let type_id = ElemID::new_type(adapter, service_type.as_deref().unwrap_or("string"));
    let multi_select = service_type
        .as_deref()
        .is_some_and(|t| MULTI_SELECT_TYPES.contains(&t));

    let mut annotations = Values::new();
    if let Some(value_set) = record.get(VALUE_SET).and_then(Value::as_object) {
        apply_value_set(value_set, multi_select, &mut annotations);
    }

    for (key, value) in record {
        match key.as_str() {
            FULL_NAME | TYPE | VALUE_SET => {}
            REQUIRED_MEMBER => {
                if let Some(required) = boolean_like(value) {
                    annotations.insert(REQUIRED.to_string(), Value::Bool(required));
                }
            }
            DEFAULT_VALUE => {
                annotations.insert(DEFAULT.to_string(), coerce_bool(value));
            }
            SUMMARY_FILTER_ITEMS => {
                annotations.insert(key.clone(), filter_items(value));
            }
            LOOKUP_FILTER => {
                if let Some(filter) = lookup_filter(value) {
                    annotations.insert(key.clone(), filter);
                }
            }
            _ => {
                annotations.insert(key.clone(), value.clone());
            }
        }
    }

    Some(PromotedField {
        name,
        type_id,
        annotations,
    })
}
