use super::data::{MappingStore, QualifierEntry};
use super::{MappingDirection, MappingError, MappingIssue, MappingReason};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Attribute set in insertion order.
pub type Attributes = serde_json::Map<String, JsonValue>;

/// Result of a permissive mapping call: the translated value plus every
/// issue that was tolerated along the way.
#[derive(Clone, Debug, PartialEq)]
pub struct Mapped<T> {
    pub value: T,
    pub issues: Vec<MappingIssue>,
}

impl<T> Mapped<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Applies the key-value, key and value layers of a qualifier's tables.
#[derive(Clone, Copy, Debug)]
pub struct AttributeMapper<'a> {
    store: &'a MappingStore,
}

impl<'a> AttributeMapper<'a> {
    pub fn new(store: &'a MappingStore) -> Self {
        Self { store }
    }

    pub fn map_request_attributes(
        &self,
        qualifier: &str,
        attributes: &Attributes,
        strict: bool,
    ) -> Result<Mapped<Attributes>, MappingError> {
        let mut issues = Vec::new();
        let value =
            self.map_attributes(qualifier, attributes, MappingDirection::Request, None, &mut issues);
        finish(value, issues, strict)
    }

    pub fn map_response_attributes(
        &self,
        qualifier: &str,
        attributes: &Attributes,
        strict: bool,
    ) -> Result<Mapped<Attributes>, MappingError> {
        let mut issues = Vec::new();
        let value =
            self.map_attributes(qualifier, attributes, MappingDirection::Response, None, &mut issues);
        finish(value, issues, strict)
    }

    /// Maps every element before deciding; a strict failure reports the
    /// issues of all elements, each tagged with its position.
    pub fn map_response_list(
        &self,
        qualifier: &str,
        objects: &[Attributes],
        strict: bool,
    ) -> Result<Mapped<Vec<Attributes>>, MappingError> {
        let mut issues = Vec::new();
        let value = objects
            .iter()
            .enumerate()
            .map(|(index, attributes)| {
                self.map_attributes(
                    qualifier,
                    attributes,
                    MappingDirection::Response,
                    Some(index),
                    &mut issues,
                )
            })
            .collect();
        finish(value, issues, strict)
    }

    fn map_attributes(
        &self,
        qualifier: &str,
        attributes: &Attributes,
        direction: MappingDirection,
        object_index: Option<usize>,
        issues: &mut Vec<MappingIssue>,
    ) -> Attributes {
        let Some(entry) = self.store.qualifier(qualifier) else {
            issues.push(
                MappingIssue::new(direction, MappingReason::UnknownQualifier, qualifier)
                    .with_qualifier(qualifier)
                    .with_object_index(object_index),
            );
            return attributes.clone();
        };
        let tables = Tables::for_direction(entry, direction);
        let issue = |reason: MappingReason, name: &str, value: &JsonValue| {
            MappingIssue::new(direction, reason, name)
                .with_value(value.clone())
                .with_qualifier(qualifier)
                .with_object_index(object_index)
        };

        let mut mapped = Attributes::new();
        for (name, value) in attributes {
            if let Some(targets) = tables.key_values.and_then(|map| map.get(name)) {
                match value.as_str().and_then(|text| targets.get(text)) {
                    Some(target) => {
                        mapped.insert(target.key.clone(), JsonValue::String(target.value.clone()));
                    }
                    None => {
                        issues.push(issue(MappingReason::UnknownValue, name, value));
                        mapped.insert(name.clone(), value.clone());
                    }
                }
                continue;
            }

            let Some(wire_key) = tables.keys.get(name) else {
                issues.push(issue(MappingReason::UnknownKey, name, value));
                mapped.insert(name.clone(), value.clone());
                continue;
            };

            let value = match tables.values.get(name) {
                None => value.clone(),
                Some(lookup) => match value {
                    JsonValue::String(text) => match lookup.get(text) {
                        Some(translated) => JsonValue::String(translated.clone()),
                        None => {
                            issues.push(issue(MappingReason::UnknownValue, name, value));
                            value.clone()
                        }
                    },
                    JsonValue::Array(elements) => JsonValue::Array(
                        elements
                            .iter()
                            .map(|element| match element {
                                JsonValue::String(text) => match lookup.get(text) {
                                    Some(translated) => JsonValue::String(translated.clone()),
                                    None => {
                                        issues.push(issue(
                                            MappingReason::UnknownValue,
                                            name,
                                            element,
                                        ));
                                        element.clone()
                                    }
                                },
                                other => other.clone(),
                            })
                            .collect(),
                    ),
                    other => other.clone(),
                },
            };
            mapped.insert(wire_key.clone(), value);
        }
        mapped
    }
}

struct Tables<'e> {
    keys: &'e BTreeMap<String, String>,
    values: &'e BTreeMap<String, BTreeMap<String, String>>,
    key_values: Option<&'e BTreeMap<String, BTreeMap<String, super::KeyValueTarget>>>,
}

impl<'e> Tables<'e> {
    fn for_direction(entry: &'e QualifierEntry, direction: MappingDirection) -> Self {
        match direction {
            MappingDirection::Request => Self {
                keys: &entry.request_key_map,
                values: &entry.request_value_map,
                key_values: Some(&entry.request_key_value_map),
            },
            MappingDirection::Response => Self {
                keys: &entry.response_key_map,
                values: &entry.response_value_map,
                key_values: None,
            },
        }
    }
}

fn finish<T>(value: T, issues: Vec<MappingIssue>, strict: bool) -> Result<Mapped<T>, MappingError> {
    if strict {
        if let Some(err) = MappingError::new(issues) {
            return Err(err);
        }
        return Ok(Mapped { value, issues: Vec::new() });
    }
    for issue in &issues {
        log::debug!("tolerated mapping issue: {issue}");
    }
    Ok(Mapped { value, issues })
}
