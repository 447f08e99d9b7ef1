use crate::error::MqRestError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

const BUILTIN_MAPPING: &str = include_str!("default_mapping.json");
const VALID_TOP_LEVEL_KEYS: [&str; 2] = ["commands", "qualifiers"];

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CommandEntry {
    pub qualifier: String,
    #[serde(default)]
    pub response_parameter_macros: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeyValueTarget {
    pub key: String,
    pub value: String,
}

/// Translation tables for one qualifier.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QualifierEntry {
    #[serde(default)]
    pub request_key_map: BTreeMap<String, String>,
    #[serde(default)]
    pub response_key_map: BTreeMap<String, String>,
    #[serde(default)]
    pub request_value_map: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub response_value_map: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub request_key_value_map: BTreeMap<String, BTreeMap<String, KeyValueTarget>>,
}

impl QualifierEntry {
    fn overlay(&mut self, other: QualifierEntry) {
        self.request_key_map.extend(other.request_key_map);
        self.response_key_map.extend(other.response_key_map);
        overlay_nested(&mut self.request_value_map, other.request_value_map);
        overlay_nested(&mut self.response_value_map, other.response_value_map);
        overlay_nested(&mut self.request_key_value_map, other.request_key_value_map);
    }
}

fn overlay_nested<V>(
    base: &mut BTreeMap<String, BTreeMap<String, V>>,
    other: BTreeMap<String, BTreeMap<String, V>>,
) {
    for (name, values) in other {
        base.entry(name).or_default().extend(values);
    }
}

/// Command and qualifier tables. Keys of `commands` are `"<COMMAND> <QUALIFIER>"`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MappingDocument {
    #[serde(default)]
    pub commands: BTreeMap<String, CommandEntry>,
    #[serde(default)]
    pub qualifiers: BTreeMap<String, QualifierEntry>,
}

impl MappingDocument {
    pub fn from_json(input: &str) -> Result<Self, MqRestError> {
        let value: JsonValue = serde_json::from_str(input)
            .map_err(|err| MqRestError::config(format!("mapping document is not valid JSON: {err}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, MqRestError> {
        let JsonValue::Object(sections) = &value else {
            return Err(MqRestError::config("mapping document must be a JSON object"));
        };
        if let Some(key) = sections.keys().find(|key| !VALID_TOP_LEVEL_KEYS.contains(&key.as_str())) {
            return Err(MqRestError::config(format!("invalid top-level key in mapping overrides: {key}")));
        }
        serde_json::from_value(value)
            .map_err(|err| MqRestError::config(format!("invalid mapping document: {err}")))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, MqRestError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            MqRestError::config(format!("failed to read mapping overrides {}: {err}", path.display()))
        })?;
        Self::from_json(&contents)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MappingOverrideMode {
    #[default]
    Merge,
    Replace,
}

/// Qualifier aliases consulted when a command has no entry of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualifierSynonyms {
    aliases: HashMap<String, String>,
}

impl QualifierSynonyms {
    pub fn new<I, K, V>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            aliases: aliases
                .into_iter()
                .map(|(alias, target)| (alias.into().to_ascii_uppercase(), target.into()))
                .collect(),
        }
    }

    pub fn lookup(&self, qualifier: &str) -> Option<&str> {
        self.aliases.get(&qualifier.to_ascii_uppercase()).map(String::as_str)
    }
}

impl Default for QualifierSynonyms {
    fn default() -> Self {
        Self::new([
            ("QUEUE", "queue"),
            ("QLOCAL", "queue"),
            ("QREMOTE", "queue"),
            ("QALIAS", "queue"),
            ("QMODEL", "queue"),
            ("QMSTATUS", "qmstatus"),
            ("QSTATUS", "qstatus"),
            ("CHANNEL", "channel"),
            ("QMGR", "qmgr"),
        ])
    }
}

/// Immutable mapping tables shared by every session that uses them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingStore {
    document: MappingDocument,
    synonyms: QualifierSynonyms,
}

impl MappingStore {
    pub fn new(document: MappingDocument) -> Self {
        Self { document, synonyms: QualifierSynonyms::default() }
    }

    /// Tables shipped with the crate.
    pub fn builtin() -> Result<Self, MqRestError> {
        Ok(Self::new(MappingDocument::from_json(BUILTIN_MAPPING)?))
    }

    pub fn with_synonyms(mut self, synonyms: QualifierSynonyms) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn document(&self) -> &MappingDocument {
        &self.document
    }

    /// Produces a new store with `overrides` applied. The receiver is unchanged.
    pub fn with_overrides(
        &self,
        overrides: MappingDocument,
        mode: MappingOverrideMode,
    ) -> Result<Self, MqRestError> {
        let document = match mode {
            MappingOverrideMode::Replace => {
                ensure_covers("command", &self.document.commands, &overrides.commands)?;
                ensure_covers("qualifier", &self.document.qualifiers, &overrides.qualifiers)?;
                overrides
            }
            MappingOverrideMode::Merge => {
                let mut merged = self.document.clone();
                merged.commands.extend(overrides.commands);
                for (name, entry) in overrides.qualifiers {
                    merged.qualifiers.entry(name).or_default().overlay(entry);
                }
                merged
            }
        };
        Ok(Self { document, synonyms: self.synonyms.clone() })
    }

    /// Resolves the qualifier table used for a command: the command table
    /// first, then the synonym table, then the lowercased qualifier.
    pub fn resolve_qualifier(&self, command: &str, qualifier: &str) -> String {
        let key = format!("{} {}", command.to_ascii_uppercase(), qualifier.to_ascii_uppercase());
        if let Some(entry) = self.document.commands.get(&key) {
            return entry.qualifier.clone();
        }
        if let Some(target) = self.synonyms.lookup(qualifier) {
            return target.to_owned();
        }
        qualifier.to_ascii_lowercase()
    }

    pub fn response_parameter_macros(&self, command: &str, qualifier: &str) -> &[String] {
        let key = format!("{} {}", command.to_ascii_uppercase(), qualifier.to_ascii_uppercase());
        self.document
            .commands
            .get(&key)
            .map(|entry| entry.response_parameter_macros.as_slice())
            .unwrap_or(&[])
    }

    pub fn qualifier(&self, qualifier: &str) -> Option<&QualifierEntry> {
        self.document.qualifiers.get(qualifier)
    }

    pub fn has_qualifier(&self, qualifier: &str) -> bool {
        self.document.qualifiers.contains_key(qualifier)
    }

    /// snake_case name to wire name: the inverted response key map overlaid
    /// with the request key map.
    pub fn snake_to_wire_map(&self, qualifier: &str) -> BTreeMap<String, String> {
        let Some(entry) = self.qualifier(qualifier) else {
            return BTreeMap::new();
        };
        let mut combined: BTreeMap<String, String> = entry
            .response_key_map
            .iter()
            .map(|(wire, snake)| (snake.clone(), wire.clone()))
            .collect();
        combined.extend(entry.request_key_map.iter().map(|(k, v)| (k.clone(), v.clone())));
        combined
    }
}

fn ensure_covers<V>(
    section: &str,
    base: &BTreeMap<String, V>,
    replacement: &BTreeMap<String, V>,
) -> Result<(), MqRestError> {
    let missing: BTreeSet<&String> =
        base.keys().filter(|key| !replacement.contains_key(*key)).collect();
    if missing.is_empty() {
        return Ok(());
    }
    let missing = missing.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    Err(MqRestError::config(format!(
        "replace overrides must cover all base {section} keys (missing: {missing})"
    )))
}
