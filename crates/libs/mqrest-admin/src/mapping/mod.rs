//! Translation between snake_case attribute names and the manager's wire
//! vocabulary.

mod data;
mod mapper;

pub use data::{
    CommandEntry, KeyValueTarget, MappingDocument, MappingOverrideMode, MappingStore,
    QualifierEntry, QualifierSynonyms,
};
pub use mapper::{AttributeMapper, Attributes, Mapped};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MappingDirection {
    Request,
    Response,
}

impl MappingDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for MappingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MappingReason {
    UnknownKey,
    UnknownValue,
    UnknownQualifier,
}

impl MappingReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownKey => "unknown_key",
            Self::UnknownValue => "unknown_value",
            Self::UnknownQualifier => "unknown_qualifier",
        }
    }
}

impl fmt::Display for MappingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attribute that could not be translated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MappingIssue {
    pub direction: MappingDirection,
    pub reason: MappingReason,
    pub attribute_name: String,
    pub attribute_value: Option<JsonValue>,
    pub object_index: Option<usize>,
    pub qualifier: Option<String>,
}

impl MappingIssue {
    pub fn new(
        direction: MappingDirection,
        reason: MappingReason,
        attribute_name: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            reason,
            attribute_name: attribute_name.into(),
            attribute_value: None,
            object_index: None,
            qualifier: None,
        }
    }

    pub fn with_value(mut self, value: JsonValue) -> Self {
        self.attribute_value = Some(value);
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn with_object_index(mut self, index: Option<usize>) -> Self {
        self.object_index = index;
        self
    }
}

impl fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object_index {
            Some(index) => write!(f, "index={index}")?,
            None => f.write_str("index=-")?,
        }
        write!(
            f,
            " | qualifier={} | direction={} | reason={} | attribute={} | value=",
            self.qualifier.as_deref().unwrap_or("-"),
            self.direction,
            self.reason,
            self.attribute_name,
        )?;
        match &self.attribute_value {
            Some(JsonValue::String(text)) => f.write_str(text),
            Some(value) => write!(f, "{value}"),
            None => f.write_str("-"),
        }
    }
}

/// Strict-mode mapping failure carrying every issue found in the call.
#[derive(Clone, Debug, PartialEq, Error)]
pub struct MappingError {
    issues: Vec<MappingIssue>,
}

impl MappingError {
    /// Returns `None` for an empty issue list.
    pub fn new(issues: Vec<MappingIssue>) -> Option<Self> {
        if issues.is_empty() {
            None
        } else {
            Some(Self { issues })
        }
    }

    pub fn issues(&self) -> &[MappingIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<MappingIssue> {
        self.issues
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mapping failed with {} issue(s):", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n{issue}")?;
        }
        Ok(())
    }
}
