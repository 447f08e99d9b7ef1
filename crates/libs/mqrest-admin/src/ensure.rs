//! Idempotent define-or-alter.

use crate::error::MqRestError;
use crate::mapping::Attributes;
use crate::session::{CommandRequest, CommandSession};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureResult {
    pub action: EnsureAction,
    /// Keys sent in the ALTER, in the caller's order. Empty unless `Updated`.
    pub changed: Vec<String>,
}

impl EnsureResult {
    fn created() -> Self {
        Self { action: EnsureAction::Created, changed: Vec::new() }
    }

    fn unchanged() -> Self {
        Self { action: EnsureAction::Unchanged, changed: Vec::new() }
    }

    fn updated(changed: Vec<String>) -> Self {
        Self { action: EnsureAction::Updated, changed }
    }
}

/// Qualifiers used for each step of an ensure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnsureTarget {
    pub display: &'static str,
    pub define: &'static str,
    pub alter: &'static str,
}

impl EnsureTarget {
    pub const fn new(display: &'static str, define: &'static str, alter: &'static str) -> Self {
        Self { display, define, alter }
    }

    /// Same qualifier for all three steps.
    pub const fn uniform(qualifier: &'static str) -> Self {
        Self::new(qualifier, qualifier, qualifier)
    }

    pub const QLOCAL: Self = Self::new("QUEUE", "QLOCAL", "QLOCAL");
    pub const QREMOTE: Self = Self::new("QUEUE", "QREMOTE", "QREMOTE");
    pub const QALIAS: Self = Self::new("QUEUE", "QALIAS", "QALIAS");
    pub const QMODEL: Self = Self::new("QUEUE", "QMODEL", "QMODEL");
    pub const CHANNEL: Self = Self::uniform("CHANNEL");
    pub const AUTHINFO: Self = Self::uniform("AUTHINFO");
    pub const LISTENER: Self = Self::uniform("LISTENER");
    pub const NAMELIST: Self = Self::uniform("NAMELIST");
    pub const PROCESS: Self = Self::uniform("PROCESS");
    pub const SERVICE: Self = Self::uniform("SERVICE");
    pub const TOPIC: Self = Self::uniform("TOPIC");
    pub const SUB: Self = Self::uniform("SUB");
    pub const STGCLASS: Self = Self::uniform("STGCLASS");
    pub const COMMINFO: Self = Self::uniform("COMMINFO");
    pub const CFSTRUCT: Self = Self::uniform("CFSTRUCT");
}

/// Loose equality used to decide whether an attribute needs altering.
///
/// Both sides are rendered to text (integral numbers without a fraction),
/// trimmed, and compared ignoring ASCII case. `null` never matches anything,
/// including another `null`.
pub fn values_match(desired: &JsonValue, current: Option<&JsonValue>) -> bool {
    let (Some(desired), Some(current)) = (canonical(desired), current.and_then(canonical)) else {
        return false;
    };
    desired.trim().eq_ignore_ascii_case(current.trim())
}

fn canonical(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) => {
            if let Some(integer) = number.as_i64() {
                return Some(integer.to_string());
            }
            if let Some(unsigned) = number.as_u64() {
                return Some(unsigned.to_string());
            }
            match number.as_f64() {
                Some(float) if float.is_finite() && float.fract() == 0.0 && float.abs() < 1e15 => {
                    Some(format!("{float:.0}"))
                }
                _ => Some(number.to_string()),
            }
        }
        other => Some(other.to_string()),
    }
}

fn current_attributes(item: &Attributes) -> &Attributes {
    match item.get("parameters") {
        Some(JsonValue::Object(parameters)) => parameters,
        _ => item,
    }
}

/// Desired entries whose current value does not match, in desired order.
fn differing(desired: &Attributes, current: &Attributes) -> Attributes {
    desired
        .iter()
        .filter(|(key, value)| !values_match(value, current.get(key.as_str())))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl<T: Transport> CommandSession<T> {
    /// DISPLAY, then DEFINE if absent or ALTER the differing attributes.
    ///
    /// A command error from the DISPLAY is read as "does not exist".
    pub fn ensure_object(
        &mut self,
        name: &str,
        target: EnsureTarget,
        desired: Attributes,
    ) -> Result<EnsureResult, MqRestError> {
        let display = CommandRequest::new("DISPLAY", target.display)
            .named(name)
            .response_parameters(["all"]);
        let objects = match self.mqsc_command(display) {
            Ok(objects) => objects,
            Err(MqRestError::Command(err)) => {
                log::debug!("DISPLAY {} {name} failed, treating as absent: {err}", target.display);
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let Some(first) = objects.first() else {
            self.mqsc_command(
                CommandRequest::new("DEFINE", target.define).named(name).parameters(desired),
            )?;
            log::info!("ensure {} {name}: created", target.define);
            return Ok(EnsureResult::created());
        };

        if desired.is_empty() {
            return Ok(EnsureResult::unchanged());
        }

        let changes = differing(&desired, current_attributes(first));
        if changes.is_empty() {
            log::debug!("ensure {} {name}: unchanged", target.alter);
            return Ok(EnsureResult::unchanged());
        }
        let changed: Vec<String> = changes.keys().cloned().collect();
        self.mqsc_command(CommandRequest::new("ALTER", target.alter).named(name).parameters(changes))?;
        log::info!("ensure {} {name}: updated {}", target.alter, changed.join(", "));
        Ok(EnsureResult::updated(changed))
    }

    /// The queue manager always exists, so this never returns `Created`.
    /// Unlike [`CommandSession::ensure_object`], DISPLAY errors propagate
    /// and an empty DISPLAY result marks every desired attribute as changed.
    pub fn ensure_qmgr(&mut self, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        if desired.is_empty() {
            return Ok(EnsureResult::unchanged());
        }
        let objects =
            self.mqsc_command(CommandRequest::new("DISPLAY", "QMGR").response_parameters(["all"]))?;
        let empty = Attributes::new();
        let current = objects.first().map_or(&empty, current_attributes);

        let changes = differing(&desired, current);
        if changes.is_empty() {
            return Ok(EnsureResult::unchanged());
        }
        let changed: Vec<String> = changes.keys().cloned().collect();
        self.mqsc_command(CommandRequest::new("ALTER", "QMGR").parameters(changes))?;
        log::info!("ensure QMGR: updated {}", changed.join(", "));
        Ok(EnsureResult::updated(changed))
    }

    pub fn ensure_qlocal(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::QLOCAL, desired)
    }

    pub fn ensure_qremote(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::QREMOTE, desired)
    }

    pub fn ensure_qalias(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::QALIAS, desired)
    }

    pub fn ensure_qmodel(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::QMODEL, desired)
    }

    pub fn ensure_channel(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::CHANNEL, desired)
    }

    pub fn ensure_authinfo(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::AUTHINFO, desired)
    }

    pub fn ensure_listener(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::LISTENER, desired)
    }

    pub fn ensure_namelist(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::NAMELIST, desired)
    }

    pub fn ensure_process(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::PROCESS, desired)
    }

    pub fn ensure_service(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::SERVICE, desired)
    }

    pub fn ensure_topic(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::TOPIC, desired)
    }

    pub fn ensure_sub(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::SUB, desired)
    }

    pub fn ensure_stgclass(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::STGCLASS, desired)
    }

    pub fn ensure_comminfo(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::COMMINFO, desired)
    }

    pub fn ensure_cfstruct(&mut self, name: &str, desired: Attributes) -> Result<EnsureResult, MqRestError> {
        self.ensure_object(name, EnsureTarget::CFSTRUCT, desired)
    }
}
