use crate::error::{code_value, CommandError, MqRestError};
use crate::mapping::Attributes;
use serde::Serialize;
use serde_json::Value as JsonValue;

const ITEM_ENVELOPE_KEYS: [&str; 3] = ["completionCode", "reasonCode", "message"];

#[derive(Debug, Serialize)]
pub(crate) struct CommandPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: String,
    pub qualifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub parameters: Attributes,
    #[serde(rename = "responseParameters", skip_serializing_if = "Vec::is_empty")]
    pub response_parameters: Vec<String>,
}

impl CommandPayload {
    pub fn new(
        command: String,
        qualifier: String,
        name: Option<String>,
        parameters: Attributes,
        response_parameters: Vec<String>,
    ) -> Self {
        Self {
            kind: "runCommandJSON",
            command,
            qualifier,
            name: name.filter(|name| !name.is_empty()),
            parameters,
            response_parameters,
        }
    }

    pub fn to_value(&self) -> Result<JsonValue, MqRestError> {
        serde_json::to_value(self)
            .map_err(|err| MqRestError::config(format!("command payload is not serializable: {err}")))
    }
}

/// `None` means "everything" for DISPLAY and "nothing" otherwise. Any
/// spelling of `all` collapses the list.
pub(crate) fn normalize_response_parameters(
    parameters: Option<Vec<String>>,
    is_display: bool,
) -> Vec<String> {
    match parameters {
        None if is_display => vec!["all".to_owned()],
        None => Vec::new(),
        Some(parameters) if parameters.iter().any(|p| p.eq_ignore_ascii_case("all")) => {
            vec!["all".to_owned()]
        }
        Some(parameters) => parameters,
    }
}

pub(crate) fn parse_response_payload(text: &str) -> Result<JsonValue, MqRestError> {
    let decoded: JsonValue = serde_json::from_str(text).map_err(|err| {
        MqRestError::response(format!("invalid JSON in response: {err}"), Some(text.to_owned()))
    })?;
    if !decoded.is_object() {
        return Err(MqRestError::response("response is not a JSON object", Some(text.to_owned())));
    }
    Ok(decoded)
}

/// Fails when the overall codes or any item's codes are non-zero. The HTTP
/// status is carried along but never decides the outcome.
pub(crate) fn raise_for_command_errors(
    payload: &JsonValue,
    status_code: u16,
) -> Result<(), CommandError> {
    let overall_completion = payload.get("overallCompletionCode").and_then(code_value);
    let overall_reason = payload.get("overallReasonCode").and_then(code_value);
    let overall_error = has_error_codes(overall_completion, overall_reason);

    let item_error = payload
        .get("commandResponse")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items.iter().filter(|item| item.is_object()).any(|item| {
                has_error_codes(
                    item.get("completionCode").and_then(code_value),
                    item.get("reasonCode").and_then(code_value),
                )
            })
        })
        .unwrap_or(false);

    if !(overall_error || item_error) {
        return Ok(());
    }
    let mut message = String::from("MQSC command error");
    if overall_completion.is_some() || overall_reason.is_some() {
        message.push_str(&format!(
            " (overallCompletionCode={}, overallReasonCode={})",
            render_code(overall_completion),
            render_code(overall_reason),
        ));
    }
    Err(CommandError::new(message, payload.clone(), Some(status_code)))
}

fn has_error_codes(completion: Option<i64>, reason: Option<i64>) -> bool {
    completion.is_some_and(|code| code != 0) || reason.is_some_and(|code| code != 0)
}

fn render_code(code: Option<i64>) -> String {
    code.map_or_else(|| "null".to_owned(), |code| code.to_string())
}

/// An absent `commandResponse` is an empty result.
pub(crate) fn extract_command_response(payload: &JsonValue) -> Result<Vec<Attributes>, MqRestError> {
    match payload.get("commandResponse") {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| match item {
                JsonValue::Object(map) => Ok(map.clone()),
                _ => Err(MqRestError::response("commandResponse item is not an object", None)),
            })
            .collect(),
        Some(_) => Err(MqRestError::response("commandResponse is not a list", None)),
    }
}

/// The `parameters` sub-map when the item has one, otherwise the item without
/// its completion/reason envelope.
pub(crate) fn item_parameters(item: &Attributes) -> Attributes {
    match item.get("parameters") {
        Some(JsonValue::Object(parameters)) => parameters.clone(),
        _ => item
            .iter()
            .filter(|(key, _)| !ITEM_ENVELOPE_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

/// Expands items carrying an `objects` list into one item per nested object.
pub fn flatten_nested_objects(items: Vec<Attributes>) -> Vec<Attributes> {
    let mut flattened = Vec::with_capacity(items.len());
    for mut item in items {
        let Some(JsonValue::Array(nested)) = item.get("objects") else {
            flattened.push(item);
            continue;
        };
        let nested = nested.clone();
        item.shift_remove("objects");
        for object in nested {
            if let JsonValue::Object(fields) = object {
                let mut merged = item.clone();
                merged.extend(fields);
                flattened.push(merged);
            }
        }
    }
    flattened
}

pub(crate) fn uppercase_keys(attributes: Attributes) -> Attributes {
    attributes.into_iter().map(|(key, value)| (key.to_ascii_uppercase(), value)).collect()
}
