use crate::auth::{basic_auth_header, extract_ltpa_cookie, Credentials, LtpaCookie, LTPA_LOGIN_PATH};
use crate::config::SessionConfig;
use crate::error::MqRestError;
use crate::mapping::{
    AttributeMapper, Attributes, MappingDirection, MappingDocument, MappingError, MappingIssue,
    MappingReason, MappingStore,
};
use crate::sync::{Clock, SystemClock};
use crate::transport::Transport;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

mod commands;
mod response;
#[cfg(test)]
mod tests;

pub use commands::DisplayFilter;
pub use response::flatten_nested_objects;
pub(crate) use response::item_parameters;
use response::{
    extract_command_response, normalize_response_parameters, parse_response_payload,
    raise_for_command_errors, uppercase_keys, CommandPayload,
};

pub const CSRF_HEADER: &str = "ibm-mq-rest-csrf-token";
pub const GATEWAY_HEADER: &str = "ibm-mq-rest-gateway-qmgr";

/// One administrative command. Names and values may use either vocabulary
/// when attribute mapping is enabled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandRequest {
    pub command: String,
    pub qualifier: String,
    pub name: Option<String>,
    pub parameters: Attributes,
    /// `None` lets the command pick its default.
    pub response_parameters: Option<Vec<String>>,
    pub where_clause: Option<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self { command: command.into(), qualifier: qualifier.into(), ..Self::default() }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn maybe_named(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_owned);
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn parameters(mut self, parameters: Attributes) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn response_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.response_parameters = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }
}

/// Sends mqsc commands for one queue manager.
///
/// Calls take `&mut self`, so a session runs one command at a time. The
/// `last_*` accessors describe the most recent call and are overwritten by
/// the next one.
pub struct CommandSession<T: Transport> {
    config: SessionConfig,
    credentials: Credentials,
    transport: T,
    mapping: Arc<MappingStore>,
    ltpa_cookie: Option<LtpaCookie>,
    clock: Box<dyn Clock>,
    last_http_status: Option<u16>,
    last_response_text: Option<String>,
    last_response_payload: Option<JsonValue>,
    last_command_payload: Option<JsonValue>,
}

impl<T: Transport> CommandSession<T> {
    /// Builds a session on the built-in mapping tables. LTPA credentials log
    /// in before this returns.
    pub fn new(
        config: SessionConfig,
        credentials: Credentials,
        transport: T,
    ) -> Result<Self, MqRestError> {
        let mapping = Arc::new(MappingStore::builtin()?);
        Self::with_mapping(config, credentials, transport, mapping)
    }

    /// Like [`CommandSession::new`] but shares an existing mapping store.
    /// Overrides named in the config are layered on top of it.
    pub fn with_mapping(
        config: SessionConfig,
        credentials: Credentials,
        transport: T,
        mapping: Arc<MappingStore>,
    ) -> Result<Self, MqRestError> {
        config.validate()?;
        let mapping = match config.mapping_overrides_path.as_deref() {
            Some(path) => {
                let overrides = MappingDocument::from_path(path)?;
                Arc::new(mapping.with_overrides(overrides, config.mapping_override_mode)?)
            }
            None => mapping,
        };
        let mut session = Self {
            config,
            credentials,
            transport,
            mapping,
            ltpa_cookie: None,
            clock: Box::new(SystemClock::new()),
            last_http_status: None,
            last_response_text: None,
            last_response_payload: None,
            last_command_payload: None,
        };
        if let Credentials::Ltpa { username, password } = &session.credentials {
            let cookie = session.ltpa_login(username, password)?;
            session.ltpa_cookie = Some(cookie);
        }
        Ok(session)
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn qmgr_name(&self) -> &str {
        &self.config.qmgr_name
    }

    pub fn gateway_qmgr(&self) -> Option<&str> {
        self.config.gateway_qmgr.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mapping(&self) -> &Arc<MappingStore> {
        &self.mapping
    }

    pub fn last_http_status(&self) -> Option<u16> {
        self.last_http_status
    }

    pub fn last_response_text(&self) -> Option<&str> {
        self.last_response_text.as_deref()
    }

    pub fn last_response_payload(&self) -> Option<&JsonValue> {
        self.last_response_payload.as_ref()
    }

    pub fn last_command_payload(&self) -> Option<&JsonValue> {
        self.last_command_payload.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn clock_mut(&mut self) -> &mut dyn Clock {
        self.clock.as_mut()
    }

    /// Runs one command and returns the response objects, flattened and
    /// (when enabled) translated to snake_case.
    pub fn mqsc_command(&mut self, request: CommandRequest) -> Result<Vec<Attributes>, MqRestError> {
        let command = request.command.trim().to_ascii_uppercase();
        let qualifier = request.qualifier.trim().to_ascii_uppercase();
        let mut response_parameters =
            normalize_response_parameters(request.response_parameters, command == "DISPLAY");
        let mapping_qualifier = self.mapping.resolve_qualifier(&command, &qualifier);
        let strict = self.config.mapping_strict;
        let mut parameters = request.parameters;

        if self.config.map_attributes {
            let mapper = AttributeMapper::new(&self.mapping);
            parameters =
                mapper.map_request_attributes(&mapping_qualifier, &parameters, strict)?.into_value();
            response_parameters = self.map_response_parameter_names(
                &command,
                &qualifier,
                &mapping_qualifier,
                response_parameters,
            )?;
        }

        if let Some(clause) = request.where_clause.filter(|clause| !clause.trim().is_empty()) {
            let clause = if self.config.map_attributes {
                self.map_where_keyword(&clause, &mapping_qualifier)?
            } else {
                clause
            };
            parameters.insert("WHERE".to_owned(), JsonValue::String(clause));
        }

        let payload =
            CommandPayload::new(command, qualifier, request.name, parameters, response_parameters)
                .to_value()?;
        log::debug!(
            "dispatching {} {} for {}",
            payload["command"].as_str().unwrap_or_default(),
            payload["qualifier"].as_str().unwrap_or_default(),
            self.config.qmgr_name,
        );
        log::trace!("command payload: {payload}");
        self.last_command_payload = Some(payload.clone());
        self.last_http_status = None;
        self.last_response_text = None;
        self.last_response_payload = None;

        let url = self.config.mqsc_url();
        let headers = self.request_headers();
        let response = self.transport.post_json(
            &url,
            &payload,
            &headers,
            self.config.timeout(),
            self.config.verify_tls,
        )?;

        self.last_http_status = Some(response.status_code);
        self.last_response_text = Some(response.body.clone());

        let response_payload = parse_response_payload(&response.body)?;
        self.last_response_payload = Some(response_payload.clone());

        raise_for_command_errors(&response_payload, response.status_code)?;

        let objects = extract_command_response(&response_payload)?
            .iter()
            .map(item_parameters)
            .collect::<Vec<_>>();
        let objects = flatten_nested_objects(objects);

        if !self.config.map_attributes {
            return Ok(objects);
        }
        let normalized = objects.into_iter().map(uppercase_keys).collect::<Vec<_>>();
        let mapped = AttributeMapper::new(&self.mapping).map_response_list(
            &mapping_qualifier,
            &normalized,
            strict,
        )?;
        Ok(mapped.into_value())
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Accept".to_owned(), "application/json".to_owned())];
        match &self.credentials {
            Credentials::Basic { username, password } => {
                headers.push(("Authorization".to_owned(), basic_auth_header(username, password)));
            }
            Credentials::Ltpa { .. } => {
                if let Some(cookie) = &self.ltpa_cookie {
                    headers.push(("Cookie".to_owned(), cookie.header_value()));
                }
            }
            Credentials::Certificate { .. } => {}
        }
        if let Some(token) = &self.config.csrf_token {
            headers.push((CSRF_HEADER.to_owned(), token.clone()));
        }
        if let Some(gateway) = &self.config.gateway_qmgr {
            headers.push((GATEWAY_HEADER.to_owned(), gateway.clone()));
        }
        headers
    }

    fn ltpa_login(&self, username: &str, password: &str) -> Result<LtpaCookie, MqRestError> {
        let url = format!("{}{}", self.config.base_url(), LTPA_LOGIN_PATH);
        let payload = json!({"username": username, "password": password});
        let mut headers = vec![("Accept".to_owned(), "application/json".to_owned())];
        if let Some(token) = &self.config.csrf_token {
            headers.push((CSRF_HEADER.to_owned(), token.clone()));
        }
        let response = self.transport.post_json(
            &url,
            &payload,
            &headers,
            self.config.timeout(),
            self.config.verify_tls,
        )?;
        if response.status_code >= 400 {
            return Err(MqRestError::auth("LTPA login failed", url, Some(response.status_code)));
        }
        let cookie = extract_ltpa_cookie(&response.headers).ok_or_else(|| {
            MqRestError::auth(
                "LTPA login succeeded but LtpaToken2 cookie not found in response",
                url.clone(),
                Some(response.status_code),
            )
        })?;
        log::debug!("LTPA login for {username} succeeded");
        Ok(cookie)
    }

    /// `all` passes through. Other names resolve against the command's
    /// macros (case-insensitively) and then the snake_case table.
    fn map_response_parameter_names(
        &self,
        command: &str,
        qualifier: &str,
        mapping_qualifier: &str,
        names: Vec<String>,
    ) -> Result<Vec<String>, MappingError> {
        if names.len() == 1 && names[0].eq_ignore_ascii_case("all") {
            return Ok(names);
        }
        let macros = self.mapping.response_parameter_macros(command, qualifier);
        let snake_to_wire = self.mapping.snake_to_wire_map(mapping_qualifier);

        let mut issues = Vec::new();
        let mut mapped = Vec::with_capacity(names.len());
        for name in names {
            if let Some(found) = macros.iter().find(|m| m.eq_ignore_ascii_case(&name)) {
                mapped.push(found.clone());
            } else if let Some(wire) = snake_to_wire.get(&name) {
                mapped.push(wire.clone());
            } else {
                issues.push(
                    MappingIssue::new(MappingDirection::Request, MappingReason::UnknownKey, &name)
                        .with_qualifier(mapping_qualifier),
                );
                mapped.push(name);
            }
        }
        if self.config.mapping_strict {
            if let Some(err) = MappingError::new(issues) {
                return Err(err);
            }
        }
        Ok(mapped)
    }

    /// Translates the leading keyword of `KEYWORD rest`; the rest is kept
    /// verbatim.
    fn map_where_keyword(&self, clause: &str, mapping_qualifier: &str) -> Result<String, MappingError> {
        let clause = clause.trim();
        let (keyword, rest) = match clause.find(char::is_whitespace) {
            Some(index) => {
                let (keyword, tail) = clause.split_at(index);
                let mut chars = tail.chars();
                chars.next();
                (keyword, chars.as_str())
            }
            None => (clause, ""),
        };

        let reject = |reason: MappingReason| -> Result<String, MappingError> {
            if self.config.mapping_strict {
                let issue = MappingIssue::new(MappingDirection::Request, reason, keyword)
                    .with_qualifier(mapping_qualifier);
                if let Some(err) = MappingError::new(vec![issue]) {
                    return Err(err);
                }
            }
            Ok(clause.to_owned())
        };

        if !self.mapping.has_qualifier(mapping_qualifier) {
            return reject(MappingReason::UnknownQualifier);
        }
        let Some(wire) = self.mapping.snake_to_wire_map(mapping_qualifier).remove(keyword) else {
            return reject(MappingReason::UnknownKey);
        };
        if rest.is_empty() {
            Ok(wire)
        } else {
            Ok(format!("{wire} {rest}"))
        }
    }
}
