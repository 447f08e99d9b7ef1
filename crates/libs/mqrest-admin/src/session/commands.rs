//! Typed wrappers over [`CommandSession::mqsc_command`].

use super::{CommandRequest, CommandSession};
use crate::error::MqRestError;
use crate::mapping::Attributes;
use crate::transport::Transport;

/// Optional narrowing for DISPLAY helpers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayFilter {
    pub parameters: Attributes,
    pub response_parameters: Option<Vec<String>>,
    pub where_clause: Option<String>,
}

impl DisplayFilter {
    pub fn new() -> Self {
        Self::default()
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

    fn apply(self, mut request: CommandRequest) -> CommandRequest {
        request.parameters = self.parameters;
        request.response_parameters = self.response_parameters;
        request.where_clause = self.where_clause;
        request
    }
}

impl<T: Transport> CommandSession<T> {
    fn display(
        &mut self,
        qualifier: &str,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        let request = CommandRequest::new("DISPLAY", qualifier).maybe_named(name);
        self.mqsc_command(filter.apply(request))
    }

    fn display_single(&mut self, qualifier: &str) -> Result<Option<Attributes>, MqRestError> {
        let objects = self.mqsc_command(CommandRequest::new("DISPLAY", qualifier))?;
        Ok(objects.into_iter().next())
    }

    fn action(
        &mut self,
        command: &str,
        qualifier: &str,
        name: &str,
        parameters: Attributes,
    ) -> Result<(), MqRestError> {
        let request = CommandRequest::new(command, qualifier).named(name).parameters(parameters);
        self.mqsc_command(request).map(drop)
    }

    /// Defaults to every queue (`*`) when `name` is `None`.
    pub fn display_queue(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("QUEUE", Some(name.unwrap_or("*")), filter)
    }

    /// Defaults to every channel (`*`) when `name` is `None`.
    pub fn display_channel(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("CHANNEL", Some(name.unwrap_or("*")), filter)
    }

    pub fn display_listener(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("LISTENER", name, filter)
    }

    pub fn display_service(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("SERVICE", name, filter)
    }

    pub fn display_qstatus(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("QSTATUS", name, filter)
    }

    pub fn display_chstatus(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("CHSTATUS", name, filter)
    }

    pub fn display_lsstatus(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("LSSTATUS", name, filter)
    }

    pub fn display_svstatus(
        &mut self,
        name: Option<&str>,
        filter: DisplayFilter,
    ) -> Result<Vec<Attributes>, MqRestError> {
        self.display("SVSTATUS", name, filter)
    }

    /// The queue manager's attributes, or `None` if nothing came back.
    pub fn display_qmgr(&mut self) -> Result<Option<Attributes>, MqRestError> {
        self.display_single("QMGR")
    }

    pub fn display_qmstatus(&mut self) -> Result<Option<Attributes>, MqRestError> {
        self.display_single("QMSTATUS")
    }

    pub fn define_qlocal(&mut self, name: &str, parameters: Attributes) -> Result<(), MqRestError> {
        self.action("DEFINE", "QLOCAL", name, parameters)
    }

    pub fn alter_qlocal(&mut self, name: &str, parameters: Attributes) -> Result<(), MqRestError> {
        self.action("ALTER", "QLOCAL", name, parameters)
    }

    pub fn delete_queue(&mut self, name: &str, parameters: Attributes) -> Result<(), MqRestError> {
        self.action("DELETE", "QUEUE", name, parameters)
    }

    pub fn define_channel(&mut self, name: &str, parameters: Attributes) -> Result<(), MqRestError> {
        self.action("DEFINE", "CHANNEL", name, parameters)
    }

    /// Fire-and-forget; see [`CommandSession::start_channel_sync`] to wait.
    pub fn start_channel(&mut self, name: &str) -> Result<(), MqRestError> {
        self.action("START", "CHANNEL", name, Attributes::new())
    }

    pub fn stop_channel(&mut self, name: &str) -> Result<(), MqRestError> {
        self.action("STOP", "CHANNEL", name, Attributes::new())
    }

    pub fn start_listener(&mut self, name: &str) -> Result<(), MqRestError> {
        self.action("START", "LISTENER", name, Attributes::new())
    }

    pub fn stop_listener(&mut self, name: &str) -> Result<(), MqRestError> {
        self.action("STOP", "LISTENER", name, Attributes::new())
    }

    pub fn start_service(&mut self, name: &str) -> Result<(), MqRestError> {
        self.action("START", "SERVICE", name, Attributes::new())
    }

    pub fn stop_service(&mut self, name: &str) -> Result<(), MqRestError> {
        self.action("STOP", "SERVICE", name, Attributes::new())
    }
}
