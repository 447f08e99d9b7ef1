//! Blocking start/stop/restart with status polling.

use crate::error::MqRestError;
use crate::mapping::Attributes;
use crate::session::{item_parameters, CommandRequest, CommandSession};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_SYNC_TIMEOUT_SECONDS: f64 = 30.0;
pub const DEFAULT_POLL_INTERVAL_SECONDS: f64 = 1.0;

const RUNNING_VALUES: [&str; 2] = ["RUNNING", "running"];
const STOPPED_VALUES: [&str; 2] = ["STOPPED", "stopped"];

/// A sleep that ended early because cancellation was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("sleep interrupted by cancellation request")]
pub struct Interrupted;

/// Time source for the poll loop.
pub trait Clock: Send {
    fn sleep(&mut self, seconds: f64) -> Result<(), Interrupted>;

    /// Seconds since the last `reset`.
    fn elapsed_seconds(&self) -> f64;

    fn reset(&mut self);
}

/// Cooperative cancellation shared between a poller and whoever may want to
/// stop it. Once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for up to `timeout`. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    cancelled = condvar
                        .wait_timeout(cancelled, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    cancelled = condvar.wait(cancelled).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        true
    }
}

/// Wall-clock implementation; sleeps wake early on cancellation.
#[derive(Debug)]
pub struct SystemClock {
    started: Instant,
    cancellation: CancellationFlag,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationFlag::new())
    }

    pub fn with_cancellation(cancellation: CancellationFlag) -> Self {
        Self { started: Instant::now(), cancellation }
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn sleep(&mut self, seconds: f64) -> Result<(), Interrupted> {
        let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO);
        if self.cancellation.wait_timeout(duration) {
            return Err(Interrupted);
        }
        Ok(())
    }

    fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn reset(&mut self) {
        self.started = Instant::now();
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "SyncConfigFields")]
pub struct SyncConfig {
    timeout_seconds: f64,
    poll_interval_seconds: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncConfigFields {
    #[serde(default = "default_sync_timeout")]
    timeout_seconds: f64,
    #[serde(default = "default_poll_interval")]
    poll_interval_seconds: f64,
}

fn default_sync_timeout() -> f64 {
    DEFAULT_SYNC_TIMEOUT_SECONDS
}

fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL_SECONDS
}

impl TryFrom<SyncConfigFields> for SyncConfig {
    type Error = MqRestError;

    fn try_from(fields: SyncConfigFields) -> Result<Self, Self::Error> {
        Self::new(fields.timeout_seconds, fields.poll_interval_seconds)
    }
}

impl SyncConfig {
    pub fn new(timeout_seconds: f64, poll_interval_seconds: f64) -> Result<Self, MqRestError> {
        if !is_positive(timeout_seconds) {
            return Err(MqRestError::config("sync timeout_seconds must be > 0"));
        }
        if !is_positive(poll_interval_seconds) {
            return Err(MqRestError::config("sync poll_interval_seconds must be > 0"));
        }
        Ok(Self { timeout_seconds, poll_interval_seconds })
    }

    pub fn timeout_seconds(&self) -> f64 {
        self.timeout_seconds
    }

    pub fn poll_interval_seconds(&self) -> f64 {
        self.poll_interval_seconds
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_SYNC_TIMEOUT_SECONDS,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Started,
    Stopped,
    Restarted,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    pub operation: SyncOperation,
    pub polls: u32,
    pub elapsed_seconds: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    Start,
    Stop,
}

impl Transition {
    pub fn command(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }

    pub fn operation(self) -> SyncOperation {
        match self {
            Self::Start => SyncOperation::Started,
            Self::Stop => SyncOperation::Stopped,
        }
    }

    fn target_values(self) -> &'static [&'static str] {
        match self {
            Self::Start => &RUNNING_VALUES,
            Self::Stop => &STOPPED_VALUES,
        }
    }
}

/// An object kind that can be started and stopped, and how to read its
/// status back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleObject {
    pub action_qualifier: String,
    pub status_qualifier: String,
    pub status_fields: Vec<String>,
    /// Whether an empty status result means the object is stopped.
    pub empty_means_stopped: bool,
}

impl LifecycleObject {
    pub fn new(
        action_qualifier: impl Into<String>,
        status_qualifier: impl Into<String>,
        status_fields: &[&str],
        empty_means_stopped: bool,
    ) -> Self {
        Self {
            action_qualifier: action_qualifier.into(),
            status_qualifier: status_qualifier.into(),
            status_fields: status_fields.iter().map(|field| (*field).to_owned()).collect(),
            empty_means_stopped,
        }
    }

    /// Inactive channels have no status row at all.
    pub fn channel() -> Self {
        Self::new("CHANNEL", "CHSTATUS", &["channel_status", "STATUS"], true)
    }

    pub fn listener() -> Self {
        Self::new("LISTENER", "LSSTATUS", &["status", "STATUS"], false)
    }

    pub fn service() -> Self {
        Self::new("SERVICE", "SVSTATUS", &["status", "STATUS"], false)
    }

    pub fn probe(&self, transition: Transition) -> StatusProbe {
        StatusProbe {
            status_command: "DISPLAY".to_owned(),
            status_qualifier: self.status_qualifier.clone(),
            status_fields: self.status_fields.clone(),
            target_values: transition.target_values().iter().map(|v| (*v).to_owned()).collect(),
            empty_result_means_target: transition == Transition::Stop && self.empty_means_stopped,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusProbe {
    pub status_command: String,
    pub status_qualifier: String,
    pub status_fields: Vec<String>,
    pub target_values: Vec<String>,
    pub empty_result_means_target: bool,
}

impl StatusProbe {
    pub fn is_satisfied(&self, rows: &[Attributes]) -> bool {
        if rows.is_empty() {
            return self.empty_result_means_target;
        }
        rows.iter().any(|row| {
            let parameters = item_parameters(row);
            self.status_fields.iter().any(|field| match parameters.get(field) {
                Some(JsonValue::String(status)) => self.target_values.iter().any(|t| t == status),
                _ => false,
            })
        })
    }
}

impl<T: Transport> CommandSession<T> {
    pub fn start_channel_sync(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.sync_object(name, &LifecycleObject::channel(), Transition::Start, config)
    }

    pub fn stop_channel_sync(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.sync_object(name, &LifecycleObject::channel(), Transition::Stop, config)
    }

    pub fn restart_channel(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.restart_object(name, &LifecycleObject::channel(), config)
    }

    pub fn start_listener_sync(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.sync_object(name, &LifecycleObject::listener(), Transition::Start, config)
    }

    pub fn stop_listener_sync(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.sync_object(name, &LifecycleObject::listener(), Transition::Stop, config)
    }

    pub fn restart_listener(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.restart_object(name, &LifecycleObject::listener(), config)
    }

    pub fn start_service_sync(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.sync_object(name, &LifecycleObject::service(), Transition::Start, config)
    }

    pub fn stop_service_sync(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.sync_object(name, &LifecycleObject::service(), Transition::Stop, config)
    }

    pub fn restart_service(
        &mut self,
        name: &str,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        self.restart_object(name, &LifecycleObject::service(), config)
    }

    /// Stop phase then start phase. A failed stop never issues START.
    pub fn restart_object(
        &mut self,
        name: &str,
        object: &LifecycleObject,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        let stopped = self.sync_object(name, object, Transition::Stop, config)?;
        let started = self.sync_object(name, object, Transition::Start, config)?;
        Ok(SyncResult {
            operation: SyncOperation::Restarted,
            polls: stopped.polls + started.polls,
            elapsed_seconds: stopped.elapsed_seconds + started.elapsed_seconds,
        })
    }

    /// Issues the transition and polls status until it is reached, the
    /// timeout passes, or the clock is interrupted.
    pub fn sync_object(
        &mut self,
        name: &str,
        object: &LifecycleObject,
        transition: Transition,
        config: Option<SyncConfig>,
    ) -> Result<SyncResult, MqRestError> {
        let config = config.unwrap_or(self.config().sync);
        let operation = transition.command();
        let probe = object.probe(transition);

        self.mqsc_command(
            CommandRequest::new(operation, object.action_qualifier.as_str()).named(name),
        )?;

        self.clock_mut().reset();
        let mut polls = 0u32;
        loop {
            let status_request =
                CommandRequest::new(probe.status_command.as_str(), probe.status_qualifier.as_str())
                    .named(name)
                    .response_parameters(["all"]);
            let rows = match self.mqsc_command(status_request) {
                Ok(rows) => rows,
                Err(MqRestError::Command(err)) => {
                    log::warn!("status probe for {name} failed, treating as no rows: {err}");
                    Vec::new()
                }
                Err(err) => return Err(err),
            };

            if probe.is_satisfied(&rows) {
                let elapsed_seconds = self.clock().elapsed_seconds();
                log::info!("{operation} {name} reached target after {polls} poll(s)");
                return Ok(SyncResult { operation: transition.operation(), polls, elapsed_seconds });
            }

            let elapsed_seconds = self.clock().elapsed_seconds();
            if elapsed_seconds >= config.timeout_seconds() {
                return Err(MqRestError::Timeout {
                    name: name.to_owned(),
                    operation: operation.to_owned(),
                    elapsed_seconds,
                    source: None,
                });
            }

            if let Err(interrupted) = self.clock_mut().sleep(config.poll_interval_seconds()) {
                return Err(MqRestError::Timeout {
                    name: name.to_owned(),
                    operation: operation.to_owned(),
                    elapsed_seconds: self.clock().elapsed_seconds(),
                    source: Some(interrupted),
                });
            }
            polls += 1;
            log::debug!("{operation} {name}: poll {polls}");
        }
    }
}
