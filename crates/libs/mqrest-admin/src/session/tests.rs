use super::*;
use crate::ensure::EnsureAction;
use crate::sync::{CancellationFlag, Interrupted, LifecycleObject, SyncConfig, SyncOperation, Transition};
use crate::transport::TransportResponse;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const BASE_URL: &str = "https://mq.test:9443/ibmmq/rest/v2";
const MQSC_URL: &str = "https://mq.test:9443/ibmmq/rest/v2/admin/action/qmgr/QM1/mqsc";

#[derive(Debug)]
struct RecordedRequest {
    url: String,
    payload: JsonValue,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    verify_tls: bool,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn command(&self) -> String {
        format!(
            "{} {}",
            self.payload["command"].as_str().unwrap_or_default(),
            self.payload["qualifier"].as_str().unwrap_or_default()
        )
    }
}

struct MockTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, MqRestError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
}

impl MockTransport {
    fn new(responses: Vec<Result<TransportResponse, MqRestError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from(responses)),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn commands(&self) -> Vec<String> {
        self.requests.lock().expect("requests mutex poisoned").iter().map(|r| r.command()).collect()
    }

    fn request(&self, index: usize) -> RecordedRequest {
        let requests = self.requests.lock().expect("requests mutex poisoned");
        let request = &requests[index];
        RecordedRequest {
            url: request.url.clone(),
            payload: request.payload.clone(),
            headers: request.headers.clone(),
            timeout: request.timeout,
            verify_tls: request.verify_tls,
        }
    }
}

impl Transport for MockTransport {
    fn post_json(
        &self,
        url: &str,
        payload: &JsonValue,
        headers: &[(String, String)],
        timeout: Option<Duration>,
        verify_tls: bool,
    ) -> Result<TransportResponse, MqRestError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().expect("requests mutex poisoned").push(RecordedRequest {
            url: url.to_owned(),
            payload: payload.clone(),
            headers: headers.to_vec(),
            timeout,
            verify_tls,
        });
        self.responses
            .lock()
            .expect("responses mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(MqRestError::transport("no response queued", url)))
    }
}

/// Advances only when slept; interrupted once the flag is cancelled.
struct FakeClock {
    elapsed: f64,
    sleeps: Arc<Mutex<Vec<f64>>>,
    cancellation: CancellationFlag,
}

impl FakeClock {
    fn new() -> Self {
        Self { elapsed: 0.0, sleeps: Arc::new(Mutex::new(Vec::new())), cancellation: CancellationFlag::new() }
    }
}

impl Clock for FakeClock {
    fn sleep(&mut self, seconds: f64) -> Result<(), Interrupted> {
        if self.cancellation.is_cancelled() {
            return Err(Interrupted);
        }
        self.sleeps.lock().expect("sleeps mutex poisoned").push(seconds);
        self.elapsed += seconds;
        Ok(())
    }

    fn elapsed_seconds(&self) -> f64 {
        self.elapsed
    }

    fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

fn ok(body: JsonValue) -> Result<TransportResponse, MqRestError> {
    Ok(TransportResponse::new(200, body.to_string()))
}

fn success(items: JsonValue) -> Result<TransportResponse, MqRestError> {
    ok(json!({"overallCompletionCode": 0, "overallReasonCode": 0, "commandResponse": items}))
}

fn item(parameters: JsonValue) -> JsonValue {
    json!({"completionCode": 0, "reasonCode": 0, "parameters": parameters})
}

fn failure(reason: i64) -> Result<TransportResponse, MqRestError> {
    ok(json!({
        "overallCompletionCode": 2,
        "overallReasonCode": reason,
        "commandResponse": [{"completionCode": 2, "reasonCode": reason}]
    }))
}

fn attrs(value: JsonValue) -> Attributes {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn config() -> SessionConfig {
    SessionConfig::new(BASE_URL, "QM1")
}

fn session(
    transport: &Arc<MockTransport>,
    config: SessionConfig,
) -> CommandSession<Arc<MockTransport>> {
    CommandSession::new(config, Credentials::basic("admin", "passw0rd"), Arc::clone(transport))
        .expect("session")
        .with_clock(FakeClock::new())
}

fn fast_sync(timeout: f64) -> Option<SyncConfig> {
    Some(SyncConfig::new(timeout, 1.0).expect("valid sync config"))
}

#[test]
fn display_queue_maps_where_keyword_and_response_attributes() {
    let transport = MockTransport::new(vec![success(json!([item(json!({
        "QUEUE": "APP.Q1",
        "MAXDEPTH": 20000,
        "DEFPSIST": "YES"
    }))]))]);
    let mut session = session(&transport, config());

    let queues = session
        .display_queue(None, DisplayFilter::new().where_clause("max_queue_depth GT 5000"))
        .expect("display");

    assert_eq!(
        queues,
        vec![attrs(json!({
            "queue_name": "APP.Q1",
            "max_queue_depth": 20000,
            "default_persistence": "persistent"
        }))]
    );
    let request = transport.request(0);
    assert_eq!(request.url, MQSC_URL);
    assert_eq!(
        request.payload,
        json!({
            "type": "runCommandJSON",
            "command": "DISPLAY",
            "qualifier": "QUEUE",
            "name": "*",
            "parameters": {"WHERE": "MAXDEPTH GT 5000"},
            "responseParameters": ["all"]
        })
    );
    assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    assert!(request.verify_tls);
}

#[test]
fn request_attributes_are_translated_for_define() {
    let transport = MockTransport::new(vec![success(json!([]))]);
    let mut session = session(&transport, config());

    session
        .define_qlocal(
            "APP.Q1",
            attrs(json!({
                "max_queue_depth": 5000,
                "default_persistence": "persistent",
                "replace": "yes"
            })),
        )
        .expect("define");

    assert_eq!(
        transport.request(0).payload,
        json!({
            "type": "runCommandJSON",
            "command": "DEFINE",
            "qualifier": "QLOCAL",
            "name": "APP.Q1",
            "parameters": {"MAXDEPTH": 5000, "DEFPSIST": "YES", "REPLACE": "YES"}
        })
    );
}

#[test]
fn command_error_carries_codes_and_last_call_state() {
    let transport = MockTransport::new(vec![failure(3008)]);
    let mut session = session(&transport, config());

    let err = session.define_qlocal("APP.Q1", Attributes::new()).expect_err("command error");
    let MqRestError::Command(err) = err else { panic!("expected command error") };
    assert_eq!(err.overall_completion_code(), Some(2));
    assert_eq!(err.overall_reason_code(), Some(3008));
    assert_eq!(err.status_code, Some(200));
    assert!(err.message.contains("overallReasonCode=3008"));

    assert_eq!(session.last_http_status(), Some(200));
    assert_eq!(
        session.last_response_payload().and_then(|p| p.get("overallReasonCode")),
        Some(&json!(3008))
    );
    assert_eq!(
        session.last_command_payload().and_then(|p| p.get("command")),
        Some(&json!("DEFINE"))
    );
}

#[test]
fn http_error_status_with_clean_codes_is_success() {
    let transport = MockTransport::new(vec![Ok(TransportResponse::new(
        500,
        json!({"overallCompletionCode": 0, "overallReasonCode": 0}).to_string(),
    ))]);
    let mut session = session(&transport, config());
    let objects = session.display_qmstatus().expect("no command error");
    assert!(objects.is_none());
    assert_eq!(session.last_http_status(), Some(500));
}

#[test]
fn invalid_response_body_records_text_only() {
    let transport = MockTransport::new(vec![Ok(TransportResponse::new(502, "<html>bad gateway</html>"))]);
    let mut session = session(&transport, config());
    let err = session.display_qmgr().expect_err("invalid json");
    assert!(matches!(err, MqRestError::Response { .. }));
    assert_eq!(session.last_response_text(), Some("<html>bad gateway</html>"));
    assert!(session.last_response_payload().is_none());
}

#[test]
fn transport_failure_propagates() {
    let transport = MockTransport::new(vec![Err(MqRestError::transport("connection refused", MQSC_URL))]);
    let mut session = session(&transport, config());
    let err = session.display_qmgr().expect_err("transport failure");
    assert!(matches!(err, MqRestError::Transport { .. }));
}

#[test]
fn transport_failure_clears_previous_response_state() {
    let transport = MockTransport::new(vec![
        success(json!([item(json!({"QMNAME": "QM1"}))])),
        Err(MqRestError::transport("connection reset", MQSC_URL)),
    ]);
    let mut session = session(&transport, config());
    session.display_qmgr().expect("display");
    assert_eq!(session.last_http_status(), Some(200));

    session.start_channel("TO.QM2").expect_err("transport failure");
    assert_eq!(
        session.last_command_payload().and_then(|p| p.get("command")),
        Some(&json!("START"))
    );
    assert_eq!(session.last_http_status(), None);
    assert_eq!(session.last_response_text(), None);
    assert!(session.last_response_payload().is_none());
}

#[test]
fn strict_mode_rejects_unknown_names_before_sending() {
    let transport = MockTransport::new(vec![]);
    let mut session = session(&transport, config());

    let err = session
        .display_queue(Some("Q1"), DisplayFilter::new().where_clause("bogus_attr EQ 1"))
        .expect_err("unknown where keyword");
    let MqRestError::Mapping(err) = err else { panic!("expected mapping error") };
    assert_eq!(err.issues()[0].reason, MappingReason::UnknownKey);
    assert_eq!(err.issues()[0].attribute_name, "bogus_attr");

    let err = session
        .define_qlocal("Q1", attrs(json!({"max_queue_depth": 1, "colour": "red", "size": 2})))
        .expect_err("unknown request keys");
    let MqRestError::Mapping(err) = err else { panic!("expected mapping error") };
    let names: Vec<_> = err.issues().iter().map(|i| i.attribute_name.as_str()).collect();
    assert_eq!(names, ["colour", "size"]);

    let err = session
        .display_queue(Some("Q1"), DisplayFilter::new().response_parameters(["nope"]))
        .expect_err("unknown response parameter");
    assert!(matches!(err, MqRestError::Mapping(_)));

    assert_eq!(transport.calls(), 0);
}

#[test]
fn where_on_unmapped_qualifier_reports_unknown_qualifier() {
    let transport = MockTransport::new(vec![]);
    let mut session = session(&transport, config());
    let err = session
        .mqsc_command(
            CommandRequest::new("DISPLAY", "CLUSQMGR").named("*").where_clause("status EQ RUNNING"),
        )
        .expect_err("no clusqmgr tables");
    let MqRestError::Mapping(err) = err else { panic!("expected mapping error") };
    assert!(err.issues().iter().any(|i| i.reason == MappingReason::UnknownQualifier));
}

#[test]
fn permissive_mode_passes_unknown_names_through() {
    let transport = MockTransport::new(vec![success(json!([item(json!({"QUEUE": "Q1", "ZZZ": 1}))]))]);
    let mut config = config();
    config.mapping_strict = false;
    let mut session = session(&transport, config);

    let rows = session
        .mqsc_command(
            CommandRequest::new("display", "queue")
                .named("Q1")
                .parameter("colour", "red")
                .where_clause("bogus GT 1"),
        )
        .expect("permissive");
    assert_eq!(rows, vec![attrs(json!({"queue_name": "Q1", "ZZZ": 1}))]);
    assert_eq!(
        transport.request(0).payload["parameters"],
        json!({"colour": "red", "WHERE": "bogus GT 1"})
    );
}

#[test]
fn response_parameter_names_use_macros_then_key_map() {
    let transport = MockTransport::new(vec![success(json!([]))]);
    let mut session = session(&transport, config());
    session
        .display_queue(
            Some("Q1"),
            DisplayFilter::new().response_parameters(["max_queue_depth", "clusinfo"]),
        )
        .expect("display");
    assert_eq!(transport.request(0).payload["responseParameters"], json!(["MAXDEPTH", "CLUSINFO"]));
}

#[test]
fn mapping_disabled_leaves_names_untouched() {
    let transport = MockTransport::new(vec![success(json!([
        {"completionCode": 0, "reasonCode": 0, "QUEUE": "Q1", "objects": [{"CURDEPTH": 1}, {"CURDEPTH": 2}]}
    ]))]);
    let mut config = config();
    config.map_attributes = false;
    let mut session = session(&transport, config);

    let rows = session
        .mqsc_command(
            CommandRequest::new("DISPLAY", "QSTATUS")
                .named("Q1")
                .parameter("TYPE", "HANDLE")
                .where_clause("anything goes"),
        )
        .expect("display");
    assert_eq!(
        rows,
        vec![attrs(json!({"QUEUE": "Q1", "CURDEPTH": 1})), attrs(json!({"QUEUE": "Q1", "CURDEPTH": 2}))]
    );
    assert_eq!(
        transport.request(0).payload["parameters"],
        json!({"TYPE": "HANDLE", "WHERE": "anything goes"})
    );
}

#[test]
fn basic_auth_csrf_and_gateway_headers_are_sent() {
    let transport = MockTransport::new(vec![success(json!([]))]);
    let mut config = config();
    config.gateway_qmgr = Some("GW1".to_owned());
    let mut session = session(&transport, config);
    session.display_qmgr().expect("display");

    let request = transport.request(0);
    assert_eq!(request.header("Accept"), Some("application/json"));
    assert_eq!(request.header("Authorization"), Some("Basic YWRtaW46cGFzc3cwcmQ="));
    assert_eq!(request.header(CSRF_HEADER), Some("local"));
    assert_eq!(request.header(GATEWAY_HEADER), Some("GW1"));
}

#[test]
fn csrf_header_is_omitted_when_unset() {
    let transport = MockTransport::new(vec![success(json!([]))]);
    let mut config = config();
    config.csrf_token = None;
    let mut session = session(&transport, config);
    session.display_qmgr().expect("display");
    let request = transport.request(0);
    assert!(request.header(CSRF_HEADER).is_none());
    assert!(request.header(GATEWAY_HEADER).is_none());
}

#[test]
fn ltpa_login_cookie_rides_on_later_requests() {
    let login = TransportResponse::new(200, "{}")
        .with_header("Set-Cookie", "LtpaToken2_8Gp3=tok123; Path=/; Secure; HttpOnly");
    let transport = MockTransport::new(vec![Ok(login), success(json!([]))]);
    let mut session = CommandSession::new(config(), Credentials::ltpa("mqadmin", "secret"), Arc::clone(&transport))
        .expect("login");
    session.display_qmgr().expect("display");

    let login = transport.request(0);
    assert_eq!(login.url, format!("{BASE_URL}/login"));
    assert_eq!(login.payload, json!({"username": "mqadmin", "password": "secret"}));
    assert_eq!(login.header(CSRF_HEADER), Some("local"));

    let command = transport.request(1);
    assert_eq!(command.header("Cookie"), Some("LtpaToken2_8Gp3=tok123"));
    assert!(command.header("Authorization").is_none());
}

#[test]
fn ltpa_login_failures_are_auth_errors() {
    let transport = MockTransport::new(vec![Ok(TransportResponse::new(401, "{}"))]);
    let err = CommandSession::new(config(), Credentials::ltpa("u", "p"), Arc::clone(&transport))
        .err()
        .expect("rejected login");
    assert!(matches!(err, MqRestError::Auth { status_code: Some(401), .. }));

    let transport = MockTransport::new(vec![Ok(TransportResponse::new(200, "{}"))]);
    let err = CommandSession::new(config(), Credentials::ltpa("u", "p"), Arc::clone(&transport))
        .err()
        .expect("no cookie");
    let MqRestError::Auth { message, .. } = err else { panic!("expected auth error") };
    assert!(message.contains("LtpaToken2"));
}

#[test]
fn certificate_credentials_add_no_auth_header() {
    let transport = MockTransport::new(vec![success(json!([]))]);
    let mut session = CommandSession::new(
        config(),
        Credentials::certificate("/etc/mq/client.pem", None),
        Arc::clone(&transport),
    )
    .expect("session");
    session.display_qmgr().expect("display");
    let request = transport.request(0);
    assert!(request.header("Authorization").is_none());
    assert!(request.header("Cookie").is_none());
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let transport = MockTransport::new(vec![]);
    let result = CommandSession::new(
        SessionConfig::new(BASE_URL, ""),
        Credentials::basic("a", "b"),
        Arc::clone(&transport),
    );
    assert!(matches!(result.err(), Some(MqRestError::Config { .. })));
}

#[test]
fn display_qmgr_returns_first_object_or_none() {
    let transport = MockTransport::new(vec![
        success(json!([item(json!({"QMNAME": "QM1", "DESCR": "main"}))])),
        success(json!([])),
    ]);
    let mut session = session(&transport, config());
    let qmgr = session.display_qmgr().expect("display").expect("one object");
    assert_eq!(qmgr.get("queue_manager_name"), Some(&json!("QM1")));
    assert!(session.display_qmgr().expect("display").is_none());
}

#[test]
fn start_stop_helpers_send_named_actions() {
    let transport = MockTransport::new(vec![success(json!([])), success(json!([])), success(json!([]))]);
    let mut session = session(&transport, config());
    session.start_channel("TO.QM2").expect("start");
    session.stop_listener("LSN1").expect("stop");
    session.start_service("SVC1").expect("start");
    assert_eq!(transport.commands(), ["START CHANNEL", "STOP LISTENER", "START SERVICE"]);
    assert_eq!(transport.request(0).payload["name"], json!("TO.QM2"));
    assert!(transport.request(0).payload.get("responseParameters").is_none());
}

// ensure

#[test]
fn ensure_defines_when_display_fails() {
    let transport = MockTransport::new(vec![failure(2085), success(json!([]))]);
    let mut session = session(&transport, config());
    let result =
        session.ensure_qlocal("APP.Q1", attrs(json!({"max_queue_depth": 5000}))).expect("ensure");
    assert_eq!(result.action, EnsureAction::Created);
    assert!(result.changed.is_empty());
    assert_eq!(transport.commands(), ["DISPLAY QUEUE", "DEFINE QLOCAL"]);
    assert_eq!(transport.request(1).payload["parameters"], json!({"MAXDEPTH": 5000}));
}

#[test]
fn ensure_defines_when_display_is_empty() {
    let transport = MockTransport::new(vec![success(json!([])), success(json!([]))]);
    let mut session = session(&transport, config());
    let result = session.ensure_channel("TO.QM2", Attributes::new()).expect("ensure");
    assert_eq!(result.action, EnsureAction::Created);
    assert_eq!(transport.commands(), ["DISPLAY CHANNEL", "DEFINE CHANNEL"]);
}

#[test]
fn ensure_alters_only_mismatched_keys_in_order() {
    let transport = MockTransport::new(vec![
        success(json!([item(json!({"QUEUE": "APP.Q1", "MAXDEPTH": 5000, "DESCR": "old"}))])),
        success(json!([])),
    ]);
    let mut session = session(&transport, config());
    let result = session
        .ensure_qlocal(
            "APP.Q1",
            attrs(json!({"description": "new", "max_queue_depth": "5000", "default_priority": 5})),
        )
        .expect("ensure");
    assert_eq!(result.action, EnsureAction::Updated);
    assert_eq!(result.changed, ["description", "default_priority"]);
    assert_eq!(transport.commands(), ["DISPLAY QUEUE", "ALTER QLOCAL"]);
    assert_eq!(transport.request(1).payload["parameters"], json!({"DESCR": "new", "DEFPRTY": 5}));
}

#[test]
fn ensure_is_unchanged_when_everything_matches() {
    let transport = MockTransport::new(vec![
        success(json!([item(json!({"QUEUE": "APP.Q1", "MAXDEPTH": 5000, "DESCR": "Orders "}))])),
        success(json!([item(json!({"QUEUE": "APP.Q1"}))])),
    ]);
    let mut session = session(&transport, config());
    let result = session
        .ensure_qlocal("APP.Q1", attrs(json!({"max_queue_depth": 5000.0, "description": "orders"})))
        .expect("ensure");
    assert_eq!(result.action, EnsureAction::Unchanged);
    let result = session.ensure_qlocal("APP.Q1", Attributes::new()).expect("ensure");
    assert_eq!(result.action, EnsureAction::Unchanged);
    assert_eq!(transport.commands(), ["DISPLAY QUEUE", "DISPLAY QUEUE"]);
}

fn full_qlocal_row() -> JsonValue {
    json!({
        "QUEUE": "APP.Q1", "TYPE": "QLOCAL", "ACCTQ": "QMGR", "ALTDATE": "2024-05-01",
        "ALTTIME": "10.15.02", "BOQNAME": "", "BOTHRESH": 0, "CAPEXPRY": "NOLIMIT",
        "CLCHNAME": "", "CLUSNL": "", "CLUSTER": "", "CLWLPRTY": 0, "CLWLRANK": 0,
        "CLWLUSEQ": "QMGR", "CRDATE": "2024-05-01", "CRTIME": "10.15.02", "CURDEPTH": 12,
        "CUSTOM": "", "DEFBIND": "OPEN", "DEFPRESP": "SYNC", "DEFPRTY": 0, "DEFPSIST": "NO",
        "DEFREADA": "NO", "DEFSOPT": "SHARED", "DEFTYPE": "PREDEFINED", "DESCR": "orders",
        "DISTL": "NO", "GET": "ENABLED", "HARDENBO": "YES", "IMGRCOVQ": "QMGR", "INITQ": "",
        "IPPROCS": 1, "MAXDEPTH": 5000, "MAXFSIZE": "DEFAULT", "MAXMSGL": 4194304,
        "MONQ": "QMGR", "MSGDLVSQ": "PRIORITY", "NPMCLASS": "NORMAL", "OPPROCS": 0,
        "PROCESS": "", "PROPCTL": "COMPAT", "PUT": "ENABLED", "QDEPTHHI": 80, "QDEPTHLO": 20,
        "QDPHIEV": "DISABLED", "QDPLOEV": "DISABLED", "QDPMAXEV": "ENABLED",
        "QSVCIEV": "NONE", "QSVCINT": 999999999, "RETINTVL": 999999999, "SCOPE": "QMGR",
        "SHARE": "YES", "STATQ": "QMGR", "STREAMQ": "", "STRMQOS": "BESTEF",
        "TRIGDATA": "", "TRIGDPTH": 1, "TRIGGER": "NO", "TRIGMPRI": 0, "TRIGTYPE": "FIRST",
        "USAGE": "NORMAL"
    })
}

#[test]
fn strict_session_maps_a_complete_display_qlocal_row() {
    let transport = MockTransport::new(vec![
        success(json!([item(full_qlocal_row())])),
        success(json!([item(full_qlocal_row())])),
    ]);
    let mut session = session(&transport, config());

    let rows = session.display_queue(Some("APP.Q1"), DisplayFilter::new()).expect("strict display");
    assert_eq!(rows[0].get("accounting_q"), Some(&json!("QMGR")));
    assert_eq!(rows[0].get("cluster_workload_priority"), Some(&json!(0)));
    assert_eq!(rows[0].get("default_bind"), Some(&json!("OPEN")));
    assert_eq!(rows[0].get("type"), Some(&json!("local")));
    assert!(rows[0].keys().all(|name| name.chars().all(|c| !c.is_ascii_uppercase())));

    let result = session
        .ensure_qlocal("APP.Q1", attrs(json!({"max_queue_depth": 5000})))
        .expect("strict ensure");
    assert_eq!(result.action, EnsureAction::Unchanged);
}

#[test]
fn ensure_propagates_non_command_display_failures() {
    let transport = MockTransport::new(vec![Ok(TransportResponse::new(200, "not json"))]);
    let mut session = session(&transport, config());
    let err = session.ensure_topic("T1", Attributes::new()).expect_err("bad response");
    assert!(matches!(err, MqRestError::Response { .. }));
    assert_eq!(transport.calls(), 1);
}

#[test]
fn ensure_qmgr_skips_display_without_desired_attributes() {
    let transport = MockTransport::new(vec![]);
    let mut session = session(&transport, config());
    let result = session.ensure_qmgr(Attributes::new()).expect("ensure");
    assert_eq!(result.action, EnsureAction::Unchanged);
    assert_eq!(transport.calls(), 0);
}

#[test]
fn ensure_qmgr_never_creates_and_propagates_display_errors() {
    let transport = MockTransport::new(vec![success(json!([])), success(json!([])), failure(2035)]);
    let mut session = session(&transport, config());
    let desired = attrs(json!({"description": "main", "max_handles": 512}));
    let result = session.ensure_qmgr(desired.clone()).expect("ensure");
    assert_eq!(result.action, EnsureAction::Updated);
    assert_eq!(result.changed, ["description", "max_handles"]);
    assert_eq!(transport.commands(), ["DISPLAY QMGR", "ALTER QMGR"]);
    assert!(transport.request(1).payload.get("name").is_none());

    let err = session.ensure_qmgr(desired).expect_err("display error");
    assert!(err.is_command_error());
}

// sync

fn channel_status(status: &str) -> Result<TransportResponse, MqRestError> {
    success(json!([item(json!({"CHANNEL": "TO.QM2", "STATUS": status}))]))
}

#[test]
fn start_channel_sync_counts_polls_until_running() {
    let transport = MockTransport::new(vec![
        success(json!([])),
        channel_status("STARTING"),
        channel_status("BINDING"),
        channel_status("BINDING"),
        channel_status("RUNNING"),
    ]);
    let clock = FakeClock::new();
    let sleeps = Arc::clone(&clock.sleeps);
    let mut session = session(&transport, config()).with_clock(clock);

    let result = session.start_channel_sync("TO.QM2", fast_sync(30.0)).expect("sync");
    assert_eq!(result.operation, SyncOperation::Started);
    assert_eq!(result.polls, 3);
    assert_eq!(result.elapsed_seconds, 3.0);
    assert_eq!(*sleeps.lock().expect("sleeps mutex poisoned"), [1.0, 1.0, 1.0]);
    assert_eq!(
        transport.commands(),
        ["START CHANNEL", "DISPLAY CHSTATUS", "DISPLAY CHSTATUS", "DISPLAY CHSTATUS", "DISPLAY CHSTATUS"]
    );
    assert_eq!(transport.request(1).payload["responseParameters"], json!(["all"]));
}

#[test]
fn start_channel_sync_reads_a_complete_chstatus_row() {
    let running = json!({
        "CHANNEL": "TO.QM2", "CHLTYPE": "SDR", "CONNAME": "10.0.0.2(1414)", "CURRENT": "YES",
        "STATUS": "RUNNING", "SUBSTATE": "MQGET", "XMITQ": "QM2", "BATCHES": 4, "BATCHSZ": 50,
        "BUFSRCVD": 9, "BUFSSENT": 14, "BYTSRCVD": 1168, "BYTSSENT": 5321,
        "CHSTADA": "2024-05-01", "CHSTATI": "10.15.02", "COMPHDR": ["NONE", "NONE"],
        "COMPMSG": ["NONE", "NONE"], "COMPRATE": ["", ""], "COMPTIME": ["", ""],
        "CURLUWID": "A1B2C3D4E5F60718", "CURMSGS": 0, "CURSEQNO": 4, "EXITTIME": ["", ""],
        "HBINT": 300, "INDOUBT": "NO", "JOBNAME": "0000046D00000001", "KAINT": 360,
        "LOCLADDR": "10.0.0.1(50123)", "LONGRTS": 999999999, "LSTLUWID": "A1B2C3D4E5F60717",
        "LSTMSGDA": "2024-05-01", "LSTMSGTI": "10.16.40", "LSTSEQNO": 4, "MAXMSGL": 4194304,
        "MCASTAT": "RUNNING", "MCAUSER": "mqm", "MONCHL": "OFF", "MSGS": 4,
        "NETTIME": ["", ""], "NPMSPEED": "FAST", "RQMNAME": "QM2", "RPRODUCT": "MQMM",
        "RVERSION": "09040000", "SECPROT": "NONE", "SHORTRTS": 10, "SSLCERTI": "",
        "SSLKEYDA": "", "SSLKEYTI": "", "SSLPEER": "", "SSLRKEYS": 0, "STATCHL": "OFF",
        "STOPREQ": "NO", "XBATCHSZ": ["", ""], "XQMSGSA": 0, "XQTIME": ["", ""]
    });
    let transport = MockTransport::new(vec![success(json!([])), success(json!([item(running)]))]);
    let mut session = session(&transport, config());

    let result = session.start_channel_sync("TO.QM2", fast_sync(30.0)).expect("strict sync");
    assert_eq!(result.operation, SyncOperation::Started);
    assert_eq!(result.polls, 0);
}

#[test]
fn stop_channel_sync_accepts_empty_status() {
    let transport = MockTransport::new(vec![success(json!([])), success(json!([]))]);
    let mut session = session(&transport, config());
    let result = session.stop_channel_sync("TO.QM2", None).expect("sync");
    assert_eq!(result.operation, SyncOperation::Stopped);
    assert_eq!(result.polls, 0);
}

#[test]
fn status_probe_command_errors_count_as_no_rows() {
    let transport = MockTransport::new(vec![
        success(json!([])),
        failure(3065),
        success(json!([item(json!({"LISTENER": "LSN1", "STATUS": "RUNNING"}))])),
    ]);
    let mut session = session(&transport, config());
    let result = session.start_listener_sync("LSN1", fast_sync(10.0)).expect("sync");
    assert_eq!(result.polls, 1);
}

#[test]
fn action_command_errors_propagate() {
    let transport = MockTransport::new(vec![failure(2085)]);
    let mut session = session(&transport, config());
    let err = session.start_service_sync("SVC1", None).expect_err("start failed");
    assert!(err.is_command_error());
    assert_eq!(transport.calls(), 1);
}

#[test]
fn sync_times_out_with_operation_and_elapsed() {
    let transport = MockTransport::new(vec![
        success(json!([])),
        channel_status("RETRYING"),
        channel_status("RETRYING"),
        channel_status("RETRYING"),
    ]);
    let mut session = session(&transport, config());
    let err = session.start_channel_sync("TO.QM2", fast_sync(2.0)).expect_err("timeout");
    let MqRestError::Timeout { name, operation, elapsed_seconds, source } = err else {
        panic!("expected timeout")
    };
    assert_eq!(name, "TO.QM2");
    assert_eq!(operation, "START");
    assert_eq!(elapsed_seconds, 2.0);
    assert!(source.is_none());
}

#[test]
fn cancelled_clock_ends_sync_as_interrupted_timeout() {
    let transport = MockTransport::new(vec![success(json!([])), channel_status("STOPPING")]);
    let clock = FakeClock::new();
    let flag = clock.cancellation.clone();
    let mut session = session(&transport, config()).with_clock(clock);
    flag.cancel();

    let err = session.stop_channel_sync("TO.QM2", fast_sync(30.0)).expect_err("interrupted");
    let MqRestError::Timeout { operation, source, .. } = err else {
        panic!("expected timeout")
    };
    assert_eq!(operation, "STOP");
    assert_eq!(source, Some(Interrupted));
    assert!(flag.is_cancelled());
}

#[test]
fn restart_sums_both_phases() {
    let transport = MockTransport::new(vec![
        success(json!([])),
        success(json!([])),
        success(json!([])),
        channel_status("STARTING"),
        channel_status("RUNNING"),
    ]);
    let mut session = session(&transport, config());
    let result = session.restart_channel("TO.QM2", fast_sync(30.0)).expect("restart");
    assert_eq!(result.operation, SyncOperation::Restarted);
    assert_eq!(result.polls, 1);
    assert_eq!(result.elapsed_seconds, 1.0);
    assert_eq!(
        transport.commands(),
        ["STOP CHANNEL", "DISPLAY CHSTATUS", "START CHANNEL", "DISPLAY CHSTATUS", "DISPLAY CHSTATUS"]
    );
}

#[test]
fn restart_never_starts_after_stop_timeout() {
    let transport = MockTransport::new(vec![
        success(json!([])),
        success(json!([item(json!({"SERVICE": "SVC1", "STATUS": "STOPPING"}))])),
        success(json!([item(json!({"SERVICE": "SVC1", "STATUS": "STOPPING"}))])),
    ]);
    let mut session = session(&transport, config());
    let err = session.restart_service("SVC1", fast_sync(1.0)).expect_err("stop timeout");
    assert!(err.is_timeout());
    assert!(!transport.commands().iter().any(|command| command.starts_with("START")));
}

#[test]
fn custom_lifecycle_object_uses_its_own_qualifiers() {
    let transport = MockTransport::new(vec![success(json!([])), success(json!([]))]);
    let mut config = config();
    config.map_attributes = false;
    let mut session = session(&transport, config);
    let object = LifecycleObject::new("CHANNEL", "CHSTATUS", &["STATUS"], true);
    let result = session
        .sync_object("TO.QM2", &object, Transition::Stop, None)
        .expect("sync");
    assert_eq!(result.operation, SyncOperation::Stopped);
}
