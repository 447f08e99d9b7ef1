use super::{Transport, TransportResponse};
use crate::auth::Credentials;
use crate::error::MqRestError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde_json::Value as JsonValue;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ureq::ErrorKind;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trust anchors and client identity for HTTPS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub ca_bundle: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    /// Falls back to `client_cert` when the key lives in the same PEM file.
    pub client_key: Option<PathBuf>,
}

impl TlsSettings {
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Client identity for certificate credentials; other variants add none.
    pub fn for_credentials(credentials: &Credentials) -> Self {
        match credentials {
            Credentials::Certificate { cert_path, key_path } => Self {
                ca_bundle: None,
                client_cert: Some(cert_path.clone()),
                client_key: key_path.clone(),
            },
            _ => Self::default(),
        }
    }

    fn is_custom(&self) -> bool {
        self.ca_bundle.is_some() || self.client_cert.is_some()
    }
}

/// Blocking HTTP transport backed by a `ureq` agent.
pub struct HttpTransport {
    connect_timeout: Duration,
    tls: TlsSettings,
    verifying: ureq::Agent,
    non_verifying: Mutex<Option<ureq::Agent>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls: TlsSettings::default(),
            verifying: ureq::AgentBuilder::new().timeout_connect(DEFAULT_CONNECT_TIMEOUT).build(),
            non_verifying: Mutex::new(None),
        }
    }

    pub fn with_tls(tls: TlsSettings) -> Result<Self, MqRestError> {
        let mut builder = ureq::AgentBuilder::new().timeout_connect(DEFAULT_CONNECT_TIMEOUT);
        if tls.is_custom() {
            builder = builder.tls_config(Arc::new(build_client_config(&tls, true)?));
        }
        Ok(Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls,
            verifying: builder.build(),
            non_verifying: Mutex::new(None),
        })
    }

    /// Transport for a session's credentials. Certificate credentials only
    /// take effect through this (or [`HttpTransport::with_tls`]); `ca_bundle`
    /// verifies the server when the client presents a certificate.
    pub fn for_credentials(
        credentials: &Credentials,
        ca_bundle: Option<PathBuf>,
    ) -> Result<Self, MqRestError> {
        let mut tls = TlsSettings::for_credentials(credentials);
        tls.ca_bundle = ca_bundle;
        Self::with_tls(tls)
    }

    fn non_verifying_agent(&self) -> Result<ureq::Agent, MqRestError> {
        let mut slot = self.non_verifying.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(agent) = slot.as_ref() {
            return Ok(agent.clone());
        }
        log::warn!("building https agent with server certificate verification disabled");
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.connect_timeout)
            .tls_config(Arc::new(build_client_config(&self.tls, false)?))
            .build();
        *slot = Some(agent.clone());
        Ok(agent)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        payload: &JsonValue,
        headers: &[(String, String)],
        timeout: Option<Duration>,
        verify_tls: bool,
    ) -> Result<TransportResponse, MqRestError> {
        let agent =
            if verify_tls { self.verifying.clone() } else { self.non_verifying_agent()? };
        let body = serde_json::to_string(payload).map_err(|err| MqRestError::Transport {
            message: format!("failed to encode request payload: {err}"),
            url: url.to_owned(),
            source: Some(Box::new(err)),
        })?;

        let mut request = agent.post(url).set("Content-Type", "application/json");
        for (name, value) in headers {
            request = request.set(name, value);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send_string(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(MqRestError::Transport {
                    message: describe_transport_failure(&transport),
                    url: url.to_owned(),
                    source: Some(Box::new(transport)),
                });
            }
        };

        let status_code = response.status();
        let mut response_headers = Vec::new();
        for name in response.headers_names() {
            for value in response.all(&name) {
                response_headers.push((name.clone(), value.to_owned()));
            }
        }
        let body = response.into_string().map_err(|err| MqRestError::Transport {
            message: format!("failed to read response body: {err}"),
            url: url.to_owned(),
            source: Some(Box::new(err)),
        })?;
        log::trace!("POST {url} -> {status_code}");
        Ok(TransportResponse { status_code, body, headers: response_headers })
    }
}

fn build_client_config(tls: &TlsSettings, verify: bool) -> Result<ClientConfig, MqRestError> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|err| MqRestError::config(format!("unsupported tls protocol set: {err}")))?;

    let builder = if verify {
        let Some(ca_bundle) = tls.ca_bundle.as_deref() else {
            return Err(MqRestError::config(
                "a CA bundle is required to verify the server when a client certificate is used",
            ));
        };
        builder.with_root_certificates(load_root_store(ca_bundle).map_err(config_io_error)?)
    } else {
        builder.dangerous().with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert {
            algorithms: provider.signature_verification_algorithms,
        }))
    };

    match tls.client_cert.as_deref() {
        None => Ok(builder.with_no_client_auth()),
        Some(cert_path) => {
            let chain = load_cert_chain(cert_path).map_err(config_io_error)?;
            let key_path = tls.client_key.as_deref().unwrap_or(cert_path);
            let key = load_private_key(key_path).map_err(config_io_error)?;
            builder.with_client_auth_cert(chain, key).map_err(|err| {
                MqRestError::config(format!("invalid client certificate/key configuration: {err}"))
            })
        }
    }
}

fn config_io_error(err: io::Error) -> MqRestError {
    MqRestError::config(err.to_string())
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

fn load_cert_chain(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|err| {
        io::Error::new(err.kind(), format!("failed to open {}: {err}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    let certificates =
        rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>().map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse PEM certs from {}: {}", path.display(), err),
            )
        })?;
    if certificates.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no certificates found in {}", path.display()),
        ));
    }
    Ok(certificates)
}

fn load_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|err| {
        io::Error::new(err.kind(), format!("failed to open {}: {err}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    let key = rustls_pemfile::private_key(&mut reader).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to parse private key {}: {}", path.display(), err),
        )
    })?;
    key.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key found in {}", path.display()),
        )
    })
}

fn load_root_store(path: &Path) -> io::Result<RootCertStore> {
    let certificates = load_cert_chain(path)?;
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(certificates);
    if added == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no valid CA certificates found in {}", path.display()),
        ));
    }
    Ok(roots)
}

/// One line naming what went wrong on the way to the mqweb server, plus the
/// agent's own detail when it has one.
fn describe_transport_failure(transport: &ureq::Transport) -> String {
    let reason = match transport.kind() {
        ErrorKind::Dns | ErrorKind::ConnectionFailed => "mqweb server unreachable",
        ErrorKind::Io => "connection to mqweb server dropped",
        ErrorKind::InvalidUrl | ErrorKind::UnknownScheme | ErrorKind::InsecureRequestHttpsOnly => {
            "rest url rejected before sending"
        }
        ErrorKind::InvalidProxyUrl | ErrorKind::ProxyConnect | ErrorKind::ProxyUnauthorized => {
            "proxy refused the request"
        }
        ErrorKind::BadStatus
        | ErrorKind::BadHeader
        | ErrorKind::TooManyRedirects
        | ErrorKind::HTTP => "mqweb server sent an unusable reply",
    };
    let detail = transport
        .message()
        .map(str::to_owned)
        .or_else(|| std::error::Error::source(transport).map(|source| source.to_string()))
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty());
    match detail {
        Some(detail) => format!("{reason}: {detail}"),
        None => reason.to_owned(),
    }
}
