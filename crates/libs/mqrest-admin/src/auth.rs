use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

pub const LTPA_COOKIE_NAME: &str = "LtpaToken2";
pub const LTPA_LOGIN_PATH: &str = "/login";

/// How a session authenticates against the REST endpoint.
#[derive(Clone)]
#[non_exhaustive]
pub enum Credentials {
    /// HTTP basic authentication on every request.
    Basic { username: String, password: Zeroizing<String> },
    /// One login at session construction; the returned cookie rides on every
    /// later request.
    Ltpa { username: String, password: Zeroizing<String> },
    /// Mutual TLS. The transport presents the client certificate, so no
    /// header is added; build it with `HttpTransport::for_credentials` so the
    /// certificate is actually loaded.
    Certificate { cert_path: PathBuf, key_path: Option<PathBuf> },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic { username: username.into(), password: Zeroizing::new(password.into()) }
    }

    pub fn ltpa(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Ltpa { username: username.into(), password: Zeroizing::new(password.into()) }
    }

    pub fn certificate(cert_path: impl Into<PathBuf>, key_path: Option<PathBuf>) -> Self {
        Self::Certificate { cert_path: cert_path.into(), key_path }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Ltpa { .. } => "ltpa",
            Self::Certificate { .. } => "certificate",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Ltpa { username, .. } => f
                .debug_struct("Ltpa")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Certificate { cert_path, key_path } => f
                .debug_struct("Certificate")
                .field("cert_path", cert_path)
                .field("key_path", key_path)
                .finish(),
        }
    }
}

pub(crate) fn basic_auth_header(username: &str, password: &str) -> String {
    let joined = Zeroizing::new(format!("{username}:{password}"));
    format!("Basic {}", BASE64_STANDARD.encode(joined.as_bytes()))
}

/// Session cookie captured by a successful LTPA login.
#[derive(Clone)]
pub(crate) struct LtpaCookie {
    pub name: String,
    pub token: Zeroizing<String>,
}

impl LtpaCookie {
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.token.as_str())
    }
}

impl fmt::Debug for LtpaCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LtpaCookie").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Finds the LTPA cookie in the response headers. Header names match
/// case-insensitively; the cookie name may carry a suffix.
pub(crate) fn extract_ltpa_cookie(headers: &[(String, String)]) -> Option<LtpaCookie> {
    headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
        .flat_map(|(_, value)| value.split(';'))
        .map(str::trim)
        .filter(|part| part.starts_with(LTPA_COOKIE_NAME))
        .find_map(|part| {
            let (name, token) = part.split_once('=')?;
            Some(LtpaCookie { name: name.to_owned(), token: Zeroizing::new(token.to_owned()) })
        })
}
