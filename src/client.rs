use crate::element::{Element, Response, parse_response};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 443;

const FILER_PATH: &str = "/servlets/netapp.servlets.admin.XMLrequest_filer";
const FILER_NAMESPACE: &str = "http://www.netapp.com/filer/admin";

/// errno used for failures produced locally rather than by the cluster.
pub const ERRNO_INTERNAL: i32 = 13001;
pub const ERRNO_AUTHORIZATION: i32 = 13002;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Https,
    Http,
}

impl Transport {
    fn scheme(self) -> &'static str {
        match self {
            Transport::Https => "https",
            Transport::Http => "http",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 170,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub api_version: ApiVersion,
    pub username: String,
    pub password: String,
    pub verify_tls: bool,
}

impl SessionConfig {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            transport: Transport::Https,
            api_version: ApiVersion::default(),
            username: username.to_string(),
            password: password.to_string(),
            verify_tls: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Unable to set transport: {0}")]
    Transport(String),
    #[error("Error connecting: {0}")]
    Rejected(String),
}

impl ConnectError {
    pub fn reason(&self) -> &str {
        match self {
            ConnectError::Transport(reason) | ConnectError::Rejected(reason) => reason,
        }
    }
}

/// An authenticated session against one cluster management endpoint.
#[derive(Debug)]
pub struct Session {
    url: Url,
    http: Client,
    username: String,
    password: String,
    api_version: ApiVersion,
    version: Option<String>,
}

impl Session {
    /// Opens a session and confirms it with `system-get-version`.
    pub fn connect(config: &SessionConfig) -> Result<Self, ConnectError> {
        let url = endpoint_url(config)?;
        let http = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(concat!("smupdate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConnectError::Transport(err.to_string()))?;

        let mut session = Self {
            url,
            http,
            username: config.username.clone(),
            password: config.password.clone(),
            api_version: config.api_version,
            version: None,
        };

        let output = session.invoke(&Element::node("system-get-version", Vec::new()));
        if !output.is_passed() {
            return Err(ConnectError::Rejected(output.reason().to_string()));
        }

        session.version = output.child_string("version").map(str::to_string);
        debug!(
            "Cluster {} is running {}",
            config.host,
            session.version.as_deref().unwrap_or("an unknown version")
        );
        Ok(session)
    }

    pub fn remote_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Sends one API element and returns the parsed reply.
    ///
    /// Transport and HTTP errors are folded into a failed [`Response`] so
    /// callers only ever inspect the status.
    pub fn invoke(&self, api: &Element) -> Response {
        debug!(api = api.name(), url = %self.url, "invoking API");

        let sent = self
            .http
            .post(self.url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/xml; charset=\"UTF-8\""),
            )
            .body(self.envelope(api))
            .send();

        let response = match sent {
            Ok(response) => response,
            Err(err) => return Response::failed(ERRNO_INTERNAL, err.to_string()),
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Response::failed(ERRNO_AUTHORIZATION, "Authorization failed");
        }
        if !status.is_success() {
            return Response::failed(
                ERRNO_INTERNAL,
                format!("Server returned HTTP Error: {status}"),
            );
        }

        let text = match response.text() {
            Ok(text) => text,
            Err(err) => {
                return Response::failed(ERRNO_INTERNAL, format!("reading response body: {err}"));
            }
        };

        parse_response(&text).unwrap_or_else(|err| {
            Response::failed(ERRNO_INTERNAL, format!("malformed API response: {err}"))
        })
    }

    fn envelope(&self, api: &Element) -> String {
        format!(
            "<?xml version='1.0' encoding='utf-8'?>\n\
             <!DOCTYPE netapp SYSTEM 'file:/etc/netapp_filer.dtd'>\n\
             <netapp version='{}' xmlns='{}'>{}</netapp>",
            self.api_version, FILER_NAMESPACE, api
        )
    }
}

fn endpoint_url(config: &SessionConfig) -> Result<Url, ConnectError> {
    let host = if config.host.contains(':') && !config.host.starts_with('[') {
        format!("[{}]", config.host)
    } else {
        config.host.clone()
    };
    let raw = format!(
        "{}://{}:{}{}",
        config.transport.scheme(),
        host,
        config.port,
        FILER_PATH
    );
    Url::parse(&raw).map_err(|err| {
        ConnectError::Transport(format!("invalid cluster address `{}`: {err}", config.host))
    })
}
