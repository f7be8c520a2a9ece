//! Room addressing: turns a host, party and room into a socket URL.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use ticketdesk_shared::is_local_address;
use url::form_urlencoded;
use uuid::Uuid;

const DEFAULT_PREFIX: &str = "parties";
const DEFAULT_PARTY: &str = "main";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("path must not start with a slash: {0}")]
    LeadingSlash(String),
}

/// Strip protocol prefix and trailing slash from a host.
pub fn normalize_host(host: &str) -> String {
    let host = ["http://", "https://", "ws://", "wss://"]
        .iter()
        .find_map(|scheme| host.strip_prefix(scheme))
        .unwrap_or(host);
    host.strip_suffix('/').unwrap_or(host).to_string()
}

/// Which family of URL to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    WebSocket,
    Http,
}

impl Scheme {
    /// Plain variant for local hosts, TLS variant for everything else.
    pub fn for_host(self, host: &str) -> &'static str {
        match (self, is_local_address(host)) {
            (Scheme::WebSocket, true) => "ws",
            (Scheme::WebSocket, false) => "wss",
            (Scheme::Http, true) => "http",
            (Scheme::Http, false) => "https",
        }
    }
}

pub type QueryParams = Vec<(String, Option<String>)>;

/// Query parameters, either fixed or computed fresh for every connect attempt.
#[derive(Clone, Default)]
pub enum Query {
    #[default]
    None,
    Static(QueryParams),
    Dynamic(Arc<dyn Fn() -> BoxFuture<'static, QueryParams> + Send + Sync>),
}

impl Query {
    pub fn dynamic<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryParams> + Send + 'static,
    {
        Query::Dynamic(Arc::new(move || Box::pin(f())))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::None => f.write_str("Query::None"),
            Query::Static(params) => f.debug_tuple("Query::Static").field(params).finish(),
            Query::Dynamic(_) => f.write_str("Query::Dynamic(..)"),
        }
    }
}

/// Produces the URL for a connect attempt.
#[derive(Clone)]
pub enum UrlProvider {
    Static(String),
    Dynamic(Arc<dyn Fn() -> BoxFuture<'static, String> + Send + Sync>),
}

impl UrlProvider {
    pub fn dynamic<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        UrlProvider::Dynamic(Arc::new(move || Box::pin(f())))
    }

    pub async fn resolve(&self) -> String {
        match self {
            UrlProvider::Static(url) => url.clone(),
            UrlProvider::Dynamic(f) => f().await,
        }
    }
}

impl fmt::Debug for UrlProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlProvider::Static(url) => f.debug_tuple("UrlProvider::Static").field(url).finish(),
            UrlProvider::Dynamic(_) => f.write_str("UrlProvider::Dynamic(..)"),
        }
    }
}

impl From<String> for UrlProvider {
    fn from(url: String) -> Self {
        UrlProvider::Static(url)
    }
}

impl From<&str> for UrlProvider {
    fn from(url: &str) -> Self {
        UrlProvider::Static(url.to_string())
    }
}

/// Everything needed to address one room.
#[derive(Debug, Clone, Default)]
pub struct RoomOptions {
    pub host: String,
    pub room: String,
    /// Defaults to `main`.
    pub party: Option<String>,
    /// Defaults to `parties`.
    pub prefix: Option<String>,
    /// Replaces the whole `prefix/party/room` segment when set.
    pub base_path: Option<String>,
    /// Extra path appended after the room, without a leading slash.
    pub path: Option<String>,
    /// Explicit protocol, skipping the local-host heuristic.
    pub protocol: Option<String>,
    pub query: Query,
    /// Connection id sent as `_pk`; a fresh uuid when unset.
    pub id: Option<String>,
}

impl RoomOptions {
    pub fn new(host: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            room: room.into(),
            ..Default::default()
        }
    }

    pub fn with_party(mut self, party: impl Into<String>) -> Self {
        self.party = Some(party.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A resolved room: where to connect and how to build the URL per attempt.
#[derive(Debug, Clone)]
pub struct RoomAddress {
    pub host: String,
    pub room: String,
    pub party: String,
    pub protocol: String,
    /// URL without the query string.
    pub base_url: String,
    pub url_provider: UrlProvider,
}

impl RoomAddress {
    /// Resolve a WebSocket address.
    pub fn resolve(options: &RoomOptions) -> Result<Self, AddressError> {
        Self::resolve_with(options, Scheme::WebSocket)
    }

    pub fn resolve_with(options: &RoomOptions, scheme: Scheme) -> Result<Self, AddressError> {
        let host = normalize_host(&options.host);
        if host.is_empty() {
            return Err(AddressError::EmptyHost);
        }
        if let Some(path) = options.path.as_deref().filter(|p| p.starts_with('/')) {
            return Err(AddressError::LeadingSlash(path.to_string()));
        }

        let party = options.party.as_deref().unwrap_or(DEFAULT_PARTY).to_string();
        let protocol = options
            .protocol
            .clone()
            .unwrap_or_else(|| scheme.for_host(&host).to_string());
        let location = match options.base_path.as_deref().filter(|b| !b.is_empty()) {
            Some(base_path) => base_path.to_string(),
            None => format!(
                "{}/{}/{}",
                options.prefix.as_deref().unwrap_or(DEFAULT_PREFIX),
                party,
                options.room
            ),
        };
        let path = options
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("/{p}"))
            .unwrap_or_default();
        let base_url = format!("{protocol}://{host}/{location}{path}");

        let defaults = vec![(
            "_pk".to_string(),
            Some(options.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string())),
        )];
        let url_provider = match &options.query {
            Query::None => UrlProvider::Static(make_url(&base_url, &defaults, &[])),
            Query::Static(params) => UrlProvider::Static(make_url(&base_url, &defaults, params)),
            Query::Dynamic(query) => {
                let query = Arc::clone(query);
                let base_url = base_url.clone();
                UrlProvider::dynamic(move || {
                    let params = query();
                    let base_url = base_url.clone();
                    let defaults = defaults.clone();
                    async move { make_url(&base_url, &defaults, &params.await) }
                })
            }
        };

        Ok(Self {
            host,
            room: options.room.clone(),
            party,
            protocol,
            base_url,
            url_provider,
        })
    }
}

/// Origin (`scheme://host`) for plain HTTP calls against the same host.
pub fn http_origin(host: &str) -> String {
    let host = normalize_host(host);
    format!("{}://{}", Scheme::Http.for_host(&host), host)
}

fn make_url(
    base_url: &str,
    defaults: &[(String, Option<String>)],
    params: &[(String, Option<String>)],
) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in defaults.iter().chain(params) {
        if let Some(value) = value {
            query.append_pair(key, value);
        }
    }
    format!("{}?{}", base_url, query.finish())
}
