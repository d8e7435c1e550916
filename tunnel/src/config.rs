use http::HeaderValue;
use http::header::HeaderName;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::{Host, Url};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: i64 = 3000;
pub const DEFAULT_ROUTE: &str = "/tunnel";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const MAX_HOSTNAME_LEN: usize = 255;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("projects cannot be empty")]
    NoProjects,

    #[error("invalid upstream.base_url: {0}")]
    InvalidUpstreamUrl(String),

    #[error("server.port must be between 1 and 65535, got {0}")]
    InvalidPort(i64),

    #[error("invalid server.route: {0}")]
    InvalidRoute(&'static str),

    #[error("invalid server.header_name: {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid server.allowed_origins entry: {0:?}")]
    InvalidOrigin(String),

    #[error("upstream.timeout_secs must be greater than 0")]
    InvalidTimeout,

    #[error("project {0:?} is missing its upstream credentials")]
    MissingCredentials(String),
}

/// Tunnel configuration as it appears in the settings document.
///
/// Nothing is validated at this stage: ports are plain integers and the base
/// URL a plain string, so that `Config::load` can report problems in a fixed
/// order instead of failing on whatever serde happens to see first.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawConfig {
    /// Maps application identifiers to their upstream project
    #[serde(default, deserialize_with = "deserialize_projects")]
    pub projects: HashMap<String, RawProject>,
    pub server: RawServerSettings,
    pub upstream: RawUpstreamSettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawProject {
    /// Sentry project ids are numeric, so the document may leave them unquoted.
    #[serde(deserialize_with = "deserialize_project_id")]
    pub upstream_project_id: String,
    pub upstream_key: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default = "default_route")]
    pub route: String,
    /// Request header carrying the application identifier
    pub header_name: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawUpstreamSettings {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Builds the project map. A repeated id is an error, never last-wins.
fn deserialize_projects<'de, D>(deserializer: D) -> Result<HashMap<String, RawProject>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ProjectsVisitor;

    impl<'de> Visitor<'de> for ProjectsVisitor {
        type Value = HashMap<String, RawProject>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of application ids to projects")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut projects = HashMap::new();
            while let Some((id, project)) = map.next_entry::<String, RawProject>()? {
                match projects.entry(id) {
                    Entry::Occupied(entry) => {
                        return Err(de::Error::custom(format!(
                            "duplicate project id {:?}",
                            entry.key()
                        )));
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(project);
                    }
                }
            }
            Ok(projects)
        }
    }

    deserializer.deserialize_map(ProjectsVisitor)
}

fn deserialize_project_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ProjectId {
        Text(String),
        Number(u64),
    }

    Ok(match ProjectId::deserialize(deserializer)? {
        ProjectId::Text(id) => id,
        ProjectId::Number(id) => id.to_string(),
    })
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}

fn default_port() -> i64 {
    DEFAULT_PORT
}

fn default_route() -> String {
    DEFAULT_ROUTE.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// One tenant's upstream destination.
#[derive(Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub upstream_project_id: String,
    pub upstream_key: String,
}

// The key is a credential and must not end up in logs.
impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("upstream_project_id", &self.upstream_project_id)
            .field("upstream_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

impl AllowedOrigins {
    pub fn allows(&self, origin: &HeaderValue) -> bool {
        match self {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(origins) => origins.contains(origin),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub route: String,
    pub header_name: HeaderName,
    pub allowed_origins: AllowedOrigins,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

/// Validated, immutable tunnel configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub projects: HashMap<String, Project>,
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
}

impl Config {
    /// Validates the raw settings and builds the configuration used by the tunnel.
    ///
    /// Checks run in a fixed order and the first violation is returned.
    pub fn load(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.projects.is_empty() {
            return Err(ConfigError::NoProjects);
        }

        let base_url = parse_upstream_url(&raw.upstream.base_url)?;
        let port = validate_port(raw.server.port)?;
        validate_route(&raw.server.route)?;

        let header_name = HeaderName::from_bytes(raw.server.header_name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(raw.server.header_name.clone()))?;
        let allowed_origins = parse_allowed_origins(&raw.server.allowed_origins)?;

        if raw.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let mut ids: Vec<&String> = raw.projects.keys().collect();
        ids.sort();
        for id in ids {
            let project = &raw.projects[id];
            if project.upstream_project_id.is_empty() || project.upstream_key.is_empty() {
                return Err(ConfigError::MissingCredentials(id.clone()));
            }
        }

        let projects = raw
            .projects
            .into_iter()
            .map(|(id, project)| {
                let project = Project {
                    id: id.clone(),
                    upstream_project_id: project.upstream_project_id,
                    upstream_key: project.upstream_key,
                };
                (id, project)
            })
            .collect();

        Ok(Config {
            projects,
            server: ServerSettings {
                host: raw.server.host,
                port,
                route: raw.server.route,
                header_name,
                allowed_origins,
            },
            upstream: UpstreamSettings {
                base_url,
                timeout: Duration::from_secs(raw.upstream.timeout_secs),
            },
        })
    }
}

fn parse_upstream_url(raw: &str) -> Result<Url, ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidUpstreamUrl(format!("{raw:?}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUpstreamUrl(format!(
            "scheme must be http or https, got {:?}",
            url.scheme()
        )));
    }

    match url.host() {
        Some(Host::Domain(domain)) if (1..=MAX_HOSTNAME_LEN).contains(&domain.len()) => Ok(url),
        Some(Host::Domain(domain)) => Err(ConfigError::InvalidUpstreamUrl(format!(
            "hostname must be between 1 and {MAX_HOSTNAME_LEN} characters, got {}",
            domain.len()
        ))),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Err(ConfigError::InvalidUpstreamUrl(
            "hostname must not be an IP address".into(),
        )),
        None => Err(ConfigError::InvalidUpstreamUrl("missing hostname".into())),
    }
}

fn validate_port(port: i64) -> Result<u16, ConfigError> {
    u16::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or(ConfigError::InvalidPort(port))
}

fn validate_route(route: &str) -> Result<(), ConfigError> {
    if route.is_empty() {
        return Err(ConfigError::InvalidRoute("cannot be empty"));
    }
    if !route.starts_with('/') {
        return Err(ConfigError::InvalidRoute("must start with '/'"));
    }
    if route.len() > 1 && route.ends_with('/') {
        return Err(ConfigError::InvalidRoute("must not end with '/'"));
    }
    Ok(())
}

fn parse_allowed_origins(origins: &[String]) -> Result<AllowedOrigins, ConfigError> {
    if origins.iter().any(|origin| origin == "*") {
        return Ok(AllowedOrigins::Any);
    }

    origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(AllowedOrigins::List)
}
