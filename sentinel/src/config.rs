use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::fmt::Write as _;
use tunnel::config::{
    AllowedOrigins, Config as TunnelConfig, ConfigError as TunnelConfigError, RawConfig,
};

const CONFIG_FILE_NAMES: &[&str] = &["settings.yaml", "settings.yml", "settings.json"];

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

fn default_metrics_prefix() -> String {
    "sentinel".into()
}

#[derive(Deserialize, Debug)]
pub struct LoggingConfig {
    /// Where the tunnel reports its own errors. Unrelated to the tunneled projects.
    pub sentry_dsn: Option<String>,
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            sentry_dsn: None,
            level: default_log_level(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(flatten)]
    pub tunnel: RawConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Validates the tunnel section. Must succeed before anything is served.
    pub fn tunnel_config(&self) -> Result<TunnelConfig, ConfigError> {
        Ok(TunnelConfig::load(self.tunnel.clone())?)
    }
}

/// Returns `explicit` if given, otherwise the first settings file found in
/// the working directory, `$HOME/.sentinel/` or `/etc/sentinel/`.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let mut dirs = vec![PathBuf::from(".")];
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(".sentinel"));
    }
    dirs.push(PathBuf::from("/etc/sentinel"));

    find_in(&dirs).ok_or(ConfigError::NotFound)
}

fn find_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Human readable description of a validated config. Upstream keys are left out.
pub fn summary(config: &TunnelConfig) -> String {
    let mut base_url = config.upstream.base_url.clone();
    // userinfo is the only place a credential could hide in the base url
    let _ = base_url.set_username("");
    let _ = base_url.set_password(None);

    let origins = match &config.server.allowed_origins {
        AllowedOrigins::Any => "*".to_string(),
        AllowedOrigins::List(list) if list.is_empty() => "none".to_string(),
        AllowedOrigins::List(list) => list
            .iter()
            .map(|origin| origin.to_str().unwrap_or("<non-ascii>"))
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut out = String::new();
    let _ = writeln!(out, "listen:   {}:{}", config.server.host, config.server.port);
    let _ = writeln!(out, "route:    {}", config.server.route);
    let _ = writeln!(out, "header:   {}", config.server.header_name);
    let _ = writeln!(out, "origins:  {origins}");
    let _ = writeln!(
        out,
        "upstream: {} (timeout {}s)",
        base_url,
        config.upstream.timeout.as_secs()
    );

    let mut ids: Vec<_> = config.projects.keys().collect();
    ids.sort();
    let _ = writeln!(out, "projects: {}", ids.len());
    for id in ids {
        let project = &config.projects[id];
        let _ = writeln!(out, "  {id} -> {}", project.upstream_project_id);
    }
    out
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no config file found, pass --config-file-path or create settings.yaml")]
    NotFound,
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid tunnel config: {0}")]
    InvalidTunnel(#[from] TunnelConfigError),
}
