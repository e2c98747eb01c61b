//! Configuration types for a pipeline session.
//!
//! All session behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The builder lets callers set only what they
//! care about and rely on documented defaults for the rest.

use crate::error::SchematizeError;
use crate::gateway::Transport;
use std::fmt;
use std::sync::Arc;

/// Environment variable consulted when no base URL is configured.
pub const BASE_URL_ENV: &str = "SCHEMATIZE_API_URL";

/// Configuration for a pipeline session.
///
/// # Example
/// ```rust
/// use schematize_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .base_url("http://localhost:8000")
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.endpoints.extract, "/extrair/");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Base address of the processing service, e.g. `http://localhost:8000`.
    /// If None (and no `transport`), [`BASE_URL_ENV`] is consulted.
    pub base_url: Option<String>,

    /// Path of each stage endpoint relative to `base_url`.
    pub endpoints: EndpointPaths,

    /// Multipart field name carrying the document at Upload. Default: `"pdf"`.
    pub upload_field: String,

    /// `export_format` sent to the export service. Default: `"pdf"`.
    pub export_format: String,

    /// Whether the Edit stage accepts user-edited schematization. Default: true.
    ///
    /// A read-only Edit stage still calls the edit service, it just forwards
    /// the schematization unchanged.
    pub editable: bool,

    /// Whole-request timeout for one stage call in seconds. Default: 60.
    ///
    /// Schematization runs one LLM call per section on the service side, so
    /// large documents may need more.
    pub api_timeout_secs: u64,

    /// TCP connect timeout in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Pre-constructed transport. Takes precedence over `base_url`.
    pub transport: Option<Arc<dyn Transport>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            endpoints: EndpointPaths::default(),
            upload_field: "pdf".to_string(),
            export_format: "pdf".to_string(),
            editable: true,
            api_timeout_secs: 60,
            connect_timeout_secs: 10,
            download_timeout_secs: 120,
            transport: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("base_url", &self.base_url)
            .field("endpoints", &self.endpoints)
            .field("upload_field", &self.upload_field)
            .field("export_format", &self.export_format)
            .field("editable", &self.editable)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn Transport>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The base URL to use: configured value first, then the environment.
    pub fn resolved_base_url(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .filter(|u| !u.trim().is_empty())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn endpoints(mut self, endpoints: EndpointPaths) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn upload_field(mut self, name: impl Into<String>) -> Self {
        self.config.upload_field = name.into();
        self
    }

    pub fn export_format(mut self, format: impl Into<String>) -> Self {
        self.config.export_format = format.into();
        self
    }

    pub fn editable(mut self, v: bool) -> Self {
        self.config.editable = v;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, SchematizeError> {
        let c = &self.config;
        if let Some(ref url) = c.base_url {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                SchematizeError::InvalidConfig(format!("base URL '{url}' is not a valid URL: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SchematizeError::InvalidConfig(format!(
                    "base URL must be http or https, got '{}'",
                    parsed.scheme()
                )));
            }
        }
        if c.upload_field.trim().is_empty() {
            return Err(SchematizeError::InvalidConfig(
                "upload field name must not be empty".into(),
            ));
        }
        if c.export_format.trim().is_empty() {
            return Err(SchematizeError::InvalidConfig(
                "export format must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(SchematizeError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        c.endpoints.validate()?;
        Ok(self.config)
    }
}

/// Endpoint path per stage, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    pub extract: String,
    pub summarize: String,
    pub schematize: String,
    pub edit: String,
    pub export: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            extract: "/extrair/".to_string(),
            summarize: "/sumarizar/".to_string(),
            schematize: "/esquematizar/".to_string(),
            edit: "/editar/".to_string(),
            export: "/exportar/".to_string(),
        }
    }
}

impl EndpointPaths {
    fn validate(&self) -> Result<(), SchematizeError> {
        for (name, path) in [
            ("extract", &self.extract),
            ("summarize", &self.summarize),
            ("schematize", &self.schematize),
            ("edit", &self.edit),
            ("export", &self.export),
        ] {
            if !path.starts_with('/') {
                return Err(SchematizeError::InvalidConfig(format!(
                    "{name} endpoint must start with '/', got '{path}'"
                )));
            }
        }
        Ok(())
    }
}
