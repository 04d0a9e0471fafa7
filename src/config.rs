// Configuration management module
// This file handles loading and parsing of the metrics settings
// from environment variables
//
// Numan Thabit 2025 Nov

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Deployment environment reported in the `Environment` dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentEnvironment {
    Production,
    #[default]
    Development,
    Local,
}

impl DeploymentEnvironment {
    pub fn tag_value(&self) -> &'static str {
        match self {
            DeploymentEnvironment::Production => "prod",
            DeploymentEnvironment::Development => "dev",
            DeploymentEnvironment::Local => "local",
        }
    }
}

/// High level grouping of metrics, used as the backend namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionGroup {
    /// Content supply data collector applications
    CatalogDataCollector,
    #[default]
    DirectApiService,
}

impl CollectionGroup {
    pub fn group_name(&self) -> &'static str {
        match self {
            CollectionGroup::CatalogDataCollector => "Data Sources",
            CollectionGroup::DirectApiService => "Direct API Service",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
    DataCollector,
}

impl InstanceType {
    pub fn tag_value(&self) -> &'static str {
        match self {
            InstanceType::DataCollector => "data_collector",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Service name; used as the Application Name tag unless `app_name` is set
    #[serde(default = "default_application_name")]
    pub application_name: String,
    /// Optional override for the Application Name tag value
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub environment: DeploymentEnvironment,
    #[serde(default)]
    pub collection_group: CollectionGroup,
    /// Free-form namespace; takes precedence over `collection_group`
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_publish_interval_secs")]
    pub publish_interval_secs: u64,
    #[serde(default)]
    pub instance_type: Option<InstanceType>,
    /// Feature switch: record `restapi.duration` for every inbound request
    #[serde(default)]
    pub rest_api_monitoring_enabled: bool,
    #[serde(default = "default_region")]
    pub region: String,
    /// Push endpoint for metric batches; batches are logged when unset
    #[serde(default)]
    pub sink_endpoint: Option<Url>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_application_name() -> String {
    "unknown-service".to_string()
}

fn default_publish_interval_secs() -> u64 {
    30
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            app_name: None,
            environment: DeploymentEnvironment::default(),
            collection_group: CollectionGroup::default(),
            namespace: None,
            publish_interval_secs: default_publish_interval_secs(),
            instance_type: None,
            rest_api_monitoring_enabled: false,
            region: default_region(),
            sink_endpoint: None,
            listen_addr: default_listen_addr(),
        }
    }
}

impl MetricsConfig {
    /// Loads `METRICS__*` environment variables, e.g.
    /// `METRICS__ENVIRONMENT=production`.
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("METRICS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("read METRICS__* environment")?;
        let parsed: Self = cfg
            .try_deserialize()
            .context("deserialize metrics configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.publish_interval_secs > 0,
            "publish_interval_secs must be positive"
        );
        ensure!(
            !self.effective_application_name().is_empty(),
            "application name must not be blank"
        );
        Ok(())
    }

    /// Application Name tag value: the override when non-blank, else the
    /// service name.
    pub fn effective_application_name(&self) -> &str {
        match self.app_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.application_name.trim(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self.namespace.as_deref().map(str::trim) {
            Some(ns) if !ns.is_empty() => ns,
            _ => self.collection_group.group_name(),
        }
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }
}
