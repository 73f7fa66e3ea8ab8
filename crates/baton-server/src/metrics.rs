// Metrics bootstrap
// Describes the election metrics and, when enabled, serves them for Prometheus scraping

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Prometheus exporter settings (`baton.metrics.*`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9464,
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .address
            .parse()
            .with_context(|| format!("invalid metrics address '{}'", self.address))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Initialize all metric descriptions and the optional scrape endpoint.
/// Should be called once at application startup, inside the runtime
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    if config.enabled {
        let addr = config.listen_addr()?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics endpoint listening");
    }

    // Descriptions go to whichever recorder is installed, so describe afterwards
    baton_election::metrics::describe_metrics();
    Ok(())
}
