use anyhow::{Context, Result};
use svcgraph_config::Config;
use svcgraph_statsd::MetricsClientConfig;

/// Validates settings that can only be checked together.
pub fn check_config(config: &Config) -> Result<()> {
    if config.request_timeout().is_zero() {
        anyhow::bail!("`limits.request_timeout` must be greater than zero");
    }

    if !(0.0..=1.0).contains(&config.metrics_sample_rate()) {
        anyhow::bail!(
            "`metrics.sample_rate` must be between 0.0 and 1.0, got {}",
            config.metrics_sample_rate()
        );
    }

    Ok(())
}

/// Initialize the logging system.
pub fn init_logging(config: &Config) {
    svcgraph_log::init(config.logging());
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        svcgraph_log::info!("launching svcgraph without config folder");
    } else {
        svcgraph_log::info!(
            "launching svcgraph from config folder {}",
            config.path().display()
        );
    }
    svcgraph_log::info!("  release: {}", svcgraph_log::RELEASE);
    svcgraph_log::info!("  graph store: {}", config.store().uri);
    svcgraph_log::info!(
        "  cluster lookups: {}",
        if config.cluster_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    svcgraph_log::info!("  dedup window: {}s", config.dedup_ttl().as_secs());
    svcgraph_log::info!("  log level: {}", config.logging().level);
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    svcgraph_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags,
        sample_rate: config.metrics_sample_rate(),
    })
    .with_context(|| format!("failed to set up statsd client for {host}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_config() {
        let config = Config::from_json_value(serde_json::json!({})).unwrap();
        assert!(check_config(&config).is_ok());

        let config =
            Config::from_json_value(serde_json::json!({"limits": {"request_timeout": 0}}))
                .unwrap();
        assert!(check_config(&config).is_err());

        let config =
            Config::from_json_value(serde_json::json!({"metrics": {"sample_rate": 1.5}})).unwrap();
        insta::assert_snapshot!(
            check_config(&config).unwrap_err(),
            @"`metrics.sample_rate` must be between 0.0 and 1.0, got 1.5"
        );
    }
}
