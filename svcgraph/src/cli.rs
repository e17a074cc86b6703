use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use svcgraph_config::{Config, OverridableConfig};

use crate::cliapp::make_app;
use crate::setup;

/// Config folder used when neither `--config` nor `SVCGRAPH_CONFIG` is given.
const DEFAULT_CONFIG_PATH: &str = ".svcgraph";

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(DEFAULT_CONFIG_PATH), PathBuf::as_path);

    let mut config = Config::from_path(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    if let Some(matches) = matches.subcommand_matches("config") {
        svcgraph_log::init(config.logging());
        manage_config(&config, matches)
    } else if let Some(matches) = matches.subcommand_matches("run") {
        config.apply_override(extract_config_args(matches))?;
        run(config)
    } else {
        unreachable!();
    }
}

/// Extracts config overrides from the `run` command.
///
/// Environment variables are already folded into the matches, with command line arguments
/// taking precedence.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    let value = |name: &str| matches.get_one::<String>(name).cloned();

    OverridableConfig {
        host: value("host"),
        port: value("port"),
        store_uri: value("store_uri"),
        store_username: value("store_username"),
        store_password: value("store_password"),
        cluster_enabled: value("cluster_enabled"),
        dedup_ttl: value("dedup_ttl"),
        shutdown_timeout: value("shutdown_timeout"),
    }
}

#[allow(clippy::print_stdout)]
pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    if let Some(matches) = matches.subcommand_matches("show") {
        match matches.get_one::<String>("format").map(String::as_str) {
            Some("debug") => println!("{config:#?}"),
            Some("yaml") | None => println!("{}", config.to_yaml_string()?),
            _ => unreachable!(),
        }
        Ok(())
    } else {
        unreachable!();
    }
}

pub fn run(config: Config) -> Result<()> {
    setup::check_config(&config)?;
    setup::init_logging(&config);
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;

    svcgraph_server::run(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        make_app().debug_assert();
    }

    #[test]
    fn test_extract_config_args() {
        let matches = make_app().get_matches_from([
            "svcgraph",
            "run",
            "--port",
            "9000",
            "--store-uri",
            "https://neo4j.internal:7473",
            "--dedup-ttl",
            "30",
        ]);
        let (_, run_matches) = matches.subcommand().unwrap();

        let overrides = extract_config_args(run_matches);
        assert_eq!(overrides.port.as_deref(), Some("9000"));
        assert_eq!(
            overrides.store_uri.as_deref(),
            Some("https://neo4j.internal:7473")
        );
        assert_eq!(overrides.dedup_ttl.as_deref(), Some("30"));
        assert_eq!(overrides.host, None);
    }
}
