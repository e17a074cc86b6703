//! This module implements the definition of the command line app.

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Builds a live service dependency graph from OpenTelemetry traces.";

pub fn make_app() -> Command {
    Command::new("svcgraph")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("SVCGRAPH_CONFIG")
                .value_parser(ValueParser::path_buf())
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the svcgraph server")
                .after_help(
                    "This runs svcgraph in the foreground until it's shut down.  It will bind \
                     to the port and network interface configured in the config file.  \
                     Before accepting traces, the graph store must be reachable.",
                )
                .arg(
                    Arg::new("host")
                        .value_name("HOST")
                        .long("host")
                        .env("SVCGRAPH_HOST")
                        .help("The host to which the server should bind."),
                )
                .arg(
                    Arg::new("port")
                        .value_name("PORT")
                        .long("port")
                        .short('p')
                        .env("SVCGRAPH_PORT")
                        .help("The port to bind for the OTLP/HTTP endpoint."),
                )
                .arg(
                    Arg::new("store_uri")
                        .value_name("URI")
                        .long("store-uri")
                        .env("NEO4J_URI")
                        .help(
                            "Base URL of the Neo4j HTTP API, e.g. http://localhost:7474. \
                             Bolt URIs are not supported.",
                        ),
                )
                .arg(
                    Arg::new("store_username")
                        .value_name("USERNAME")
                        .long("store-username")
                        .env("NEO4J_USERNAME")
                        .help("User of the graph store."),
                )
                .arg(
                    Arg::new("store_password")
                        .value_name("PASSWORD")
                        .long("store-password")
                        .env("NEO4J_PASSWORD")
                        .hide_env_values(true)
                        .help("Password of the graph store."),
                )
                .arg(
                    Arg::new("cluster_enabled")
                        .value_name("BOOL")
                        .long("cluster-enabled")
                        .env("SVCGRAPH_CLUSTER_ENABLED")
                        .help("Whether workload owners are looked up in the cluster."),
                )
                .arg(
                    Arg::new("dedup_ttl")
                        .value_name("SECONDS")
                        .long("dedup-ttl")
                        .env("SVCGRAPH_DEDUP_TTL")
                        .help("Seconds during which the same call is written only once."),
                )
                .arg(
                    Arg::new("shutdown_timeout")
                        .value_name("SECONDS")
                        .long("shutdown-timeout")
                        .env("SVCGRAPH_SHUTDOWN_TIMEOUT")
                        .help("Seconds to wait for in-flight requests on shutdown."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the svcgraph config")
                .after_help("This command provides basic config management.")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values \
                             which are not in the config file but filled in from \
                             defaults.  The default output format is YAML but \
                             a debug format can also be specific which is useful \
                             to understand how svcgraph interprets the individual \
                             values.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .action(ArgAction::Set)
                                .help("The output format"),
                        ),
                ),
        )
}
