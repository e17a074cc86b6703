/// Value of the `Server` response header.
pub const SERVER: &str = concat!("svcgraph/", env!("CARGO_PKG_VERSION"));

/// Upper bound for the graph store connectivity check during startup.
pub const STARTUP_CHECK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
