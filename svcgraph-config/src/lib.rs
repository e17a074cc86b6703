//! Configuration for the svcgraph server.
//!
//! Configuration is read from `config.yml` in a config folder. Every section is optional and
//! falls back to defaults, so a missing file yields a working local setup. Values from the
//! environment and the command line are applied on top through [`OverridableConfig`].

#![warn(missing_docs)]

mod config;

pub use config::*;
