//! Agent configuration
//!
//! Settings come from a TOML file, `CWMP_AGENT__*` environment variables and
//! command line flags, in increasing order of precedence.

mod settings;

pub use settings::*;
