//! # Program configuration: document loading and snapshot types.
//!
//! [`ConfigStore`] reads the configuration document and produces an immutable
//! [`ProgramSet`]. Every resync loads a fresh set; nothing is cached between loads.

mod program;
mod store;

pub use program::{DEFAULT_REFRESH_RATE_SECS, ParamValue, Params, ProgramConfig, ProgramSet};
pub use store::ConfigStore;
