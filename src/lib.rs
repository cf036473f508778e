//! Operational analytics cockpit engine.
//!
//! Raw tables are validated ([`quality`]), aggregated into unit-economics
//! KPIs ([`kpi`]), scored against targets ([`variance`]) and the worst
//! unfavorable deviations become CAPA proposals ([`actions`]). Maintenance
//! events are summarized on their own ([`maintenance`]) and every run gets a
//! risk score with recommended follow-ups ([`risk`]). [`session`] wires
//! the stages together around a host-owned context.
pub mod actions;
pub mod config;
pub mod error;
pub mod kpi;
pub mod loader;
pub mod logging;
pub mod maintenance;
pub mod output;
pub mod quality;
pub mod reports;
pub mod risk;
pub mod scenario;
pub mod session;
pub mod synth;
pub mod targets;
pub mod types;
pub mod util;
pub mod variance;

pub use config::EngineConfig;
pub use error::{CockpitError, CockpitResult};
pub use session::{run_pipeline, CockpitOutput, Session};
