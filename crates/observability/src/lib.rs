//! # geheimpost-observability
//!
//! Observability-Crate fuer Geheimpost:
//! - Prometheus-Metriken fuer Queue und Transport (Textformat)
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::GeheimpostMetrics;
