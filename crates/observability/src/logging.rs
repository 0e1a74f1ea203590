//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `GP_LOG_LEVEL`: Filter (trace/debug/info/warn/error oder EnvFilter-Direktiven)
//! - `GP_LOG_FORMAT`: Format (text/json)
//!
//! Die Umgebung hat Vorrang vor den Werten aus der Konfigurationsdatei.

use anyhow::anyhow;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "GP_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "GP_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `level` und `format` stammen aus der Konfiguration und werden nur
/// verwendet, wenn die Umgebungsvariablen fehlen. Ein zweiter Aufruf im
/// selben Prozess liefert einen Fehler.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let level = einstellung_waehlen(std::env::var(ENV_LOG_LEVEL).ok(), level);
    let format = einstellung_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format);

    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| anyhow!("Logging bereits initialisiert: {e}"))
}

/// Umgebungswert, falls gesetzt und nicht leer, sonst Konfigurationswert
pub fn einstellung_waehlen(umgebung: Option<String>, konfiguration: &str) -> String {
    umgebung
        .map(|wert| wert.trim().to_string())
        .filter(|wert| !wert.is_empty())
        .unwrap_or_else(|| konfiguration.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
