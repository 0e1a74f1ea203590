//! Prometheus-Metriken fuer Geheimpost
//!
//! Registrierte Metriken:
//! - `geheimpost_queue_enqueued_total` – Counter: Eingereihte Nachrichten (richtung)
//! - `geheimpost_queue_pending` – Gauge: Wartende Nachrichten (richtung)
//! - `geheimpost_queue_failed_total` – Counter: Endgueltig gescheiterte Nachrichten
//! - `geheimpost_messages_sent_total` – Counter: Zugestellte Nachrichten
//! - `geheimpost_send_failures_total` – Counter: Fehlgeschlagene Sendeversuche
//! - `geheimpost_decrypt_failures_total` – Counter: Abgelehnte eingehende Nachrichten
//! - `geheimpost_transport_connects_total` – Counter: Verbindungsaufbauten (ergebnis)
//! - `geheimpost_transport_reconnects_total` – Counter: Wiederverbindungen
//! - `geheimpost_connected_peers` – Gauge: Offene Data-Channels
//! - `geheimpost_connect_duration_seconds` – Histogram: Dauer des Verbindungsaufbaus
//!
//! Unter Linux kommen die Prozess-Metriken (`process_*`) hinzu.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

/// Label-Werte fuer `richtung`
pub const AUSGEHEND: &str = "ausgehend";
pub const EINGEHEND: &str = "eingehend";

/// Alle Geheimpost-Prometheus-Metriken
#[derive(Clone)]
pub struct GeheimpostMetrics {
    pub registry: Arc<Registry>,

    // Queue
    pub queue_enqueued_total: IntCounterVec,
    pub queue_pending: IntGaugeVec,
    pub queue_failed_total: IntCounter,
    pub messages_sent_total: IntCounter,
    pub send_failures_total: IntCounter,
    pub decrypt_failures_total: IntCounter,

    // Transport
    pub transport_connects_total: IntCounterVec,
    pub transport_reconnects_total: IntCounter,
    pub connected_peers: IntGauge,
    pub connect_duration_seconds: Histogram,
}

impl GeheimpostMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Queue ---
        let queue_enqueued_total = IntCounterVec::new(
            Opts::new("geheimpost_queue_enqueued_total", "Eingereihte Nachrichten"),
            &["richtung"],
        )?;
        registry.register(Box::new(queue_enqueued_total.clone()))?;

        let queue_pending = IntGaugeVec::new(
            Opts::new("geheimpost_queue_pending", "Wartende Nachrichten"),
            &["richtung"],
        )?;
        registry.register(Box::new(queue_pending.clone()))?;

        let queue_failed_total = IntCounter::with_opts(Opts::new(
            "geheimpost_queue_failed_total",
            "Endgueltig gescheiterte Nachrichten",
        ))?;
        registry.register(Box::new(queue_failed_total.clone()))?;

        let messages_sent_total = IntCounter::with_opts(Opts::new(
            "geheimpost_messages_sent_total",
            "Zugestellte Nachrichten",
        ))?;
        registry.register(Box::new(messages_sent_total.clone()))?;

        let send_failures_total = IntCounter::with_opts(Opts::new(
            "geheimpost_send_failures_total",
            "Fehlgeschlagene Sendeversuche",
        ))?;
        registry.register(Box::new(send_failures_total.clone()))?;

        let decrypt_failures_total = IntCounter::with_opts(Opts::new(
            "geheimpost_decrypt_failures_total",
            "Abgelehnte eingehende Nachrichten",
        ))?;
        registry.register(Box::new(decrypt_failures_total.clone()))?;

        // --- Transport ---
        let transport_connects_total = IntCounterVec::new(
            Opts::new("geheimpost_transport_connects_total", "Verbindungsaufbauten"),
            &["ergebnis"],
        )?;
        registry.register(Box::new(transport_connects_total.clone()))?;

        let transport_reconnects_total = IntCounter::with_opts(Opts::new(
            "geheimpost_transport_reconnects_total",
            "Wiederverbindungen nach Abbruch",
        ))?;
        registry.register(Box::new(transport_reconnects_total.clone()))?;

        let connected_peers = IntGauge::with_opts(Opts::new(
            "geheimpost_connected_peers",
            "Peers mit offenem Data-Channel",
        ))?;
        registry.register(Box::new(connected_peers.clone()))?;

        let connect_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "geheimpost_connect_duration_seconds",
                "Dauer des Verbindungsaufbaus in Sekunden",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(connect_duration_seconds.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            queue_enqueued_total,
            queue_pending,
            queue_failed_total,
            messages_sent_total,
            send_failures_total,
            decrypt_failures_total,
            transport_connects_total,
            transport_reconnects_total,
            connected_peers,
            connect_duration_seconds,
        })
    }

    /// Setzt die Gauges fuer wartende Nachrichten
    pub fn queue_stand(&self, ausgehend: usize, eingehend: usize) {
        self.queue_pending
            .with_label_values(&[AUSGEHEND])
            .set(ausgehend as i64);
        self.queue_pending
            .with_label_values(&[EINGEHEND])
            .set(eingehend as i64);
    }

    /// Zaehlt einen Verbindungsaufbau
    pub fn verbindungsaufbau(&self, erfolgreich: bool, sekunden: f64) {
        let ergebnis = if erfolgreich { "ok" } else { "fehler" };
        self.transport_connects_total
            .with_label_values(&[ergebnis])
            .inc();
        if erfolgreich {
            self.connect_duration_seconds.observe(sekunden);
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn metriken_als_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for GeheimpostMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeheimpostMetrics").finish_non_exhaustive()
    }
}
