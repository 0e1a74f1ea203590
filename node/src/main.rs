//! Geheimpost-Knoten – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Knoten.
//! Zeilen auf stdin der Form `<peer> <text>` werden als Nachricht versendet.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use geheimpost_core::PeerId;
use geheimpost_node::config::NodeConfig;
use geheimpost_node::{Knoten, KnotenEreignis};
use geheimpost_observability::logging_initialisieren;
use geheimpost_transport::{WebRtcPlattform, WebSocketSignaling};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("GEHEIMPOST_CONFIG").unwrap_or_else(|_| "geheimpost.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = NodeConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Geheimpost-Knoten wird initialisiert"
    );

    let connector = Arc::new(WebSocketSignaling::new(
        config.signaling.url.clone(),
        config.eigene_id(),
    ));
    let knoten = Knoten::neu(config, Arc::new(WebRtcPlattform::new()), connector)?;
    tracing::info!(
        peer = %knoten.eigene_id(),
        schluessel = %BASE64.encode(knoten.oeffentlicher_schluessel()),
        "Knoten-Identitaet"
    );

    let mut ereignisse = knoten
        .ereignisse()
        .ok_or_else(|| anyhow!("Ereignis-Strom bereits vergeben"))?;
    knoten.starten().await?;

    let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_offen = true;

    tracing::info!("Knoten laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Knoten wird beendet");
                break;
            }
            ereignis = ereignisse.recv() => match ereignis {
                Some(KnotenEreignis::Klartext { peer, text }) => {
                    println!("{peer}: {text}");
                }
                Some(ereignis) => tracing::info!(ereignis = ?ereignis, "Knoten-Ereignis"),
                None => break,
            },
            zeile = zeilen.next_line(), if stdin_offen => match zeile {
                Ok(Some(zeile)) => eingabe_senden(&knoten, &zeile),
                Ok(None) => stdin_offen = false,
                Err(e) => {
                    tracing::warn!(fehler = %e, "stdin nicht lesbar");
                    stdin_offen = false;
                }
            },
        }
    }

    knoten.herunterfahren().await?;
    tracing::debug!(metriken = %knoten.metriken().metriken_als_text()?, "Metriken bei Ende");
    Ok(())
}

/// `<peer> <text>` versenden
fn eingabe_senden(knoten: &Knoten, zeile: &str) {
    let Some((peer, text)) = zeile.trim().split_once(' ') else {
        if !zeile.trim().is_empty() {
            tracing::warn!("Eingabe erwartet: <peer> <text>");
        }
        return;
    };
    match knoten.nachricht_senden(&PeerId::new(peer), text.trim()) {
        Ok(id) => tracing::info!(peer, id = %id, "Nachricht eingereiht"),
        Err(e) => tracing::warn!(peer, fehler = %e, "Nachricht nicht eingereiht"),
    }
}
