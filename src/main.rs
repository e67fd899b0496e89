//! Web server: upload PDFs and ask questions about them in the browser.

use anyhow::{Context, Result, bail};
use pdfqa::config::{self, Config};
use pdfqa::processing::RagService;
use pdfqa::{api, logging};
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Ports tried in order when `SERVER_PORT` is unset.
const FALLBACK_PORTS: RangeInclusive<u16> = 5000..=5099;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    if let Err(err) = serve(config::get_config()).await {
        tracing::error!(error = %format!("{err:#}"), "Server stopped");
        std::process::exit(1);
    }
}

async fn serve(config: &Config) -> Result<()> {
    let listener = match config.server_port {
        Some(port) => TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .with_context(|| format!("cannot bind SERVER_PORT {port}"))?,
        None => first_free_listener(FALLBACK_PORTS).await?,
    };
    let address = listener.local_addr()?;
    tracing::info!(
        %address,
        upload_dir = %config.upload_dir.display(),
        embedding_provider = ?config.embedding_provider,
        llm_model = %config.llm_model,
        "Listening on http://{address}"
    );

    let app = api::create_router(Arc::new(RagService::new(config)));
    axum::serve(listener, app).await.context("server error")
}

/// Bind the first port in `ports` that is not already taken.
async fn first_free_listener(ports: RangeInclusive<u16>) -> Result<TcpListener> {
    let (first, last) = (*ports.start(), *ports.end());
    for port in ports {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port in use; trying next");
            }
            Err(err) => return Err(err).with_context(|| format!("cannot bind port {port}")),
        }
    }
    bail!("no free port in {first}-{last}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn taken_ports_are_skipped_until_the_range_runs_out() {
        let taken = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .expect("ephemeral listener");
        let port = taken.local_addr().expect("address").port();

        let error = first_free_listener(port..=port).await.unwrap_err();
        assert_eq!(error.to_string(), format!("no free port in {port}-{port}"));

        drop(taken);
        let listener = first_free_listener(port..=port).await.expect("port freed");
        assert_eq!(listener.local_addr().expect("address").port(), port);
    }
}
