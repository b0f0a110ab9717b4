use anyhow::{Context, Result};
use predict_core::{clear_ready, init_tracing, load_config, mark_ready};
use predict_udf::{server, PredictUdf};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

const SERVICE: &str = "predict-udf";

fn main() -> Result<()> {
    let cfg = load_config(SERVICE)?;
    init_tracing(SERVICE, &cfg.log_level)?;
    info!(?cfg, "config loaded");

    // The registry client blocks: it must be built and dropped outside the
    // async runtime, so `udf` outlives `rt`.
    let udf = Arc::new(PredictUdf::from_config(&cfg).context("building registry client")?);

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(serve(udf.clone(), cfg.listen_port))
}

async fn serve(udf: Arc<PredictUdf>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    mark_ready();
    info!(%addr, "service ready");

    axum::serve(listener, server::router(udf))
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            clear_ready();
            info!("shutdown");
        })
        .await?;
    Ok(())
}
