use crate::config::MetricsConfig;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CONNECTIONS_ACCEPTED: &str = "updategate_connections_total";
pub const DIAL_ERRORS: &str = "updategate_dial_errors_total";
pub const FRAMES_INSPECTED: &str = "updategate_frames_inspected_total";
pub const STATEMENTS_BLOCKED: &str = "updategate_statements_blocked_total";

pub fn install(config: &MetricsConfig) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let addr = config.listen_addr.clone();
    tokio::spawn(async move {
        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            )
            .route("/health", get(|| async { "ok" }));
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("metrics listener on {addr} failed: {err}");
                return;
            }
        };
        info!("metrics on http://{addr}/metrics");
        if let Err(err) = axum::serve(listener, app).await {
            error!("metrics server error: {err}");
        }
    });
    Ok(())
}
