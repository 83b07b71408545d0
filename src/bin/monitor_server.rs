//! Booking-Order Monitor Server
//!
//! Composition root: wires the price feed, order store and trade endpoint into
//! one engine, exposes Prometheus metrics and logs outbound notifications.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use booking_order_monitor::config::{FeedConfig, MonitorConfig, ServerConfig};
use booking_order_monitor::feed::sources::{DexScreenerSource, JupiterSource, PriceSource};
use booking_order_monitor::feed::PriceFeedAdapter;
use booking_order_monitor::gateway::{
    DryRunTradeExecutor, HttpTradeExecutor, InMemoryOrderStore, OrderStore, TradeExecutor,
};
use booking_order_monitor::metrics::MetricsReporter;
use booking_order_monitor::monitor::{MonitorEvent, NewBookingOrder};
use booking_order_monitor::utils::format_price;
use booking_order_monitor::{MonitorEngine, MonitorHandle};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Booking-Order Monitor...");

    let monitor_config = MonitorConfig::from_env();
    let feed_config = FeedConfig::from_env();
    let server_config = ServerConfig::from_env();

    start_metrics_exporter(&server_config.metrics_addr)?;

    // Price sources in priority order
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(DexScreenerSource::new(feed_config.request_timeout)?),
        Arc::new(JupiterSource::new(feed_config.request_timeout)?),
    ];
    let feed = PriceFeedAdapter::new(sources, feed_config);

    let executor: Arc<dyn TradeExecutor> = match (&server_config.trade_endpoint_url, server_config.dry_run) {
        (_, true) => {
            warn!("Mode: DRY RUN, trades are logged and reported as filled");
            Arc::new(DryRunTradeExecutor)
        }
        (Some(url), false) => {
            info!("Mode: LIVE, trade endpoint {}", url);
            Arc::new(HttpTradeExecutor::new(url.clone(), monitor_config.execution_timeout)?)
        }
        (None, false) => bail!("TRADE_ENDPOINT_URL not set (set DRY_RUN=1 to run without one)"),
    };

    let store = Arc::new(InMemoryOrderStore::new());
    if let Some(path) = &server_config.seed_orders_file {
        let seeded = seed_orders(store.as_ref(), path).await?;
        info!("Seeded {} orders from {}", seeded, path);
    }

    let mut engine = MonitorEngine::new(
        store,
        Arc::new(feed.clone()),
        executor,
        monitor_config.clone(),
    );
    engine.bootstrap().await?;

    let reporter = MetricsReporter::new(engine.metrics(), monitor_config.metrics_report_interval);
    tokio::spawn(async move {
        reporter.run().await;
    });

    let (handle, engine_task) = engine.start();
    tokio::spawn(log_events(handle.clone()));

    info!("Monitor is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down monitor...");
    if let Ok(stats) = handle.stats().await {
        info!(
            "Final stats: {} pending orders on {} instruments, {} executions in flight",
            stats.pending_orders, stats.tracked_instruments, stats.executions_in_flight
        );
    }
    if let Err(e) = handle.shutdown().await {
        warn!("Engine already stopped: {}", e);
    }
    feed.shutdown();

    if let Err(e) = engine_task.await {
        error!("Engine task ended abnormally: {}", e);
    }

    info!("Monitor stopped");
    Ok(())
}

fn start_metrics_exporter(addr: &str) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid METRICS_ADDR '{}'", addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    info!("Prometheus metrics available at http://{}/metrics", addr);
    Ok(())
}

/// Load a JSON array of draft orders into the store.
async fn seed_orders(store: &dyn OrderStore, path: &str) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seed file {}", path))?;
    let drafts: Vec<NewBookingOrder> =
        serde_json::from_str(&raw).with_context(|| format!("invalid seed file {}", path))?;

    let count = drafts.len();
    for draft in drafts {
        store.insert(draft).await?;
    }
    Ok(count)
}

async fn log_events(handle: MonitorHandle) {
    let mut events = handle.subscribe();

    loop {
        match events.recv().await {
            Ok(MonitorEvent::OrderAdded { order }) => {
                info!(order_id = %order.id, "Order added: {} {}", order.action, order.instrument);
            }
            Ok(MonitorEvent::OrderRemoved { order_id, reason }) => {
                info!(order_id = %order_id, "Order removed: {}", reason);
            }
            Ok(MonitorEvent::OrderExecuted { order, result, .. }) => {
                info!(
                    order_id = %order.id,
                    "Order executed: {} {} tx={}",
                    order.action,
                    order.instrument,
                    result.tx_hash.as_deref().unwrap_or("-")
                );
            }
            Ok(MonitorEvent::PriceUpdate(update)) => {
                tracing::debug!("{} {}", update.symbol, format_price(update.price));
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event logger lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
