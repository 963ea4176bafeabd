use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use va_market::backend::{InMemoryBackend, SupabaseBackend, WebhookNotifier};
use va_market::config::AppConfig;
use va_market::error::AppError;
use va_market::marketplace::{
    AuthProvider, ListingStore, Marketplace, MarketplaceService, ProfileStore, SessionContext,
    SessionFile,
};
use va_market::telemetry;

/// How long before expiry the session is renewed.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.offline {
        config.backend.supabase = None;
    }

    telemetry::init(&config.telemetry)?;

    let timeout = config.backend.http_timeout;
    let notifier = Arc::new(match &config.backend.webhook_url {
        Some(url) => WebhookNotifier::new(url.clone(), timeout)?,
        None => WebhookNotifier::disabled(),
    });

    match config.backend.supabase.clone() {
        Some(supabase) => {
            info!(url = %supabase.url, "using hosted backend");
            let backend = Arc::new(SupabaseBackend::new(&supabase, timeout)?);
            serve(config, backend, notifier).await
        }
        None => {
            warn!("no SUPABASE_URL configured; data lives in memory and is lost on exit");
            serve(config, Arc::new(InMemoryBackend::new()), notifier).await
        }
    }
}

async fn serve<B>(
    config: AppConfig,
    backend: Arc<B>,
    notifier: Arc<WebhookNotifier>,
) -> Result<(), AppError>
where
    B: AuthProvider + ProfileStore + ListingStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let session_file = config.backend.session_file.clone().map(SessionFile::new);
    let context = SessionContext::new(backend.clone(), session_file);
    let service = MarketplaceService::new(backend.clone(), backend, notifier);
    let marketplace = Arc::new(Marketplace::new(context.clone(), service));

    let app = with_marketplace_routes(marketplace)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let restored = context.initialize().await;
    let refresher = context.spawn_auto_refresh(REFRESH_MARGIN);
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        signed_in = restored.is_some(),
        "marketplace gateway ready"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    refresher.abort();
    served?;

    info!("marketplace gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c; shutting down");
    }
}
