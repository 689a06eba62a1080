use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
};
use portcullis_auth::{AuthenticationCache, DeviceIdCipher, JwtValidator};
use portcullis_store::{DynStore, KeyNamespace};
use tower_http::trace::TraceLayer;

use crate::{
    admin,
    config::AppConfig,
    handlers,
    i18n::{self, Locale},
    middleware as app_middleware,
    paths::PatternRegistry,
    public_paths::PublicPathRegistry,
    rate_limit::{ClientKeyResolver, RateLimitConfigTable, RateLimiterEngine},
    routes::RouteTable,
    sync::ConfigSync,
};

/// Services shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: DynStore,
    pub public_paths: Arc<PublicPathRegistry>,
    pub auth_cache: Arc<AuthenticationCache>,
    pub engine: Arc<RateLimiterEngine>,
    pub resolver: Arc<ClientKeyResolver>,
    pub routes: Arc<RouteTable>,
    pub sync: Arc<ConfigSync>,
    pub rate_limit_enabled: bool,
    pub admin_authority: Arc<str>,
    pub default_locale: Locale,
    pub body_limit_bytes: usize,
}

impl AppState {
    /// Connects to the configured store and wires every service.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let store = portcullis_store::connect(&cfg.store).await;
        Self::with_store(cfg, store)
    }

    /// Wires every service on top of an existing store.
    pub fn with_store(cfg: &AppConfig, store: DynStore) -> anyhow::Result<Self> {
        let keys = KeyNamespace::new(cfg.store.key_prefix.clone());

        let validator = Arc::new(JwtValidator::new(&cfg.auth.signing)?);
        let auth_cache = Arc::new(AuthenticationCache::new(
            store.clone(),
            keys.clone(),
            validator,
            cfg.auth.cache.clone(),
        ));

        let cipher = cfg
            .auth
            .device
            .key
            .as_deref()
            .map(DeviceIdCipher::new)
            .transpose()?;
        let resolver = ClientKeyResolver::new(
            &cfg.auth.device.header,
            cipher,
            &cfg.rate_limiter.client_key,
        )
        .map_err(|e| anyhow::anyhow!("client key resolver: {e}"))?;

        let limits = &cfg.rate_limiter;
        let rate_limits = Arc::new(RateLimitConfigTable::new(limits.defaults, &limits.routes));
        let excluded = Arc::new(PatternRegistry::new("excluded_apis", &limits.excluded_apis));
        let public_paths = Arc::new(PublicPathRegistry::new(&cfg.security.public_paths));
        let routes = Arc::new(RouteTable::new(&limits.routes, limits.default_route_id.clone()));

        let engine = Arc::new(RateLimiterEngine::new(
            store.clone(),
            keys.clone(),
            rate_limits.clone(),
            excluded.clone(),
            limits.ban_scope,
        ));
        let sync = Arc::new(ConfigSync::new(
            store.clone(),
            keys,
            rate_limits,
            excluded,
            public_paths.clone(),
        ));

        Ok(Self {
            store,
            public_paths,
            auth_cache,
            engine,
            resolver: Arc::new(resolver),
            routes,
            sync,
            rate_limit_enabled: limits.enabled,
            admin_authority: Arc::from(cfg.security.admin_authority.as_str()),
            default_locale: cfg.i18n.default_locale,
            body_limit_bytes: cfg.server.body_limit_bytes,
        })
    }
}

/// Puts the admission pipeline in front of `downstream`.
///
/// Health and admin endpoints are served by the gateway itself and go through
/// the same pipeline.
pub fn build_app(state: AppState, downstream: Router) -> Router {
    let gateway = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest(admin::ADMIN_BASE_PATH, admin::router(state.clone()))
        .with_state(state.clone());

    // Middleware stack (order: request id -> trace -> locale -> authentication -> rate limit -> identity forwarding)
    gateway
        .merge(downstream)
        .layer(middleware::from_fn(app_middleware::forward_identity))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authentication_gate,
        ))
        .layer(middleware::from_fn_with_state(
            state.default_locale,
            i18n::locale_middleware,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(DefaultBodyLimit::max(state.body_limit_bytes))
}

pub struct PortcullisServer {
    addr: SocketAddr,
    app: Router,
    sync: Arc<ConfigSync>,
    sync_interval: Option<Duration>,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    downstream: Option<Router>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            downstream: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Router the admitted requests are handed to. Defaults to the fallback
    /// handlers.
    pub fn with_downstream(mut self, downstream: Router) -> Self {
        self.downstream = Some(downstream);
        self
    }

    /// Wires the services and pulls the published configuration once.
    pub async fn build(self) -> anyhow::Result<PortcullisServer> {
        let state = AppState::from_config(&self.config).await?;
        state.sync.initialize().await;

        let sync = state.sync.clone();
        let downstream = self.downstream.unwrap_or_else(handlers::fallback_router);
        let app = build_app(state, downstream);

        Ok(PortcullisServer {
            addr: self.addr,
            app,
            sync,
            sync_interval: self.config.sync.interval,
        })
    }
}

impl PortcullisServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let sync_task = self
            .sync_interval
            .map(|interval| self.sync.clone().start_periodic(interval));

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Some(task) = sync_task {
            task.abort();
        }
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
