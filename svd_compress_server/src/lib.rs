// HTTP front end for the compression engine. It decodes multipart uploads,
// validates query parameters into engine types, runs the job on the worker pool
// and answers with a PNG (or JSON for the info route). None of the compression
// logic lives here.

use svd_compress::WorkerPoolConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_ORIGINS: &str = "http://localhost:4200,http://127.0.0.1:4200";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            allowed_origins: split_origins(DEFAULT_ORIGINS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            workers: WorkerPoolConfig::default().workers,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SVDC_BIND`, `SVDC_ALLOWED_ORIGINS`,
    /// `SVDC_MAX_UPLOAD_BYTES` and `SVDC_WORKERS` when they are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = value("SVDC_BIND") {
            cfg.bind_addr = bind;
        }
        if let Some(origins) = value("SVDC_ALLOWED_ORIGINS") {
            cfg.allowed_origins = split_origins(&origins);
        }
        if let Some(limit) = value("SVDC_MAX_UPLOAD_BYTES") {
            match limit.trim().parse() {
                Ok(bytes) => cfg.max_upload_bytes = bytes,
                Err(_) => tracing::warn!(%limit, "ignoring unparsable SVDC_MAX_UPLOAD_BYTES"),
            }
        }
        if let Some(workers) = value("SVDC_WORKERS") {
            match workers.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.workers = n,
                _ => tracing::warn!(%workers, "ignoring invalid SVDC_WORKERS"),
            }
        }
        cfg
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// Installs the global fmt subscriber, `info` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

#[cfg(feature = "web")]
mod web {
    use super::ServerConfig;
    use axum::body::Bytes;
    use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
    use axum::http::{HeaderValue, StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde::{Deserialize, Serialize};
    use svd_compress::image_helper::{self, ImageIoError};
    use svd_compress::{
        CompressError, CompressionConfig, DEFAULT_TILE_SIZE, ImageInfo, ParallelPipeline, PixelArray, PoolError, Rank,
        Region, Strategy, WorkerPoolConfig, inspect,
    };
    use thiserror::Error;
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    #[derive(Debug, Error)]
    pub enum ApiError {
        #[error("{0}")]
        BadRequest(String),
        #[error(transparent)]
        Compress(#[from] CompressError),
        #[error("could not decode image: {0}")]
        Decode(ImageIoError),
        #[error("could not encode result: {0}")]
        Encode(ImageIoError),
        #[error(transparent)]
        Pool(#[from] PoolError),
    }

    impl ApiError {
        fn status(&self) -> StatusCode {
            match self {
                ApiError::BadRequest(_) | ApiError::Compress(_) | ApiError::Decode(_) => StatusCode::BAD_REQUEST,
                ApiError::Pool(PoolError::Compress(_)) => StatusCode::BAD_REQUEST,
                ApiError::Pool(_) | ApiError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                tracing::error!(error = %self, "request failed");
            } else {
                tracing::debug!(error = %self, "request rejected");
            }
            (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum RegionMode {
        #[default]
        Tiled,
        Blended,
    }

    /// Query parameters shared by the compression routes. Ranks are signed so a
    /// non-positive value is reported as an invalid rank rather than a parse error.
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct CompressQuery {
        pub k: Option<i64>,
        pub k_region: Option<i64>,
        pub k_base: Option<i64>,
        pub x1: Option<u32>,
        pub y1: Option<u32>,
        pub x2: Option<u32>,
        pub y2: Option<u32>,
        #[serde(default)]
        pub strategy: RegionMode,
        pub tile_size: Option<usize>,
    }

    impl CompressQuery {
        fn has_region(&self) -> bool {
            self.k_region.is_some() || self.x1.is_some()
        }

        pub fn full_strategy(&self) -> Result<Strategy, ApiError> {
            let k = self
                .k
                .ok_or_else(|| ApiError::BadRequest("missing query parameter `k`".into()))?;
            Ok(Strategy::Full { k: Rank::new(k)? })
        }

        /// Validates the region, clips it to the image, and builds the region strategy.
        pub fn region_strategy(&self, info: &ImageInfo) -> Result<Strategy, ApiError> {
            let missing = |name: &str| ApiError::BadRequest(format!("missing query parameter `{name}`"));
            let k_region = Rank::new(self.k_region.ok_or_else(|| missing("k_region"))?)?;
            let k_base = Rank::new(self.k_base.ok_or_else(|| missing("k_base"))?)?;
            let region = Region::new(
                self.x1.ok_or_else(|| missing("x1"))?,
                self.y1.ok_or_else(|| missing("y1"))?,
                self.x2.ok_or_else(|| missing("x2"))?,
                self.y2.ok_or_else(|| missing("y2"))?,
            )?;
            let region = region.clip_to(info.width, info.height).ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "region lies outside the {}x{} image",
                    info.width, info.height
                ))
            })?;
            Ok(match self.strategy {
                RegionMode::Tiled => Strategy::Tiled { k_region, k_base, region },
                RegionMode::Blended => Strategy::Blended { k_region, k_base, region },
            })
        }

        pub fn any_strategy(&self, info: &ImageInfo) -> Result<Strategy, ApiError> {
            if self.k.is_none() && self.has_region() {
                self.region_strategy(info)
            } else {
                self.full_strategy()
            }
        }

        fn config(&self, strategy: Strategy) -> Result<CompressionConfig, ApiError> {
            let tile_size = self.tile_size.unwrap_or(DEFAULT_TILE_SIZE);
            if tile_size == 0 {
                return Err(CompressError::InvalidTileSize.into());
            }
            Ok(CompressionConfig::new(strategy).with_tile_size(tile_size))
        }
    }

    #[derive(Debug, Serialize)]
    pub struct UploadInfo {
        pub width: usize,
        pub height: usize,
        pub channels: usize,
        pub k_max: usize,
        pub message: &'static str,
    }

    #[derive(Clone)]
    pub struct AppState {
        pub pipeline: ParallelPipeline,
    }

    impl AppState {
        pub fn new(workers: usize) -> Self {
            Self {
                pipeline: ParallelPipeline::new(WorkerPoolConfig { workers }),
            }
        }
    }

    async fn read_upload(mut multipart: Multipart) -> Result<PixelArray, ApiError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
        {
            if field.name() == Some("file") {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("could not read upload: {e}")))?;
                return decode_upload(bytes).await;
            }
        }
        Err(ApiError::BadRequest("missing multipart field `file`".into()))
    }

    /// Runs CPU-bound codec work on the blocking pool so request intake stays responsive.
    async fn off_executor<T, F>(job: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(job).await.map_err(|join_error| {
            tracing::error!(error = %join_error, "codec task panicked");
            ApiError::Pool(PoolError::WorkerLost)
        })?
    }

    async fn decode_upload(bytes: Bytes) -> Result<PixelArray, ApiError> {
        off_executor(move || image_helper::decode(&bytes).map_err(ApiError::Decode)).await
    }

    async fn png_response(pixels: PixelArray) -> Result<Response, ApiError> {
        let body = off_executor(move || image_helper::encode_png(&pixels).map_err(ApiError::Encode)).await?;
        Ok(([(header::CONTENT_TYPE, HeaderValue::from_static("image/png"))], body).into_response())
    }

    async fn upload_image(multipart: Multipart) -> Result<Json<UploadInfo>, ApiError> {
        let image = read_upload(multipart).await?;
        let info = inspect(&image);
        Ok(Json(UploadInfo {
            width: info.width,
            height: info.height,
            channels: info.channels,
            k_max: info.k_max,
            message: "image received",
        }))
    }

    async fn compress(
        State(state): State<AppState>,
        Query(query): Query<CompressQuery>,
        multipart: Multipart,
    ) -> Result<Response, ApiError> {
        let strategy = query.full_strategy()?;
        let image = read_upload(multipart).await?;
        let report = state.pipeline.process(image, query.config(strategy)?).await?;
        png_response(report.image).await
    }

    async fn compress_region(
        State(state): State<AppState>,
        Query(query): Query<CompressQuery>,
        multipart: Multipart,
    ) -> Result<Response, ApiError> {
        let image = read_upload(multipart).await?;
        let strategy = query.region_strategy(&inspect(&image))?;
        let report = state.pipeline.process(image, query.config(strategy)?).await?;
        png_response(report.image).await
    }

    async fn error_map(
        State(state): State<AppState>,
        Query(query): Query<CompressQuery>,
        multipart: Multipart,
    ) -> Result<Response, ApiError> {
        let image = read_upload(multipart).await?;
        let strategy = query.any_strategy(&inspect(&image))?;
        let config = query.config(strategy)?.with_error_map(true);
        let report = state.pipeline.process(image, config).await?;
        let map = report
            .error_map
            .ok_or_else(|| ApiError::BadRequest("error map was not produced".into()))?;
        png_response(map).await
    }

    fn cors(cfg: &ServerConfig) -> CorsLayer {
        let origins: Vec<HeaderValue> = cfg
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }

    pub fn router(state: AppState, cfg: &ServerConfig) -> Router {
        let api = Router::new()
            .route("/upload-image", post(upload_image))
            .route("/compress", post(compress))
            .route("/compress-region", post(compress_region))
            .route("/error-map", post(error_map));

        Router::new()
            .nest("/api", api)
            .route("/healthz", get(|| async { "ok" }))
            .with_state(state)
            .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
            .layer(cors(cfg))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn start_server(cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
        let state = AppState::new(cfg.workers);
        let app = router(state, &cfg);
        let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            workers = cfg.workers,
            origins = ?cfg.allowed_origins,
            "compression server listening"
        );
        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "server stopped");
            }
        }))
    }
}

#[cfg(feature = "web")]
pub use web::{ApiError, AppState, CompressQuery, RegionMode, UploadInfo, router, start_server};

#[cfg(not(feature = "web"))]
pub async fn start_server(_cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for svd_compress_server"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SVDC_BIND", "0.0.0.0:9000"),
            ("SVDC_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("SVDC_MAX_UPLOAD_BYTES", "1024"),
            ("SVDC_WORKERS", "0"),
        ]);
        let cfg = ServerConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(cfg.max_upload_bytes, 1024);
        assert_eq!(cfg.workers, ServerConfig::default().workers);
    }

    #[test]
    fn defaults_match_local_frontend() {
        let cfg = ServerConfig::from_lookup(|_| None);
        assert_eq!(cfg.bind_addr, DEFAULT_BIND);
        assert_eq!(cfg.allowed_origins.len(), 2);
    }
}
