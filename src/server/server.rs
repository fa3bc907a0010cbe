//! # 网关 HTTP 服务器
//!
//! Axum HTTP服务器：`/api` 下的 JSON 接口，以及可选的前端静态资源

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::app::context::AppContext;
use crate::config::ServerConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 服务器应用状态
#[derive(Clone)]
pub struct AppState {
    context: Arc<AppContext>,
}

impl AppState {
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    #[must_use]
    pub const fn context_arc(&self) -> &Arc<AppContext> {
        &self.context
    }
}

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// 网关服务器
pub struct GatewayServer {
    /// 配置
    config: ServerConfig,
    /// 路由器
    router: Router,
}

impl GatewayServer {
    /// 创建新的网关服务器
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Self {
        let config = context.config.server.clone();
        let router = Self::create_router(AppState::new(context), &config);
        Self { config, router }
    }

    /// 路由器副本（测试中可直接驱动）
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// 创建路由器
    fn create_router(state: AppState, config: &ServerConfig) -> Router {
        let api_routes = super::routes::create_routes(state);

        let mut app = Router::new().nest("/api", api_routes);

        // 静态文件服务配置，支持SPA应用的fallback
        match &config.static_dir {
            Some(static_dir) if static_dir.is_dir() => {
                linfo!(
                    "system",
                    LogStage::Startup,
                    LogComponent::ServerSetup,
                    "static_service_enabled",
                    "Enabling static file service",
                    static_dir = %static_dir.display()
                );
                let service = ServeDir::new(static_dir)
                    .not_found_service(ServeFile::new(static_dir.join("index.html")));
                app = app.fallback_service(service);
            }
            Some(static_dir) => {
                lwarn!(
                    "system",
                    LogStage::Startup,
                    LogComponent::ServerSetup,
                    "static_dir_not_found",
                    "Static directory not found, static files will not be served",
                    static_dir = %static_dir.display()
                );
            }
            None => {}
        }

        // 添加中间件
        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        // 配置CORS
        if config.enable_cors {
            let mut cors_layer = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::ACCEPT,
                    axum::http::header::ORIGIN,
                ]);

            // 配置允许的源
            if config.allows_any_origin() {
                cors_layer = cors_layer.allow_origin(Any);
            } else {
                let origins = config
                    .cors_origins
                    .iter()
                    .map(|origin| origin.parse::<axum::http::HeaderValue>())
                    .collect::<std::result::Result<Vec<_>, axum::http::header::InvalidHeaderValue>>(
                    );

                match origins {
                    Ok(origins) => {
                        cors_layer = cors_layer.allow_origin(origins);
                    }
                    Err(e) => {
                        lwarn!(
                            "system",
                            LogStage::Startup,
                            LogComponent::ServerSetup,
                            "cors_config_fail",
                            "Invalid CORS origin configuration, falling back to allow any",
                            error = %e
                        );
                        cors_layer = cors_layer.allow_origin(Any);
                    }
                }
            }

            app = app.layer(service_builder.layer(cors_layer));
        } else {
            app = app.layer(service_builder);
        }

        app.layer(DefaultBodyLimit::max(config.max_request_size))
    }

    /// 绑定配置中的地址并启动服务器，`shutdown` 完成后优雅退出
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ProxyError::server_start_with_source(format!("Failed to bind {addr}"), e)
        })?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// 在已绑定的监听器上启动服务器
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            "Gateway server listening",
            address = %local_addr
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ProxyError::network_with_source("Gateway server error", e))?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "server_stopped",
            "Gateway server stopped"
        );

        Ok(())
    }

    /// 配置的监听地址
    #[must_use]
    pub fn bind_address(&self) -> String {
        self.config.bind_address()
    }
}
