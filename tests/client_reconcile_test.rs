//! # 客户端状态同步集成测试

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gemini_key_proxy::app::AppContext;
use gemini_key_proxy::client::{
    ClientError, GatewayClient, KeyReconciler, KeySelectionPrompt, KeyStatus, ReconcileConfig,
};
use gemini_key_proxy::config::AppConfig;
use gemini_key_proxy::key_pool::StaticEnv;
use gemini_key_proxy::providers::GeminiUpstream;
use gemini_key_proxy::server::GatewayServer;

fn fast_config() -> ReconcileConfig {
    ReconcileConfig {
        max_attempts: 3,
        retry_delay: Duration::from_millis(20),
        poll_interval: Duration::from_millis(50),
    }
}

struct NoopPrompt;

#[async_trait]
impl KeySelectionPrompt for NoopPrompt {
    async fn open_select_key(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_settles_after_transient_html_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<!doctype html><html><body>Vite is starting</body></html>"),
        )
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "source": "GEMINI_API_KEY",
            "hasKey": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GatewayClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let session = KeyReconciler::new(client)
        .with_config(fast_config())
        .with_prompt(Arc::new(NoopPrompt))
        .mount()
        .await;

    let state = session.state();
    assert_eq!(state.status, KeyStatus::Ok);
    assert_eq!(state.retry_count, 2);
    // 稳定后不保留此前 HTML 响应的调试信息
    assert_eq!(state.last_debug, None);
    assert_eq!(state.source.as_deref(), Some("GEMINI_API_KEY"));
    assert!(!session.is_polling());

    // 稳定后不再有后台请求
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    session.unmount().await;
}

#[tokio::test]
async fn test_against_real_gateway_without_keys() {
    let context = Arc::new(AppContext::with_parts(
        AppConfig::default(),
        Arc::new(StaticEnv::new()),
        Arc::new(GeminiUpstream::new(AppConfig::default().gemini)),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = GatewayServer::new(context);
    let handle = tokio::spawn(async move {
        server
            .serve_with_listener(listener, async move { signal.cancelled().await })
            .await
    });

    let client = GatewayClient::new(&base_url, Duration::from_secs(5)).unwrap();
    let session = KeyReconciler::new(client)
        .with_config(fast_config())
        .with_prompt(Arc::new(NoopPrompt))
        .mount()
        .await;

    assert_eq!(session.state().status, KeyStatus::Missing);
    assert!(session.needs_key_selection());
    assert!(session.is_polling());

    // 连接测试的错误与健康状态相互独立
    let err = session.test_connection().await.unwrap_err();
    assert_eq!(
        err,
        ClientError::NoKeyConfigured {
            status: 401,
            message: "No API key found".to_string(),
        }
    );
    assert_eq!(session.state().status, KeyStatus::Missing);

    session.unmount().await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();
}
