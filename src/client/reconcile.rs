//! # 客户端密钥状态同步
//!
//! 状态机：`checking -> ok` 或 `checking -> missing`，
//! `missing` 可在用户选择密钥后或后台轮询发现新密钥后回到 `ok`。
//!
//! 每个会话最多只有一个后台轮询任务，会话卸载或被丢弃时随之停止。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::api::GatewayClient;
use super::error::ClientError;
use crate::health::HealthStatus;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

/// 初次检查的最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// 两次尝试之间的固定间隔
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// `missing` 状态下的后台轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// 交互式密钥选择能力（由宿主环境提供）
#[async_trait]
pub trait KeySelectionPrompt: Send + Sync {
    /// 打开密钥选择流程，用户完成选择后返回
    async fn open_select_key(&self) -> Result<(), ClientError>;
}

/// 同步参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// 客户端看到的密钥状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Checking,
    Ok,
    Missing,
}

/// 客户端密钥状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyState {
    pub status: KeyStatus,
    /// 最近一次同步中的重试次数
    pub retry_count: u32,
    /// 最近一次异常的调试信息
    pub last_debug: Option<String>,
    /// 服务端报告的密钥来源
    pub source: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for ClientKeyState {
    fn default() -> Self {
        Self {
            status: KeyStatus::Checking,
            retry_count: 0,
            last_debug: None,
            source: None,
            last_checked_at: None,
        }
    }
}

impl ClientKeyState {
    /// AI 功能是否不可用（用于显示常驻提示条）
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.status == KeyStatus::Missing
    }
}

/// 会话共享部分，轮询任务持有其 `Arc`
struct SessionShared {
    client: GatewayClient,
    prompt: Option<Arc<dyn KeySelectionPrompt>>,
    config: ReconcileConfig,
    state_tx: watch::Sender<ClientKeyState>,
}

impl SessionShared {
    fn publish_health(&self, health: &HealthStatus, retry_count: u32) -> KeyStatus {
        let status = if health.is_ok() {
            KeyStatus::Ok
        } else {
            KeyStatus::Missing
        };
        self.state_tx.send_modify(|state| {
            state.status = status;
            state.retry_count = retry_count;
            state.last_debug = None;
            state.source = health.has_key.then(|| health.source.clone());
            state.last_checked_at = Some(Utc::now());
        });
        status
    }

    /// 带有限重试的健康检查
    ///
    /// 仅在响应体异常或网关不可达时重试；达到上限后落到 `missing`。
    async fn reconcile(&self, request_id: &str) -> KeyStatus {
        let max_attempts = self.config.max_attempts.max(1);
        self.state_tx.send_modify(|state| {
            state.status = KeyStatus::Checking;
            state.retry_count = 0;
        });

        for attempt in 1..=max_attempts {
            match self.client.fetch_health(request_id).await {
                Ok(health) => {
                    let status = self.publish_health(&health, attempt - 1);
                    linfo!(
                        request_id,
                        LogStage::Reconcile,
                        LogComponent::Client,
                        "reconcile_settled",
                        "Key status settled",
                        status = ?status,
                        attempts = attempt,
                        source = %health.source
                    );
                    return status;
                }
                Err(e) => {
                    let debug = e.to_string();
                    self.state_tx.send_modify(|state| {
                        state.retry_count = attempt - 1;
                        state.last_debug = Some(debug.clone());
                    });
                    if !e.is_transient() || attempt == max_attempts {
                        lwarn!(
                            request_id,
                            LogStage::Reconcile,
                            LogComponent::Client,
                            "reconcile_failed",
                            "Health check failed, assuming no key is available",
                            attempts = attempt,
                            error = %e
                        );
                        break;
                    }
                    ldebug!(
                        request_id,
                        LogStage::Reconcile,
                        LogComponent::Client,
                        "reconcile_retry",
                        "Health response not usable yet, retrying",
                        attempt = attempt,
                        delay = ?self.config.retry_delay,
                        error = %e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }

        self.state_tx.send_modify(|state| {
            state.status = KeyStatus::Missing;
            state.source = None;
            state.last_checked_at = Some(Utc::now());
        });
        KeyStatus::Missing
    }

    /// 后台轮询：静默检查，发现密钥即切换到 `ok` 并退出
    async fn poll_until_available(self: Arc<Self>, cancel: CancellationToken) {
        let request_id = format!("poll-{}", uuid::Uuid::new_v4());
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    ldebug!(
                        request_id,
                        LogStage::Reconcile,
                        LogComponent::Client,
                        "poll_cancelled",
                        "Background key poll cancelled"
                    );
                    return;
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }

            match self.client.fetch_health(&request_id).await {
                Ok(health) if health.is_ok() => {
                    self.publish_health(&health, 0);
                    linfo!(
                        request_id,
                        LogStage::Reconcile,
                        LogComponent::Client,
                        "key_detected",
                        "Background poll detected an available key",
                        source = %health.source
                    );
                    return;
                }
                Ok(_) => {
                    self.state_tx.send_modify(|state| {
                        state.last_checked_at = Some(Utc::now());
                    });
                }
                Err(e) => {
                    ldebug!(
                        request_id,
                        LogStage::Reconcile,
                        LogComponent::Client,
                        "poll_failed",
                        "Background key poll failed",
                        error = %e
                    );
                }
            }
        }
    }
}

/// 后台轮询任务句柄
struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Poller {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// 密钥状态同步器
pub struct KeyReconciler {
    client: GatewayClient,
    prompt: Option<Arc<dyn KeySelectionPrompt>>,
    config: ReconcileConfig,
}

impl KeyReconciler {
    #[must_use]
    pub fn new(client: GatewayClient) -> Self {
        Self {
            client,
            prompt: None,
            config: ReconcileConfig::default(),
        }
    }

    /// 提供交互式密钥选择能力
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn KeySelectionPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    #[must_use]
    pub const fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    /// 挂载：执行一次初始同步，必要时启动后台轮询
    pub async fn mount(self) -> ReconcileSession {
        let (state_tx, _) = watch::channel(ClientKeyState::default());
        let session = ReconcileSession {
            shared: Arc::new(SessionShared {
                client: self.client,
                prompt: self.prompt,
                config: self.config,
                state_tx,
            }),
            poller: Mutex::new(None),
        };

        let request_id = format!("mount-{}", uuid::Uuid::new_v4());
        let status = session.shared.reconcile(&request_id).await;
        session.sync_poller(status);
        session
    }
}

/// 已挂载的同步会话
pub struct ReconcileSession {
    shared: Arc<SessionShared>,
    poller: Mutex<Option<Poller>>,
}

impl ReconcileSession {
    /// 当前状态快照
    #[must_use]
    pub fn state(&self) -> ClientKeyState {
        self.shared.state_tx.borrow().clone()
    }

    /// 订阅状态变化
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientKeyState> {
        self.shared.state_tx.subscribe()
    }

    /// 是否存在交互式密钥选择能力
    #[must_use]
    pub fn can_select_key(&self) -> bool {
        self.shared.prompt.is_some()
    }

    /// 是否应显示阻塞式密钥选择弹窗：能选择密钥且服务端确实没有密钥
    #[must_use]
    pub fn needs_key_selection(&self) -> bool {
        self.can_select_key() && self.state().status == KeyStatus::Missing
    }

    /// 后台轮询是否在运行
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .map(|slot| slot.as_ref().is_some_and(Poller::is_running))
            .unwrap_or(false)
    }

    /// 重新同步（不经过密钥选择）
    pub async fn refresh(&self) -> KeyStatus {
        let request_id = format!("refresh-{}", uuid::Uuid::new_v4());
        let status = self.shared.reconcile(&request_id).await;
        self.sync_poller(status);
        status
    }

    /// 手动连接：打开密钥选择流程后重新同步
    pub async fn connect(&self) -> Result<KeyStatus, ClientError> {
        let request_id = format!("connect-{}", uuid::Uuid::new_v4());
        if let Some(prompt) = &self.shared.prompt {
            linfo!(
                request_id,
                LogStage::Reconcile,
                LogComponent::Client,
                "open_key_selection",
                "Opening key selection"
            );
            prompt.open_select_key().await?;
        }
        let status = self.shared.reconcile(&request_id).await;
        self.sync_poller(status);
        Ok(status)
    }

    /// 真实调用一次上游，错误与健康状态相互独立
    pub async fn test_connection(&self) -> Result<String, ClientError> {
        let request_id = format!("test-{}", uuid::Uuid::new_v4());
        let result = self.shared.client.test_connection(&request_id).await;
        match &result {
            Ok(_) => linfo!(
                request_id,
                LogStage::Response,
                LogComponent::Client,
                "connection_test_ok",
                "Connection test succeeded"
            ),
            Err(e) => lwarn!(
                request_id,
                LogStage::ResponseFailure,
                LogComponent::Client,
                "connection_test_failed",
                "Connection test failed",
                error = %e
            ),
        }
        result
    }

    /// 卸载：停止后台轮询并等待其退出
    pub async fn unmount(self) {
        let poller = self.take_poller();
        if let Some(poller) = poller {
            poller.cancel.cancel();
            let _ = poller.handle.await;
        }
    }

    fn take_poller(&self) -> Option<Poller> {
        self.poller.lock().ok().and_then(|mut slot| slot.take())
    }

    /// `missing` 且可选择密钥时保证恰好一个轮询任务，其余情况停止轮询
    fn sync_poller(&self, status: KeyStatus) {
        let Ok(mut slot) = self.poller.lock() else {
            return;
        };

        let wanted = status == KeyStatus::Missing && self.shared.prompt.is_some();
        if !wanted {
            if let Some(poller) = slot.take() {
                poller.cancel.cancel();
            }
            return;
        }
        if slot.as_ref().is_some_and(Poller::is_running) {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            Arc::clone(&self.shared).poll_until_available(cancel.clone()),
        );
        *slot = Some(Poller { cancel, handle });
    }
}

impl Drop for ReconcileSession {
    fn drop(&mut self) {
        if let Some(poller) = self.take_poller() {
            poller.cancel.cancel();
            poller.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> ReconcileConfig {
        ReconcileConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(20),
        }
    }

    fn health_body(ok: bool) -> serde_json::Value {
        if ok {
            json!({"status": "ok", "source": "GEMINI_API_KEY", "hasKey": true})
        } else {
            json!({"status": "missing", "source": "none", "hasKey": false})
        }
    }

    async fn reconciler_for(server: &MockServer) -> KeyReconciler {
        let client = GatewayClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        KeyReconciler::new(client).with_config(fast_config())
    }

    #[derive(Default)]
    struct CountingPrompt {
        opened: AtomicUsize,
    }

    #[async_trait]
    impl KeySelectionPrompt for CountingPrompt {
        async fn open_select_key(&self) -> Result<(), ClientError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mount_ok_without_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(true)))
            .expect(1)
            .mount(&server)
            .await;

        let session = reconciler_for(&server).await.mount().await;
        let state = session.state();
        assert_eq!(state.status, KeyStatus::Ok);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.source.as_deref(), Some("GEMINI_API_KEY"));
        assert!(state.last_checked_at.is_some());
        assert!(!session.is_polling());
    }

    #[tokio::test]
    async fn test_missing_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(false)))
            .expect(1)
            .mount(&server)
            .await;

        let session = reconciler_for(&server).await.mount().await;
        assert_eq!(session.state().status, KeyStatus::Missing);
        assert!(session.state().is_unavailable());
        // 没有密钥选择能力时不轮询
        assert!(!session.is_polling());
        assert!(!session.needs_key_selection());
    }

    #[tokio::test]
    async fn test_malformed_until_limit_settles_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>loading</html>"))
            .expect(3)
            .mount(&server)
            .await;

        let session = reconciler_for(&server).await.mount().await;
        let state = session.state();
        assert_eq!(state.status, KeyStatus::Missing);
        assert_eq!(state.retry_count, 2);
        assert!(
            state
                .last_debug
                .as_deref()
                .is_some_and(|d| d.contains("<html>loading</html>"))
        );
    }

    #[tokio::test]
    async fn test_poller_detects_new_key_and_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(false)))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(true)))
            .mount(&server)
            .await;

        let session = reconciler_for(&server)
            .await
            .with_prompt(Arc::new(CountingPrompt::default()))
            .mount()
            .await;
        assert_eq!(session.state().status, KeyStatus::Missing);
        assert!(session.is_polling());
        assert!(session.needs_key_selection());

        let mut rx = session.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.status == KeyStatus::Ok),
        )
        .await
        .unwrap()
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while session.is_polling() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connect_opens_prompt_and_reconciles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(false)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(true)))
            .mount(&server)
            .await;

        let prompt = Arc::new(CountingPrompt::default());
        let session = reconciler_for(&server)
            .await
            .with_config(ReconcileConfig {
                poll_interval: Duration::from_secs(60),
                ..fast_config()
            })
            .with_prompt(prompt.clone())
            .mount()
            .await;
        assert!(session.is_polling());

        let status = session.connect().await.unwrap();
        assert_eq!(status, KeyStatus::Ok);
        assert_eq!(prompt.opened.load(Ordering::SeqCst), 1);
        assert!(!session.is_polling());
    }

    #[tokio::test]
    async fn test_unmount_stops_poller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(false)))
            .mount(&server)
            .await;

        let session = reconciler_for(&server)
            .await
            .with_prompt(Arc::new(CountingPrompt::default()))
            .mount()
            .await;
        assert!(session.is_polling());

        tokio::time::timeout(Duration::from_secs(5), session.unmount())
            .await
            .unwrap();

        let calls = server.received_requests().await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), calls);
    }

    #[tokio::test]
    async fn test_refresh_keeps_single_poller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(health_body(false)))
            .mount(&server)
            .await;

        let session = reconciler_for(&server)
            .await
            .with_config(ReconcileConfig {
                poll_interval: Duration::from_secs(60),
                ..fast_config()
            })
            .with_prompt(Arc::new(CountingPrompt::default()))
            .mount()
            .await;

        session.refresh().await;
        session.refresh().await;
        assert!(session.is_polling());
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }
}
