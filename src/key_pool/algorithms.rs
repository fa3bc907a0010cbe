//! # 密钥选择算法实现
//!
//! 负责两件事：为连接测试挑选单个密钥，以及为故障转移给出覆盖全部密钥的尝试顺序。

use super::types::{ApiKey, KeyPool, SelectionStrategy};
use crate::{
    ldebug,
    logging::{LogComponent, LogStage},
};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 密钥选择器特质
pub trait KeySelector: Send + Sync {
    /// 选出单个密钥，空池返回 `None`
    fn pick_one(&self, pool: &KeyPool, request_id: &str) -> Option<ApiKey>;

    /// 返回包含池中每个密钥恰好一次的尝试顺序，空池返回空列表
    fn shuffled_order(&self, pool: &KeyPool, request_id: &str) -> Vec<ApiKey>;

    /// 获取选择器名称
    fn name(&self) -> &'static str;
}

/// 均匀随机选择器
#[derive(Debug, Default)]
pub struct RandomKeySelector;

impl RandomKeySelector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl KeySelector for RandomKeySelector {
    fn pick_one(&self, pool: &KeyPool, request_id: &str) -> Option<ApiKey> {
        let selected = pool.keys().choose(&mut rand::thread_rng()).cloned()?;

        ldebug!(
            request_id,
            LogStage::Scheduling,
            LogComponent::Selector,
            "pick_one",
            "Selected API key using random strategy",
            pool_size = pool.len(),
            source = selected.source(),
            key = %selected.masked()
        );

        Some(selected)
    }

    fn shuffled_order(&self, pool: &KeyPool, request_id: &str) -> Vec<ApiKey> {
        let mut order = pool.keys().to_vec();
        order.shuffle(&mut rand::thread_rng());
        let sources: Vec<&str> = order.iter().map(ApiKey::source).collect();

        ldebug!(
            request_id,
            LogStage::Scheduling,
            LogComponent::Selector,
            "shuffled_order",
            "Shuffled key order for failover",
            pool_size = pool.len(),
            order = ?sources
        );

        order
    }

    fn name(&self) -> &'static str {
        "RandomKeySelector"
    }
}

/// 轮询选择器（进程级计数器）
#[derive(Debug, Default)]
pub struct RoundRobinKeySelector {
    counter: AtomicUsize,
}

impl RoundRobinKeySelector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    fn next_index(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) % len
    }
}

impl KeySelector for RoundRobinKeySelector {
    fn pick_one(&self, pool: &KeyPool, request_id: &str) -> Option<ApiKey> {
        if pool.is_empty() {
            return None;
        }

        let index = self.next_index(pool.len());
        let selected = pool.keys()[index].clone();

        ldebug!(
            request_id,
            LogStage::Scheduling,
            LogComponent::Selector,
            "pick_one",
            "Selected API key using round robin strategy",
            pool_size = pool.len(),
            selected_index = index,
            source = selected.source()
        );

        Some(selected)
    }

    fn shuffled_order(&self, pool: &KeyPool, request_id: &str) -> Vec<ApiKey> {
        if pool.is_empty() {
            return Vec::new();
        }

        // 从计数器位置开始旋转，仍是覆盖全部密钥的排列
        let start = self.next_index(pool.len());
        let keys = pool.keys();
        let order: Vec<ApiKey> = keys[start..].iter().chain(&keys[..start]).cloned().collect();

        ldebug!(
            request_id,
            LogStage::Scheduling,
            LogComponent::Selector,
            "shuffled_order",
            "Rotated key order for failover",
            pool_size = pool.len(),
            start_index = start
        );

        order
    }

    fn name(&self) -> &'static str {
        "RoundRobinKeySelector"
    }
}

/// 创建密钥选择器
#[must_use]
pub fn create_key_selector(strategy: SelectionStrategy) -> Arc<dyn KeySelector> {
    match strategy {
        SelectionStrategy::Random => Arc::new(RandomKeySelector::new()),
        SelectionStrategy::RoundRobin => Arc::new(RoundRobinKeySelector::new()),
    }
}
