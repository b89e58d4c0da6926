//! 重试账本（RetryLedger）
//!
//! 以主体键为粒度的持久退避记账：
//! - `should_back_off`：距上次尝试不足 `backoff_base * 2^attempt_count`
//!   时要求等待；无条目或尚无尝试则放行（首次尝试永不退避）；
//! - `record_attempt`：每个到达处理阶段的可准入事件恰好记账一次，
//!   与处理结果无关，使同一主体的重复投递收敛为更长等待；
//! - `record_skipped`：记录“观察到但未推进”的时间，不触碰尝试计数，
//!   使跳过历史与尝试历史可分别审计。
//!
//! 所有变更通过存储的 compare-and-put 循环完成，跨分区并发更新
//! 同一键时不会丢失递增。
//!
use crate::error::DenormResult;
use crate::persist::{KeyValueStore, Namespace};
use crate::subject::SubjectKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 指数封顶，避免 `backoff_base << n` 溢出
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// 账本条目：某主体键的退避进度，跨进程重启保留
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryEntry {
    /// 已尝试次数
    attempt_count: u32,
    /// 最近一次尝试时间；条目可能先由 `record_skipped` 创建，此时为空
    last_attempt_at: Option<DateTime<Utc>>,
    /// 最近一次被跳过的时间
    last_skipped_at: Option<DateTime<Utc>>,
}

impl RetryEntry {
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    pub fn last_skipped_at(&self) -> Option<DateTime<Utc>> {
        self.last_skipped_at
    }
}

/// 重试账本
pub struct RetryLedger {
    store: Arc<dyn KeyValueStore>,
    backoff_base: Duration,
}

impl RetryLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, backoff_base: Duration) -> Self {
        Self {
            store,
            backoff_base,
        }
    }

    /// 读取某主体键的账本条目
    pub async fn entry(&self, key: &SubjectKey) -> DenormResult<Option<RetryEntry>> {
        match self.store.get(Namespace::Retry, key.as_str()).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// 距上次尝试是否仍在退避窗口内
    pub async fn should_back_off(
        &self,
        key: &SubjectKey,
        now: DateTime<Utc>,
    ) -> DenormResult<bool> {
        let Some(entry) = self.entry(key).await? else {
            return Ok(false);
        };
        let Some(last_attempt_at) = entry.last_attempt_at else {
            return Ok(false);
        };
        // 上次尝试晚于 now（时钟偏斜）：按零已过时长处理，即仍在退避
        let elapsed = (now - last_attempt_at).to_std().unwrap_or(Duration::ZERO);
        Ok(elapsed < self.threshold(entry.attempt_count))
    }

    /// 记录一次处理尝试：递增计数并刷新尝试时间
    pub async fn record_attempt(
        &self,
        key: &SubjectKey,
        now: DateTime<Utc>,
    ) -> DenormResult<RetryEntry> {
        self.update(key, |mut entry| {
            entry.attempt_count = entry.attempt_count.saturating_add(1);
            entry.last_attempt_at = Some(now);
            entry
        })
        .await
    }

    /// 记录一次“观察到但未推进”，不触碰尝试计数
    pub async fn record_skipped(
        &self,
        key: &SubjectKey,
        now: DateTime<Utc>,
    ) -> DenormResult<RetryEntry> {
        self.update(key, |mut entry| {
            entry.last_skipped_at = Some(now);
            entry
        })
        .await
    }

    fn threshold(&self, attempt_count: u32) -> Duration {
        let factor = 1u32 << attempt_count.min(MAX_BACKOFF_EXPONENT);
        self.backoff_base.saturating_mul(factor)
    }

    /// compare-and-put 循环：按键的原子读改写
    async fn update(
        &self,
        key: &SubjectKey,
        apply: impl Fn(RetryEntry) -> RetryEntry,
    ) -> DenormResult<RetryEntry> {
        loop {
            let current = self.store.get(Namespace::Retry, key.as_str()).await?;
            let entry: RetryEntry = match &current {
                Some(value) => serde_json::from_value(value.clone())?,
                None => RetryEntry::default(),
            };
            let next = apply(entry);
            let value = serde_json::to_value(&next)?;
            if self
                .store
                .compare_and_put(Namespace::Retry, key.as_str(), current.as_ref(), value)
                .await?
            {
                return Ok(next);
            }
        }
    }
}
