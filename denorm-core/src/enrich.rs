//! 富化引擎（EnrichmentEngine）
//!
//! 将主体实体解析并合并进事件：
//! - 先查本地缓存，命中且新鲜则直接合并，不走网络；
//! - 未命中或过期则在超时约束内回源外部服务，成功后写缓存再合并；
//! - 回源失败（服务错误/超时/未找到）不修改事件，报告 `NotProcessed`
//!   及可区分的原因；存储不可用则作为硬错误向上传递；
//! - 合并按属性覆盖（last-write-wins），同一事件重放富化是安全的。
//!
use crate::error::DenormResult;
use crate::fields::RawEvent;
use crate::lookup::{Resolution, SubjectLookup};
use crate::persist::{KeyValueStore, Namespace};
use crate::subject::{SubjectEntity, SubjectKey};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// 富化结论：以返回值而非异常表达
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// 属性已合并进事件
    Processed,
    /// 暂无可用数据，事件应进入重试
    NotProcessed(NotProcessedReason),
}

/// `NotProcessed` 的可区分原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotProcessedReason {
    /// 服务侧明确不存在该主体
    NotFound,
    /// 服务调用错误
    ServiceError,
    /// 调用超时
    Timeout,
}

impl fmt::Display for NotProcessedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotProcessedReason::NotFound => f.write_str("not found"),
            NotProcessedReason::ServiceError => f.write_str("service error"),
            NotProcessedReason::Timeout => f.write_str("timeout"),
        }
    }
}

/// 富化引擎
pub struct EnrichmentEngine {
    store: Arc<dyn KeyValueStore>,
    lookup: Arc<dyn SubjectLookup>,
    staleness_window: Duration,
    lookup_timeout: Duration,
}

impl EnrichmentEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lookup: Arc<dyn SubjectLookup>,
        staleness_window: Duration,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            lookup,
            staleness_window,
            lookup_timeout,
        }
    }

    /// 一次性的初始化钩子：预读缓存，与后续 `enrich` 隔离
    pub async fn warm(&self, key: &SubjectKey) -> DenormResult<Option<SubjectEntity>> {
        self.cached(key).await
    }

    /// 解析并合并；事件内部的回源失败不作为错误向上传递
    pub async fn enrich(
        &self,
        event: &mut RawEvent,
        now: DateTime<Utc>,
    ) -> DenormResult<EnrichOutcome> {
        let key = event.subject_key()?;

        if let Some(entity) = self.cached(&key).await? {
            if !entity.is_stale(now, self.staleness_window) {
                merge(event, &entity);
                return Ok(EnrichOutcome::Processed);
            }
        }

        let attributes =
            match tokio::time::timeout(self.lookup_timeout, self.lookup.resolve(&key)).await {
                Err(_elapsed) => {
                    warn!(subject = %key, timeout_ms = self.lookup_timeout.as_millis() as u64, "lookup timed out");
                    return Ok(EnrichOutcome::NotProcessed(NotProcessedReason::Timeout));
                }
                Ok(Err(err)) => {
                    warn!(subject = %key, error = %err, "lookup service failed");
                    return Ok(EnrichOutcome::NotProcessed(NotProcessedReason::ServiceError));
                }
                Ok(Ok(Resolution::NotFound)) => {
                    return Ok(EnrichOutcome::NotProcessed(NotProcessedReason::NotFound));
                }
                Ok(Ok(Resolution::Found(attributes))) => attributes,
            };

        let entity = SubjectEntity::builder()
            .attributes(attributes)
            .resolved_at(now)
            .build();
        self.store
            .put(
                Namespace::Subject,
                key.as_str(),
                serde_json::to_value(&entity)?,
            )
            .await?;
        merge(event, &entity);
        Ok(EnrichOutcome::Processed)
    }

    /// 读取缓存实体；损坏的缓存值按未命中处理并重新解析
    async fn cached(&self, key: &SubjectKey) -> DenormResult<Option<SubjectEntity>> {
        match self.store.get(Namespace::Subject, key.as_str()).await? {
            None => Ok(None),
            Some(value) => match serde_json::from_value(value) {
                Ok(entity) => Ok(Some(entity)),
                Err(err) => {
                    warn!(subject = %key, error = %err, "corrupt cached entity, treating as miss");
                    Ok(None)
                }
            },
        }
    }
}

/// 按属性覆盖合并，可安全重放
fn merge(event: &mut RawEvent, entity: &SubjectEntity) {
    for (name, value) in entity.attributes() {
        event.insert(name.clone(), value.clone());
    }
}
