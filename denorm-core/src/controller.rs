//! 事件控制器（EventController）与装配（Denormalizer）
//!
//! 每个事件的生命周期编排：初始化（校验 + 时间戳解析 + 缓存预热）→
//! 准入判定（合法 且 非后端 且 未命中跳过规则）→ 处理（富化）→
//! 决策（重试/退避/丢弃/完成）。这是外围管线调用本核心的唯一入口。
//!
//! 约束：
//! - 单个事件富化路径上的失败不向调用方抛出，转换为标志位，
//!   保证一个坏事件不会中断所在批次；
//! - 可准入事件无论结果如何，恰好记账一次尝试（等价 finally 语义）；
//! - 事件在其控制器生命周期内被独占持有。
//!
use crate::admission::{BackendClassifier, SkipFilter};
use crate::config::DenormConfig;
use crate::enrich::{EnrichOutcome, EnrichmentEngine, NotProcessedReason};
use crate::error::DenormResult;
use crate::fields::RawEvent;
use crate::lookup::SubjectLookup;
use crate::persist::KeyValueStore;
use crate::retry::RetryLedger;
use crate::validators::{Validate, ValidationOutcome, validator_chain};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 事件进入重试队列的可区分原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// 存储路径上发生硬错误（账本或缓存不可用）
    StoreIssue,
    /// 富化未产出可用数据
    NotEnriched(NotProcessedReason),
}

/// 共享组件的装配件：每个分区 worker 持有一份，为每个事件铸造控制器
pub struct Denormalizer {
    validators: Vec<Box<dyn Validate>>,
    classifier: BackendClassifier,
    skip_filter: SkipFilter,
    ledger: RetryLedger,
    engine: EnrichmentEngine,
}

impl Denormalizer {
    /// 装配共享组件；跳过规则在此处一次性编译
    pub fn new(
        config: DenormConfig,
        store: Arc<dyn KeyValueStore>,
        lookup: Arc<dyn SubjectLookup>,
    ) -> DenormResult<Self> {
        let skip_filter =
            SkipFilter::compile(config.skip_patterns().iter().map(String::as_str))?;
        Ok(Self {
            validators: validator_chain(),
            classifier: BackendClassifier::new(config.backend_events().clone()),
            skip_filter,
            ledger: RetryLedger::new(store.clone(), config.backoff_base()),
            engine: EnrichmentEngine::new(
                store,
                lookup,
                config.staleness_window(),
                config.lookup_timeout(),
            ),
        })
    }

    /// 为一个事件铸造控制器；后端分类在此一次性计算
    pub fn controller(&self, event: RawEvent) -> EventController<'_> {
        let is_backend = self.classifier.is_backend(&event);
        EventController {
            shared: self,
            event,
            valid: true,
            is_backend,
            outcome: None,
            had_store_issue: false,
        }
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }
}

/// 单个事件的生命周期控制器
pub struct EventController<'a> {
    shared: &'a Denormalizer,
    event: RawEvent,
    valid: bool,
    is_backend: bool,
    outcome: Option<EnrichOutcome>,
    had_store_issue: bool,
}

impl EventController<'_> {
    /// 初始化：执行校验链、解析时间戳、预热缓存。
    /// 任一失败使事件进入 Invalid，后续操作退化为报告“不可处理”。
    pub async fn initialize(&mut self) {
        for validator in &self.shared.validators {
            if let ValidationOutcome::Invalid { reason } = validator.validate(&self.event) {
                error!(
                    id = %self.event.id(),
                    validator = validator.name(),
                    %reason,
                    "event failed validation, dropping"
                );
                self.valid = false;
                return;
            }
        }

        if let Err(err) = self.event.occurred_at() {
            error!(id = %self.event.id(), %err, "event init error");
            self.valid = false;
            return;
        }

        // 缓存预热与后续 process 隔离，失败仅记日志
        if let Ok(key) = self.event.subject_key() {
            if let Err(err) = self.shared.engine.warm(&key).await {
                warn!(id = %self.event.id(), subject = %key, %err, "warm lookup failed");
            }
        }
    }

    /// 纯谓词，可重复调用：合法 且 非后端 且 未命中跳过规则
    pub fn can_be_processed(&self) -> bool {
        self.valid && !self.is_backend && !self.shared.skip_filter.should_skip(&self.event)
    }

    pub fn is_backend_event(&self) -> bool {
        self.is_backend
    }

    /// 处理事件：不可准入则为 no-op。富化失败被捕获为标志位而非传播；
    /// 只要事件可准入，尝试记账恰好发生一次（含富化出错的情况）。
    pub async fn process(&mut self, now: DateTime<Utc>) {
        if !self.can_be_processed() {
            return;
        }
        let Ok(key) = self.event.subject_key() else {
            // 校验链已保证键字段存在
            return;
        };

        info!(id = %self.event.id(), subject = %key, "processing start");
        match self.shared.engine.enrich(&mut self.event, now).await {
            Ok(outcome) => {
                if let EnrichOutcome::NotProcessed(reason) = outcome {
                    info!(id = %self.event.id(), subject = %key, %reason, "subject not yet resolvable");
                }
                self.outcome = Some(outcome);
            }
            Err(err) => {
                self.had_store_issue = true;
                error!(id = %self.event.id(), subject = %key, %err, "store issue during enrichment");
            }
        }

        // 等价 finally：与处理结果无关的尝试记账
        match self.shared.ledger.record_attempt(&key, now).await {
            Ok(entry) => {
                info!(
                    id = %self.event.id(),
                    subject = %key,
                    attempt = entry.attempt_count(),
                    "attempt recorded"
                );
            }
            Err(err) => {
                self.had_store_issue = true;
                error!(id = %self.event.id(), subject = %key, %err, "failed to record attempt");
            }
        }
    }

    /// 是否应进入重试：存储硬错误，或可准入但富化未产出数据。
    /// 非法/后端/被跳过的事件永不进入重试。
    pub fn should_put_in_retry(&self) -> bool {
        let not_enriched =
            self.can_be_processed() && !matches!(self.outcome, Some(EnrichOutcome::Processed));
        self.had_store_issue || not_enriched
    }

    /// 可区分的重试原因（在 `process` 之后有意义）
    pub fn retry_reason(&self) -> Option<RetryReason> {
        if self.had_store_issue {
            return Some(RetryReason::StoreIssue);
        }
        if !self.can_be_processed() {
            return None;
        }
        match self.outcome {
            Some(EnrichOutcome::NotProcessed(reason)) => Some(RetryReason::NotEnriched(reason)),
            _ => None,
        }
    }

    /// 委托账本判断当前是否处于退避窗口内
    pub async fn should_backoff(&self, now: DateTime<Utc>) -> DenormResult<bool> {
        let Ok(key) = self.event.subject_key() else {
            return Ok(false);
        };
        self.shared.ledger.should_back_off(&key, now).await
    }

    /// 记录“观察到但未推进”的时间
    pub async fn add_last_skipped_at(&self, now: DateTime<Utc>) -> DenormResult<()> {
        let Ok(key) = self.event.subject_key() else {
            return Ok(());
        };
        self.shared.ledger.record_skipped(&key, now).await?;
        Ok(())
    }

    /// 日志关联用标识
    pub fn id(&self) -> &str {
        self.event.id()
    }

    /// 当前（可能已合并）的事件数据
    pub fn data(&self) -> &Map<String, Value> {
        self.event.as_map()
    }

    /// 交出事件，供下游 sink 使用
    pub fn into_data(self) -> Map<String, Value> {
        self.event.into_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Resolution;
    use crate::persist::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;

    struct FixedLookup(Resolution);

    #[async_trait::async_trait]
    impl SubjectLookup for FixedLookup {
        async fn resolve(&self, _key: &crate::subject::SubjectKey) -> anyhow::Result<Resolution> {
            Ok(self.0.clone())
        }
    }

    fn event(value: serde_json::Value) -> RawEvent {
        RawEvent::new(value.as_object().cloned().expect("object"))
    }

    fn pipeline(config: DenormConfig, store: Arc<InMemoryStore>) -> Denormalizer {
        Denormalizer::new(
            config,
            store,
            Arc::new(FixedLookup(Resolution::Found(
                json!({ "grade": "3" }).as_object().cloned().unwrap(),
            ))),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn invalid_event_reports_not_processable() {
        let pipeline = pipeline(DenormConfig::default(), Arc::new(InMemoryStore::new()));
        let mut controller = pipeline.controller(event(json!({ "eid": "GE_LAUNCH" })));

        controller.initialize().await;
        assert!(!controller.can_be_processed());

        // 后续操作退化为 no-op
        controller.process(Utc::now()).await;
        assert!(!controller.should_put_in_retry());
        assert_eq!(controller.retry_reason(), None);
    }

    #[tokio::test]
    async fn malformed_timestamp_invalidates_the_event() {
        let pipeline = pipeline(DenormConfig::default(), Arc::new(InMemoryStore::new()));
        let mut controller = pipeline.controller(event(
            json!({ "uid": "u1", "channel": "c1", "ts": "not-a-time" }),
        ));

        controller.initialize().await;
        assert!(!controller.can_be_processed());
    }

    #[tokio::test]
    async fn predicate_is_stable_across_calls() {
        let pipeline = pipeline(DenormConfig::default(), Arc::new(InMemoryStore::new()));
        let mut controller =
            pipeline.controller(event(json!({ "uid": "u1", "channel": "c1", "eid": "GE_LAUNCH" })));

        controller.initialize().await;
        let first = controller.can_be_processed();
        for _ in 0..3 {
            assert_eq!(controller.can_be_processed(), first);
        }
    }

    #[tokio::test]
    async fn backend_event_never_touches_the_ledger() {
        let store = Arc::new(InMemoryStore::new());
        let config = DenormConfig::builder()
            .backend_events(["ME_FEED".to_string()].into())
            .build();
        let pipeline = pipeline(config, store.clone());
        let mut controller = pipeline.controller(event(
            json!({ "eid": "ME_FEED", "uid": "u1", "channel": "c1" }),
        ));

        controller.initialize().await;
        assert!(!controller.can_be_processed());
        assert!(controller.is_backend_event());

        controller.process(Utc::now()).await;
        assert!(!controller.should_put_in_retry());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn skipped_event_is_excluded_but_skip_time_is_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let config = DenormConfig::builder()
            .skip_patterns(vec!["GE_.*".to_string()])
            .build();
        let pipeline = pipeline(config, store.clone());
        let mut controller = pipeline.controller(event(
            json!({ "eid": "GE_LAUNCH", "uid": "u1", "channel": "c1" }),
        ));

        controller.initialize().await;
        assert!(!controller.can_be_processed());

        // 跳过记账独立于尝试记账
        let now = Utc::now();
        controller.add_last_skipped_at(now).await.unwrap();
        let entry = pipeline
            .ledger()
            .entry(&crate::subject::SubjectKey::new("u1", "c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.attempt_count(), 0);
        assert_eq!(entry.last_skipped_at(), Some(now));
    }

    #[tokio::test]
    async fn successful_enrichment_merges_and_completes() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(DenormConfig::default(), store);
        let mut controller =
            pipeline.controller(event(json!({ "uid": "u1", "channel": "c1", "eid": "GE_LAUNCH" })));

        controller.initialize().await;
        assert!(controller.can_be_processed());

        controller.process(Utc::now()).await;
        assert!(!controller.should_put_in_retry());
        assert_eq!(controller.retry_reason(), None);
        assert_eq!(controller.data().get("grade"), Some(&json!("3")));
    }

    #[tokio::test]
    async fn store_failure_flags_retry_without_propagating() {
        /// 任何操作都失败的存储
        #[derive(Debug)]
        struct BrokenStore;

        #[async_trait::async_trait]
        impl KeyValueStore for BrokenStore {
            async fn get(
                &self,
                _ns: crate::persist::Namespace,
                _key: &str,
            ) -> DenormResult<Option<serde_json::Value>> {
                Err(crate::error::DenormError::Store {
                    reason: "connection refused".into(),
                })
            }
            async fn put(
                &self,
                _ns: crate::persist::Namespace,
                _key: &str,
                _value: serde_json::Value,
            ) -> DenormResult<()> {
                Err(crate::error::DenormError::Store {
                    reason: "connection refused".into(),
                })
            }
            async fn compare_and_put(
                &self,
                _ns: crate::persist::Namespace,
                _key: &str,
                _expected: Option<&serde_json::Value>,
                _value: serde_json::Value,
            ) -> DenormResult<bool> {
                Err(crate::error::DenormError::Store {
                    reason: "connection refused".into(),
                })
            }
        }

        let pipeline = Denormalizer::new(
            DenormConfig::default(),
            Arc::new(BrokenStore),
            Arc::new(FixedLookup(Resolution::NotFound)),
        )
        .unwrap();
        let mut controller =
            pipeline.controller(event(json!({ "uid": "u1", "channel": "c1", "eid": "GE_LAUNCH" })));

        controller.initialize().await;
        controller.process(Utc::now()).await;

        assert!(controller.should_put_in_retry());
        assert_eq!(controller.retry_reason(), Some(RetryReason::StoreIssue));
    }

    #[tokio::test]
    async fn slow_lookup_times_out_and_goes_to_retry() {
        struct SlowLookup;

        #[async_trait::async_trait]
        impl SubjectLookup for SlowLookup {
            async fn resolve(
                &self,
                _key: &crate::subject::SubjectKey,
            ) -> anyhow::Result<Resolution> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Resolution::NotFound)
            }
        }

        let config = DenormConfig::builder()
            .lookup_timeout(Duration::from_millis(20))
            .build();
        let pipeline =
            Denormalizer::new(config, Arc::new(InMemoryStore::new()), Arc::new(SlowLookup))
                .unwrap();
        let mut controller =
            pipeline.controller(event(json!({ "uid": "u1", "channel": "c1", "eid": "GE_LAUNCH" })));

        controller.initialize().await;
        controller.process(Utc::now()).await;

        assert!(controller.should_put_in_retry());
        assert_eq!(
            controller.retry_reason(),
            Some(RetryReason::NotEnriched(NotProcessedReason::Timeout))
        );
    }
}
