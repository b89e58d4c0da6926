//! 流式反规范化的事件处理核心（denorm-core）
//!
//! 对到达的每条事件记录进行校验、（可选地）用外部服务解析的主体数据
//! 富化，并在瞬时失败时依据持久化的指数退避账本安排重试：
//! - 字段读取（`fields`）与校验链（`validators`）
//! - 准入判别（`admission`）：后端分类与跳过规则
//! - 重试账本（`retry`）：按主体键持久化的退避记账
//! - 富化引擎（`enrich`）：缓存 → 回源 → 合并
//! - 事件控制器（`controller`）：生命周期编排，外围管线的唯一入口
//!
//! 本 crate 不包含消息传输、外部查询服务与底层存储引擎的实现，
//! 仅定义协议（`persist`、`lookup`）与最小必要的错误类型，便于在
//! 不同基础设施上适配；内存实现随附，供测试与本地开发使用。
//!
//! 典型用法：
//! 1. 实现 `persist::KeyValueStore` 与 `lookup::SubjectLookup`；
//! 2. 以 `DenormConfig` 装配一个 `Denormalizer`（每分区 worker 一份）；
//! 3. 对每条事件：`controller(event)` → `initialize()` →
//!    `can_be_processed()` / `should_backoff(now)` 判定 → `process(now)` →
//!    依 `should_put_in_retry()` / `retry_reason()` 决定去向。
//!
pub mod admission;
pub mod config;
pub mod controller;
pub mod enrich;
pub mod error;
pub mod fields;
pub mod lookup;
pub mod persist;
pub mod retry;
pub mod subject;
pub mod validators;
