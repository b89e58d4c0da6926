//! 持久化能力（persist）
//!
//! 定义事件核心依赖的键值存储协议与内存参考实现：
//! - `KeyValueStore`：带命名空间的 get/put/compare-and-put；
//! - `InMemoryStore`：测试与本地开发用的内存实现。
//!
pub mod store;
pub mod store_inmemory;

pub use store::{KeyValueStore, Namespace};
pub use store_inmemory::InMemoryStore;
