//! 处理核心配置（DenormConfig）
//!
//! 由外部装载（文件/环境变量等不在本 crate 范围内），这里只定义结构：
//! - 后端事件类型集合与跳过规则在装载后即被编译为判别组件；
//! - 退避基准与新鲜度窗口用于重试账本与富化引擎。
//!
use bon::Builder;
use std::collections::HashSet;
use std::time::Duration;

/// 事件核心配置
#[derive(Debug, Clone, Builder)]
pub struct DenormConfig {
    /// 后端事件类型集合，命中者不参与富化与下游输出
    #[builder(default)]
    backend_events: HashSet<String>,
    /// 跳过规则（正则，整串匹配语义）
    #[builder(default)]
    skip_patterns: Vec<String>,
    /// 退避基准时长，乘以 2^attempt_count 得到最小等待
    #[builder(default = Duration::from_secs(10))]
    backoff_base: Duration,
    /// 缓存主体实体的新鲜度窗口，超过则重新解析
    #[builder(default = Duration::from_secs(3600))]
    staleness_window: Duration,
    /// 外部查询的单次超时
    #[builder(default = Duration::from_secs(5))]
    lookup_timeout: Duration,
}

impl DenormConfig {
    pub fn backend_events(&self) -> &HashSet<String> {
        &self.backend_events
    }

    pub fn skip_patterns(&self) -> &[String] {
        &self.skip_patterns
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }
}

impl Default for DenormConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
