//! 注册表静态定义：意图、上下文与生命周期
//!
//! 启动时加载一次，运行期只读。可选字段（context_set / follow_up）显式建模为 Option。

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::core::Parameters;
use crate::registry::RegistryError;

/// 元意图：补充参数
pub const INFORMATION: &str = "Information";
/// 元意图：取消最近的未完成意图
pub const CANCEL: &str = "Cancel";
/// 未完成意图镜像上下文的名称后缀
pub const PENDING_SUFFIX: &str = " - Parameters";
/// 会话摘要参数，所有回复与追问模板都可以引用
pub const SUMMARY_PARAMETERS: [&str; 3] = ["active_contexts", "active_intents", "last-intent"];

/// 未完成意图 `tag` 对应的镜像上下文名
pub fn pending_context_name(tag: &str) -> String {
    format!("{tag}{PENDING_SUFFIX}")
}

/// 若 `name` 为镜像上下文名，返回其意图 tag
pub fn pending_tag(name: &str) -> Option<&str> {
    name.strip_suffix(PENDING_SUFFIX)
}

/// 生命周期：(最长分钟数, 最多请求数)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Lifespan {
    pub minutes: u32,
    pub requests: u32,
}

impl Lifespan {
    pub fn new(minutes: u32, requests: u32) -> Self {
        Self { minutes, requests }
    }

    /// 存活条件：经过时间 ≤ minutes 且 请求差 < requests，两者须同时满足
    pub fn is_alive(
        &self,
        created_at: DateTime<Utc>,
        request_num: u64,
        now: DateTime<Utc>,
        request_counter: u64,
    ) -> bool {
        let within_time = now - created_at <= Duration::minutes(i64::from(self.minutes));
        // 计数器可能被重置到创建时之下，差值按有符号处理
        let elapsed_requests = request_counter as i64 - request_num as i64;
        within_time && elapsed_requests < i64::from(self.requests)
    }
}

/// 上下文定义
#[derive(Debug, Clone, Deserialize)]
pub struct ContextDefinition {
    #[serde(skip)]
    pub name: String,
    pub lifespan: Lifespan,
}

/// 意图定义
#[derive(Debug, Clone, Deserialize)]
pub struct IntentDefinition {
    #[serde(skip)]
    pub tag: String,
    /// 必需参数（有序，追问按此顺序进行）
    pub parameters: Vec<String>,
    /// 参数 -> 追问模板
    #[serde(default)]
    pub prompts: HashMap<String, Vec<String>>,
    /// 完成后的回复模板
    #[serde(default)]
    pub responses: Vec<String>,
    /// 完成时激活的上下文
    #[serde(default)]
    pub context_set: Option<String>,
    /// 适用所需的上下文（空 = 总是适用）
    #[serde(default)]
    pub context_needed: BTreeSet<String>,
    /// 前置意图
    #[serde(default)]
    pub follow_up: Option<BTreeSet<String>>,
    pub lifespan: Lifespan,
    /// 关键词分类器的提示词（引擎本身不使用）
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 执行器必须返回的参数名（回复模板可引用）
    #[serde(default)]
    pub enrichment: Vec<String>,
}

impl IntentDefinition {
    pub fn is_information(&self) -> bool {
        self.tag == INFORMATION
    }

    pub fn is_cancel(&self) -> bool {
        self.tag == CANCEL
    }

    /// Information / Cancel 不会进入 active intents
    pub fn is_meta(&self) -> bool {
        self.is_information() || self.is_cancel()
    }

    /// 所有必需参数都以键的形式存在（空字符串也算存在）
    pub fn is_satisfied(&self, params: &Parameters) -> bool {
        self.parameters.iter().all(|p| params.contains_key(p))
    }

    /// 模板中可引用的参数名
    ///
    /// 追问 `parameter` 时只有排在它之前的必需参数一定已知；`parameter` 为 None 表示回复模板，
    /// 此时全部必需参数与 enrichment 都可用。context- / intent- 前缀需声明 context_needed / follow_up。
    pub fn knows_placeholder(&self, name: &str, parameter: Option<&str>) -> bool {
        if SUMMARY_PARAMETERS.contains(&name) {
            return true;
        }
        if self.is_meta() {
            return false;
        }
        if name.starts_with("context-") {
            return !self.context_needed.is_empty();
        }
        if name.starts_with("intent-") {
            return self.follow_up.is_some();
        }
        match parameter {
            Some(prompted) => self
                .parameters
                .iter()
                .take_while(|p| p.as_str() != prompted)
                .any(|p| p == name),
            None => {
                self.parameters.iter().any(|p| p == name)
                    || self.enrichment.iter().any(|e| e == name)
            }
        }
    }

    /// 第一个缺失的必需参数
    pub fn first_missing<'a>(&'a self, params: &Parameters) -> Option<&'a str> {
        self.parameters
            .iter()
            .find(|p| !params.contains_key(*p))
            .map(String::as_str)
    }

    pub fn prompts_for(&self, parameter: &str) -> Result<&[String], RegistryError> {
        self.prompts
            .get(parameter)
            .map(Vec::as_slice)
            .ok_or_else(|| RegistryError::MissingPrompts {
                intent: self.tag.clone(),
                parameter: parameter.to_string(),
            })
    }

    pub fn pending_context_name(&self) -> String {
        pending_context_name(&self.tag)
    }
}
