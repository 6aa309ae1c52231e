//! 意图 / 上下文注册表
//!
//! 静态定义在进程启动时从 TOML 加载（见 config/registry.toml），之后只读。
//!
//! ```text
//! fallback = ["..."]
//! [contexts.event-added]
//! lifespan = { minutes = 5, requests = 3 }
//! [intents.AddEvent]
//! parameters = ["eventType", "time"]
//! prompts.time = ["When is the $eventType?"]
//! responses = ["Added $eventType for $time."]
//! context_set = "event-added"
//! lifespan = { minutes = 5, requests = 3 }
//! [entities]
//! eventType = "\\b(exam|lab)\\b"
//! ```

mod loader;
mod types;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

pub use loader::DEFAULT_REGISTRY;
pub use types::{
    pending_context_name, pending_tag, ContextDefinition, IntentDefinition, Lifespan, CANCEL,
    INFORMATION, PENDING_SUFFIX, SUMMARY_PARAMETERS,
};

/// 注册表错误：均属配置缺陷，不做恢复
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse registry: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown intent: {0}")]
    UnknownIntent(String),

    #[error("Unknown context: {0}")]
    UnknownContext(String),

    #[error("Intent '{intent}' has no prompts for parameter '{parameter}'")]
    MissingPrompts { intent: String, parameter: String },

    #[error("Template of '{owner}' references unknown parameter '${placeholder}'")]
    UnknownPlaceholder { owner: String, placeholder: String },

    #[error("Invalid entity pattern for '{entity}': {source}")]
    InvalidPattern {
        entity: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid registry: {0}")]
    Invalid(String),
}

/// 只读注册表
#[derive(Debug, Clone)]
pub struct Registry {
    intents: HashMap<String, IntentDefinition>,
    contexts: HashMap<String, ContextDefinition>,
    fallback: Vec<String>,
    entities: BTreeMap<String, String>,
}

impl Registry {
    pub fn intent(&self, tag: &str) -> Option<&IntentDefinition> {
        self.intents.get(tag)
    }

    /// 按 tag 取意图定义；不存在即配置缺陷
    pub fn require_intent(&self, tag: &str) -> Result<&IntentDefinition, RegistryError> {
        self.intent(tag)
            .ok_or_else(|| RegistryError::UnknownIntent(tag.to_string()))
    }

    pub fn context(&self, name: &str) -> Option<&ContextDefinition> {
        self.contexts.get(name)
    }

    /// 上下文的生命周期；镜像上下文（"<tag> - Parameters"）取对应意图的生命周期
    pub fn context_lifespan(&self, name: &str) -> Result<Lifespan, RegistryError> {
        if let Some(tag) = pending_tag(name) {
            return Ok(self.require_intent(tag)?.lifespan);
        }
        self.context(name)
            .map(|c| c.lifespan)
            .ok_or_else(|| RegistryError::UnknownContext(name.to_string()))
    }

    pub fn intents(&self) -> impl Iterator<Item = &IntentDefinition> {
        self.intents.values()
    }

    pub fn fallback_responses(&self) -> &[String] {
        &self.fallback
    }

    /// 实体名 -> 正则（供关键词分类器使用）
    pub fn entity_patterns(&self) -> &BTreeMap<String, String> {
        &self.entities
    }
}
