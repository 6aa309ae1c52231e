//! 分类器抽象
//!
//! 外部分类器把原始文本变成按置信度降序排列的候选意图与抽取出的参数。
//! 引擎只依赖 Classifier trait；KeywordClassifier 是基于注册表关键词的参考实现。

mod keyword;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Parameters;

pub use keyword::KeywordClassifier;

/// 候选意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    /// 0.0 ~ 1.0
    pub confidence: f64,
}

impl Candidate {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// 一次分类的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    /// 按置信度降序
    pub candidates: Vec<Candidate>,
    pub parameters: Parameters,
    pub text: String,
}

/// 分类器 trait
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, String>;
}
