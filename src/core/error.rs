//! 对话引擎错误类型
//!
//! 三类错误：配置缺陷（Registry / Compose，不做恢复）、分类歧义（不是错误，走 fallback）、
//! 协作方失败（Classifier / Fulfillment，原样向调用方传播，便于上层给出统一道歉）。

use thiserror::Error;

use crate::dialogue::ComposeError;
use crate::registry::RegistryError;

/// handle_turn 可能返回的错误
#[derive(Error, Debug)]
pub enum DialogueError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Template error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Classifier failed: {0}")]
    Classifier(String),

    #[error("Fulfillment failed for '{tag}': {message}")]
    Fulfillment { tag: String, message: String },
}

impl DialogueError {
    /// 分类器或执行器失败（外部协作方），区别于配置缺陷
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            DialogueError::Classifier(_) | DialogueError::Fulfillment { .. }
        )
    }

    pub fn is_configuration_defect(&self) -> bool {
        matches!(self, DialogueError::Registry(_) | DialogueError::Compose(_))
    }
}
