//! Linda - 上下文对话状态引擎
//!
//! 模块划分：
//! - **classifier**: 分类器抽象与关键词分类器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 对话引擎（Turn API）、错误类型、单轮结果
//! - **dialogue**: 生命周期清扫、候选裁决、槽位填充、回复组装
//! - **fulfillment**: 意图执行器抽象与日程执行器
//! - **observability**: tracing 初始化
//! - **registry**: 意图 / 上下文注册表（只读）
//! - **session**: 会话状态与会话存储

pub mod classifier;
pub mod config;
pub mod core;
pub mod dialogue;
pub mod fulfillment;
pub mod observability;
pub mod registry;
pub mod session;

pub use crate::core::{DialogueEngine, DialogueError, TurnKind, TurnResponse};
