//! 单轮对话的结果投影
//!
//! 引擎内部状态由 Session 维护，每轮结束后投影为可序列化的 TurnResponse 交给上层（控制台 / 调用方）。

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// 参数表：参数名 -> 值（值可能是字符串、列表或 {from, to} 之类的对象）
pub type Parameters = BTreeMap<String, Value>;

/// 本轮的处理结果类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// 意图参数齐全并已执行
    Fulfilled,
    /// 参数不全，向用户追问
    Prompted,
    /// 取消了最近的未完成意图
    Cancelled,
    /// 没有处于上下文中的候选，返回兜底回复
    Fallback,
}

/// 通过 Information 补全参数的那一轮
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InformationSource {
    pub text: String,
    pub request_num: u64,
}

/// Turn API 的返回值
#[derive(Clone, Debug, Serialize)]
pub struct TurnResponse {
    pub user_id: String,
    pub text: String,
    pub response: String,
    pub kind: TurnKind,
    /// 实际处理的意图（Information 补全时为被补全的意图）
    pub intent: Option<String>,
    /// 分类器给出的原始参数
    pub parameters: Parameters,
    /// 执行器返回的附加数据
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub enrichment: Parameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<InformationSource>,
    pub active_contexts: Vec<String>,
    pub active_intents: Vec<String>,
    pub request_num: u64,
}
