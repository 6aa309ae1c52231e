//! 单个用户的对话状态
//!
//! 活跃上下文、活跃意图、未完成意图栈与请求计数器。所有修改都经由本类型的方法，
//! 保证「未完成意图 <-> 镜像上下文」一一对应，以及摘要字段随修改刷新。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::records::{
    ActiveContexts, CompletionState, ContextOrigin, ContextRecord, IncompleteStack, IntentRecord,
    RecordId,
};
use crate::core::Parameters;
use crate::registry::pending_context_name;

/// 会话摘要（用于模板替换与展示）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// 最近激活的在前
    pub active_contexts: Vec<String>,
    /// 最近完成的在前
    pub active_intents: Vec<String>,
}

/// 单个会话
#[derive(Debug)]
pub struct Session {
    /// 会话 ID
    pub id: String,
    /// 关联的用户 ID
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// 最后活跃时间（空闲回收用）
    pub last_active: DateTime<Utc>,
    contexts: ActiveContexts,
    active_intents: Vec<IntentRecord>,
    incomplete: IncompleteStack,
    request_counter: u64,
    summary: SessionSummary,
}

impl Session {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            user_id: user_id.into(),
            created_at: now,
            last_active: now,
            contexts: ActiveContexts::default(),
            active_intents: Vec::new(),
            incomplete: IncompleteStack::default(),
            request_counter: 0,
            summary: SessionSummary::default(),
        }
    }

    /// 每轮开始：上下文与意图都为空时计数器归零，然后自增
    pub fn begin_turn(&mut self, now: DateTime<Utc>) -> u64 {
        if self.contexts.is_empty() && self.active_intents.is_empty() {
            self.request_counter = 0;
        }
        self.request_counter += 1;
        self.last_active = now;
        self.request_counter
    }

    pub fn request_counter(&self) -> u64 {
        self.request_counter
    }

    pub(crate) fn set_request_counter(&mut self, value: u64) {
        self.request_counter = value;
    }

    pub fn contexts(&self) -> &ActiveContexts {
        &self.contexts
    }

    pub fn active_intents(&self) -> &[IntentRecord] {
        &self.active_intents
    }

    pub fn incomplete(&self) -> &IncompleteStack {
        &self.incomplete
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn has_active_intent(&self, tag: &str) -> bool {
        self.active_intents.iter().any(|r| r.tag == tag)
    }

    /// 最近完成的意图
    pub fn last_intent(&self) -> Option<&str> {
        self.active_intents.first().map(|r| r.tag.as_str())
    }

    /// 激活（或替换）声明式上下文
    pub fn set_context(&mut self, name: &str, parameters: Parameters, now: DateTime<Utc>) {
        self.contexts.insert(ContextRecord {
            name: name.to_string(),
            parameters,
            created_at: now,
            request_num: self.request_counter,
            origin: ContextOrigin::Declared,
        });
        self.refresh_summary();
    }

    /// 记录一个已完成的意图（放在最前）
    pub fn push_active_intent(&mut self, tag: &str, parameters: Parameters, now: DateTime<Utc>) {
        let record = IntentRecord::new(
            tag,
            parameters,
            now,
            self.request_counter,
            CompletionState::Complete,
        );
        self.active_intents.insert(0, record);
        self.refresh_summary();
    }

    /// 压入未完成意图并建立镜像上下文；同 tag 的旧记录被取代
    pub fn push_pending(&mut self, tag: &str, parameters: Parameters, now: DateTime<Utc>) -> RecordId {
        if let Some(previous) = self.incomplete.find_by_tag(tag).map(|r| r.id) {
            tracing::debug!("Pending '{}' supersedes an older pending record", tag);
            self.incomplete.remove(previous);
        }

        let record = IntentRecord::new(
            tag,
            parameters.clone(),
            now,
            self.request_counter,
            CompletionState::Pending,
        );
        let id = record.id;
        self.incomplete.push(record);
        self.contexts.insert(ContextRecord {
            name: pending_context_name(tag),
            parameters,
            created_at: now,
            request_num: self.request_counter,
            origin: ContextOrigin::Pending(id),
        });
        self.refresh_summary();
        id
    }

    /// 为未完成意图补填缺失参数（不覆盖），镜像上下文同步更新；返回新填入的参数名
    pub fn fill_pending(&mut self, id: RecordId, supplied: &Parameters) -> Vec<String> {
        let Some(record) = self.incomplete.get_mut(id) else {
            return Vec::new();
        };
        let filled = record.fill_gaps(supplied);
        let (tag, snapshot) = (record.tag.clone(), record.parameters.clone());
        self.sync_mirror(id, &tag, snapshot);
        filled
    }

    /// 整体替换未完成意图的参数（用于执行失败后回滚），镜像上下文同步
    pub fn set_pending_parameters(&mut self, id: RecordId, parameters: Parameters) -> bool {
        let Some(record) = self.incomplete.get_mut(id) else {
            return false;
        };
        record.parameters = parameters.clone();
        let tag = record.tag.clone();
        self.sync_mirror(id, &tag, parameters);
        true
    }

    fn sync_mirror(&mut self, id: RecordId, tag: &str, parameters: Parameters) {
        if let Some(context) = self.contexts.get_mut(&pending_context_name(tag)) {
            if context.origin == ContextOrigin::Pending(id) {
                context.parameters = parameters;
            }
        }
    }

    /// 同时移除未完成意图与其镜像上下文
    pub fn take_pending(&mut self, id: RecordId) -> Option<IntentRecord> {
        let record = self.incomplete.remove(id)?;
        let mirror = pending_context_name(&record.tag);
        if matches!(
            self.contexts.get(&mirror).map(|c| c.origin),
            Some(ContextOrigin::Pending(linked)) if linked == id
        ) {
            self.contexts.remove(&mirror);
        }
        self.refresh_summary();
        Some(record)
    }

    /// Cancel：丢弃最近的未完成意图
    pub fn cancel_most_recent(&mut self) -> Option<IntentRecord> {
        let id = self.incomplete.most_recent()?.id;
        self.take_pending(id)
    }

    /// 移除上下文；若为镜像上下文，连同未完成意图一起移除
    pub fn remove_context(&mut self, name: &str) -> Option<ContextRecord> {
        let record = self.contexts.remove(name)?;
        if let ContextOrigin::Pending(id) = record.origin {
            self.incomplete.remove(id);
        }
        self.refresh_summary();
        Some(record)
    }

    pub fn remove_active_intent(&mut self, id: RecordId) -> Option<IntentRecord> {
        let index = self.active_intents.iter().position(|r| r.id == id)?;
        let record = self.active_intents.remove(index);
        self.refresh_summary();
        Some(record)
    }

    pub fn refresh_summary(&mut self) {
        self.summary = SessionSummary {
            active_contexts: self.contexts.names_recent(),
            active_intents: self.active_intents.iter().map(|r| r.tag.clone()).collect(),
        };
    }

    /// 模板中可直接引用的会话字段
    pub fn summary_parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(
            "active_contexts".to_string(),
            Value::from(self.summary.active_contexts.clone()),
        );
        params.insert(
            "active_intents".to_string(),
            Value::from(self.summary.active_intents.clone()),
        );
        params.insert(
            "last-intent".to_string(),
            Value::from(self.last_intent().unwrap_or("none")),
        );
        params
    }
}
