//! 运行期记录：上下文记录、意图记录、未完成意图栈
//!
//! 未完成意图与其镜像上下文通过 RecordId 关联，不依赖栈中的位置。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::Parameters;

/// 意图记录 ID（进程内唯一，稳定不变）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct RecordId(u64);

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

impl RecordId {
    pub fn new() -> Self {
        Self(NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CompletionState {
    Pending,
    Complete,
}

/// 上下文来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextOrigin {
    /// 意图完成时按 context_set 激活
    Declared,
    /// 未完成意图的镜像（"<tag> - Parameters"）
    Pending(RecordId),
}

#[derive(Clone, Debug)]
pub struct ContextRecord {
    pub name: String,
    pub parameters: Parameters,
    pub created_at: DateTime<Utc>,
    pub request_num: u64,
    pub origin: ContextOrigin,
}

#[derive(Clone, Debug)]
pub struct IntentRecord {
    pub id: RecordId,
    pub tag: String,
    pub parameters: Parameters,
    pub created_at: DateTime<Utc>,
    pub request_num: u64,
    pub state: CompletionState,
}

impl IntentRecord {
    pub fn new(
        tag: impl Into<String>,
        parameters: Parameters,
        created_at: DateTime<Utc>,
        request_num: u64,
        state: CompletionState,
    ) -> Self {
        Self {
            id: RecordId::new(),
            tag: tag.into(),
            parameters,
            created_at,
            request_num,
            state,
        }
    }

    /// 是否缺少 names 中的任一参数
    pub fn missing_any<'a>(&self, mut names: impl Iterator<Item = &'a String>) -> bool {
        names.any(|n| !self.parameters.contains_key(n))
    }

    /// 只填补缺口，不覆盖已有值；返回新填入的参数名
    pub fn fill_gaps(&mut self, supplied: &Parameters) -> Vec<String> {
        let mut filled = Vec::new();
        for (name, value) in supplied {
            if !self.parameters.contains_key(name) {
                self.parameters.insert(name.clone(), value.clone());
                filled.push(name.clone());
            }
        }
        filled
    }
}

/// 活跃上下文：按插入顺序保存，重复插入同名上下文会移到最新位置
#[derive(Clone, Debug, Default)]
pub struct ActiveContexts {
    records: Vec<ContextRecord>,
}

impl ActiveContexts {
    pub fn insert(&mut self, record: ContextRecord) -> Option<ContextRecord> {
        let previous = self.remove(&record.name);
        self.records.push(record);
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<ContextRecord> {
        let index = self.records.iter().position(|r| r.name == name)?;
        Some(self.records.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&ContextRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ContextRecord> {
        self.records.iter_mut().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 最近插入的在前
    pub fn iter_recent(&self) -> impl Iterator<Item = &ContextRecord> {
        self.records.iter().rev()
    }

    pub fn names_recent(&self) -> Vec<String> {
        self.iter_recent().map(|r| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 未完成意图栈（IIS）：队首为最近压入
#[derive(Clone, Debug, Default)]
pub struct IncompleteStack {
    entries: VecDeque<IntentRecord>,
}

impl IncompleteStack {
    pub fn push(&mut self, record: IntentRecord) {
        self.entries.push_front(record);
    }

    pub fn remove(&mut self, id: RecordId) -> Option<IntentRecord> {
        let index = self.entries.iter().position(|r| r.id == id)?;
        self.entries.remove(index)
    }

    pub fn most_recent(&self) -> Option<&IntentRecord> {
        self.entries.front()
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut IntentRecord> {
        self.entries.iter_mut().find(|r| r.id == id)
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<&IntentRecord> {
        self.entries.iter().find(|r| r.tag == tag)
    }

    /// 最近压入的在前
    pub fn iter(&self) -> impl Iterator<Item = &IntentRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
