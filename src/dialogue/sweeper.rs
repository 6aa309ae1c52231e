//! 生命周期清扫：每轮开始时移除过期的上下文与意图
//!
//! 两阶段：先计算待移除集合，再统一应用，避免边遍历边删除。

use chrono::{DateTime, Utc};

use crate::registry::{pending_tag, Registry, RegistryError};
use crate::session::{ContextOrigin, RecordId, Session};

/// 一次清扫的结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_contexts: Vec<String>,
    pub expired_intents: Vec<String>,
    /// 随镜像上下文一起丢弃的未完成意图
    pub dropped_pending: Vec<String>,
    pub counter_reset: bool,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_contexts.is_empty() && self.expired_intents.is_empty()
    }
}

pub fn sweep(
    session: &mut Session,
    registry: &Registry,
    now: DateTime<Utc>,
) -> Result<SweepReport, RegistryError> {
    let counter = session.request_counter();

    let mut expired_contexts = Vec::new();
    for record in session.contexts().iter_recent() {
        let lifespan = registry.context_lifespan(&record.name)?;
        if !lifespan.is_alive(record.created_at, record.request_num, now, counter) {
            expired_contexts.push(record.name.clone());
        }
    }

    let mut expired_intents: Vec<(RecordId, String)> = Vec::new();
    for record in session.active_intents() {
        let lifespan = registry.require_intent(&record.tag)?.lifespan;
        if !lifespan.is_alive(record.created_at, record.request_num, now, counter) {
            expired_intents.push((record.id, record.tag.clone()));
        }
    }

    let mut report = SweepReport::default();
    for name in expired_contexts {
        if let Some(removed) = session.remove_context(&name) {
            if let (ContextOrigin::Pending(_), Some(tag)) = (removed.origin, pending_tag(&name)) {
                report.dropped_pending.push(tag.to_string());
            }
            report.expired_contexts.push(name);
        }
    }
    for (id, tag) in expired_intents {
        if session.remove_active_intent(id).is_some() {
            report.expired_intents.push(tag);
        }
    }

    if !report.expired_contexts.is_empty() && session.contexts().is_empty() {
        session.set_request_counter(1);
        report.counter_reset = true;
    }

    if !report.is_empty() {
        tracing::debug!(
            user_id = %session.user_id,
            "Swept contexts {:?}, intents {:?}",
            report.expired_contexts,
            report.expired_intents
        );
    }
    Ok(report)
}
