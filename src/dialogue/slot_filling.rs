//! 槽位填充
//!
//! 参数齐全则执行并回复；不全则压入未完成意图栈并追问第一个缺失参数。
//! Information 为栈中的意图补参数，Cancel 丢弃最近的未完成意图。

use chrono::{DateTime, Utc};

use super::composer::render;
use crate::core::{DialogueError, InformationSource, Parameters, TurnKind};
use crate::fulfillment::FulfillmentExecutor;
use crate::registry::{IntentDefinition, Registry};
use crate::session::{RecordId, Session};

/// 槽位填充一轮的结果
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub response: String,
    pub kind: TurnKind,
    pub intent: Option<String>,
    pub enrichment: Parameters,
    pub completed_by: Option<InformationSource>,
}

pub struct SlotFiller<'a> {
    registry: &'a Registry,
    executor: &'a dyn FulfillmentExecutor,
}

impl<'a> SlotFiller<'a> {
    pub fn new(registry: &'a Registry, executor: &'a dyn FulfillmentExecutor) -> Self {
        Self { registry, executor }
    }

    pub async fn process(
        &self,
        def: &IntentDefinition,
        supplied: &Parameters,
        session: &mut Session,
        now: DateTime<Utc>,
        text: &str,
    ) -> Result<TurnOutcome, DialogueError> {
        if def.is_cancel() {
            return self.cancel(def, session);
        }
        if def.is_information() {
            return self.information(def, supplied, session, now, text).await;
        }

        let merged = merge_parameters(def, supplied, session);
        match def.first_missing(&merged) {
            Some(missing) => self.prompt_pending(def, missing, merged, session, now),
            None => self.complete(def, merged, session, now, None).await,
        }
    }

    /// 参数齐全：执行 → 激活 context_set → 记入 active intents → 回复
    ///
    /// `resolved` 为被 Information 补全的未完成意图，执行成功后才从栈中移除。
    /// 执行器失败时会话状态保持不变。
    async fn complete(
        &self,
        def: &IntentDefinition,
        merged: Parameters,
        session: &mut Session,
        now: DateTime<Utc>,
        resolved: Option<RecordId>,
    ) -> Result<TurnOutcome, DialogueError> {
        let enrichment = self
            .executor
            .fulfill(&def.tag, &merged)
            .await
            .map_err(|message| DialogueError::Fulfillment {
                tag: def.tag.clone(),
                message,
            })?;
        if let Some(name) = def.enrichment.iter().find(|n| !enrichment.contains_key(*n)) {
            return Err(DialogueError::Fulfillment {
                tag: def.tag.clone(),
                message: format!("executor returned no '{name}'"),
            });
        }

        if let Some(id) = resolved {
            session.take_pending(id);
        }
        if let Some(context) = &def.context_set {
            session.set_context(context, merged.clone(), now);
        }
        session.push_active_intent(&def.tag, merged.clone(), now);

        let mut known = merged;
        extend_missing(&mut known, &enrichment);
        extend_missing(&mut known, &session.summary_parameters());
        let response = render(&def.responses, &known)?;

        tracing::info!(user_id = %session.user_id, "Fulfilled '{}'", def.tag);
        Ok(TurnOutcome {
            response,
            kind: TurnKind::Fulfilled,
            intent: Some(def.tag.clone()),
            enrichment,
            completed_by: None,
        })
    }

    /// 参数不全：压栈并追问第一个缺失参数
    fn prompt_pending(
        &self,
        def: &IntentDefinition,
        missing: &str,
        merged: Parameters,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, DialogueError> {
        session.push_pending(&def.tag, merged.clone(), now);
        let mut known = merged;
        extend_missing(&mut known, &session.summary_parameters());
        tracing::info!(user_id = %session.user_id, "'{}' is missing '{}'", def.tag, missing);
        let response = render(def.prompts_for(missing)?, &known)?;

        Ok(TurnOutcome {
            response,
            kind: TurnKind::Prompted,
            intent: Some(def.tag.clone()),
            enrichment: Parameters::new(),
            completed_by: None,
        })
    }

    fn cancel(
        &self,
        def: &IntentDefinition,
        session: &mut Session,
    ) -> Result<TurnOutcome, DialogueError> {
        if let Some(dropped) = session.cancel_most_recent() {
            tracing::info!(user_id = %session.user_id, "Cancelled pending '{}'", dropped.tag);
        }
        let response = render(&def.responses, &session.summary_parameters())?;
        Ok(TurnOutcome {
            response,
            kind: TurnKind::Cancelled,
            intent: Some(def.tag.clone()),
            enrichment: Parameters::new(),
            completed_by: None,
        })
    }

    /// 无需追问的 Information：只用自身模板回复
    fn acknowledge(
        &self,
        def: &IntentDefinition,
        session: &Session,
    ) -> Result<TurnOutcome, DialogueError> {
        let response = render(&def.responses, &session.summary_parameters())?;
        Ok(TurnOutcome {
            response,
            kind: TurnKind::Fulfilled,
            intent: Some(def.tag.clone()),
            enrichment: Parameters::new(),
            completed_by: None,
        })
    }

    async fn information(
        &self,
        def: &IntentDefinition,
        supplied: &Parameters,
        session: &mut Session,
        now: DateTime<Utc>,
        text: &str,
    ) -> Result<TurnOutcome, DialogueError> {
        // 最近压入、且缺少本轮给出的某个参数的记录优先
        let target = session
            .incomplete()
            .iter()
            .find(|r| r.missing_any(supplied.keys()))
            .or_else(|| session.incomplete().most_recent())
            .map(|r| r.id);

        let Some(target) = target else {
            return self.acknowledge(def, session);
        };

        let before = session
            .incomplete()
            .iter()
            .find(|r| r.id == target)
            .map(|r| r.parameters.clone())
            .unwrap_or_default();
        let filled = session.fill_pending(target, supplied);
        tracing::debug!("Information filled {:?}", filled);

        let mut satisfied = None;
        for record in session.incomplete().iter() {
            let pending_def = self.registry.require_intent(&record.tag)?;
            if pending_def.is_satisfied(&record.parameters) {
                satisfied = Some((record.id, pending_def, record.parameters.clone()));
                break;
            }
        }

        if let Some((id, pending_def, params)) = satisfied {
            let source = InformationSource {
                text: text.to_string(),
                request_num: session.request_counter(),
            };
            return match self.complete(pending_def, params, session, now, Some(id)).await {
                Ok(mut outcome) => {
                    outcome.completed_by = Some(source);
                    Ok(outcome)
                }
                Err(e) => {
                    // 执行失败：撤销本轮补入的参数
                    session.set_pending_parameters(target, before);
                    Err(e)
                }
            };
        }

        let Some(record) = session.incomplete().most_recent() else {
            return self.acknowledge(def, session);
        };
        let pending_def = self.registry.require_intent(&record.tag)?;
        let Some(missing) = pending_def.first_missing(&record.parameters) else {
            return self.acknowledge(def, session);
        };
        let mut known = record.parameters.clone();
        extend_missing(&mut known, &session.summary_parameters());
        let response = render(pending_def.prompts_for(missing)?, &known)?;

        Ok(TurnOutcome {
            response,
            kind: TurnKind::Prompted,
            intent: Some(pending_def.tag.clone()),
            enrichment: Parameters::new(),
            completed_by: None,
        })
    }
}

/// 合并上下文参数（`context-<参数>`）与前置意图参数（`intent-<参数>`），不覆盖已有值
pub fn merge_parameters(
    def: &IntentDefinition,
    supplied: &Parameters,
    session: &Session,
) -> Parameters {
    let mut merged = supplied.clone();

    for context in session
        .contexts()
        .iter_recent()
        .filter(|c| def.context_needed.contains(&c.name))
    {
        for (name, value) in &context.parameters {
            merged
                .entry(format!("context-{name}"))
                .or_insert_with(|| value.clone());
        }
    }

    if let Some(tags) = &def.follow_up {
        for record in session.active_intents().iter().filter(|r| tags.contains(&r.tag)) {
            for (name, value) in &record.parameters {
                merged
                    .entry(format!("intent-{name}"))
                    .or_insert_with(|| value.clone());
            }
        }
    }

    merged
}

fn extend_missing(target: &mut Parameters, extra: &Parameters) {
    for (name, value) in extra {
        target.entry(name.clone()).or_insert_with(|| value.clone());
    }
}
