//! 候选意图裁决与适用性检查
//!
//! 置信度相近的候选视为同样可信，再按最近激活的上下文排序挑选；
//! Follow-Up 意图以及有待补全意图时的 Information / Cancel 优先。

use crate::classifier::Candidate;
use crate::registry::{IntentDefinition, Registry};
use crate::session::Session;

/// 默认相似度阈值：与最高置信度相差不超过该值的候选都参与裁决
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.1;

// 浮点减法误差（0.5 - 0.4 = 0.09999...）
const EPSILON: f64 = 1e-9;

#[derive(Clone, Debug)]
pub struct CandidateResolver {
    similarity_threshold: f64,
}

impl Default for CandidateResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl CandidateResolver {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// 从按置信度降序排列的候选中选出要处理的意图；候选为空时返回 None
    pub fn resolve<'a>(
        &self,
        candidates: &'a [Candidate],
        session: &Session,
        registry: &Registry,
    ) -> Option<&'a Candidate> {
        let top = candidates.first()?;

        let similar: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| top.confidence - c.confidence <= self.similarity_threshold + EPSILON)
            .collect();

        // 按上下文的新旧顺序收集处于上下文中的候选
        let mut shortlist: Vec<(&Candidate, &IntentDefinition)> = Vec::new();
        for context in session.contexts().iter_recent() {
            for candidate in &similar {
                let Some(def) = registry.intent(&candidate.name) else {
                    continue;
                };
                let applies =
                    def.context_needed.is_empty() || def.context_needed.contains(&context.name);
                if applies && !shortlist.iter().any(|(c, _)| c.name == candidate.name) {
                    shortlist.push((*candidate, def));
                }
            }
        }

        let pending_work = !session.incomplete().is_empty();
        let preferred = shortlist.iter().find(|(_, def)| {
            let follows_active = def
                .follow_up
                .as_ref()
                .is_some_and(|tags| tags.iter().any(|t| session.has_active_intent(t)));
            follows_active || (def.is_meta() && pending_work)
        });

        let chosen = preferred
            .or_else(|| shortlist.first())
            .map(|(c, _)| *c)
            .unwrap_or(top);

        tracing::debug!(
            "Resolved '{}' from {} similar candidates ({} in context)",
            chosen.name,
            similar.len(),
            shortlist.len()
        );
        Some(chosen)
    }
}

/// 意图在当前会话下是否不可用（上下文或 Follow-Up 前置不满足）
pub fn is_out_of_context(def: &IntentDefinition, session: &Session) -> bool {
    if def.is_meta() {
        // 没有待补全 / 待取消的意图
        return session.incomplete().is_empty();
    }

    let in_context = def.context_needed.is_empty()
        || def
            .context_needed
            .iter()
            .any(|name| session.contexts().contains(name));
    if !in_context {
        return true;
    }

    match &def.follow_up {
        Some(tags) => !tags.iter().all(|t| session.has_active_intent(t)),
        None => false,
    }
}
