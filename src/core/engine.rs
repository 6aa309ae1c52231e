//! 对话引擎：Turn API
//!
//! 每轮：锁定会话 → 请求计数 → 清扫 → 分类 → 候选裁决 → 适用性检查 → 槽位填充 → 投影为 TurnResponse。
//! 整轮在会话锁内完成，同一用户的轮次串行，不同用户并行。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OwnedMutexGuard;

use super::{DialogueError, Parameters, TurnKind, TurnResponse};
use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::dialogue::{is_out_of_context, render, sweep, CandidateResolver, SlotFiller, TurnOutcome};
use crate::fulfillment::FulfillmentExecutor;
use crate::registry::Registry;
use crate::session::{MemorySessionStore, Session, SessionStore};

/// 默认空闲会话超时（秒）
const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 3600;

pub struct DialogueEngine {
    registry: Arc<Registry>,
    sessions: Arc<dyn SessionStore>,
    classifier: Arc<dyn Classifier>,
    executor: Arc<dyn FulfillmentExecutor>,
    resolver: CandidateResolver,
    idle_timeout: Duration,
}

impl DialogueEngine {
    pub fn new(
        registry: Arc<Registry>,
        classifier: Arc<dyn Classifier>,
        executor: Arc<dyn FulfillmentExecutor>,
    ) -> Self {
        Self {
            registry,
            sessions: Arc::new(MemorySessionStore::new()),
            classifier,
            executor,
            resolver: CandidateResolver::default(),
            idle_timeout: Duration::seconds(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }

    /// 按配置构建（阈值、空闲超时）
    pub fn from_config(
        cfg: &AppConfig,
        registry: Arc<Registry>,
        classifier: Arc<dyn Classifier>,
        executor: Arc<dyn FulfillmentExecutor>,
    ) -> Self {
        let idle_secs = i64::try_from(cfg.sessions.idle_timeout_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Self::new(registry, classifier, executor)
            .with_similarity_threshold(cfg.engine.similarity_threshold)
            .with_idle_timeout(Duration::seconds(idle_secs))
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.resolver = CandidateResolver::new(threshold);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub async fn handle_turn(&self, user_id: &str, text: &str) -> Result<TurnResponse, DialogueError> {
        self.handle_turn_at(user_id, text, Utc::now()).await
    }

    /// 以给定时间处理一轮（测试用固定时钟）
    pub async fn handle_turn_at(
        &self,
        user_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnResponse, DialogueError> {
        let mut session = self.lock_session(user_id).await;

        session.begin_turn(now);
        sweep(&mut session, &self.registry, now)?;

        let classification = self
            .classifier
            .classify(text)
            .await
            .map_err(DialogueError::Classifier)?;

        let chosen = self
            .resolver
            .resolve(&classification.candidates, &session, &self.registry);
        let def = match chosen {
            Some(candidate) => Some(self.registry.require_intent(&candidate.name)?),
            None => None,
        };

        let outcome = match def {
            Some(def) if !is_out_of_context(def, &session) => {
                SlotFiller::new(&self.registry, self.executor.as_ref())
                    .process(def, &classification.parameters, &mut session, now, text)
                    .await?
            }
            Some(def) => {
                tracing::warn!(user_id, "'{}' is out of context, falling back", def.tag);
                self.fallback()?
            }
            None => {
                tracing::warn!(user_id, "No intent candidates for {:?}, falling back", text);
                self.fallback()?
            }
        };

        let summary = session.summary().clone();
        let request_num = session.request_counter();
        tracing::info!(
            user_id,
            request_num,
            "Turn handled: {:?} {:?}",
            outcome.kind,
            outcome.intent
        );

        Ok(TurnResponse {
            user_id: user_id.to_string(),
            text: text.to_string(),
            response: outcome.response,
            kind: outcome.kind,
            intent: outcome.intent,
            parameters: classification.parameters,
            enrichment: outcome.enrichment,
            completed_by: outcome.completed_by,
            active_contexts: summary.active_contexts,
            active_intents: summary.active_intents,
            request_num,
        })
    }

    /// 锁定用户会话。等锁期间会话可能已被回收，此时重新获取，保证本轮写入存储中的会话
    async fn lock_session(&self, user_id: &str) -> OwnedMutexGuard<Session> {
        loop {
            let handle = self.sessions.get_or_create(user_id).await;
            let guard = Arc::clone(&handle).lock_owned().await;
            match self.sessions.get(user_id).await {
                Some(current) if Arc::ptr_eq(&current, &handle) => return guard,
                _ => tracing::debug!(user_id, "Session was reaped before locking, retrying"),
            }
        }
    }

    /// 回收空闲会话
    pub async fn reap_idle_sessions(&self) -> usize {
        self.sessions.cleanup_idle(self.idle_timeout, Utc::now()).await
    }

    fn fallback(&self) -> Result<TurnOutcome, DialogueError> {
        let response = render(self.registry.fallback_responses(), &Parameters::new())?;
        Ok(TurnOutcome {
            response,
            kind: TurnKind::Fallback,
            intent: None,
            enrichment: Parameters::new(),
            completed_by: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Candidate, Classification};
    use crate::fulfillment::NoopExecutor;
    use crate::session::SessionHandle;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// 无论输入如何都返回固定候选
    struct FixedClassifier(Vec<Candidate>);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, text: &str) -> Result<Classification, String> {
            Ok(Classification {
                candidates: self.0.clone(),
                parameters: Parameters::new(),
                text: text.to_string(),
            })
        }
    }

    /// 返回固定候选与参数
    struct ParamClassifier(Vec<Candidate>, Parameters);

    #[async_trait]
    impl Classifier for ParamClassifier {
        async fn classify(&self, text: &str) -> Result<Classification, String> {
            Ok(Classification {
                candidates: self.0.clone(),
                parameters: self.1.clone(),
                text: text.to_string(),
            })
        }
    }

    /// 第一次 get_or_create 交出一个已被回收、不在存储中的会话
    #[derive(Default)]
    struct ReapedOnceStore {
        inner: MemorySessionStore,
        reaped: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for ReapedOnceStore {
        async fn get_or_create(&self, user_id: &str) -> SessionHandle {
            if !self.reaped.swap(true, Ordering::SeqCst) {
                return Arc::new(Mutex::new(Session::new(user_id, Utc::now())));
            }
            self.inner.get_or_create(user_id).await
        }

        async fn get(&self, user_id: &str) -> Option<SessionHandle> {
            self.inner.get(user_id).await
        }

        async fn remove(&self, user_id: &str) -> bool {
            self.inner.remove(user_id).await
        }

        async fn cleanup_idle(&self, timeout: Duration, now: DateTime<Utc>) -> usize {
            self.inner.cleanup_idle(timeout, now).await
        }

        async fn active_count(&self) -> usize {
            self.inner.active_count().await
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl Classifier for BrokenClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, String> {
            Err("model not loaded".to_string())
        }
    }

    fn engine(classifier: Arc<dyn Classifier>) -> DialogueEngine {
        let registry = Arc::new(Registry::embedded_default().unwrap());
        DialogueEngine::new(registry, classifier, Arc::new(NoopExecutor))
    }

    #[tokio::test]
    async fn test_no_candidates_falls_back() {
        let engine = engine(Arc::new(FixedClassifier(Vec::new())));
        let turn = engine.handle_turn("u1", "blah").await.unwrap();
        assert_eq!(turn.kind, TurnKind::Fallback);
        assert!(engine
            .registry()
            .fallback_responses()
            .contains(&turn.response));
        assert_eq!(turn.request_num, 1);
    }

    #[tokio::test]
    async fn test_unknown_candidate_is_defect() {
        let engine = engine(Arc::new(FixedClassifier(vec![Candidate::new("Dance", 0.9)])));
        let err = engine.handle_turn("u1", "dance").await.unwrap_err();
        assert!(err.is_configuration_defect());
    }

    #[tokio::test]
    async fn test_classifier_failure_propagates() {
        let engine = engine(Arc::new(BrokenClassifier));
        let err = engine.handle_turn("u1", "hi").await.unwrap_err();
        assert!(matches!(err, DialogueError::Classifier(_)));
        assert!(err.is_collaborator_failure());
    }

    #[tokio::test]
    async fn test_last_intent_in_response() {
        let engine = engine(Arc::new(FixedClassifier(vec![Candidate::new(
            "Check Current State",
            0.9,
        )])));
        let turn = engine.handle_turn("u1", "status").await.unwrap();
        assert_eq!(turn.response, "Last given intent was Check Current State.");
        assert_eq!(turn.active_intents, vec!["Check Current State"]);
    }

    #[tokio::test]
    async fn test_turn_lands_in_stored_session_after_reap() {
        let mut supplied = Parameters::new();
        supplied.insert("eventType".to_string(), json!("exam"));
        let classifier = ParamClassifier(vec![Candidate::new("AddEvent", 0.9)], supplied);
        let store = Arc::new(ReapedOnceStore::default());
        let engine = engine(Arc::new(classifier)).with_session_store(store.clone());

        let turn = engine.handle_turn("u1", "add exam").await.unwrap();
        assert_eq!(turn.kind, TurnKind::Prompted);

        let stored = store.get("u1").await.unwrap();
        let session = stored.lock().await;
        assert_eq!(session.incomplete().most_recent().unwrap().tag, "AddEvent");
        assert_eq!(session.request_counter(), 1);
    }

    #[tokio::test]
    async fn test_from_config_and_reap() {
        let mut cfg = AppConfig::default();
        cfg.sessions.idle_timeout_secs = 0;
        let engine = DialogueEngine::from_config(
            &cfg,
            Arc::new(Registry::embedded_default().unwrap()),
            Arc::new(FixedClassifier(Vec::new())),
            Arc::new(NoopExecutor),
        );

        let past = Utc::now() - Duration::seconds(5);
        engine.handle_turn_at("u1", "hi", past).await.unwrap();
        assert_eq!(engine.sessions().active_count().await, 1);
        assert_eq!(engine.reap_idle_sessions().await, 1);
        assert_eq!(engine.sessions().active_count().await, 0);
    }
}
