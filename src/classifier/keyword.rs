//! 关键词分类器
//!
//! 不调用模型：按注册表中每个意图的 keywords 计分，用 [entities] 中的正则抽取参数。
//! 抽取到参数时额外给出 Information 候选，交由引擎按上下文裁决。

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::{Candidate, Classification, Classifier};
use crate::core::Parameters;
use crate::registry::{Registry, RegistryError, INFORMATION};

/// 抽取到参数时 Information 候选的置信度（与命中一个关键词相同）
const INFORMATION_CONFIDENCE: f64 = 0.5;

struct IntentRule {
    tag: String,
    keywords: Vec<Regex>,
}

pub struct KeywordClassifier {
    rules: Vec<IntentRule>,
    entities: Vec<(String, Regex)>,
}

impl KeywordClassifier {
    pub fn from_registry(registry: &Registry) -> Result<Self, RegistryError> {
        let mut rules = Vec::new();
        for def in registry.intents().filter(|def| !def.keywords.is_empty()) {
            let keywords = def
                .keywords
                .iter()
                .map(|k| keyword_regex(k))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| RegistryError::InvalidPattern {
                    entity: format!("{}.keywords", def.tag),
                    source,
                })?;
            rules.push(IntentRule {
                tag: def.tag.clone(),
                keywords,
            });
        }
        rules.sort_by(|a, b| a.tag.cmp(&b.tag));

        let entities = registry
            .entity_patterns()
            .iter()
            .map(|(entity, pattern)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (entity.clone(), re))
                    .map_err(|source| RegistryError::InvalidPattern {
                        entity: entity.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules, entities })
    }

    /// 抽取实体：有捕获组取第一组，否则取整个匹配
    fn extract(&self, text: &str) -> Parameters {
        let mut params = Parameters::new();
        for (entity, re) in &self.entities {
            if let Some(caps) = re.captures(text) {
                let value = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str());
                if let Some(value) = value {
                    params.insert(entity.clone(), Value::from(normalize(value)));
                }
            }
        }
        params
    }

    /// 命中 n 个关键词的置信度为 n / (n + 1)
    fn score(&self, text: &str, has_entities: bool) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let hits = rule.keywords.iter().filter(|re| re.is_match(text)).count();
                (hits > 0).then(|| {
                    let hits = hits as f64;
                    Candidate::new(rule.tag.clone(), hits / (hits + 1.0))
                })
            })
            .collect();

        if has_entities {
            candidates.push(Candidate::new(INFORMATION, INFORMATION_CONFIDENCE));
        }
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, String> {
        let parameters = self.extract(text);
        let candidates = self.score(text, !parameters.is_empty());
        tracing::debug!(
            "Classified {:?}: {:?}",
            text,
            candidates
                .iter()
                .map(|c| (c.name.as_str(), c.confidence))
                .collect::<Vec<_>>()
        );
        Ok(Classification {
            candidates,
            parameters,
            text: text.to_string(),
        })
    }
}

fn keyword_regex(keyword: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))
}

/// 纯字母的值统一小写，日期等保持原样
fn normalize(value: &str) -> String {
    if value.chars().all(char::is_alphabetic) {
        value.to_lowercase()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::from_registry(&Registry::embedded_default().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_add_event_with_type() {
        let result = classifier().classify("Add an exam please").await.unwrap();
        assert_eq!(result.candidates[0].name, "AddEvent");
        assert!(result.candidates.iter().any(|c| c.name == INFORMATION));
        assert_eq!(result.parameters["eventType"], json!("exam"));
        assert!(!result.parameters.contains_key("time"));
    }

    #[tokio::test]
    async fn test_information_only() {
        let result = classifier().classify("tomorrow").await.unwrap();
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].name, INFORMATION);
        assert_eq!(result.parameters["time"], json!("tomorrow"));
    }

    #[tokio::test]
    async fn test_keywords_match_whole_words() {
        let result = classifier().classify("I know nothing").await.unwrap();
        assert!(result.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_iso_time_extracted() {
        let result = classifier()
            .classify("add lab on 2030-01-02T10:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(result.parameters["time"], json!("2030-01-02T10:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_more_hits_rank_higher() {
        let result = classifier().classify("cancel, stop it").await.unwrap();
        assert_eq!(result.candidates[0].name, "Cancel");
        assert!(result.candidates[0].confidence > 0.6);
    }
}
