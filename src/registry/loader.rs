//! 注册表加载与校验

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use super::{ContextDefinition, IntentDefinition, Registry, RegistryError, CANCEL, INFORMATION};
use crate::dialogue::placeholders;

/// 内置注册表（config/registry.toml）
pub const DEFAULT_REGISTRY: &str = include_str!("../../config/registry.toml");

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    fallback: Vec<String>,
    #[serde(default)]
    contexts: HashMap<String, ContextDefinition>,
    #[serde(default)]
    intents: HashMap<String, IntentDefinition>,
    #[serde(default)]
    entities: BTreeMap<String, String>,
}

impl Registry {
    /// 从 TOML 文本构建并校验
    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(content)?;

        let contexts = file
            .contexts
            .into_iter()
            .map(|(name, mut def)| {
                def.name = name.clone();
                (name, def)
            })
            .collect();
        let intents = file
            .intents
            .into_iter()
            .map(|(tag, mut def)| {
                def.tag = tag.clone();
                (tag, def)
            })
            .collect();

        let registry = Self {
            intents,
            contexts,
            fallback: file.fallback,
            entities: file.entities,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded registry from {:?}: {} intents, {} contexts",
            path,
            registry.intents.len(),
            registry.contexts.len()
        );
        Ok(registry)
    }

    pub fn embedded_default() -> Result<Self, RegistryError> {
        Self::from_toml_str(DEFAULT_REGISTRY)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        for tag in [INFORMATION, CANCEL] {
            if !self.intents.contains_key(tag) {
                return Err(RegistryError::UnknownIntent(tag.to_string()));
            }
        }
        if self.fallback.is_empty() {
            return Err(RegistryError::Invalid(
                "fallback responses must not be empty".to_string(),
            ));
        }

        for intent in self.intents.values() {
            for parameter in &intent.parameters {
                if intent.prompts.get(parameter).map_or(true, Vec::is_empty) {
                    return Err(RegistryError::MissingPrompts {
                        intent: intent.tag.clone(),
                        parameter: parameter.clone(),
                    });
                }
            }
            let contexts = intent.context_set.iter().chain(intent.context_needed.iter());
            for name in contexts {
                if !self.contexts.contains_key(name) {
                    return Err(RegistryError::UnknownContext(name.clone()));
                }
            }
            for tag in intent.follow_up.iter().flatten() {
                if !self.intents.contains_key(tag) {
                    return Err(RegistryError::UnknownIntent(tag.clone()));
                }
            }
            check_templates(intent)?;
        }

        for template in &self.fallback {
            if let Some(name) = placeholders(template).first() {
                return Err(RegistryError::UnknownPlaceholder {
                    owner: "fallback".to_string(),
                    placeholder: name.to_string(),
                });
            }
        }

        for (entity, pattern) in &self.entities {
            regex::Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
                entity: entity.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// 模板只能引用渲染时一定存在的参数
fn check_templates(intent: &IntentDefinition) -> Result<(), RegistryError> {
    let prompts = intent.prompts.iter().flat_map(|(parameter, templates)| {
        templates.iter().map(move |t| (Some(parameter.as_str()), t))
    });
    let responses = intent.responses.iter().map(|t| (None, t));

    for (parameter, template) in prompts.chain(responses) {
        for name in placeholders(template) {
            if !intent.knows_placeholder(name, parameter) {
                return Err(RegistryError::UnknownPlaceholder {
                    owner: intent.tag.clone(),
                    placeholder: name.to_string(),
                });
            }
        }
    }
    Ok(())
}
