//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `LINDA__*` 覆盖（双下划线表示嵌套，如 `LINDA__ENGINE__SIMILARITY_THRESHOLD=0.2`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::dialogue::DEFAULT_SIMILARITY_THRESHOLD;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub sessions: SessionsSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
}

/// [app] 段：应用名、控制台使用的用户 ID
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_user")]
    pub default_user: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_user: default_user(),
        }
    }
}

fn default_user() -> String {
    "console".to_string()
}

/// [engine] 段：候选裁决阈值、注册表路径（未设置时用内置注册表）
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    pub registry_path: Option<PathBuf>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            registry_path: None,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

/// [sessions] 段：空闲会话回收
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsSection {
    /// 超过该秒数未活动的会话会被回收
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

/// [schedule] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    #[serde(default = "default_schedule_path")]
    pub path: PathBuf,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            path: default_schedule_path(),
        }
    }
}

fn default_schedule_path() -> PathBuf {
    PathBuf::from("schedule/database.json")
}

/// 从 config 目录加载配置，环境变量 LINDA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 LINDA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("LINDA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.default_user, "console");
        assert!((cfg.engine.similarity_threshold - 0.1).abs() < f64::EPSILON);
        assert!(cfg.engine.registry_path.is_none());
        assert_eq!(cfg.sessions.idle_timeout_secs, 3600);
    }

    #[test]
    fn test_explicit_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linda.toml");
        std::fs::write(
            &path,
            "[engine]\nsimilarity_threshold = 0.25\n\n[sessions]\nidle_timeout_secs = 60\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert!((cfg.engine.similarity_threshold - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.sessions.idle_timeout_secs, 60);
        assert_eq!(cfg.schedule.path, PathBuf::from("schedule/database.json"));
    }
}
