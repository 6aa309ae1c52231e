//! Linda - 上下文对话状态引擎
//!
//! 入口：初始化日志，加载配置与注册表，逐行读取标准输入并输出每轮结果（JSON），输入 exit 退出。
//! 第一个命令行参数可指定额外的配置文件。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use linda::classifier::KeywordClassifier;
use linda::config::load_config;
use linda::core::DialogueEngine;
use linda::fulfillment::{Schedule, ScheduleExecutor};
use linda::observability;
use linda::registry::Registry;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const PROMPT: &str = "Text >> ";
const APOLOGY: &str = "Sorry, something went wrong on my side. Please try again.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(std::env::args().nth(1).map(PathBuf::from))
        .context("Failed to load configuration")?;

    let registry = match &cfg.engine.registry_path {
        Some(path) => Registry::load(path)
            .with_context(|| format!("Failed to load registry from {}", path.display()))?,
        None => Registry::embedded_default().context("Embedded registry is invalid")?,
    };
    let classifier =
        KeywordClassifier::from_registry(&registry).context("Failed to build classifier")?;
    let schedule = Schedule::open(&cfg.schedule.path, Utc::now())
        .with_context(|| format!("Failed to open schedule {}", cfg.schedule.path.display()))?;

    let engine = Arc::new(DialogueEngine::from_config(
        &cfg,
        Arc::new(registry),
        Arc::new(classifier),
        Arc::new(ScheduleExecutor::new(schedule)),
    ));

    // 定期回收空闲会话
    let reaper = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            reaper.reap_idle_sessions().await;
        }
    });

    let user_id = cfg.app.default_user.clone();
    tracing::info!(
        "{} ready for user '{}'",
        cfg.app.name.as_deref().unwrap_or("Linda"),
        user_id
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.eq_ignore_ascii_case("exit") {
            break;
        }
        if text.is_empty() {
            continue;
        }

        match engine.handle_turn(&user_id, text).await {
            Ok(turn) => {
                let json = serde_json::to_string_pretty(&turn)?;
                stdout.write_all(format!("{json}\n").as_bytes()).await?;
            }
            Err(e) if e.is_collaborator_failure() => {
                tracing::error!("Turn failed: {}", e);
                stdout.write_all(format!("{APOLOGY}\n").as_bytes()).await?;
            }
            Err(e) => return Err(e).context("Registry or template configuration is broken"),
        }
    }

    Ok(())
}
