//! 意图执行（Fulfillment）
//!
//! 参数齐全的意图交给 FulfillmentExecutor 执行副作用，返回的附加数据可用于回复模板。
//! ScheduleExecutor 是基于本地日程文件的参考实现。

mod executor;
mod schedule;

use async_trait::async_trait;

use crate::core::Parameters;

pub use executor::ScheduleExecutor;
pub use schedule::{Event, RemoveOutcome, Schedule, ScheduleError};

/// 执行器 trait：每个完成的意图恰好调用一次
#[async_trait]
pub trait FulfillmentExecutor: Send + Sync {
    async fn fulfill(&self, tag: &str, parameters: &Parameters) -> Result<Parameters, String>;
}

/// 不做任何事的执行器
#[derive(Debug, Default)]
pub struct NoopExecutor;

#[async_trait]
impl FulfillmentExecutor for NoopExecutor {
    async fn fulfill(&self, tag: &str, _parameters: &Parameters) -> Result<Parameters, String> {
        tracing::debug!("No-op fulfillment for '{}'", tag);
        Ok(Parameters::new())
    }
}
