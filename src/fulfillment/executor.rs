//! 基于日程文件的执行器

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use super::schedule::{Event, Schedule};
use super::FulfillmentExecutor;
use crate::core::Parameters;

pub struct ScheduleExecutor {
    schedule: Mutex<Schedule>,
}

impl ScheduleExecutor {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule: Mutex::new(schedule),
        }
    }

    /// 当前全部事件的描述
    pub async fn describe_events(&self) -> Vec<String> {
        self.schedule
            .lock()
            .await
            .events()
            .iter()
            .map(Event::describe)
            .collect()
    }
}

#[async_trait]
impl FulfillmentExecutor for ScheduleExecutor {
    async fn fulfill(&self, tag: &str, parameters: &Parameters) -> Result<Parameters, String> {
        let now = Utc::now();
        let mut schedule = self.schedule.lock().await;
        let mut enrichment = Parameters::new();

        match tag {
            "AddEvent" => {
                let event = Event::from_parameters(parameters).map_err(|e| e.to_string())?;
                tracing::info!("Adding event: {}", event.describe());
                enrichment.insert("event_id".to_string(), Value::from(event.id.clone()));
                schedule.add(event, now).map_err(|e| e.to_string())?;
            }
            "ShowSchedule" => {
                schedule.clean(now);
                let events: Vec<String> = schedule
                    .find(parameters)
                    .into_iter()
                    .map(Event::describe)
                    .collect();
                let listed = if events.is_empty() {
                    "nothing".to_string()
                } else {
                    events.join(", ")
                };
                enrichment.insert("count".to_string(), Value::from(events.len()));
                enrichment.insert("events".to_string(), Value::from(listed));
            }
            "RemoveEvent" => {
                let outcome = schedule
                    .remove_matching(parameters, now)
                    .map_err(|e| e.to_string())?;
                if outcome.matched > 1 {
                    tracing::info!(
                        "Not removing: {} events match {:?}",
                        outcome.matched,
                        parameters.get("eventType")
                    );
                }
                let removed = usize::from(outcome.removed.is_some());
                enrichment.insert("removed".to_string(), Value::from(removed));
                enrichment.insert("count".to_string(), Value::from(outcome.matched));
            }
            "ChangeEventTime" => {
                let rescheduled = match parameters.get("time") {
                    Some(time) => schedule
                        .reschedule_last(time, now)
                        .map_err(|e| e.to_string())?
                        .is_some(),
                    None => false,
                };
                enrichment.insert("rescheduled".to_string(), Value::from(rescheduled));
            }
            other => {
                tracing::debug!("No schedule action for '{}'", other);
            }
        }

        Ok(enrichment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_add_then_show() {
        let executor = ScheduleExecutor::new(Schedule::in_memory());
        let added = executor
            .fulfill("AddEvent", &params(&[("eventType", "exam"), ("time", "friday")]))
            .await
            .unwrap();
        assert!(added.contains_key("event_id"));

        let shown = executor.fulfill("ShowSchedule", &Parameters::new()).await.unwrap();
        assert_eq!(shown["count"], json!(1));
        assert_eq!(shown["events"], json!("exam (friday)"));
    }

    #[tokio::test]
    async fn test_show_empty_schedule() {
        let executor = ScheduleExecutor::new(Schedule::in_memory());
        let shown = executor.fulfill("ShowSchedule", &Parameters::new()).await.unwrap();
        assert_eq!(shown["count"], json!(0));
        assert_eq!(shown["events"], json!("nothing"));
    }

    #[tokio::test]
    async fn test_remove_and_reschedule() {
        let executor = ScheduleExecutor::new(Schedule::in_memory());
        executor
            .fulfill("AddEvent", &params(&[("eventType", "lab"), ("time", "monday")]))
            .await
            .unwrap();

        let moved = executor
            .fulfill("ChangeEventTime", &params(&[("time", "tuesday")]))
            .await
            .unwrap();
        assert_eq!(moved["rescheduled"], json!(true));
        assert_eq!(executor.describe_events().await, vec!["lab (tuesday)"]);

        let removed = executor
            .fulfill("RemoveEvent", &params(&[("eventType", "lab")]))
            .await
            .unwrap();
        assert_eq!(removed["removed"], json!(1));
        assert!(executor.describe_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_without_type_fails() {
        let executor = ScheduleExecutor::new(Schedule::in_memory());
        let err = executor
            .fulfill("AddEvent", &params(&[("time", "monday")]))
            .await
            .unwrap_err();
        assert!(err.contains("eventType"));
    }

    #[tokio::test]
    async fn test_unknown_tag_is_noop() {
        let executor = ScheduleExecutor::new(Schedule::in_memory());
        let result = executor.fulfill("Positive", &Parameters::new()).await.unwrap();
        assert!(result.is_empty());
    }
}
