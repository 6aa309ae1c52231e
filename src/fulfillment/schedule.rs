//! 日程存储
//!
//! 事件按开始时间排序；已经开始的事件在加载与每次修改时清除。
//! 单文件 JSON 持久化，父目录不存在时自动创建。

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::Parameters;

/// 分类器输出的时间格式（如 2017-07-30T00:00:00.000Z）
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Schedule IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schedule file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),
}

/// 单个事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    /// 用户给出的时间文本
    pub when: String,
    /// 无法解析的时间（如 "tomorrow"）为 None，视为未定日期
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Parameters,
}

impl Event {
    /// 由意图参数构建：eventType 必需，time 可为字符串或 {from, to}
    pub fn from_parameters(params: &Parameters) -> Result<Self, ScheduleError> {
        let event_type = params
            .get("eventType")
            .and_then(Value::as_str)
            .ok_or_else(|| ScheduleError::MissingParameter("eventType".to_string()))?;

        let window = params.get("time").map(parse_time).unwrap_or_default();
        let details = params
            .iter()
            .filter(|(k, _)| k.as_str() != "eventType" && k.as_str() != "time")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            when: window.text,
            from: window.from,
            to: window.to,
            details,
        })
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.from.is_some_and(|from| from <= now)
    }

    pub fn set_time(&mut self, time: &Value) {
        let window = parse_time(time);
        self.when = window.text;
        self.from = window.from;
        self.to = window.to;
    }

    pub fn describe(&self) -> String {
        if self.when.is_empty() {
            self.event_type.clone()
        } else {
            format!("{} ({})", self.event_type, self.when)
        }
    }
}

/// remove_matching 的结果：多于一个匹配时不删除
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub matched: usize,
    pub removed: Option<Event>,
}

#[derive(Debug, Default)]
pub struct Schedule {
    events: Vec<Event>,
    path: Option<PathBuf>,
    last_added: Option<String>,
}

impl Schedule {
    /// 不落盘的日程
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 打开日程文件（不存在时为空），清除过期事件后回写
    pub fn open(path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<Self, ScheduleError> {
        let path = path.as_ref().to_path_buf();
        let events: Vec<Event> = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };

        let mut schedule = Self {
            events,
            path: Some(path),
            last_added: None,
        };
        schedule.sort();
        let cleaned = schedule.clean(now);
        schedule.save()?;
        tracing::info!(
            "Opened schedule with {} events ({} past events dropped)",
            schedule.events.len(),
            cleaned
        );
        Ok(schedule)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn last_added(&self) -> Option<&Event> {
        let id = self.last_added.as_deref()?;
        self.events.iter().find(|e| e.id == id)
    }

    pub fn add(&mut self, event: Event, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        self.last_added = Some(event.id.clone());
        self.events.push(event);
        self.sort();
        self.clean(now);
        self.save()
    }

    /// 按 eventType / time 过滤（未给出的条件不限制）
    ///
    /// time 为单个日期或 {from, to} 时按时间窗口匹配：事件须完全落在窗口内。
    /// 无法解析的时间（如 "friday"）只与文本完全相同的事件匹配。
    pub fn find(&self, filters: &Parameters) -> Vec<&Event> {
        let event_type = filters.get("eventType").and_then(Value::as_str);
        let window = filters.get("time").map(parse_time);
        self.events
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| window.as_ref().map_or(true, |w| w.contains(e)))
            .collect()
    }

    /// 只有恰好一个匹配时才删除
    pub fn remove_matching(
        &mut self,
        filters: &Parameters,
        now: DateTime<Utc>,
    ) -> Result<RemoveOutcome, ScheduleError> {
        self.clean(now);
        let matches: Vec<String> = self.find(filters).iter().map(|e| e.id.clone()).collect();
        let removed = match matches.as_slice() {
            [id] => {
                let index = self.events.iter().position(|e| &e.id == id);
                index.map(|i| self.events.remove(i))
            }
            _ => None,
        };
        if removed.is_some() {
            self.save()?;
        }
        Ok(RemoveOutcome {
            matched: matches.len(),
            removed,
        })
    }

    /// 修改最近添加的事件的时间
    pub fn reschedule_last(
        &mut self,
        time: &Value,
        now: DateTime<Utc>,
    ) -> Result<Option<Event>, ScheduleError> {
        let Some(id) = self.last_added.clone() else {
            return Ok(None);
        };
        let Some(event) = self.events.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        event.set_time(time);
        let updated = event.clone();

        self.sort();
        self.clean(now);
        self.save()?;
        Ok(Some(updated))
    }

    /// 删除已经开始的事件，返回删除数量
    pub fn clean(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|e| !e.is_past(now));
        before - self.events.len()
    }

    pub fn clear(&mut self) -> Result<(), ScheduleError> {
        self.events.clear();
        self.last_added = None;
        self.save()
    }

    fn sort(&mut self) {
        self.events.sort_by(|a, b| match (a.from, b.from) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }

    fn save(&self) -> Result<(), ScheduleError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.events)?)?;
        Ok(())
    }
}

/// 解析后的时间参数
#[derive(Debug, Default)]
struct TimeWindow {
    text: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    fn contains(&self, event: &Event) -> bool {
        match (self.from, self.to, event.from, event.to) {
            (Some(start), Some(end), Some(from), Some(to)) => from >= start && to <= end,
            (Some(_), Some(_), _, _) => false,
            _ => event.when == self.text,
        }
    }
}

fn parse_time(value: &Value) -> TimeWindow {
    match value {
        Value::String(s) => {
            let from = parse_instant(s);
            TimeWindow {
                text: s.clone(),
                from,
                to: from.and_then(end_of_day),
            }
        }
        Value::Object(range) => {
            let from_text = range.get("from").and_then(Value::as_str).unwrap_or_default();
            let to_text = range.get("to").and_then(Value::as_str).unwrap_or_default();
            let from = parse_instant(from_text);
            TimeWindow {
                text: format!("{from_text} - {to_text}"),
                from,
                to: parse_instant(to_text).or(from),
            }
        }
        other => TimeWindow {
            text: other.to_string(),
            ..TimeWindow::default()
        },
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIME_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn end_of_day(from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    from.date_naive()
        .and_hms_opt(23, 59, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn event(kind: &str, time: Value) -> Event {
        Event::from_parameters(&params(&[("eventType", json!(kind)), ("time", time)])).unwrap()
    }

    #[test]
    fn test_parse_formats() {
        let e = event("exam", json!("2030-01-02T10:00:00.000Z"));
        assert_eq!(e.from.unwrap().to_rfc3339(), "2030-01-02T10:00:00+00:00");
        assert_eq!(e.to.unwrap().to_rfc3339(), "2030-01-02T23:59:00+00:00");

        let e = event("lab", json!({"from": "2030-01-02", "to": "2030-01-03"}));
        assert!(e.from.unwrap() < e.to.unwrap());

        let e = event("lab", json!("tomorrow"));
        assert!(e.from.is_none());
        assert_eq!(e.describe(), "lab (tomorrow)");
    }

    #[test]
    fn test_event_requires_type() {
        assert!(matches!(
            Event::from_parameters(&params(&[("time", json!("today"))])),
            Err(ScheduleError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_sorted_and_cleaned() {
        let now = Utc::now();
        let mut schedule = Schedule::in_memory();
        schedule.add(event("undated", json!("someday")), now).unwrap();
        schedule.add(event("late", json!("2031-01-01")), now).unwrap();
        schedule.add(event("early", json!("2030-01-01")), now).unwrap();
        schedule.add(event("past", json!("2001-01-01")), now).unwrap();

        let order: Vec<&str> = schedule.events().iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(order, vec!["early", "late", "undated"]);
        assert_eq!(schedule.clean(now + Duration::days(365 * 100)), 2);
    }

    #[test]
    fn test_remove_requires_single_match() {
        let now = Utc::now();
        let mut schedule = Schedule::in_memory();
        schedule.add(event("exam", json!("monday")), now).unwrap();
        schedule.add(event("exam", json!("friday")), now).unwrap();
        schedule.add(event("lab", json!("friday")), now).unwrap();

        let outcome = schedule
            .remove_matching(&params(&[("eventType", json!("exam"))]), now)
            .unwrap();
        assert_eq!(outcome.matched, 2);
        assert!(outcome.removed.is_none());

        let outcome = schedule
            .remove_matching(&params(&[("eventType", json!("lab"))]), now)
            .unwrap();
        assert_eq!(outcome.removed.unwrap().event_type, "lab");
        assert_eq!(schedule.events().len(), 2);
    }

    #[test]
    fn test_find_by_single_day() {
        let now = Utc::now();
        let mut schedule = Schedule::in_memory();
        schedule.add(event("exam", json!("2030-01-02T10:00:00.000Z")), now).unwrap();
        schedule.add(event("lab", json!("2030-01-03T09:00:00.000Z")), now).unwrap();

        let found = schedule.find(&params(&[("time", json!("2030-01-02"))]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_type, "exam");
    }

    #[test]
    fn test_find_by_range() {
        let now = Utc::now();
        let mut schedule = Schedule::in_memory();
        schedule.add(event("exam", json!("2030-01-02T10:00:00.000Z")), now).unwrap();
        schedule.add(event("later", json!("friday")), now).unwrap();

        let january = json!({"from": "2030-01-01", "to": "2030-01-31"});
        let found = schedule.find(&params(&[("time", january)]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_type, "exam");

        let next_year = json!({"from": "2031-01-01", "to": "2031-01-31"});
        assert!(schedule.find(&params(&[("time", next_year)])).is_empty());
    }

    #[test]
    fn test_find_undated_by_text() {
        let now = Utc::now();
        let mut schedule = Schedule::in_memory();
        schedule.add(event("exam", json!("friday")), now).unwrap();
        schedule.add(event("lab", json!("monday")), now).unwrap();

        let found = schedule.find(&params(&[("time", json!("friday"))]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_type, "exam");
    }

    #[test]
    fn test_reschedule_last() {
        let now = Utc::now();
        let mut schedule = Schedule::in_memory();
        assert!(schedule.reschedule_last(&json!("friday"), now).unwrap().is_none());

        schedule.add(event("exam", json!("monday")), now).unwrap();
        let moved = schedule.reschedule_last(&json!("friday"), now).unwrap().unwrap();
        assert_eq!(moved.when, "friday");
        assert_eq!(schedule.last_added().unwrap().when, "friday");
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("schedule.json");
        let now = Utc::now();

        let mut schedule = Schedule::open(&path, now).unwrap();
        schedule.add(event("exam", json!("2030-05-01")), now).unwrap();
        schedule.add(event("old", json!("2000-05-01")), now).unwrap();

        let reopened = Schedule::open(&path, now).unwrap();
        assert_eq!(reopened.events().len(), 1);
        assert_eq!(reopened.events()[0].event_type, "exam");
    }
}
