//! 回复组装：随机选模板并替换 $参数
//!
//! 模板中的占位符为 `$` 加标识符（字母、数字、`_`、`-`），句末的 `.` 只是标点。
//! 占位符在参数表中找不到属于配置缺陷，直接报错，不留空也不保留原样。

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use crate::core::Parameters;

const MARKER: char = '$';

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Template list is empty")]
    NoTemplates,

    #[error("Template '{template}' references unknown parameter '{parameter}'")]
    UnknownParameter { template: String, parameter: String },
}

/// 从模板列表中均匀随机选一条并填充参数
pub fn render(templates: &[String], known: &Parameters) -> Result<String, ComposeError> {
    render_with(&mut rand::thread_rng(), templates, known)
}

/// 同 render，随机源由调用方提供（测试用固定种子）
pub fn render_with<R: Rng + ?Sized>(
    rng: &mut R,
    templates: &[String],
    known: &Parameters,
) -> Result<String, ComposeError> {
    let template = templates.choose(rng).ok_or(ComposeError::NoTemplates)?;
    fill(template, known)
}

/// 替换模板中的全部占位符
pub fn fill(template: &str, known: &Parameters) -> Result<String, ComposeError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(MARKER) {
        out.push_str(&rest[..start]);
        let after = &rest[start + MARKER.len_utf8()..];
        let len = identifier_len(after);
        if len == 0 {
            out.push(MARKER);
            rest = after;
            continue;
        }

        let name = &after[..len];
        let value = known.get(name).ok_or_else(|| ComposeError::UnknownParameter {
            template: template.to_string(),
            parameter: name.to_string(),
        })?;
        out.push_str(&value_text(value));
        rest = &after[len..];
    }
    out.push_str(rest);
    Ok(out)
}

/// 模板引用的参数名（按出现顺序）
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(MARKER) {
        let after = &rest[start + MARKER.len_utf8()..];
        let len = identifier_len(after);
        if len > 0 {
            found.push(&after[..len]);
        }
        rest = &after[len..];
    }
    found
}

fn identifier_len(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        .map_or(s.len(), |(i, _)| i)
}

/// 参数值的文本形式：字符串原样，列表以 ", " 连接，其余用 JSON 文本
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::HashSet;

    fn known(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fill_strips_trailing_period() {
        let params = known(&[("eventType", json!("exam")), ("time", json!("tomorrow"))]);
        let text = fill("Added $eventType for $time.", &params).unwrap();
        assert_eq!(text, "Added exam for tomorrow.");
    }

    #[test]
    fn test_fill_hyphenated_names() {
        let params = known(&[("last-intent", json!("AddEvent"))]);
        assert_eq!(
            fill("Last given intent was $last-intent.", &params).unwrap(),
            "Last given intent was AddEvent."
        );
    }

    #[test]
    fn test_prefix_names_do_not_collide() {
        let params = known(&[("time", json!("9am")), ("timezone", json!("UTC"))]);
        assert_eq!(fill("$time $timezone", &params).unwrap(), "9am UTC");
    }

    #[test]
    fn test_unknown_parameter_fails_loudly() {
        let err = fill("When is the $eventType?", &Parameters::new()).unwrap_err();
        match err {
            ComposeError::UnknownParameter { parameter, .. } => assert_eq!(parameter, "eventType"),
            other => panic!("Expected UnknownParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_non_string_values() {
        let params = known(&[
            ("count", json!(2)),
            ("people", json!(["Ann", "Bo"])),
        ]);
        assert_eq!(fill("$count with $people", &params).unwrap(), "2 with Ann, Bo");
    }

    #[test]
    fn test_name_stops_at_non_ascii() {
        let params = known(&[("eventType", json!("exam"))]);
        assert_eq!(fill("$eventType在明天", &params).unwrap(), "exam在明天");
        assert_eq!(placeholders("提醒$eventType。"), vec!["eventType"]);
    }

    #[test]
    fn test_lone_marker_kept() {
        assert_eq!(fill("costs 5 $", &Parameters::new()).unwrap(), "costs 5 $");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("Moved the $context-eventType to $time."),
            vec!["context-eventType", "time"]
        );
    }

    #[test]
    fn test_empty_template_list() {
        assert!(matches!(
            render(&[], &Parameters::new()),
            Err(ComposeError::NoTemplates)
        ));
    }

    #[test]
    fn test_render_covers_all_templates() {
        let templates: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let mut rng = StdRng::seed_from_u64(7);
        let seen: HashSet<String> = (0..200)
            .map(|_| render_with(&mut rng, &templates, &Parameters::new()).unwrap())
            .collect();
        assert_eq!(seen.len(), 3);
    }
}
