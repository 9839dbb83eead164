//! 流水线辅助函数：代码围栏剥离、工具参数解析、固定负载、文案模板

use serde_json::{Map, Value};

/// 工具派发超时时回灌给模型的负载
pub const TOOL_TIMEOUT_PAYLOAD: &str = r#"{"success":false,"message":"Tool execution timed out"}"#;

/// 规划文本回退的识别标记
pub const PLAN_MARKER: &str = "\"planTitle\"";

/// 去掉包裹整段文本的 ``` 代码围栏；不成对时原样返回
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }
    match (text.find('\n'), text.rfind("```")) {
        (Some(first_newline), Some(last_fence)) if last_fence > first_newline => {
            text[first_newline + 1..last_fence].trim()
        }
        _ => text,
    }
}

/// 解析工具参数：空白视为 `{}`；非法 JSON 或非对象返回错误描述
pub fn parse_tool_args(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Value::Object(map)),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(other) => Err(format!("Tool arguments must be a JSON object, got {}", other)),
        Err(e) => Err(format!("Invalid tool arguments: {}", e)),
    }
}

/// 失败负载
pub fn failure_payload(message: &str) -> String {
    serde_json::json!({ "success": false, "message": message }).to_string()
}

/// 用 `{name}` 占位符填充文案模板
pub fn fill(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        // 没有换行或没有闭合围栏时原样返回
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "```{\"a\":1}```");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "```json\n{\"a\":1}");
    }

    #[test]
    fn test_parse_tool_args() {
        assert_eq!(parse_tool_args("").unwrap(), serde_json::json!({}));
        assert_eq!(parse_tool_args("  \n").unwrap(), serde_json::json!({}));
        assert_eq!(parse_tool_args("{\"a\":1}").unwrap()["a"], 1);
        assert!(parse_tool_args("{not json").is_err());
        assert!(parse_tool_args("[1,2]").is_err());
    }

    #[test]
    fn test_timeout_payload_is_valid_json() {
        let v: Value = serde_json::from_str(TOOL_TIMEOUT_PAYLOAD).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["message"], "Tool execution timed out");
    }

    #[test]
    fn test_fill() {
        assert_eq!(
            fill(
                "Done! {steps} steps, {tools} commands in {secs}s.",
                &[("steps", "2".into()), ("tools", "5".into()), ("secs", "12".into())]
            ),
            "Done! 2 steps, 5 commands in 12s."
        );
    }
}
