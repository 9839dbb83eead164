//! 工具桥：把一次具名工具调用落到世界上
//!
//! 只在世界线程上调用。`execute` 执行改动或查询；`update_bounds` 在成功的改动后按位置参数扩展会话包围盒。

use serde::Serialize;
use serde_json::Value;

use crate::session::{ActorId, Session};
use crate::world::{BlockPos, WorldContext};

/// 单次工具执行结果，序列化后作为 tool 结果回灌给模型
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
    /// 查询类工具的结构化结果
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// JSON 负载文本
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            serde_json::json!({ "success": self.success, "message": self.message }).to_string()
        })
    }
}

impl From<Result<String, String>> for ToolOutcome {
    fn from(result: Result<String, String>) -> Self {
        match result {
            Ok(message) => ToolOutcome::ok(message),
            Err(message) => ToolOutcome::failed(message),
        }
    }
}

/// 工具桥
pub trait ToolBridge: Send + Sync {
    fn execute(
        &self,
        ctx: &mut WorldContext,
        actor: &ActorId,
        session: &Session,
        tool: &str,
        args: &Value,
    ) -> ToolOutcome;

    /// 按位置参数扩展包围盒；只读工具或无位置参数时不做任何事
    fn update_bounds(&self, ctx: &WorldContext, session: &Session, tool: &str, args: &Value);
}

// ---- 参数读取 ----

/// 读取 `{x, y, z}` 形式的坐标参数
pub fn arg_pos(args: &Value, key: &str) -> Option<BlockPos> {
    args.get(key)
        .and_then(|v| serde_json::from_value::<BlockPos>(v.clone()).ok())
}

pub fn require_pos(args: &Value, key: &str) -> Result<BlockPos, String> {
    arg_pos(args, key).ok_or_else(|| format!("Missing or invalid '{}'", key))
}

pub fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    arg_str(args, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("Missing '{}'", key))
}

/// 整数参数；接受 JSON 数字（含小数，向零取整）
pub fn arg_i64(args: &Value, key: &str) -> Option<i64> {
    let v = args.get(key)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

pub fn arg_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_payload_shape() {
        assert_eq!(
            ToolOutcome::failed("boom").to_payload(),
            r#"{"success":false,"message":"boom"}"#
        );
        let with_data = ToolOutcome::ok_with_data("read", json!({"isAir": true}));
        let v: Value = serde_json::from_str(&with_data.to_payload()).unwrap();
        assert_eq!(v["data"]["isAir"], true);
    }

    #[test]
    fn test_arg_readers() {
        let args = json!({
            "pos1": {"x": 1, "y": 2, "z": 3},
            "bad": {"x": "one"},
            "radius": 2.7,
            "pattern": "stone",
            "hollow": true
        });
        assert_eq!(arg_pos(&args, "pos1"), Some(BlockPos::new(1, 2, 3)));
        assert!(arg_pos(&args, "bad").is_none());
        assert!(require_pos(&args, "pos2").is_err());
        assert_eq!(arg_i64(&args, "radius"), Some(2));
        assert_eq!(require_str(&args, "pattern"), Ok("stone"));
        assert_eq!(arg_bool(&args, "hollow"), Some(true));
    }
}
