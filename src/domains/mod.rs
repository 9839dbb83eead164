//! 具体领域：通用建造与红石电路
//!
//! 每个领域提供一个 `PipelineProfile`（文案、提示词、工具目录、工具桥、历史分域）。

pub mod build;
pub mod circuit;
pub mod ops;

use serde_json::{json, Value};

use crate::llm::ToolSpec;

/// `{x, y, z}` 整数坐标的 JSON Schema
pub(crate) fn position_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "properties": {
            "x": { "type": "integer", "description": "X coordinate (east/west)" },
            "y": { "type": "integer", "description": "Y coordinate (up/down)" },
            "z": { "type": "integer", "description": "Z coordinate (north/south)" }
        },
        "required": ["x", "y", "z"]
    })
}

/// 规划工具契约 submit_plan
pub(crate) fn submit_plan_tool(subject: &str, id_hint: &str) -> ToolSpec {
    ToolSpec::new(
        "submit_plan",
        format!(
            "Submit the {} plan. Call this exactly once with the complete plan.",
            subject
        ),
        json!({
            "type": "object",
            "properties": {
                "planTitle": { "type": "string", "description": format!("Short title for the {}", subject) },
                "origin": position_schema("Origin coordinates"),
                "steps": {
                    "type": "array",
                    "description": "Ordered list of steps to build",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "description": id_hint },
                            "feature": { "type": "string", "description": "What this step builds" },
                            "details": { "type": "string", "description": "Materials, dimensions, coordinates and block states for the executor" }
                        },
                        "required": ["id", "feature", "details"]
                    }
                }
            },
            "required": ["planTitle", "origin", "steps"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_plan_contract() {
        let tool = submit_plan_tool("circuit", "id");
        assert_eq!(tool.name, "submit_plan");
        let required = tool.parameters["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "planTitle"));
        assert_eq!(tool.parameters["properties"]["origin"]["required"][2], "z");
    }
}
