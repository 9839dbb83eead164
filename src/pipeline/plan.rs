//! 计划：规划阶段的结构化产出
//!
//! 由 submit_plan 工具调用的参数（JSON）解析而来，一次运行内不可变。

use serde::Deserialize;

use crate::core::PipelineError;
use crate::world::BlockPos;

/// 单个计划步骤
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Step {
    pub id: String,
    pub feature: String,
    pub details: String,
}

/// 建造计划
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Plan {
    #[serde(rename = "planTitle", alias = "title")]
    pub title: String,
    #[serde(rename = "origin", alias = "anchor")]
    pub anchor: BlockPos,
    pub steps: Vec<Step>,
}

impl Plan {
    /// 写入规划历史的摘要（assistant 条目）
    pub fn history_summary(&self, label: &str) -> String {
        let mut out = format!(
            "{}: \"{}\" at ({}, {}, {})",
            label, self.title, self.anchor.x, self.anchor.y, self.anchor.z
        );
        for step in &self.steps {
            out.push_str(&format!("\n- {}: {} - {}", step.id, step.feature, step.details));
        }
        out
    }

    /// 已完成步骤摘要："none" 或 "1. id: feature | 2. id: feature"
    pub fn completed_digest(&self, current: usize) -> String {
        if current == 0 {
            return "none".to_string();
        }
        self.steps
            .iter()
            .take(current)
            .enumerate()
            .map(|(i, s)| format!("{}. {}: {}", i + 1, s.id, s.feature))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// 逗号连接的特性名
    pub fn features(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.feature.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 解析计划 JSON；字段缺失或类型错误为 MalformedPlan，步骤为空为 EmptyPlan
pub fn parse_plan(raw: &str) -> Result<Plan, PipelineError> {
    let plan: Plan =
        serde_json::from_str(raw.trim()).map_err(|e| PipelineError::MalformedPlan(e.to_string()))?;
    if plan.steps.is_empty() {
        return Err(PipelineError::EmptyPlan);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUSE: &str = r#"{
        "planTitle": "Tiny house",
        "origin": {"x": 0, "y": 64, "z": 0},
        "steps": [
            {"id": "walls", "feature": "walls", "details": "3x3x3 oak walls"},
            {"id": "roof", "feature": "roof", "details": "slab roof"}
        ]
    }"#;

    #[test]
    fn test_parse_plan() {
        let plan = parse_plan(HOUSE).unwrap();
        assert_eq!(plan.title, "Tiny house");
        assert_eq!(plan.anchor, BlockPos::new(0, 64, 0));
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].id, "roof");
        assert_eq!(plan.features(), "walls, roof");
    }

    #[test]
    fn test_aliases_accepted() {
        let raw = r#"{"title":"t","anchor":{"x":1,"y":2,"z":3},"steps":[{"id":"a","feature":"f","details":"d"}]}"#;
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.anchor, BlockPos::new(1, 2, 3));
    }

    #[test]
    fn test_float_origin_accepted() {
        let raw = r#"{"planTitle":"t","origin":{"x":0.0,"y":64.0,"z":-12.0},"steps":[{"id":"a","feature":"f","details":"d"}]}"#;
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.anchor, BlockPos::new(0, 64, -12));

        let far = r#"{"planTitle":"t","origin":{"x":1e12,"y":64,"z":0},"steps":[{"id":"a","feature":"f","details":"d"}]}"#;
        assert!(matches!(parse_plan(far), Err(PipelineError::MalformedPlan(_))));
    }

    #[test]
    fn test_empty_steps_is_empty_plan() {
        let raw = r#"{"planTitle":"t","origin":{"x":0,"y":0,"z":0},"steps":[]}"#;
        assert!(matches!(parse_plan(raw), Err(PipelineError::EmptyPlan)));
    }

    #[test]
    fn test_malformed_plans() {
        let cases = [
            "not json",
            r#"{"origin":{"x":0,"y":0,"z":0},"steps":[]}"#,
            r#"{"planTitle":"t","origin":{"x":"zero","y":0,"z":0},"steps":[]}"#,
            r#"{"planTitle":"t","origin":{"x":0,"y":0,"z":0},"steps":[{"id":"a"}]}"#,
            r#"{"planTitle":"t","origin":{"x":0,"y":0,"z":0},"steps":{}}"#,
        ];
        for raw in cases {
            assert!(
                matches!(parse_plan(raw), Err(PipelineError::MalformedPlan(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_completed_digest() {
        let plan = parse_plan(HOUSE).unwrap();
        assert_eq!(plan.completed_digest(0), "none");
        assert_eq!(plan.completed_digest(1), "1. walls: walls");
        assert_eq!(plan.completed_digest(2), "1. walls: walls | 2. roof: roof");
    }

    #[test]
    fn test_history_summary() {
        let plan = parse_plan(HOUSE).unwrap();
        let summary = plan.history_summary("Plan");
        assert!(summary.starts_with("Plan: \"Tiny house\" at (0, 64, 0)"));
        assert!(summary.contains("\n- roof: roof - slab roof"));
    }
}
