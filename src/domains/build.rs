//! 通用建造领域：Profile、工具目录与工具桥
//!
//! 支持参考图输入；规划器未调用工具时允许从文本回退解析计划。

use std::sync::Arc;

use serde_json::{json, Value};

use crate::domains::ops;
use crate::domains::{position_schema, submit_plan_tool};
use crate::llm::ToolSpec;
use crate::pipeline::bridge::{
    arg_bool, arg_i64, arg_pos, arg_str, require_pos, require_str, ToolBridge, ToolOutcome,
};
use crate::pipeline::{HistoryKey, PipelineProfile, ProfileStrings, PromptSet};
use crate::session::{ActorId, Session};
use crate::world::WorldContext;

pub const BUILD_HISTORY: HistoryKey = HistoryKey("build");

pub fn strings() -> ProfileStrings {
    ProfileStrings {
        log_label: "[build]",
        planning_started: "Planning your build...",
        planning_complete: "Planning complete: {steps} features to build.",
        completion: "Build complete! {steps} steps, {tools} commands in {secs}s.",
        review: "Fly around to review your build.",
        review_hint: "Type /confirm to accept, /cancel to discard.",
        done_log: "{tools} commands across {steps} features in {secs}s",
        cancelled: "Build cancelled by player",
        request_label: "Build request",
        origin_label: "Build origin",
        completed_steps_label: "All completed steps",
        current_step_label: "Current step",
        units_label: "features",
        built_label: "Features built",
        history_label: "Plan",
        image_analysis: Some("Analyzing reference image..."),
    }
}

pub fn prompts() -> PromptSet {
    PromptSet {
        spatial: "build/spatial",
        planner: "build/planner",
        executor: "build/executor",
        finalizer: "build/finalizer",
        planner_image: Some("build/planner-image"),
        image: Some("build/image"),
    }
}

/// 执行器工具目录
pub fn executor_tools() -> Vec<ToolSpec> {
    let region = |description: &str, pattern_desc: &str| {
        json!({
            "type": "object",
            "properties": {
                "pos1": position_schema("First corner"),
                "pos2": position_schema("Opposite corner"),
                "pattern": { "type": "string", "description": pattern_desc }
            },
            "required": ["pos1", "pos2", "pattern"],
            "description": description
        })
    };

    vec![
        ToolSpec::new(
            "set",
            "Set all blocks within a cuboid region to a pattern. Replaces EVERY block including air.",
            region("Cuboid fill", "Block pattern to fill with"),
        ),
        ToolSpec::new(
            "we_replace",
            "Replace blocks matching a mask with a new pattern within a cuboid region.",
            json!({
                "type": "object",
                "properties": {
                    "pos1": position_schema("First corner"),
                    "pos2": position_schema("Opposite corner"),
                    "from": { "type": "string", "description": "Mask of blocks to replace (omit to replace all non-air)" },
                    "to": { "type": "string", "description": "Pattern to replace with" }
                },
                "required": ["pos1", "pos2", "to"]
            }),
        ),
        ToolSpec::new(
            "we_walls",
            "Build the four vertical sides (walls) of a cuboid selection. No ceiling or floor.",
            region("Walls", "Block pattern for walls"),
        ),
        ToolSpec::new(
            "we_faces",
            "Build all 6 faces of a cuboid selection (hollow box). Interior not modified.",
            region("Faces", "Block pattern for faces"),
        ),
        ToolSpec::new(
            "we_cyl",
            "Generate a filled cylinder. For a flat circle, set height to 1.",
            json!({
                "type": "object",
                "properties": {
                    "center": position_schema("Center base point"),
                    "pattern": { "type": "string", "description": "Block pattern" },
                    "radiusNS": { "type": "number", "description": "Radius north/south" },
                    "radiusEW": { "type": "number", "description": "Radius east/west (default same as radiusNS)" },
                    "height": { "type": "integer", "description": "Height in blocks (default 1)" },
                    "hollow": { "type": "boolean", "description": "If true, hollow cylinder" }
                },
                "required": ["center", "pattern", "radiusNS"]
            }),
        ),
        ToolSpec::new(
            "we_sphere",
            "Generate a filled sphere. Can create ellipsoids with different radii.",
            json!({
                "type": "object",
                "properties": {
                    "center": position_schema("Center point"),
                    "pattern": { "type": "string", "description": "Block pattern" },
                    "radiusNS": { "type": "number", "description": "Radius north/south" },
                    "radiusUD": { "type": "number", "description": "Radius up/down (default same)" },
                    "radiusEW": { "type": "number", "description": "Radius east/west (default same)" },
                    "hollow": { "type": "boolean", "description": "If true, hollow sphere" }
                },
                "required": ["center", "pattern", "radiusNS"]
            }),
        ),
        ToolSpec::new(
            "place_sign",
            "Place a sign with custom text. Use this instead of set for signs.",
            json!({
                "type": "object",
                "properties": {
                    "position": position_schema("Position to place the sign"),
                    "signType": { "type": "string", "enum": ["oak", "spruce", "birch", "jungle", "acacia", "dark_oak", "cherry", "mangrove", "bamboo", "crimson", "warped"] },
                    "wallMounted": { "type": "boolean", "description": "true = wall sign, false = standing sign" },
                    "facing": { "type": "string", "enum": ["north", "south", "east", "west"] },
                    "frontLines": { "type": "array", "items": { "type": "string" }, "description": "Up to 4 lines of front text" }
                },
                "required": ["position", "signType", "wallMounted", "facing", "frontLines"]
            }),
        ),
    ]
}

/// 构造通用建造 Profile
pub fn profile(max_tokens: u32) -> PipelineProfile {
    PipelineProfile {
        strings: strings(),
        prompts: prompts(),
        max_tokens,
        planner_tool: submit_plan_tool("build", "Short kebab-case id like 'foundation' or 'roof'"),
        executor_tools: executor_tools(),
        bridge: Arc::new(BuildBridge),
        history_key: BUILD_HISTORY,
        allow_text_fallback: true,
    }
}

/// 通用建造工具桥
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildBridge;

impl BuildBridge {
    fn dispatch(&self, ctx: &mut WorldContext, tool: &str, args: &Value) -> Result<String, String> {
        let host = ctx.host_mut();
        match tool {
            "set" => {
                let (a, b) = (require_pos(args, "pos1")?, require_pos(args, "pos2")?);
                let block = ops::pattern_block(require_str(args, "pattern")?);
                let n = ops::fill_box(host, a, b, &block)?;
                Ok(format!("Set {} blocks to {}", n, block))
            }
            "we_replace" => {
                let (a, b) = (require_pos(args, "pos1")?, require_pos(args, "pos2")?);
                let to = ops::pattern_block(require_str(args, "to")?);
                let from = arg_str(args, "from").filter(|s| !s.trim().is_empty());
                let n = ops::replace_box(host, a, b, from, &to)?;
                Ok(format!("Replaced {} blocks with {}", n, to))
            }
            "we_walls" => {
                let (a, b) = (require_pos(args, "pos1")?, require_pos(args, "pos2")?);
                let block = ops::pattern_block(require_str(args, "pattern")?);
                let n = ops::walls(host, a, b, &block)?;
                Ok(format!("Built walls: {} blocks", n))
            }
            "we_faces" => {
                let (a, b) = (require_pos(args, "pos1")?, require_pos(args, "pos2")?);
                let block = ops::pattern_block(require_str(args, "pattern")?);
                let n = ops::faces(host, a, b, &block)?;
                Ok(format!("Built faces: {} blocks", n))
            }
            "we_cyl" => {
                let center = require_pos(args, "center")?;
                let block = ops::pattern_block(require_str(args, "pattern")?);
                let ns = radius(args, "radiusNS").ok_or("Missing 'radiusNS'")?;
                let ew = radius(args, "radiusEW").unwrap_or(ns);
                let height = arg_i32(args, "height")?.unwrap_or(1);
                let hollow = arg_bool(args, "hollow").unwrap_or(false);
                let n = ops::cylinder(host, center, ns, ew, height, hollow, &block)?;
                Ok(format!("Generated cylinder: {} blocks", n))
            }
            "we_sphere" => {
                let center = require_pos(args, "center")?;
                let block = ops::pattern_block(require_str(args, "pattern")?);
                let ns = radius(args, "radiusNS").ok_or("Missing 'radiusNS'")?;
                let ud = radius(args, "radiusUD").unwrap_or(ns);
                let ew = radius(args, "radiusEW").unwrap_or(ns);
                let hollow = arg_bool(args, "hollow").unwrap_or(false);
                let n = ops::sphere(host, center, (ew, ud, ns), hollow, &block)?;
                Ok(format!("Generated sphere: {} blocks", n))
            }
            "place_sign" => {
                let position = require_pos(args, "position")?;
                let wood = arg_str(args, "signType").unwrap_or("oak");
                let wall = arg_bool(args, "wallMounted").unwrap_or(false);
                let facing = arg_str(args, "facing").unwrap_or("north");
                if ops::horizontal_step(facing).is_none() {
                    return Err(format!("Invalid facing: {}", facing));
                }
                let lines = args
                    .get("frontLines")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).take(4).collect::<Vec<_>>())
                    .unwrap_or_default();
                let kind = if wall { "wall_sign" } else { "sign" };
                host.set_block(
                    position,
                    &format!("{}_{}[facing={}]", wood, kind, facing.to_ascii_lowercase()),
                );
                Ok(format!("Placed sign at {} with {} lines", position, lines.len()))
            }
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}

/// 可选的 i32 参数；超出范围是工具错误
fn arg_i32(args: &Value, key: &str) -> Result<Option<i32>, String> {
    arg_i64(args, key)
        .map(|v| i32::try_from(v).map_err(|_| format!("'{}' out of range: {}", key, v)))
        .transpose()
}

fn radius(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

/// 通用建造的包围盒规则：pos1+pos2 立方体；center 按 radiusNS / height 取圆柱外接盒；position 单格
pub(crate) fn expand_build_bounds(ctx: &WorldContext, session: &Session, args: &Value) {
    let mut state = session.world(ctx);

    if let (Some(a), Some(b)) = (arg_pos(args, "pos1"), arg_pos(args, "pos2")) {
        state.expand_bounds(a, b);
    }

    if let Some(center) = arg_pos(args, "center") {
        let r = arg_i32(args, "radiusNS").ok().flatten().unwrap_or(0);
        let h = arg_i32(args, "height").ok().flatten().unwrap_or(1);
        let corners = r
            .checked_neg()
            .and_then(|neg| Some((center.offset(neg, 0, neg)?, center.offset(r, h, r)?)));
        if let Some((a, b)) = corners {
            state.expand_bounds(a, b);
        }
    }

    if let Some(position) = arg_pos(args, "position") {
        state.expand_bounds(position, position);
    }
}

impl ToolBridge for BuildBridge {
    fn execute(
        &self,
        ctx: &mut WorldContext,
        _actor: &ActorId,
        _session: &Session,
        tool: &str,
        args: &Value,
    ) -> ToolOutcome {
        self.dispatch(ctx, tool, args).into()
    }

    fn update_bounds(&self, ctx: &WorldContext, session: &Session, _tool: &str, args: &Value) {
        expand_build_bounds(ctx, session, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{BlockPos, MemoryWorld};

    fn context() -> (MemoryWorld, WorldContext) {
        let world = MemoryWorld::new();
        let ctx = WorldContext::new(Box::new(world.clone()), Box::new(world.clone()));
        (world, ctx)
    }

    #[test]
    fn test_set_fills_region_and_bounds() {
        let (world, mut ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let args = json!({
            "pos1": {"x": 0, "y": 64, "z": 0},
            "pos2": {"x": 2, "y": 66, "z": 2},
            "pattern": "minecraft:oak_planks"
        });

        let outcome = BuildBridge.execute(&mut ctx, session.actor(), &session, "set", &args);
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(world.block_count(), 27);

        BuildBridge.update_bounds(&ctx, &session, "set", &args);
        let bounds = session.world(&ctx).bounds.unwrap();
        assert_eq!(bounds.min, BlockPos::new(0, 64, 0));
        assert_eq!(bounds.max, BlockPos::new(2, 66, 2));
    }

    #[test]
    fn test_cylinder_bounds_use_radius_and_height() {
        let (_world, ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let args = json!({"center": {"x": 10, "y": 64, "z": 10}, "radiusNS": 3, "height": 5, "pattern": "stone"});
        BuildBridge.update_bounds(&ctx, &session, "we_cyl", &args);
        let bounds = session.world(&ctx).bounds.unwrap();
        assert_eq!(bounds.min, BlockPos::new(7, 64, 7));
        assert_eq!(bounds.max, BlockPos::new(13, 69, 13));
    }

    #[test]
    fn test_missing_args_fail_without_changes() {
        let (world, mut ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let outcome = BuildBridge.execute(
            &mut ctx,
            session.actor(),
            &session,
            "set",
            &json!({"pos1": {"x": 0, "y": 0, "z": 0}}),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Missing or invalid 'pos2'");
        assert_eq!(world.block_count(), 0);
    }

    #[test]
    fn test_out_of_range_height_is_a_tool_failure() {
        let (world, mut ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let args = json!({
            "center": {"x": 0, "y": 64, "z": 0},
            "radiusNS": 2,
            "height": 4294967297i64,
            "pattern": "stone"
        });
        let outcome = BuildBridge.execute(&mut ctx, session.actor(), &session, "we_cyl", &args);
        assert!(!outcome.success);
        assert_eq!(outcome.message, "'height' out of range: 4294967297");
        assert_eq!(world.block_count(), 0);

        BuildBridge.update_bounds(&ctx, &session, "we_cyl", &args);
        let bounds = session.world(&ctx).bounds.unwrap();
        assert_eq!(bounds.max, BlockPos::new(2, 65, 2));
    }

    #[test]
    fn test_float_coordinates_are_accepted() {
        let (world, mut ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let args = json!({
            "pos1": {"x": 0.0, "y": 64.0, "z": 0.0},
            "pos2": {"x": 1.0, "y": 64.0, "z": 1.0},
            "pattern": "stone"
        });
        let outcome = BuildBridge.execute(&mut ctx, session.actor(), &session, "set", &args);
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(world.block_count(), 4);
    }

    #[test]
    fn test_far_corners_fail_without_panicking() {
        let (world, mut ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let args = json!({
            "pos1": {"x": -2000000000, "y": 64, "z": 0},
            "pos2": {"x": 2000000000, "y": 64, "z": 0},
            "pattern": "stone"
        });
        let outcome = BuildBridge.execute(&mut ctx, session.actor(), &session, "set", &args);
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Region too large"));
        assert_eq!(world.block_count(), 0);
    }

    #[test]
    fn test_unknown_tool() {
        let (_world, mut ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let outcome = BuildBridge.execute(&mut ctx, session.actor(), &session, "we_nuke", &json!({}));
        assert!(!outcome.success);
        assert!(outcome.message.contains("we_nuke"));
    }

    #[test]
    fn test_no_positional_args_leaves_bounds_untouched() {
        let (_world, ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        BuildBridge.update_bounds(&ctx, &session, "set", &json!({"pattern": "stone"}));
        assert!(session.world(&ctx).bounds.is_none());
    }

    #[test]
    fn test_sign_placement() {
        let (world, mut ctx) = context();
        let session = Session::new(ActorId::new("alex"));
        let args = json!({
            "position": {"x": 1, "y": 65, "z": 0},
            "signType": "spruce",
            "wallMounted": true,
            "facing": "south",
            "frontLines": ["Welcome"]
        });
        let outcome = BuildBridge.execute(&mut ctx, session.actor(), &session, "place_sign", &args);
        assert!(outcome.success);
        assert_eq!(
            world.block(BlockPos::new(1, 65, 0)).as_deref(),
            Some("spruce_wall_sign[facing=south]")
        );
    }
}
