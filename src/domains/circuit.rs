//! 红石电路领域：Profile、红石工具目录与工具桥
//!
//! 不支持参考图；规划器必须通过 submit_plan 提交计划。
//! `set` / `we_replace` 与通用建造共用实现和包围盒规则。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::domains::build::{expand_build_bounds, BuildBridge};
use crate::domains::ops;
use crate::domains::{position_schema, submit_plan_tool};
use crate::llm::ToolSpec;
use crate::pipeline::bridge::{
    arg_i64, arg_pos, arg_str, require_pos, require_str, ToolBridge, ToolOutcome,
};
use crate::pipeline::{HistoryKey, PipelineProfile, ProfileStrings, PromptSet};
use crate::session::{ActorId, Session};
use crate::world::{BlockPos, WorldContext, WorldHost};

pub const CIRCUIT_HISTORY: HistoryKey = HistoryKey("circuit");

/// 与通用建造共用的工具
const SHARED_TOOLS: &[&str] = &["set", "we_replace"];
/// 只读工具不影响包围盒
const READ_ONLY_TOOLS: &[&str] = &["read_block", "read_region"];

const MAX_SPACING: i64 = 14;
const DEFAULT_REGION_LIMIT: i64 = 1000;
const MAX_REGION_LIMIT: i64 = 5000;

const COMPONENTS: &[&str] = &[
    "redstone_wire",
    "redstone_torch",
    "redstone_wall_torch",
    "repeater",
    "comparator",
    "piston",
    "sticky_piston",
    "observer",
    "dropper",
    "dispenser",
    "hopper",
    "lever",
    "stone_button",
    "oak_button",
    "redstone_lamp",
    "target",
    "daylight_detector",
    "tripwire_hook",
    "trapped_chest",
    "note_block",
    "tnt",
    "redstone_block",
    "slime_block",
    "honey_block",
];

pub fn strings() -> ProfileStrings {
    ProfileStrings {
        log_label: "[circuit]",
        planning_started: "Planning your redstone circuit...",
        planning_complete: "Circuit planned: {steps} subsystems to build.",
        completion: "Circuit complete! {steps} subsystems, {tools} commands in {secs}s.",
        review: "Fly around to review your circuit.",
        review_hint: "Type /confirm to accept, /cancel to discard.",
        done_log: "{tools} commands across {steps} subsystems in {secs}s",
        cancelled: "Circuit build cancelled by player",
        request_label: "Circuit request",
        origin_label: "Circuit origin",
        completed_steps_label: "All completed subsystems",
        current_step_label: "Current subsystem",
        units_label: "subsystems",
        built_label: "Subsystems built",
        history_label: "Circuit plan",
        image_analysis: None,
    }
}

pub fn prompts() -> PromptSet {
    PromptSet {
        spatial: "circuit/spatial",
        planner: "circuit/planner",
        executor: "circuit/executor",
        finalizer: "circuit/finalizer",
        planner_image: None,
        image: None,
    }
}

/// 执行器工具目录：共用的 set / we_replace 加红石专用工具
pub fn executor_tools() -> Vec<ToolSpec> {
    let mut tools: Vec<ToolSpec> = crate::domains::build::executor_tools()
        .into_iter()
        .filter(|t| SHARED_TOOLS.contains(&t.name.as_str()))
        .collect();

    tools.extend([
        ToolSpec::new(
            "place_redstone_component",
            "Place a single redstone component with an optional explicit block state.",
            json!({
                "type": "object",
                "properties": {
                    "position": position_schema("Where to place the component"),
                    "component": { "type": "string", "enum": COMPONENTS },
                    "blockState": { "type": "string", "description": "Comma separated key=value pairs, e.g. 'facing=north,delay=2'" }
                },
                "required": ["position", "component"]
            }),
        ),
        ToolSpec::new(
            "place_redstone_line",
            "Place an axis-aligned line of redstone dust. A support block is placed beneath each dust where needed.",
            json!({
                "type": "object",
                "properties": {
                    "pos1": position_schema("Line start"),
                    "pos2": position_schema("Line end (same y, same x or z as pos1)"),
                    "supportBlock": { "type": "string", "description": "Support block beneath the dust (default stone)" }
                },
                "required": ["pos1", "pos2"]
            }),
        ),
        ToolSpec::new(
            "place_repeater_chain",
            "Place a chain of repeaters in one direction, with redstone dust between them.",
            json!({
                "type": "object",
                "properties": {
                    "start": position_schema("First repeater position"),
                    "direction": { "type": "string", "enum": ["north", "south", "east", "west"] },
                    "count": { "type": "integer", "description": "Number of repeaters (>= 1)" },
                    "delay": { "type": "integer", "description": "Repeater delay 1-4 (default 1)" },
                    "spacing": { "type": "integer", "description": "Dust blocks between repeaters, 0-14 (default 14)" },
                    "supportBlock": { "type": "string", "description": "Support block beneath the chain (default stone)" }
                },
                "required": ["start", "direction", "count"]
            }),
        ),
        ToolSpec::new(
            "read_block",
            "Read the block at a position. Does not modify the world.",
            json!({
                "type": "object",
                "properties": { "position": position_schema("Position to inspect") },
                "required": ["position"]
            }),
        ),
        ToolSpec::new(
            "read_region",
            "List non-air blocks in a cuboid region. Does not modify the world.",
            json!({
                "type": "object",
                "properties": {
                    "pos1": position_schema("First corner"),
                    "pos2": position_schema("Opposite corner"),
                    "maxBlocks": { "type": "integer", "description": "Maximum blocks to return (default 1000, max 5000)" }
                },
                "required": ["pos1", "pos2"]
            }),
        ),
    ]);
    tools
}

/// 构造红石电路 Profile
pub fn profile(max_tokens: u32) -> PipelineProfile {
    PipelineProfile {
        strings: strings(),
        prompts: prompts(),
        max_tokens,
        planner_tool: submit_plan_tool(
            "redstone circuit",
            "Short kebab-case id like 'clock' or 'output-line'",
        ),
        executor_tools: executor_tools(),
        bridge: Arc::new(CircuitBridge),
        history_key: CIRCUIT_HISTORY,
        allow_text_fallback: false,
    }
}

/// 红石电路工具桥
#[derive(Debug, Default, Clone, Copy)]
pub struct CircuitBridge;

impl CircuitBridge {
    fn dispatch(&self, ctx: &mut WorldContext, tool: &str, args: &Value) -> Result<ToolOutcome, String> {
        let host = ctx.host_mut();
        match tool {
            "place_redstone_component" => place_component(host, args).map(ToolOutcome::ok),
            "place_redstone_line" => place_line(host, args).map(ToolOutcome::ok),
            "place_repeater_chain" => place_repeater_chain(host, args).map(ToolOutcome::ok),
            "read_block" => {
                let position = require_pos(args, "position")?;
                let data = describe_block(host, position);
                Ok(ToolOutcome::ok_with_data(data.to_string(), data))
            }
            "read_region" => {
                let (a, b) = (require_pos(args, "pos1")?, require_pos(args, "pos2")?);
                let limit = arg_i64(args, "maxBlocks")
                    .map(|n| n.clamp(1, MAX_REGION_LIMIT))
                    .unwrap_or(DEFAULT_REGION_LIMIT) as usize;
                let data = read_region(host, a, b, limit)?;
                Ok(ToolOutcome::ok_with_data(data.to_string(), data))
            }
            other => Err(format!("Unknown redstone tool: {}", other)),
        }
    }
}

impl ToolBridge for CircuitBridge {
    fn execute(
        &self,
        ctx: &mut WorldContext,
        actor: &ActorId,
        session: &Session,
        tool: &str,
        args: &Value,
    ) -> ToolOutcome {
        if SHARED_TOOLS.contains(&tool) {
            return BuildBridge.execute(ctx, actor, session, tool, args);
        }
        match self.dispatch(ctx, tool, args) {
            Ok(outcome) => outcome,
            Err(message) => {
                tracing::error!("[circuit] Tool '{}' failed: {}", tool, message);
                ToolOutcome::failed(message)
            }
        }
    }

    fn update_bounds(&self, ctx: &WorldContext, session: &Session, tool: &str, args: &Value) {
        if READ_ONLY_TOOLS.contains(&tool) {
            return;
        }
        if SHARED_TOOLS.contains(&tool) {
            expand_build_bounds(ctx, session, args);
            return;
        }

        let mut state = session.world(ctx);
        if let (Some(a), Some(b)) = (arg_pos(args, "pos1"), arg_pos(args, "pos2")) {
            state.expand_bounds(a, b);
            return;
        }

        if let Some(position) = arg_pos(args, "position") {
            state.expand_bounds(position, position);
        }

        if let Some(start) = arg_pos(args, "start") {
            let end = if tool == "place_repeater_chain" {
                repeater_chain_end(start, args).unwrap_or(start)
            } else {
                start
            };
            state.expand_bounds(start, end);
        }
    }
}

/// 中继器链最远端：长度覆盖中继器与其间的红石粉
fn repeater_chain_end(start: BlockPos, args: &Value) -> Option<BlockPos> {
    let (dx, dz) = ops::horizontal_step(arg_str(args, "direction")?)?;
    let count = arg_i64(args, "count").unwrap_or(0);
    if count <= 0 {
        return Some(start);
    }
    let spacing = arg_i64(args, "spacing").unwrap_or(MAX_SPACING).clamp(0, MAX_SPACING);
    let steps = chain_steps(count, spacing).ok()?;
    start.offset(dx * steps, 0, dz * steps)
}

/// 从第一个到最后一个中继器的步数；`count * (spacing + 1)` 超过 MAX_VOLUME 时报错
fn chain_steps(count: i64, spacing: i64) -> Result<i32, String> {
    let too_long = || {
        format!(
            "Repeater chain too long: {} repeaters with spacing {} (max {} blocks)",
            count,
            spacing,
            ops::MAX_VOLUME
        )
    };
    let span = count
        .checked_mul(spacing + 1)
        .filter(|n| *n <= ops::MAX_VOLUME)
        .ok_or_else(too_long)?;
    i32::try_from(span - spacing - 1).map_err(|_| too_long())
}

/// 支撑方块白名单，未知名称退回 stone
fn support_block(name: Option<&str>) -> &'static str {
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("stone_bricks") => "stone_bricks",
        Some("cobblestone") => "cobblestone",
        Some("oak_planks") => "oak_planks",
        Some("spruce_planks") => "spruce_planks",
        Some("birch_planks") => "birch_planks",
        Some("concrete") | Some("gray_concrete") => "gray_concrete",
        Some("white_concrete") => "white_concrete",
        Some("smooth_stone") => "smooth_stone",
        _ => "stone",
    }
}

/// 校验 `key=value,...` 形式的方块状态
fn parse_block_state(raw: &str) -> Result<Vec<(String, String)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(format!("Invalid blockState pair: '{}'", pair)),
        })
        .collect()
}

fn with_state(block: &str, state: &[(String, String)]) -> String {
    if state.is_empty() {
        return block.to_string();
    }
    let props: Vec<String> = state.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}[{}]", block, props.join(","))
}

fn ensure_support(host: &mut dyn WorldHost, pos: BlockPos, support: &str) {
    if let Some(below) = pos.offset(0, -1, 0) {
        if host.block_at(below).is_none() {
            host.set_block(below, support);
        }
    }
}

fn place_component(host: &mut dyn WorldHost, args: &Value) -> Result<String, String> {
    let position = require_pos(args, "position")?;
    let component = require_str(args, "component")?;
    if !COMPONENTS.contains(&component) {
        return Err(format!("Unknown redstone component: {}", component));
    }
    let raw_state = arg_str(args, "blockState").unwrap_or("").trim();
    let state = parse_block_state(raw_state)?;

    host.set_block(position, &with_state(component, &state));
    let suffix = if raw_state.is_empty() {
        String::new()
    } else {
        format!(" [{}]", raw_state)
    };
    Ok(format!("{} placed at {}{}", component, position, suffix))
}

fn place_line(host: &mut dyn WorldHost, args: &Value) -> Result<String, String> {
    let (a, b) = (require_pos(args, "pos1")?, require_pos(args, "pos2")?);
    if a.y != b.y {
        return Err("place_redstone_line requires pos1.y == pos2.y".to_string());
    }
    if ops::volume(a, b) > ops::MAX_VOLUME {
        return Err(format!("Line too long (max {} blocks)", ops::MAX_VOLUME));
    }
    let points = ops::axis_line(a, b)
        .ok_or("place_redstone_line only supports axis-aligned lines (X or Z)")?;
    let support = support_block(arg_str(args, "supportBlock"));

    for p in &points {
        ensure_support(host, *p, support);
        host.set_block(*p, "redstone_wire");
    }
    Ok(format!(
        "{} redstone dust placed from ({},{},{}) to ({},{},{})",
        points.len(),
        a.x,
        a.y,
        a.z,
        b.x,
        b.y,
        b.z
    ))
}

fn place_repeater_chain(host: &mut dyn WorldHost, args: &Value) -> Result<String, String> {
    let start = require_pos(args, "start")?;
    let direction = require_str(args, "direction")?;
    let count = arg_i64(args, "count").ok_or("Missing 'count'")?;
    if count < 1 {
        return Err("place_repeater_chain requires count >= 1".to_string());
    }
    let (dx, dz) = ops::horizontal_step(direction)
        .ok_or("Direction must be one of: north, south, east, west")?;
    let delay = arg_i64(args, "delay").unwrap_or(1).clamp(1, 4);
    let spacing = arg_i64(args, "spacing").unwrap_or(MAX_SPACING).clamp(0, MAX_SPACING);
    let steps = chain_steps(count, spacing)?;
    ops::shifted(start, dx * steps, 0, dz * steps)?;
    let support = support_block(arg_str(args, "supportBlock"));
    let repeater = format!(
        "repeater[facing={},delay={}]",
        direction.trim().to_ascii_lowercase(),
        delay
    );

    let mut current = start;
    let mut placed = 0usize;
    for r in 0..count {
        if r > 0 {
            for _ in 0..spacing {
                ensure_support(host, current, support);
                host.set_block(current, "redstone_wire");
                placed += 1;
                current = ops::shifted(current, dx, 0, dz)?;
            }
        }
        ensure_support(host, current, support);
        host.set_block(current, &repeater);
        placed += 1;
        if r + 1 < count {
            current = ops::shifted(current, dx, 0, dz)?;
        }
    }

    Ok(format!(
        "Repeater chain: {} repeaters, {} blocks placed from {} to {}",
        count, placed, start, current
    ))
}

fn block_id(raw: &str) -> String {
    let id = raw.split('[').next().unwrap_or(raw);
    if id.contains(':') {
        id.to_string()
    } else {
        format!("minecraft:{}", id)
    }
}

fn describe_block(host: &dyn WorldHost, position: BlockPos) -> Value {
    let raw = host.block_at(position);
    let state = raw.clone().unwrap_or_else(|| "air".to_string());
    json!({
        "x": position.x,
        "y": position.y,
        "z": position.z,
        "isAir": raw.is_none(),
        "blockId": block_id(&state),
        "state": state,
    })
}

fn read_region(host: &dyn WorldHost, a: BlockPos, b: BlockPos, limit: usize) -> Result<Value, String> {
    if ops::volume(a, b) > ops::MAX_VOLUME {
        return Err(format!("Region too large (max {} blocks)", ops::MAX_VOLUME));
    }
    let (min, max) = (a.min(b), a.max(b));
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut blocks = Vec::new();
    let mut non_air = 0usize;
    let mut truncated = false;

    for x in min.x..=max.x {
        for y in min.y..=max.y {
            for z in min.z..=max.z {
                let Some(state) = host.block_at(BlockPos::new(x, y, z)) else {
                    continue;
                };
                non_air += 1;
                let id = block_id(&state);
                *counts.entry(id.clone()).or_default() += 1;
                if blocks.len() >= limit {
                    truncated = true;
                    continue;
                }
                blocks.push(json!({ "x": x, "y": y, "z": z, "blockId": id, "state": state }));
            }
        }
    }

    Ok(json!({
        "limit": limit,
        "nonAirCount": non_air,
        "returnedCount": blocks.len(),
        "truncated": truncated,
        "countsByBlock": counts,
        "blocks": blocks,
    }))
}
