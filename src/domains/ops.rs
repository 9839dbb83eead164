//! 方块几何操作：在 WorldHost 上填充立方体、墙、面、圆柱、球、直线
//!
//! 方块图案取简化形式：`stone`、`minecraft:stone`，或 `50%stone,50%cobblestone`（取第一项）。

use crate::world::{BlockPos, WorldHost};

/// 单次操作允许改动的最大方块数
pub const MAX_VOLUME: i64 = 1_000_000;

/// 图案 -> 方块 id
pub fn pattern_block(pattern: &str) -> String {
    let first = pattern.split(',').next().unwrap_or(pattern).trim();
    let without_weight = match first.split_once('%') {
        Some((_, block)) => block,
        None => first,
    };
    without_weight
        .trim()
        .trim_start_matches("minecraft:")
        .to_string()
}

/// 立方体格数；在 i64 中计算，溢出时饱和
pub fn volume(a: BlockPos, b: BlockPos) -> i64 {
    let min = a.min(b);
    let max = a.max(b);
    let span = |lo: i32, hi: i32| i64::from(hi) - i64::from(lo) + 1;
    span(min.x, max.x)
        .saturating_mul(span(min.y, max.y))
        .saturating_mul(span(min.z, max.z))
}

/// 平移后的坐标；越界时返回工具错误
pub fn shifted(pos: BlockPos, dx: i32, dy: i32, dz: i32) -> Result<BlockPos, String> {
    pos.offset(dx, dy, dz)
        .ok_or_else(|| format!("Coordinates out of range near {}", pos))
}

fn check_volume(a: BlockPos, b: BlockPos) -> Result<(), String> {
    let v = volume(a, b);
    if v > MAX_VOLUME {
        return Err(format!("Region too large: {} blocks (max {})", v, MAX_VOLUME));
    }
    Ok(())
}

fn for_each_in_box(a: BlockPos, b: BlockPos, mut f: impl FnMut(BlockPos)) {
    let min = a.min(b);
    let max = a.max(b);
    for x in min.x..=max.x {
        for y in min.y..=max.y {
            for z in min.z..=max.z {
                f(BlockPos::new(x, y, z));
            }
        }
    }
}

/// 填充整个立方体（包括空气）
pub fn fill_box(host: &mut dyn WorldHost, a: BlockPos, b: BlockPos, block: &str) -> Result<usize, String> {
    check_volume(a, b)?;
    let mut changed = 0;
    for_each_in_box(a, b, |p| {
        host.set_block(p, block);
        changed += 1;
    });
    Ok(changed)
}

/// 替换立方体内匹配 `from` 的方块；`from` 为空时替换所有非空气方块
pub fn replace_box(
    host: &mut dyn WorldHost,
    a: BlockPos,
    b: BlockPos,
    from: Option<&str>,
    to: &str,
) -> Result<usize, String> {
    check_volume(a, b)?;
    let from = from.map(pattern_block);
    let mut positions = Vec::new();
    for_each_in_box(a, b, |p| {
        let matches = match (host.block_at(p), &from) {
            (Some(current), Some(mask)) => &current == mask,
            (Some(_), None) => true,
            (None, Some(mask)) => mask == "air",
            (None, None) => false,
        };
        if matches {
            positions.push(p);
        }
    });
    for p in &positions {
        host.set_block(*p, to);
    }
    Ok(positions.len())
}

/// 四面竖墙（不含顶和底）
pub fn walls(host: &mut dyn WorldHost, a: BlockPos, b: BlockPos, block: &str) -> Result<usize, String> {
    check_volume(a, b)?;
    let min = a.min(b);
    let max = a.max(b);
    let mut changed = 0;
    for_each_in_box(min, max, |p| {
        if p.x == min.x || p.x == max.x || p.z == min.z || p.z == max.z {
            host.set_block(p, block);
            changed += 1;
        }
    });
    Ok(changed)
}

/// 六个面（空心盒）
pub fn faces(host: &mut dyn WorldHost, a: BlockPos, b: BlockPos, block: &str) -> Result<usize, String> {
    check_volume(a, b)?;
    let min = a.min(b);
    let max = a.max(b);
    let mut changed = 0;
    for_each_in_box(min, max, |p| {
        let on_face = p.x == min.x
            || p.x == max.x
            || p.y == min.y
            || p.y == max.y
            || p.z == min.z
            || p.z == max.z;
        if on_face {
            host.set_block(p, block);
            changed += 1;
        }
    });
    Ok(changed)
}

/// 圆柱：底面中心 `center`，向上 `height` 层
pub fn cylinder(
    host: &mut dyn WorldHost,
    center: BlockPos,
    radius_ns: f64,
    radius_ew: f64,
    height: i32,
    hollow: bool,
    block: &str,
) -> Result<usize, String> {
    let (rx, rz) = (radius_ew.max(0.0) + 0.5, radius_ns.max(0.0) + 0.5);
    let height = height.max(1);
    let reach_x = rx.ceil() as i32;
    let reach_z = rz.ceil() as i32;
    check_volume(
        shifted(center, -reach_x, 0, -reach_z)?,
        shifted(center, reach_x, height - 1, reach_z)?,
    )?;

    let inside = |dx: i32, dz: i32, shrink: f64| {
        let nx = dx as f64 / (rx - shrink).max(0.5);
        let nz = dz as f64 / (rz - shrink).max(0.5);
        nx * nx + nz * nz <= 1.0
    };

    let mut changed = 0;
    for dy in 0..height {
        for dx in -reach_x..=reach_x {
            for dz in -reach_z..=reach_z {
                if !inside(dx, dz, 0.0) || (hollow && inside(dx, dz, 1.0)) {
                    continue;
                }
                host.set_block(shifted(center, dx, dy, dz)?, block);
                changed += 1;
            }
        }
    }
    Ok(changed)
}

/// 球 / 椭球
pub fn sphere(
    host: &mut dyn WorldHost,
    center: BlockPos,
    radii: (f64, f64, f64),
    hollow: bool,
    block: &str,
) -> Result<usize, String> {
    let (rx, ry, rz) = (radii.0.max(0.0) + 0.5, radii.1.max(0.0) + 0.5, radii.2.max(0.0) + 0.5);
    let (ex, ey, ez) = (rx.ceil() as i32, ry.ceil() as i32, rz.ceil() as i32);
    check_volume(shifted(center, -ex, -ey, -ez)?, shifted(center, ex, ey, ez)?)?;

    let inside = |dx: i32, dy: i32, dz: i32, shrink: f64| {
        let nx = dx as f64 / (rx - shrink).max(0.5);
        let ny = dy as f64 / (ry - shrink).max(0.5);
        let nz = dz as f64 / (rz - shrink).max(0.5);
        nx * nx + ny * ny + nz * nz <= 1.0
    };

    let mut changed = 0;
    for dx in -ex..=ex {
        for dy in -ey..=ey {
            for dz in -ez..=ez {
                if !inside(dx, dy, dz, 0.0) || (hollow && inside(dx, dy, dz, 1.0)) {
                    continue;
                }
                host.set_block(shifted(center, dx, dy, dz)?, block);
                changed += 1;
            }
        }
    }
    Ok(changed)
}

/// 轴对齐直线上的所有点（两端包含）；非轴对齐返回 None
pub fn axis_line(a: BlockPos, b: BlockPos) -> Option<Vec<BlockPos>> {
    let differing = [a.x != b.x, a.y != b.y, a.z != b.z]
        .iter()
        .filter(|d| **d)
        .count();
    if differing > 1 {
        return None;
    }
    let min = a.min(b);
    let max = a.max(b);
    let mut points = Vec::new();
    for_each_in_box(min, max, |p| points.push(p));
    Some(points)
}

/// 水平方向 -> (dx, dz)
pub fn horizontal_step(direction: &str) -> Option<(i32, i32)> {
    match direction.trim().to_ascii_lowercase().as_str() {
        "north" => Some((0, -1)),
        "south" => Some((0, 1)),
        "east" => Some((1, 0)),
        "west" => Some((-1, 0)),
        _ => None,
    }
}
