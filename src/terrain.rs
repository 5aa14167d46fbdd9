//! Terrain layer rendering
//!
//! Plain ("default"/"earth") cells become flat 32x32 rects. Every other
//! cell joins a per-texture clip region built from jittered cell outlines,
//! and each distinct texture is filled exactly once at canvas size through
//! its clip path. The jitter hides the tile seams a sharp grid would show.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt::Write;

use tracing::debug;

use crate::payload::CELL_SIZE;
use crate::registry::TextureRegistry;

/// Jitter amplitude in pixels; subtle on purpose.
const WAVE_AMPLITUDE: f64 = 1.2;

/// Jitter sample points per cell edge.
const EDGE_POINTS: usize = 6;

/// Cells overlap their neighbors by this much so jittered borders never
/// open gaps.
const CELL_OVERLAP: i32 = 2;

/// Per-edge phase offsets decorrelate the four edges of a cell.
const PHASE_TOP: f64 = 0.0;
const PHASE_RIGHT: f64 = 10.7;
const PHASE_BOTTOM: f64 = 20.3;
const PHASE_LEFT: f64 = 30.1;

/// Rendered terrain output: shared defs content and drawable body markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainLayer {
    pub defs: String,
    pub body: String,
}

/// Render the terrain grid.
///
/// `terrain` is one id per cell, row-major; `None` means the request had no
/// usable terrain and the whole canvas gets the earth fallback color.
pub fn render_terrain(
    terrain: Option<&[u8]>,
    cols: usize,
    rows: usize,
    canvas_width: i32,
    canvas_height: i32,
    registry: &TextureRegistry,
) -> TerrainLayer {
    let mut layer = TerrainLayer::default();

    let Some(terrain) = terrain else {
        let earth_color = registry
            .texture_id("earth")
            .map(|id| registry.background_color(id))
            .unwrap_or("#8B4513");
        let _ = write!(
            layer.body,
            "<rect x='0' y='0' width='{canvas_width}' height='{canvas_height}' fill='{earth_color}'/>"
        );
        debug!("no cell backgrounds provided, using default earth background");
        return layer;
    };

    // First pass: flat cells render directly, textured cells accumulate
    // jittered outlines per texture name.
    let mut clips_by_name: BTreeMap<&str, (u8, String)> = BTreeMap::new();

    for row in 0..rows {
        for col in 0..cols {
            let index = row * cols + col;
            let Some(&id) = terrain.get(index) else {
                continue;
            };
            let texture_name = registry.texture_name(id);

            if texture_name == "default" || texture_name == "earth" {
                let x = col as i32 * CELL_SIZE;
                let y = row as i32 * CELL_SIZE;
                let color = registry.background_color(id);
                let _ = write!(
                    layer.body,
                    "<rect x='{x}' y='{y}' width='{CELL_SIZE}' height='{CELL_SIZE}' fill='{color}'/>"
                );
            } else {
                let entry = clips_by_name
                    .entry(texture_name)
                    .or_insert_with(|| (id, String::new()));
                entry.1.push_str(&squiggly_cell_path(col, row));
            }
        }
    }

    // Second pass: one clip path plus one canvas-sized fill per texture.
    for (name, (id, clip_paths)) in &clips_by_name {
        let clip_id = format!("{name}-clip");
        let _ = write!(layer.defs, "<clipPath id='{clip_id}'>{clip_paths}</clipPath>");

        let fragment = registry.fragment(*id);
        if let Some(fragment) = fragment {
            fragment.write_defs(&mut layer.defs);
        }

        match fragment {
            Some(fragment) if !fragment.body_is_empty() => {
                fragment.write_body_clipped(&clip_id, canvas_width, canvas_height, &mut layer.body);
            }
            _ => {
                // No drawable content; fall back to a flat fill through the
                // same clip, slightly oversized to cover the cell overlap
                let color = registry.background_color(*id);
                let _ = write!(
                    layer.body,
                    "<rect x='-5' y='-5' width='{canvas_width}' height='{canvas_height}' fill='{color}'"
                );
                if let Some(filter_id) = registry.filter_id(*id) {
                    let _ = write!(layer.body, " filter='url(#{filter_id})'");
                }
                let _ = write!(layer.body, " clip-path='url(#{clip_id})'/>");
            }
        }
    }

    debug!(
        textures = clips_by_name.len(),
        "rendered terrain cell backgrounds"
    );
    layer
}

/// Jittered quadrilateral outline for the cell at grid (col, row).
///
/// The outline expands the cell by a 2px overlap, then walks the four edges
/// clockwise, displacing interior points along the edge's perpendicular by
/// a sine keyed on the cell position. Irrational seed multipliers keep the
/// jitter from visibly repeating across the grid, and position-only seeding
/// makes every render of the same cell byte-identical.
pub fn squiggly_cell_path(col: usize, row: usize) -> String {
    let seed = col as f64 * 137.5 + row as f64 * 97.3;

    let x = (col as i32 * CELL_SIZE - CELL_OVERLAP) as f64;
    let y = (row as i32 * CELL_SIZE - CELL_OVERLAP) as f64;
    let width = (CELL_SIZE + CELL_OVERLAP * 2) as f64;
    let height = (CELL_SIZE + CELL_OVERLAP * 2) as f64;

    let mut path = String::from("<path d='");
    let _ = write!(path, "M {x},{y}");

    // Top edge, left to right
    for i in 1..=EDGE_POINTS {
        let t = i as f64 / EDGE_POINTS as f64;
        let offset = WAVE_AMPLITUDE * (seed + PHASE_TOP + t * 2.0 * PI).sin();
        let _ = write!(path, " L {},{}", x + t * width, y + offset);
    }

    // Right edge, top to bottom
    for i in 1..=EDGE_POINTS {
        let t = i as f64 / EDGE_POINTS as f64;
        let offset = WAVE_AMPLITUDE * (seed + PHASE_RIGHT + t * 2.0 * PI).sin();
        let _ = write!(path, " L {},{}", x + width + offset, y + t * height);
    }

    // Bottom edge, right to left
    for i in (0..EDGE_POINTS).rev() {
        let t = i as f64 / EDGE_POINTS as f64;
        let offset = WAVE_AMPLITUDE * (seed + PHASE_BOTTOM + t * 2.0 * PI).sin();
        let _ = write!(path, " L {},{}", x + t * width, y + height + offset);
    }

    // Left edge, bottom to top
    for i in (0..EDGE_POINTS).rev() {
        let t = i as f64 / EDGE_POINTS as f64;
        let offset = WAVE_AMPLITUDE * (seed + PHASE_LEFT + t * 2.0 * PI).sin();
        let _ = write!(path, " L {},{}", x + offset, y + t * height);
    }

    path.push_str(" Z'/>");
    path
}
