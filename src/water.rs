//! Water layer construction
//!
//! Water cells are grouped into 4-connected blobs by an iterative flood
//! fill, each blob becomes a union of per-cell rounded-corner paths, and
//! the combined even-odd path masks a single semi-transparent canvas rect
//! carrying the animated water filter. Blobs touching a grid edge bleed a
//! few pixels past it so the water meets the map border without a hard
//! inner seam.

use std::collections::HashSet;
use std::fmt::Write;

use tracing::debug;

use crate::payload::CELL_SIZE;

/// Corner radius for convex blob corners.
const CORNER_RADIUS: i32 = 8;

/// How far water extends past the canvas on edges it touches.
const EDGE_OVERLAP: i32 = 5;

/// Water fill color and opacity for the masked rect.
const WATER_COLOR: &str = "#003f7f";
const WATER_OPACITY: &str = "0.7";

/// Rendered water output: mask defs and the masked rect markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterLayer {
    pub defs: String,
    pub body: String,
}

/// Animated turbulence/displacement filter applied to the mask path so the
/// water's edge appears to wander in viewers that animate SVG.
pub fn edge_wiggle_filter() -> &'static str {
    concat!(
        "<filter id='waterEdgeWiggle' x='-50%' y='-50%' width='200%' height='200%' filterUnits='userSpaceOnUse'>",
        "<feTurbulence type='fractalNoise' baseFrequency='0.03 0.05' numOctaves='2' seed='5' result='edgeNoise1'>",
        "<animate attributeName='baseFrequency' values='0.03 0.05;0.05 0.03;0.03 0.05' dur='16s' repeatCount='indefinite'/>",
        "</feTurbulence>",
        "<feTurbulence type='fractalNoise' baseFrequency='0.02 0.04' numOctaves='2' seed='12' result='edgeNoise2'>",
        "<animate attributeName='baseFrequency' values='0.02 0.04;0.04 0.02;0.02 0.04' dur='20s' repeatCount='indefinite'/>",
        "</feTurbulence>",
        "<feOffset in='edgeNoise1' dx='0' dy='0' result='offsetNoise1'>",
        "<animate attributeName='dx' values='-50;50;-50' dur='12s' repeatCount='indefinite'/>",
        "<animate attributeName='dy' values='-40;40;-40' dur='14s' repeatCount='indefinite'/>",
        "</feOffset>",
        "<feDisplacementMap in='edgeNoise2' in2='offsetNoise1' scale='5' xChannelSelector='R' yChannelSelector='G' result='combinedEdgeNoise'/>",
        "<feDisplacementMap in='SourceGraphic' in2='combinedEdgeNoise' scale='6' xChannelSelector='R' yChannelSelector='G'/>",
        "</filter>"
    )
}

/// Group water cells into maximal 4-connected blobs.
///
/// Diagonal adjacency does not connect. Blob cell indices are returned in
/// ascending order; membership, not visiting order, is the contract. The
/// fill uses an explicit stack so pathological grids cannot exhaust the
/// call stack.
pub fn find_water_blobs(water: &[bool], cols: usize, rows: usize) -> Vec<Vec<usize>> {
    let total = water.len().min(cols * rows);
    let mut visited = vec![false; total];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start in 0..total {
        if !water[start] || visited[start] {
            continue;
        }

        let mut blob = Vec::new();
        visited[start] = true;
        stack.push(start);

        while let Some(index) = stack.pop() {
            blob.push(index);
            let row = index / cols;
            let col = index % cols;

            let mut visit = |neighbor: usize| {
                if neighbor < total && water[neighbor] && !visited[neighbor] {
                    visited[neighbor] = true;
                    stack.push(neighbor);
                }
            };

            if row > 0 {
                visit(index - cols);
            }
            if col + 1 < cols {
                visit(index + 1);
            }
            if row + 1 < rows {
                visit(index + cols);
            }
            if col > 0 {
                visit(index - 1);
            }
        }

        blob.sort_unstable();
        blobs.push(blob);
    }

    blobs
}

/// Which canvas edges the water bleeds past.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct EdgeContact {
    top: bool,
    bottom: bool,
    left: bool,
    right: bool,
}

/// Build the water mask defs and masked rect for a grid.
///
/// Returns `None` when the grid holds no water cells.
pub fn build_water_layer(
    water: &[bool],
    cols: usize,
    rows: usize,
    canvas_width: i32,
    canvas_height: i32,
) -> Option<WaterLayer> {
    let blobs = find_water_blobs(water, cols, rows);
    if blobs.is_empty() {
        return None;
    }
    debug!(blobs = blobs.len(), "building water layer");

    let mut contact = EdgeContact::default();
    for blob in &blobs {
        for &index in blob {
            let row = index / cols;
            let col = index % cols;
            contact.top |= row == 0;
            contact.bottom |= row == rows - 1;
            contact.left |= col == 0;
            contact.right |= col == cols - 1;
        }
    }

    let mask_x = if contact.left { -EDGE_OVERLAP } else { 0 };
    let mask_y = if contact.top { -EDGE_OVERLAP } else { 0 };
    let mask_width = canvas_width
        + if contact.left { EDGE_OVERLAP } else { 0 }
        + if contact.right { EDGE_OVERLAP } else { 0 };
    let mask_height = canvas_height
        + if contact.top { EDGE_OVERLAP } else { 0 }
        + if contact.bottom { EDGE_OVERLAP } else { 0 };

    let mut combined_path = String::new();
    for blob in &blobs {
        let blob_path = build_blob_path(blob, cols, rows, contact);
        if !blob_path.is_empty() {
            if !combined_path.is_empty() {
                combined_path.push(' ');
            }
            combined_path.push_str(&blob_path);
        }
    }

    if combined_path.is_empty() {
        return None;
    }

    let mut layer = WaterLayer::default();
    let _ = write!(
        layer.defs,
        "<mask id='waterMask' maskUnits='userSpaceOnUse' x='{mask_x}' y='{mask_y}' width='{mask_width}' height='{mask_height}'>\
         <rect x='{mask_x}' y='{mask_y}' width='{mask_width}' height='{mask_height}' fill='black'/>\
         <g filter='url(#waterEdgeWiggle)'>\
         <path d='{combined_path}' fill='white' fill-rule='evenodd'/>\
         </g>\
         </mask>"
    );
    let _ = write!(
        layer.body,
        "<rect x='{mask_x}' y='{mask_y}' width='{mask_width}' height='{mask_height}' \
         fill='{WATER_COLOR}' filter='url(#waterFilter)' fill-opacity='{WATER_OPACITY}' \
         mask='url(#waterMask)'/>"
    );

    Some(layer)
}

/// Concatenate the rounded per-cell paths for one blob.
///
/// A corner rounds only when both axis neighbors at that corner and the
/// diagonal between them are outside the blob: convex outer corners get
/// arcs, concave junctions stay sharp. Cells on the grid border never
/// round toward it, and on contacted edges they stretch outward by the
/// bleed overlap.
fn build_blob_path(blob: &[usize], cols: usize, rows: usize, contact: EdgeContact) -> String {
    let members: HashSet<usize> = blob.iter().copied().collect();
    let mut path = String::new();

    for &index in blob {
        let row = index / cols;
        let col = index % cols;
        let mut x = col as i32 * CELL_SIZE;
        let mut y = row as i32 * CELL_SIZE;
        let mut width = CELL_SIZE;
        let mut height = CELL_SIZE;

        if row == 0 && contact.top {
            y -= EDGE_OVERLAP;
            height += EDGE_OVERLAP;
        }
        if row == rows - 1 && contact.bottom {
            height += EDGE_OVERLAP;
        }
        if col == 0 && contact.left {
            x -= EDGE_OVERLAP;
            width += EDGE_OVERLAP;
        }
        if col == cols - 1 && contact.right {
            width += EDGE_OVERLAP;
        }

        let has_top = row > 0;
        let has_right = col + 1 < cols;
        let has_bottom = row + 1 < rows;
        let has_left = col > 0;

        let top = has_top && members.contains(&(index - cols));
        let right = has_right && members.contains(&(index + 1));
        let bottom = has_bottom && members.contains(&(index + cols));
        let left = has_left && members.contains(&(index - 1));

        let top_left = has_top && has_left && members.contains(&(index - cols - 1));
        let top_right = has_top && has_right && members.contains(&(index - cols + 1));
        let bottom_right = has_bottom && has_right && members.contains(&(index + cols + 1));
        let bottom_left = has_bottom && has_left && members.contains(&(index + cols - 1));

        let r_tl = if has_top && has_left && !top && !left && !top_left {
            CORNER_RADIUS
        } else {
            0
        };
        let r_tr = if has_top && has_right && !top && !right && !top_right {
            CORNER_RADIUS
        } else {
            0
        };
        let r_br = if has_bottom && has_right && !bottom && !right && !bottom_right {
            CORNER_RADIUS
        } else {
            0
        };
        let r_bl = if has_bottom && has_left && !bottom && !left && !bottom_left {
            CORNER_RADIUS
        } else {
            0
        };

        if !path.is_empty() {
            path.push(' ');
        }
        path.push_str(&rounded_rect_path(x, y, width, height, r_tl, r_tr, r_br, r_bl));
    }

    path
}

/// SVG path for a rectangle with independently rounded corners, drawn
/// clockwise from the top-left.
fn rounded_rect_path(
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    r_tl: i32,
    r_tr: i32,
    r_br: i32,
    r_bl: i32,
) -> String {
    if r_tl == 0 && r_tr == 0 && r_br == 0 && r_bl == 0 {
        return format!(
            "M {},{} L {},{} L {},{} L {},{} Z",
            x,
            y,
            x + width,
            y,
            x + width,
            y + height,
            x,
            y + height
        );
    }

    let mut path = String::new();

    if r_tl > 0 {
        let _ = write!(path, "M {},{} ", x, y + r_tl);
        let _ = write!(path, "A {r_tl},{r_tl} 0 0 1 {},{} ", x + r_tl, y);
    } else {
        let _ = write!(path, "M {x},{y} ");
    }

    if r_tr > 0 {
        let _ = write!(path, "L {},{} ", x + width - r_tr, y);
        let _ = write!(path, "A {r_tr},{r_tr} 0 0 1 {},{} ", x + width, y + r_tr);
    } else {
        let _ = write!(path, "L {},{} ", x + width, y);
    }

    if r_br > 0 {
        let _ = write!(path, "L {},{} ", x + width, y + height - r_br);
        let _ = write!(
            path,
            "A {r_br},{r_br} 0 0 1 {},{} ",
            x + width - r_br,
            y + height
        );
    } else {
        let _ = write!(path, "L {},{} ", x + width, y + height);
    }

    if r_bl > 0 {
        let _ = write!(path, "L {},{} ", x + r_bl, y + height);
        let _ = write!(path, "A {r_bl},{r_bl} 0 0 1 {},{} ", x, y + height - r_bl);
    } else {
        let _ = write!(path, "L {},{} ", x, y + height);
    }

    path.push('Z');
    path
}
