//! SVG document assembly
//!
//! One render walks the decoded request through the three layers in draw
//! order (terrain, water, tokens), gathers every definition into a single
//! `<defs>` block right after the opening tag, and emits a complete SVG
//! document. Decode failures become a small diagnostic SVG instead of an
//! HTTP error, so a broken payload still shows something in an `<img>`.

use std::fmt::Write;

use tracing::{error, info};

use crate::payload::{self, MapRequest, PayloadError};
use crate::registry::TextureRegistry;
use crate::terrain;
use crate::token;
use crate::water;

/// Standalone SVG documents carry the 1.1 doctype for picky consumers.
pub const DOCTYPE: &str = "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n";

/// Decode a `data` query parameter and render it, or produce the error SVG.
///
/// This is the whole request path minus HTTP: every failure mode ends in a
/// well-formed document, never a panic or an error return.
pub fn render_data_param(data: &str, registry: &TextureRegistry, base_url: &str) -> String {
    info!(data_len = data.len(), "rendering battlemap");
    match payload::decode_data_param(data) {
        Ok(request) => render_scene(&request, registry, base_url),
        Err(e) => {
            error!(error = %e, "failed to decode battlemap payload");
            render_error_svg(&error_message(&e))
        }
    }
}

/// Diagnostic text for the error SVG.
///
/// Base64-stage failures keep their own message so callers can grep for
/// "Invalid base64 encoding"; later stages get a generic processing prefix.
pub fn error_message(e: &PayloadError) -> String {
    match e {
        PayloadError::Empty | PayloadError::EmptyPayload => {
            format!("Invalid base64 encoding: {e}")
        }
        PayloadError::InvalidBase64(_) => e.to_string(),
        PayloadError::Decompress(_) | PayloadError::Json(_) => {
            format!("Error processing battlemap data: {e}")
        }
    }
}

/// Render a decoded request into a complete SVG document.
pub fn render_scene(request: &MapRequest, registry: &TextureRegistry, base_url: &str) -> String {
    let width = request.pixel_width();
    let height = request.pixel_height();
    let cols = request.grid_cols();
    let rows = request.grid_rows();

    let terrain_ids = request.terrain_ids();
    let terrain_layer =
        terrain::render_terrain(terrain_ids.as_deref(), cols, rows, width, height, registry);

    let water_layer = request
        .water_cells()
        .filter(|cells| cells.iter().any(|&w| w))
        .and_then(|cells| water::build_water_layer(&cells, cols, rows, width, height));

    let mut defs = terrain_layer.defs;
    registry.water_fragment().write_defs(&mut defs);
    defs.push_str(water::edge_wiggle_filter());
    if let Some(layer) = &water_layer {
        defs.push_str(&layer.defs);
    }

    let mut svg = String::from(DOCTYPE);
    let _ = write!(
        svg,
        "<svg xmlns='http://www.w3.org/2000/svg' xmlns:xlink='http://www.w3.org/1999/xlink' \
         width='{width}' height='{height}'>"
    );
    if !defs.is_empty() {
        let _ = write!(svg, "<defs>{defs}</defs>");
    }
    svg.push_str(&terrain_layer.body);
    if let Some(layer) = &water_layer {
        svg.push_str(&layer.body);
    }

    let tokens = request.all_tokens();
    if !tokens.is_empty() {
        info!(tokens = tokens.len(), "adding tokens on top of background");
        svg.push_str(&token::render_tokens(&tokens, base_url));
    }

    svg.push_str("</svg>");
    svg
}

/// A small readable panel carrying the failure diagnostic.
pub fn render_error_svg(message: &str) -> String {
    format!(
        "{DOCTYPE}<svg xmlns='http://www.w3.org/2000/svg' width='400' height='100'>\
         <rect x='0' y='0' width='400' height='100' fill='#ffcccc'/>\
         <text x='200' y='50' text-anchor='middle' font-family='Arial, sans-serif' \
         font-size='14' fill='#cc0000'>{}</text>\
         </svg>",
        escape_text(message)
    )
}

/// Escape text node content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape single-quoted attribute values.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Token;

    fn registry() -> TextureRegistry {
        TextureRegistry::from_embedded_assets()
    }

    #[test]
    fn test_error_svg_shape() {
        let svg = render_error_svg("Invalid base64 encoding: bad input");
        assert!(svg.starts_with(DOCTYPE));
        assert!(svg.contains("width='400' height='100'"));
        assert!(svg.contains("fill='#ffcccc'"));
        assert!(svg.contains("<text x='200' y='50'"));
        assert!(svg.contains("Invalid base64 encoding: bad input"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_error_svg_escapes_message() {
        let svg = render_error_svg("bad <tag> & such");
        assert!(svg.contains("bad &lt;tag&gt; &amp; such"));
    }

    #[test]
    fn test_empty_data_maps_to_base64_diagnostic() {
        let svg = render_data_param("", &registry(), "http://localhost");
        assert!(svg.contains("Invalid base64 encoding: Data parameter is empty"));
    }

    #[test]
    fn test_invalid_base64_maps_to_its_own_message() {
        let svg = render_data_param("%%%not-base64%%%", &registry(), "http://localhost");
        assert!(svg.contains("Invalid base64 encoding"));
        assert!(svg.contains("fill='#ffcccc'"));
    }

    #[test]
    fn test_scene_dimensions_from_grid() {
        let request = MapRequest {
            grid_width: Some(2),
            grid_height: Some(2),
            ..MapRequest::default()
        };
        let svg = render_scene(&request, &registry(), "http://localhost");
        assert!(svg.contains("width='64' height='64'"));
    }

    #[test]
    fn test_scene_layer_order() {
        let request = MapRequest {
            grid_width: Some(2),
            grid_height: Some(2),
            cell_backgrounds: Some(vec![0, 0, 0, 0]),
            water_packed: Some(crate::payload::Packed::Bytes(vec![1])),
            tokens: Some(vec![Token {
                x: Some(16.0),
                y: Some(16.0),
                color: Some("#ff0000".to_string()),
                ..Token::default()
            }]),
            ..MapRequest::default()
        };
        let svg = render_scene(&request, &registry(), "http://localhost");

        let terrain_at = svg.find("width='32' height='32'").unwrap();
        let water_at = svg.find("mask='url(#waterMask)'").unwrap();
        let token_at = svg.find("<circle").unwrap();
        assert!(terrain_at < water_at);
        assert!(water_at < token_at);
    }

    #[test]
    fn test_defs_emitted_once_after_open_tag() {
        let request = MapRequest {
            grid_width: Some(2),
            grid_height: Some(2),
            cell_backgrounds: Some(vec![2, 2, 2, 2]),
            ..MapRequest::default()
        };
        let svg = render_scene(&request, &registry(), "http://localhost");
        assert_eq!(svg.matches("<defs>").count(), 1);
        // Shared water filter and wiggle filter always land in defs
        assert!(svg.contains("id='waterFilter'"));
        assert!(svg.contains("id='waterEdgeWiggle'"));
        // defs come directly after the opening svg tag, before any body
        let defs_at = svg.find("<defs>").unwrap();
        let body_at = svg.find("clip-path=").unwrap();
        assert!(defs_at < body_at);
    }

    #[test]
    fn test_no_water_layer_without_wet_cells() {
        let request = MapRequest {
            grid_width: Some(2),
            grid_height: Some(2),
            water_packed: Some(crate::payload::Packed::Bytes(vec![0])),
            ..MapRequest::default()
        };
        let svg = render_scene(&request, &registry(), "http://localhost");
        assert!(!svg.contains("waterMask"));
    }
}
