//! Map request payload decoding
//!
//! The `data` query parameter is base64 (standard or URL-safe) wrapping an
//! optionally gzip- or zlib-compressed JSON document. Field names on the
//! wire are short tags chosen by the map editor frontend; see `MapRequest`.

use std::io::Read;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::{GzDecoder, ZlibDecoder};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{self, SceneryRecord};

/// Pixel edge length of one grid cell.
pub const CELL_SIZE: i32 = 32;

/// Canvas fallback when neither grid nor legacy pixel dimensions are given.
const DEFAULT_CANVAS: i32 = 512;

/// Grid dimension assumed when the payload omits it entirely.
const DEFAULT_GRID_DIM: i32 = 16;

/// Error type for payload decoding failures.
///
/// Display strings double as the diagnostic text in the error SVG, so the
/// wording is part of the observable contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("Data parameter is empty")]
    Empty,
    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(String),
    #[error("Decoded bytes are empty")]
    EmptyPayload,
    #[error("Failed to decompress payload: {0}")]
    Decompress(String),
    #[error("Malformed map request: {0}")]
    Json(String),
}

/// A packed binary field: either a base64 string (legacy) or raw bytes as
/// a JSON number array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Packed {
    Base64(String),
    Bytes(Vec<i64>),
}

impl Packed {
    /// Decode to raw bytes. A bad or empty base64 string yields `None`
    /// rather than an error; packed fields degrade, they do not fail the
    /// request.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Packed::Base64(text) => {
                if text.is_empty() {
                    return None;
                }
                BASE64.decode(text).ok()
            }
            Packed::Bytes(values) => Some(values.iter().map(|&v| v as u8).collect()),
        }
    }
}

/// One token on the map, as sent by the editor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Token {
    pub id: Option<i64>,
    #[serde(rename = "tid")]
    pub token_id: Option<i64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    #[serde(rename = "gm")]
    pub is_gm_only: Option<bool>,
    pub color: Option<String>,
    #[serde(rename = "url")]
    pub avatar_url: Option<String>,
    #[serde(rename = "bc")]
    pub border_color: Option<String>,
    pub name: Option<String>,
    /// Scenery kind name, set when this token was reconstructed from the
    /// binary scenery stream.
    #[serde(rename = "et")]
    pub env_type: Option<String>,
    #[serde(rename = "ec")]
    pub env_color: Option<String>,
    #[serde(rename = "es")]
    pub env_size: Option<u32>,
}

impl Token {
    /// Build a token from a decoded scenery record.
    pub fn from_scenery(record: SceneryRecord) -> Self {
        Token {
            x: Some(record.x as f64),
            y: Some(record.y as f64),
            is_gm_only: Some(false),
            env_type: Some(record.kind.as_str().to_string()),
            env_color: record.color,
            env_size: record.size.map(|s| s as u32),
            ..Token::default()
        }
    }
}

/// The decoded map render request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapRequest {
    /// Grid width in cells.
    #[serde(rename = "gw", default = "default_grid_dim")]
    pub grid_width: Option<i32>,
    /// Grid height in cells.
    #[serde(rename = "gh", default = "default_grid_dim")]
    pub grid_height: Option<i32>,
    /// Legacy pixel canvas size, honored only when grid dims are absent.
    #[serde(rename = "w")]
    pub canvas_width: Option<i32>,
    #[serde(rename = "h")]
    pub canvas_height: Option<i32>,
    /// Plain terrain id array, row-major.
    #[serde(rename = "bg")]
    pub cell_backgrounds: Option<Vec<i64>>,
    /// Packed terrain ids (nibble or RLE format).
    #[serde(rename = "bgp")]
    pub cell_backgrounds_packed: Option<Packed>,
    #[serde(rename = "ts")]
    pub tokens: Option<Vec<Token>>,
    /// Packed scenery record stream.
    #[serde(rename = "eob")]
    pub scenery_packed: Option<Packed>,
    /// Packed water bits, 8 cells per byte.
    #[serde(rename = "wp")]
    pub water_packed: Option<Packed>,
}

fn default_grid_dim() -> Option<i32> {
    Some(DEFAULT_GRID_DIM)
}

/// Narrow a plain terrain value to a texture id. Values outside the byte
/// range map to an unregistered id, which the registry resolves to earth.
fn terrain_id(value: i64) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

impl MapRequest {
    /// Canvas width in pixels: grid cells x 32, legacy width, or 512.
    pub fn pixel_width(&self) -> i32 {
        match self.grid_width {
            Some(gw) if gw > 0 => gw * CELL_SIZE,
            _ => match self.canvas_width {
                Some(w) if w > 0 => w,
                _ => DEFAULT_CANVAS,
            },
        }
    }

    /// Canvas height in pixels: grid cells x 32, legacy height, or 512.
    pub fn pixel_height(&self) -> i32 {
        match self.grid_height {
            Some(gh) if gh > 0 => gh * CELL_SIZE,
            _ => match self.canvas_height {
                Some(h) if h > 0 => h,
                _ => DEFAULT_CANVAS,
            },
        }
    }

    /// Grid width in cells, defaulting when absent or non-positive.
    pub fn grid_cols(&self) -> usize {
        match self.grid_width {
            Some(gw) if gw > 0 => gw as usize,
            _ => DEFAULT_GRID_DIM as usize,
        }
    }

    /// Grid height in cells, defaulting when absent or non-positive.
    pub fn grid_rows(&self) -> usize {
        match self.grid_height {
            Some(gh) if gh > 0 => gh as usize,
            _ => DEFAULT_GRID_DIM as usize,
        }
    }

    /// Cell count from the declared grid dimensions, `None` unless both
    /// are present and positive. Packed fields carry no length of their
    /// own, so without a trustworthy grid they cannot be decoded.
    fn declared_cells(&self) -> Option<usize> {
        match (self.grid_width, self.grid_height) {
            (Some(gw), Some(gh)) if gw > 0 && gh > 0 => Some(gw as usize * gh as usize),
            _ => None,
        }
    }

    /// One terrain id per cell, or `None` when the request carries no
    /// usable terrain (whole-grid default fallback applies).
    ///
    /// A plain `bg` array shorter than the grid counts as unusable, and
    /// packed terrain is unusable without positive declared grid dims;
    /// otherwise packed terrain expands to the full grid.
    pub fn terrain_ids(&self) -> Option<Vec<u8>> {
        if let Some(plain) = &self.cell_backgrounds {
            let total_cells = self.grid_cols() * self.grid_rows();
            if plain.is_empty() || plain.len() < total_cells {
                return None;
            }
            return Some(
                plain
                    .iter()
                    .take(total_cells)
                    .map(|&v| terrain_id(v))
                    .collect(),
            );
        }

        let bytes = self.cell_backgrounds_packed.as_ref()?.to_bytes()?;
        let total_cells = self.declared_cells()?;
        Some(codec::decode_terrain(&bytes, total_cells))
    }

    /// One water flag per cell, or `None` when the request carries none
    /// or the declared grid dims are unusable.
    pub fn water_cells(&self) -> Option<Vec<bool>> {
        let bytes = self.water_packed.as_ref()?.to_bytes()?;
        let total_cells = self.declared_cells()?;
        Some(codec::unpack_water(&bytes, total_cells))
    }

    /// Regular tokens followed by tokens reconstructed from the scenery
    /// stream, in request order.
    pub fn all_tokens(&self) -> Vec<Token> {
        let mut all = self.tokens.clone().unwrap_or_default();
        if let Some(packed) = &self.scenery_packed {
            if let Some(bytes) = packed.to_bytes() {
                all.extend(codec::decode_scenery(&bytes).into_iter().map(Token::from_scenery));
            }
        }
        all
    }
}

/// Decode a `data` query parameter into a map request.
///
/// Steps: URL-safe base64 normalization, re-padding, base64 decode,
/// compression sniffing (gzip magic, `{` for raw JSON, zlib fallback),
/// then JSON parsing.
pub fn decode_data_param(data: &str) -> Result<MapRequest, PayloadError> {
    if data.is_empty() {
        return Err(PayloadError::Empty);
    }

    let mut base64_data = if data.contains('-') || data.contains('_') {
        data.replace('-', "+").replace('_', "/")
    } else {
        data.to_string()
    };

    let padding_needed = (4 - base64_data.len() % 4) % 4;
    for _ in 0..padding_needed {
        base64_data.push('=');
    }

    let bytes = BASE64
        .decode(&base64_data)
        .map_err(|e| PayloadError::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(PayloadError::EmptyPayload);
    }
    debug!(len = bytes.len(), "decoded base64 payload");

    let json = if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        debug!("detected gzip compressed payload");
        inflate_to_string(&bytes)?
    } else if bytes[0] == b'{' {
        debug!("detected uncompressed JSON payload");
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        debug!("unknown payload format, attempting decompression");
        inflate_to_string(&bytes)?
    };

    serde_json::from_str(&json).map_err(|e| PayloadError::Json(e.to_string()))
}

/// Inflate compressed bytes, preferring gzip and falling back to zlib.
fn inflate_to_string(bytes: &[u8]) -> Result<String, PayloadError> {
    let mut text = String::new();
    if GzDecoder::new(bytes).read_to_string(&mut text).is_ok() {
        return Ok(text);
    }

    warn!("gzip decode failed, attempting raw deflate fallback");
    let mut text = String::new();
    ZlibDecoder::new(bytes)
        .read_to_string(&mut text)
        .map_err(|e| PayloadError::Decompress(e.to_string()))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn encode_plain(json: &str) -> String {
        BASE64.encode(json.as_bytes())
    }

    fn encode_gzip(json: &str) -> String {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        BASE64.encode(encoder.finish().unwrap())
    }

    #[test]
    fn test_decode_plain_json_payload() {
        let data = encode_plain(r#"{"gw":4,"gh":3}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.grid_width, Some(4));
        assert_eq!(request.pixel_width(), 128);
        assert_eq!(request.pixel_height(), 96);
    }

    #[test]
    fn test_decode_gzip_payload() {
        let data = encode_gzip(r#"{"gw":2,"gh":2,"bg":[0,1,2,3]}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.terrain_ids(), Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn test_url_safe_base64_and_padding() {
        let data = encode_plain(r#"{"gw":16,"gh":16}"#)
            .replace('+', "-")
            .replace('/', "_")
            .trim_end_matches('=')
            .to_string();
        assert!(decode_data_param(&data).is_ok());
    }

    #[test]
    fn test_invalid_base64_error_message() {
        let err = decode_data_param("%%%not-base64%%%").unwrap_err();
        assert!(err.to_string().starts_with("Invalid base64 encoding"));
    }

    #[test]
    fn test_empty_data_rejected() {
        assert_eq!(decode_data_param(""), Err(PayloadError::Empty));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let data = encode_plain(r#"{"gw":2,"gh":2,"future":true}"#);
        assert!(decode_data_param(&data).is_ok());
    }

    #[test]
    fn test_pixel_dims_fall_back_to_legacy_canvas() {
        let data = encode_plain(r#"{"gw":null,"gh":null,"w":300,"h":200}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.pixel_width(), 300);
        assert_eq!(request.pixel_height(), 200);
        // Grid geometry still assumes the default cell grid
        assert_eq!(request.grid_cols(), 16);
    }

    #[test]
    fn test_pixel_dims_default_when_nothing_given() {
        let data = encode_plain(r#"{"gw":0,"gh":-1}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.pixel_width(), 512);
        assert_eq!(request.pixel_height(), 512);
    }

    #[test]
    fn test_short_plain_terrain_treated_as_absent() {
        let data = encode_plain(r#"{"gw":4,"gh":4,"bg":[1,2,3]}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.terrain_ids(), None);
    }

    #[test]
    fn test_packed_terrain_both_wire_shapes() {
        // 4 cells nibble-packed: [1,2,3,4] -> 0x21 0x43
        let as_array = encode_plain(r#"{"gw":2,"gh":2,"bgp":[33,67]}"#);
        let request = decode_data_param(&as_array).unwrap();
        assert_eq!(request.terrain_ids(), Some(vec![1, 2, 3, 4]));

        let b64 = BASE64.encode([0x21u8, 0x43]);
        let as_string = encode_plain(&format!(r#"{{"gw":2,"gh":2,"bgp":"{b64}"}}"#));
        let request = decode_data_param(&as_string).unwrap();
        assert_eq!(request.terrain_ids(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_bad_packed_base64_degrades_to_none() {
        let data = encode_plain(r#"{"gw":2,"gh":2,"bgp":"!!!"}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.terrain_ids(), None);
    }

    #[test]
    fn test_water_cells_decode() {
        // 2x2 grid, cells 0 and 3 wet: bits 0b1001
        let data = encode_plain(r#"{"gw":2,"gh":2,"wp":[9]}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.water_cells(), Some(vec![true, false, false, true]));
    }

    #[test]
    fn test_absent_water_is_none() {
        let data = encode_plain(r#"{"gw":2,"gh":2}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.water_cells(), None);
    }

    #[test]
    fn test_all_tokens_appends_scenery() {
        // One scenery record: stone at (100, 200), no extras
        let data = encode_plain(
            r##"{"gw":2,"gh":2,"ts":[{"x":16,"y":16,"color":"#ff0000"}],"eob":[1,100,0,200,0,0]}"##,
        );
        let request = decode_data_param(&data).unwrap();
        let tokens = request.all_tokens();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].color.as_deref(), Some("#ff0000"));
        assert_eq!(tokens[1].env_type.as_deref(), Some("stone"));
        assert_eq!(tokens[1].x, Some(100.0));
    }

    #[test]
    fn test_token_wire_tags() {
        let data = encode_plain(
            r##"{"ts":[{"tid":7,"x":1,"y":2,"gm":true,"url":"http://a/b.png","bc":"#112233"}]}"##,
        );
        let request = decode_data_param(&data).unwrap();
        let tokens = request.all_tokens();
        assert_eq!(tokens[0].token_id, Some(7));
        assert_eq!(tokens[0].is_gm_only, Some(true));
        assert_eq!(tokens[0].avatar_url.as_deref(), Some("http://a/b.png"));
        assert_eq!(tokens[0].border_color.as_deref(), Some("#112233"));
    }

    #[test]
    fn test_packed_fields_need_positive_grid_dims() {
        // Packed fields carry no length, so a zero grid dim makes them
        // undecodable rather than decoded against the default grid
        let data = encode_plain(r#"{"gw":0,"gh":2,"bgp":[255,2,32],"wp":[255]}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.terrain_ids(), None);
        assert_eq!(request.water_cells(), None);
    }

    #[test]
    fn test_packed_fields_need_declared_grid_dims() {
        let data = encode_plain(r#"{"gw":null,"gh":null,"wp":[255]}"#);
        let request = decode_data_param(&data).unwrap();
        assert_eq!(request.water_cells(), None);
    }

    #[test]
    fn test_out_of_range_terrain_ids_resolve_to_earth() {
        // Negative and over-byte ids land on an unregistered id, not on a
        // valid texture
        let data = encode_plain(r#"{"gw":2,"gh":2,"bg":[-5,300,0,0]}"#);
        let request = decode_data_param(&data).unwrap();
        let ids = request.terrain_ids().unwrap();
        assert_eq!(ids, vec![u8::MAX, u8::MAX, 0, 0]);
    }
}
