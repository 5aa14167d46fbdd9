//! Texture registry for terrain tile assets
//!
//! The registry is built once at process startup from the embedded asset
//! bundle and is immutable afterwards; concurrent renders read it freely.
//! Each texture carries a stable numeric id (registration order), a display
//! name, a representative color, and its SVG fragment parsed into a
//! structured form.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::fragment::{Element, Fragment};

/// Fallback color for textures with no recognizable fill.
pub const FALLBACK_COLOR: &str = "#808080";

/// Embedded texture assets in registration order. Ids are assigned
/// sequentially from 0, so this order is part of the wire contract.
const TEXTURE_ASSETS: &[(&str, &str)] = &[
    ("default", include_str!("../assets/texture/default.svg")),
    ("brick", include_str!("../assets/texture/brick.svg")),
    ("grass", include_str!("../assets/texture/grass.svg")),
    ("grass2", include_str!("../assets/texture/grass2.svg")),
    ("earth", include_str!("../assets/texture/earth.svg")),
    ("stone", include_str!("../assets/texture/stone.svg")),
    ("sand", include_str!("../assets/texture/sand.svg")),
    ("rubble", include_str!("../assets/texture/rubble.svg")),
];

const WATER_ASSET: &str = include_str!("../assets/water.svg");

/// Metadata for one registered texture, as listed by the backgrounds API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInfo {
    pub id: u8,
    pub name: String,
    pub display_name: String,
    pub color: String,
}

/// Immutable lookup from terrain id to texture name, color, and fragment.
#[derive(Debug, Clone)]
pub struct TextureRegistry {
    textures: Vec<TextureInfo>,
    name_to_id: HashMap<String, u8>,
    fragments: HashMap<String, Fragment>,
    water: Fragment,
}

impl TextureRegistry {
    /// Build the registry from the embedded asset bundle.
    ///
    /// Assets that fail to parse are registered with default metadata and
    /// no fragment, so a broken asset degrades to a flat-colored tile
    /// instead of failing startup.
    pub fn from_embedded_assets() -> Self {
        let mut textures = Vec::with_capacity(TEXTURE_ASSETS.len());
        let mut name_to_id = HashMap::new();
        let mut fragments = HashMap::new();

        for (index, (name, svg)) in TEXTURE_ASSETS.iter().enumerate() {
            let id = index as u8;
            let fragment = match Fragment::parse(svg) {
                Ok(fragment) => Some(fragment),
                Err(e) => {
                    warn!(texture = name, error = %e, "failed to parse texture asset");
                    None
                }
            };

            let color = fragment
                .as_ref()
                .and_then(extract_fill_color)
                .unwrap_or_else(|| default_color(name).to_string());

            textures.push(TextureInfo {
                id,
                name: name.to_string(),
                display_name: capitalize(name),
                color,
            });
            name_to_id.insert(name.to_string(), id);
            if let Some(fragment) = fragment {
                fragments.insert(name.to_string(), fragment);
            }
        }

        let water = Fragment::parse(WATER_ASSET).unwrap_or_else(|e| {
            warn!(error = %e, "failed to parse water asset");
            Fragment::default()
        });

        Self {
            textures,
            name_to_id,
            fragments,
            water,
        }
    }

    /// Texture name for a terrain id. Unknown ids resolve to `"earth"`.
    pub fn texture_name(&self, id: u8) -> &str {
        self.textures
            .get(id as usize)
            .map(|t| t.name.as_str())
            .unwrap_or("earth")
    }

    /// Id for a texture name, if registered.
    pub fn texture_id(&self, name: &str) -> Option<u8> {
        self.name_to_id.get(name).copied()
    }

    pub fn is_valid_id(&self, id: u8) -> bool {
        (id as usize) < self.textures.len()
    }

    /// All registered textures, ordered by id.
    pub fn all_textures(&self) -> &[TextureInfo] {
        &self.textures
    }

    /// Representative fill color for a terrain id.
    ///
    /// Falls back to the legacy per-id color table when the id is not
    /// registered, so old payloads keep their colors.
    pub fn background_color(&self, id: u8) -> &str {
        if let Some(info) = self.textures.get(id as usize) {
            return &info.color;
        }
        match id {
            1 => "#90EE90",
            3 => "#696969",
            4 => "#F4A460",
            _ => "#8B4513",
        }
    }

    /// Parsed fragment for a terrain id, keyed through the texture name.
    ///
    /// The `"default"` texture renders as a flat color and deliberately has
    /// no fragment.
    pub fn fragment(&self, id: u8) -> Option<&Fragment> {
        let name = self.texture_name(id);
        if name == "default" {
            return None;
        }
        self.fragments.get(name)
    }

    /// Filter reference for a texture, `<name>-filter`, when its fragment
    /// defines one.
    pub fn filter_id(&self, id: u8) -> Option<String> {
        let name = self.texture_name(id);
        if name == "default" {
            return None;
        }
        let fragment = self.fragments.get(name)?;
        let filter_id = format!("{name}-filter");
        let defines_filter = fragment
            .defs
            .iter()
            .any(|e| e.tag == "filter" && e.attr("id") == Some(filter_id.as_str()));
        defines_filter.then_some(filter_id)
    }

    /// The shared water surface fragment (defs carry the `waterFilter`).
    pub fn water_fragment(&self) -> &Fragment {
        &self.water
    }
}

/// Find the first 6-digit hex `fill` in document order, defs before body.
fn extract_fill_color(fragment: &Fragment) -> Option<String> {
    fragment
        .defs
        .iter()
        .chain(fragment.body.iter())
        .find_map(find_fill_color)
}

fn find_fill_color(element: &Element) -> Option<String> {
    if let Some(fill) = element.attr("fill") {
        if fill.len() == 7 && fill.starts_with('#') && fill[1..].chars().all(|c| c.is_ascii_hexdigit())
        {
            return Some(fill.to_string());
        }
    }
    element.children.iter().find_map(find_fill_color)
}

fn default_color(name: &str) -> &'static str {
    match name {
        "default" => "#228B22",
        "grass" => "#90EE90",
        "grass2" => "#2e7d32",
        "earth" => "#8B4513",
        "stone" => "#696969",
        "sand" => "#F4A460",
        "brick" => "#a84600",
        _ => FALLBACK_COLOR,
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_is_wire_contract() {
        let registry = TextureRegistry::from_embedded_assets();
        let names: Vec<_> = registry
            .all_textures()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["default", "brick", "grass", "grass2", "earth", "stone", "sand", "rubble"]
        );
        assert_eq!(registry.texture_id("earth"), Some(4));
    }

    #[test]
    fn test_unknown_id_falls_back_to_earth() {
        let registry = TextureRegistry::from_embedded_assets();
        assert_eq!(registry.texture_name(200), "earth");
        assert!(!registry.is_valid_id(200));
    }

    #[test]
    fn test_colors_extracted_from_assets() {
        let registry = TextureRegistry::from_embedded_assets();
        let grass_id = registry.texture_id("grass").unwrap();
        assert_eq!(registry.background_color(grass_id), "#90EE90");
        let sand_id = registry.texture_id("sand").unwrap();
        assert_eq!(registry.background_color(sand_id), "#F4A460");
    }

    #[test]
    fn test_legacy_color_table_for_unknown_ids() {
        let registry = TextureRegistry::from_embedded_assets();
        assert_eq!(registry.background_color(200), "#8B4513");
    }

    #[test]
    fn test_default_texture_has_no_fragment() {
        let registry = TextureRegistry::from_embedded_assets();
        let default_id = registry.texture_id("default").unwrap();
        assert!(registry.fragment(default_id).is_none());

        let grass_id = registry.texture_id("grass").unwrap();
        let fragment = registry.fragment(grass_id).unwrap();
        assert!(!fragment.body_is_empty());
    }

    #[test]
    fn test_filter_id_only_when_defined() {
        let registry = TextureRegistry::from_embedded_assets();
        let grass_id = registry.texture_id("grass").unwrap();
        assert_eq!(registry.filter_id(grass_id), Some("grass-filter".to_string()));
        let stone_id = registry.texture_id("stone").unwrap();
        assert_eq!(registry.filter_id(stone_id), None);
    }

    #[test]
    fn test_water_fragment_has_filter_defs() {
        let registry = TextureRegistry::from_embedded_assets();
        let water = registry.water_fragment();
        assert!(water.defs.iter().any(|e| e.tag == "filter"));
    }

    #[test]
    fn test_display_names_capitalized() {
        let registry = TextureRegistry::from_embedded_assets();
        let brick = &registry.all_textures()[1];
        assert_eq!(brick.display_name, "Brick");
    }
}
