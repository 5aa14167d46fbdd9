//! battlemap - decode tabletop battlemap payloads and render them to SVG
//!
//! A battlemap arrives as one opaque `data` string: URL-safe base64 around
//! an optionally gzipped JSON document whose grid fields are themselves
//! packed binary (nibble or run-length terrain, bit-packed water, binary
//! scenery records). This crate decodes that stack and composes a single
//! SVG document with organic-looking terrain, water, and token layers.
//!
//! # Example
//!
//! ```
//! use battlemap::compose;
//! use battlemap::payload::MapRequest;
//! use battlemap::registry::TextureRegistry;
//!
//! let registry = TextureRegistry::from_embedded_assets();
//! let request = MapRequest {
//!     grid_width: Some(2),
//!     grid_height: Some(2),
//!     ..MapRequest::default()
//! };
//! let svg = compose::render_scene(&request, &registry, "http://localhost:8080/api");
//! assert!(svg.contains("width='64' height='64'"));
//! ```

pub mod cli;
pub mod codec;
pub mod compose;
pub mod fragment;
pub mod payload;
pub mod registry;
#[cfg(feature = "server")]
pub mod server;
pub mod terrain;
pub mod token;
pub mod water;
