//! Packed grid codecs for the battlemap wire format
//!
//! Three compact encodings coexist in a map payload:
//! - terrain ids, either 4-bit nibble-packed (legacy) or 5-bit RLE
//! - water cells, packed 8 booleans per byte
//! - scenery records, a variable-length binary stream
//!
//! Terrain format detection is by byte count only; the wire carries no
//! format tag. The nibble window thresholds are load-bearing for deployed
//! clients and must not be tightened.

/// RLE marker byte. Bytes below this hold one 5-bit terrain value directly.
const RLE_MARKER: u8 = 0xFF;

/// Mask for a 5-bit terrain id.
const TERRAIN_MASK: u8 = 0x1f;

/// Decorative scenery object kind, index 0-2 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneryKind {
    Tree,
    Stone,
    House,
}

impl SceneryKind {
    /// Map a wire type index to a kind. Unknown indices fall back to tree.
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => SceneryKind::Stone,
            2 => SceneryKind::House,
            _ => SceneryKind::Tree,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SceneryKind::Tree => "tree",
            SceneryKind::Stone => "stone",
            SceneryKind::House => "house",
        }
    }
}

/// One decoded scenery record: a decorative object at a pixel position.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneryRecord {
    pub kind: SceneryKind,
    pub x: u16,
    pub y: u16,
    /// RGB color as `#rrggbb`, present when flag bit 0 is set.
    pub color: Option<String>,
    /// Size in pixels, present when flag bit 1 is set.
    pub size: Option<u8>,
}

/// Returns true when the byte count matches the legacy nibble-packed layout.
///
/// The window is `total_cells / 2` plus or minus one byte, exactly the
/// deployed heuristic. Payloads whose RLE encoding happens to land inside
/// this window decode as nibbles; clients rely on that.
pub fn looks_nibble_packed(byte_len: usize, total_cells: usize) -> bool {
    let half = (total_cells / 2) as isize;
    let len = byte_len as isize;
    len <= half + 1 && len >= half - 1
}

/// Decode a packed terrain byte stream into one id per cell.
///
/// Auto-detects the legacy nibble format by byte count and otherwise
/// decodes 5-bit RLE. Shortfalls fill with 0 (earth).
pub fn decode_terrain(bytes: &[u8], total_cells: usize) -> Vec<u8> {
    if looks_nibble_packed(bytes.len(), total_cells) {
        decode_nibbles(bytes, total_cells)
    } else {
        decode_terrain_rle(bytes, total_cells)
    }
}

/// Decode the legacy 4-bit format: two cells per byte, even cell index in
/// the low nibble.
pub fn decode_nibbles(bytes: &[u8], total_cells: usize) -> Vec<u8> {
    let mut values = Vec::with_capacity(total_cells);
    for i in 0..total_cells {
        let byte_index = i >> 1;
        let value = match bytes.get(byte_index) {
            Some(&b) if i & 1 == 0 => b & 0x0f,
            Some(&b) => (b >> 4) & 0x0f,
            None => 0,
        };
        values.push(value);
    }
    values
}

/// Pack terrain ids into the legacy nibble format. Values are truncated to
/// 4 bits; an odd trailing cell occupies the low nibble of the final byte.
pub fn pack_nibbles(values: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len().div_ceil(2));
    for pair in values.chunks(2) {
        let lo = pair[0] & 0x0f;
        let hi = pair.get(1).map(|v| v & 0x0f).unwrap_or(0);
        bytes.push(lo | (hi << 4));
    }
    bytes
}

/// Decode the 5-bit RLE terrain format.
///
/// A byte below `0xFF` is one cell value. `0xFF` starts a 3-byte run of
/// `(marker, value, count)`. A marker with fewer than two bytes after it is
/// malformed and truncates decoding; the remainder zero-fills.
pub fn decode_terrain_rle(bytes: &[u8], total_cells: usize) -> Vec<u8> {
    let mut values = Vec::with_capacity(total_cells);
    let mut idx = 0;

    while idx < bytes.len() && values.len() < total_cells {
        let current = bytes[idx];
        if current == RLE_MARKER {
            if idx + 2 < bytes.len() {
                let value = bytes[idx + 1] & TERRAIN_MASK;
                let count = bytes[idx + 2] as usize;
                for _ in 0..count {
                    if values.len() >= total_cells {
                        break;
                    }
                    values.push(value);
                }
                idx += 3;
            } else {
                // Malformed run, treat the remainder as default
                break;
            }
        } else {
            values.push(current & TERRAIN_MASK);
            idx += 1;
        }
    }

    values.resize(total_cells, 0);
    values
}

/// Encode terrain ids with the 5-bit RLE scheme.
///
/// Runs of three or more cells become `(0xFF, value, count)` triples,
/// chunked at 255; shorter runs emit direct value bytes.
pub fn encode_terrain_rle(values: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut i = 0;

    while i < values.len() {
        let value = values[i] & TERRAIN_MASK;
        let mut run = 1;
        while i + run < values.len() && values[i + run] & TERRAIN_MASK == value {
            run += 1;
        }

        if run >= 3 {
            let mut remaining = run;
            while remaining > 0 {
                let count = remaining.min(255);
                bytes.push(RLE_MARKER);
                bytes.push(value);
                bytes.push(count as u8);
                remaining -= count;
            }
        } else {
            for _ in 0..run {
                bytes.push(value);
            }
        }
        i += run;
    }

    bytes
}

/// Unpack water bits into one boolean per cell, LSB first within each byte.
/// Truncates or zero-fills to the declared cell count.
pub fn unpack_water(bytes: &[u8], total_cells: usize) -> Vec<bool> {
    let mut cells = vec![false; total_cells];
    let mut bit_index = 0;

    'outer: for &b in bytes {
        for bit in 0..8 {
            if bit_index >= total_cells {
                break 'outer;
            }
            cells[bit_index] = (b >> bit) & 1 == 1;
            bit_index += 1;
        }
    }

    cells
}

/// Pack water booleans 8 per byte, LSB first.
pub fn pack_water(cells: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; cells.len().div_ceil(8)];
    for (i, &wet) in cells.iter().enumerate() {
        if wet {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Decode the scenery binary stream.
///
/// Each record is at least 6 bytes: type, x (u16 LE), y (u16 LE), flags.
/// Flag bit 0 adds 3 RGB color bytes, bit 1 adds a size byte. A truncated
/// trailing record stops decoding silently.
pub fn decode_scenery(bytes: &[u8]) -> Vec<SceneryRecord> {
    let mut records = Vec::new();
    let mut idx = 0;

    while idx + 6 <= bytes.len() {
        let kind = SceneryKind::from_index(bytes[idx]);
        let x = u16::from_le_bytes([bytes[idx + 1], bytes[idx + 2]]);
        let y = u16::from_le_bytes([bytes[idx + 3], bytes[idx + 4]]);
        let flags = bytes[idx + 5];
        idx += 6;

        let has_color = flags & 0x01 != 0;
        let has_size = flags & 0x02 != 0;

        let color = if has_color {
            if idx + 3 > bytes.len() {
                break;
            }
            let c = format!("#{:02x}{:02x}{:02x}", bytes[idx], bytes[idx + 1], bytes[idx + 2]);
            idx += 3;
            Some(c)
        } else {
            None
        };

        let size = if has_size {
            if idx >= bytes.len() {
                break;
            }
            let s = bytes[idx];
            idx += 1;
            Some(s)
        } else {
            None
        };

        records.push(SceneryRecord { kind, x, y, color, size });
    }

    records
}

/// Encode scenery records into the binary stream format.
pub fn encode_scenery(records: &[SceneryRecord]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for record in records {
        let kind_index = match record.kind {
            SceneryKind::Tree => 0u8,
            SceneryKind::Stone => 1,
            SceneryKind::House => 2,
        };
        bytes.push(kind_index);
        bytes.extend_from_slice(&record.x.to_le_bytes());
        bytes.extend_from_slice(&record.y.to_le_bytes());

        let mut flags = 0u8;
        if record.color.is_some() {
            flags |= 0x01;
        }
        if record.size.is_some() {
            flags |= 0x02;
        }
        bytes.push(flags);

        if let Some(color) = &record.color {
            // Malformed colors encode their parseable channels and zero the
            // rest rather than failing the whole stream
            let hex = color.trim_start_matches('#');
            for i in 0..3 {
                let channel = hex
                    .get(i * 2..i * 2 + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .unwrap_or(0);
                bytes.push(channel);
            }
        }
        if let Some(size) = record.size {
            bytes.push(size);
        }
    }
    bytes
}
