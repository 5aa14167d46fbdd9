//! Token layer rendering
//!
//! Tokens draw above terrain and water. A token with an environment type
//! becomes an `<image>` pointing back at the env-object endpoint, a token
//! with an avatar URL becomes an `<image>` of that avatar, and anything
//! else is a plain colored circle. Tokens without a position are skipped.

use std::fmt::Write;

use tracing::warn;

use crate::compose::escape_attr;
use crate::payload::Token;

/// Default token diameter in pixels.
const DEFAULT_TOKEN_SIZE: f64 = 40.0;

/// Fallback circle fill when the token carries no color.
const DEFAULT_TOKEN_COLOR: &str = "#808080";

/// Render every positioned token, in payload order.
pub fn render_tokens(tokens: &[Token], base_url: &str) -> String {
    let mut body = String::new();
    for token in tokens {
        body.push_str(&render_token(token, base_url));
    }
    body
}

/// Render one token, or an empty string when it has no position.
pub fn render_token(token: &Token, base_url: &str) -> String {
    let (Some(x), Some(y)) = (token.x, token.y) else {
        warn!("skipping token without position");
        return String::new();
    };

    let mut size = DEFAULT_TOKEN_SIZE;

    let url = match &token.env_type {
        Some(env_type) if !env_type.trim().is_empty() => {
            if let Some(env_size) = token.env_size {
                size = env_size as f64;
            }
            Some(env_object_url(base_url, env_type, token))
        }
        _ => token
            .avatar_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string),
    };

    let mut markup = String::new();
    if let Some(url) = url {
        let _ = write!(
            markup,
            "<image x='{}' y='{}' width='{size}' height='{size}' href='{}' \
             preserveAspectRatio='xMidYMid slice'/>",
            x - size / 2.0,
            y - size / 2.0,
            escape_attr(&url)
        );
    } else {
        let fill = token
            .color
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_TOKEN_COLOR);
        let stroke = token
            .border_color
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("#000000");
        let _ = write!(
            markup,
            "<circle cx='{x}' cy='{y}' r='{}' fill='{}' stroke='{}' stroke-width='2'/>",
            size / 2.0,
            escape_attr(fill),
            escape_attr(stroke)
        );
    }
    markup
}

/// Rebuild the env-object image URL from the token's environment fields.
fn env_object_url(base_url: &str, env_type: &str, token: &Token) -> String {
    let mut url = format!("{base_url}/env-object?type={}", url_encode(env_type));
    if let Some(color) = token.env_color.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = write!(url, "&color={}", url_encode(color));
    }
    if let Some(env_size) = token.env_size {
        let _ = write!(url, "&size={env_size}");
    }
    url
}

/// Form-style query encoding: unreserved bytes pass through, space becomes
/// `+`, everything else is percent-escaped.
fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
