//! Structured SVG texture fragments
//!
//! Texture assets are parsed once at registry load into a small element
//! tree, so per-request rendering only walks and re-serializes structures
//! instead of re-parsing text. The parser covers the XML subset the asset
//! bundle actually uses: elements, attributes, comments, processing
//! instructions, and self-closing tags.

use thiserror::Error;

/// Error type for fragment parsing failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FragmentError {
    /// Input ended inside a tag or before the root element closed
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Malformed tag syntax
    #[error("malformed tag near '{0}'")]
    MalformedTag(String),
    /// Closing tag without a matching open tag
    #[error("unmatched closing tag '</{0}>'")]
    UnmatchedClose(String),
    /// Document has no `<svg>` root element
    #[error("missing <svg> root element")]
    MissingRoot,
}

/// One parsed SVG element: tag, attributes in document order, children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    /// Look up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A texture asset split into reusable `<defs>` content and drawable body
/// elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub defs: Vec<Element>,
    pub body: Vec<Element>,
}

impl Fragment {
    /// Parse an SVG asset into defs and body elements.
    ///
    /// The `<svg>` root is discarded; `xmlns` declarations are dropped
    /// since the composed document declares the namespace on its own root.
    pub fn parse(svg: &str) -> Result<Fragment, FragmentError> {
        let root = parse_document(svg)?;
        let mut fragment = Fragment::default();
        for child in root.children {
            if child.tag == "defs" {
                fragment.defs.extend(child.children);
            } else {
                fragment.body.push(child);
            }
        }
        Ok(fragment)
    }

    /// True when the asset has no drawable elements outside `<defs>`.
    pub fn body_is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Serialize the defs content for inclusion in a shared `<defs>` block.
    pub fn write_defs(&self, out: &mut String) {
        for element in &self.defs {
            write_element(element, out);
        }
    }

    /// Serialize the body elements stretched over the whole canvas.
    ///
    /// Position and size attributes are forced to the canvas extent and any
    /// clip-path is replaced with `clip_id`, so a single fill covers every
    /// cell accumulated into that clip region.
    pub fn write_body_clipped(&self, clip_id: &str, width: i32, height: i32, out: &mut String) {
        for element in &self.body {
            let mut attrs: Vec<(String, String)> = Vec::with_capacity(element.attrs.len() + 1);
            for (name, value) in &element.attrs {
                let value = match name.as_str() {
                    "clip-path" => continue,
                    "x" => "0".to_string(),
                    "y" => "0".to_string(),
                    "width" => width.to_string(),
                    "height" => height.to_string(),
                    _ => value.clone(),
                };
                attrs.push((name.clone(), value));
            }
            attrs.push(("clip-path".to_string(), format!("url(#{clip_id})")));

            let rewritten = Element {
                tag: element.tag.clone(),
                attrs,
                children: element.children.clone(),
            };
            write_element(&rewritten, out);
        }
    }
}

/// Serialize an element tree using single-quoted attributes, matching the
/// style of the rest of the composed document.
pub fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.tag);
    for (name, value) in &element.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("='");
        out.push_str(&escape_attr(value));
        out.push('\'');
    }
    if element.children.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        for child in &element.children {
            write_element(child, out);
        }
        out.push_str("</");
        out.push_str(&element.tag);
        out.push('>');
    }
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '\'' => escaped.push_str("&#39;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Parse a whole asset document and return the `<svg>` root element.
fn parse_document(input: &str) -> Result<Element, FragmentError> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            return Err(FragmentError::MissingRoot);
        }
        if parser.skip_non_element()? {
            continue;
        }
        let element = parser.parse_element()?;
        if element.tag != "svg" {
            return Err(FragmentError::MissingRoot);
        }
        return Ok(element);
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Skip a comment, XML declaration, or doctype if one starts here.
    /// Returns true when something was skipped.
    fn skip_non_element(&mut self) -> Result<bool, FragmentError> {
        let rest = &self.bytes[self.pos..];
        if rest.starts_with(b"<!--") {
            match find(rest, b"-->") {
                Some(end) => {
                    self.pos += end + 3;
                    Ok(true)
                }
                None => Err(FragmentError::UnexpectedEof),
            }
        } else if rest.starts_with(b"<?") || rest.starts_with(b"<!") {
            match find(rest, b">") {
                Some(end) => {
                    self.pos += end + 1;
                    Ok(true)
                }
                None => Err(FragmentError::UnexpectedEof),
            }
        } else {
            Ok(false)
        }
    }

    fn parse_element(&mut self) -> Result<Element, FragmentError> {
        if self.peek() != Some(b'<') {
            return Err(self.malformed());
        }
        self.pos += 1;

        let tag = self.parse_name()?;
        if tag.is_empty() {
            return Err(self.malformed());
        }

        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(self.malformed());
                    }
                    self.pos += 1;
                    return Ok(Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    });
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let name = self.parse_name()?;
                    if name.is_empty() {
                        return Err(self.malformed());
                    }
                    self.skip_whitespace();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        self.parse_quoted_value()?
                    } else {
                        String::new()
                    };
                    // The composed document declares the namespace once on
                    // its own root
                    if name != "xmlns" && !name.starts_with("xmlns:") {
                        attrs.push((name, value));
                    }
                }
                None => return Err(FragmentError::UnexpectedEof),
            }
        }

        let mut children = Vec::new();
        loop {
            // Text content is not part of the asset subset; drop it
            while let Some(b) = self.peek() {
                if b == b'<' {
                    break;
                }
                self.pos += 1;
            }
            if self.at_end() {
                return Err(FragmentError::UnexpectedEof);
            }
            if self.skip_non_element()? {
                continue;
            }
            if self.bytes[self.pos..].starts_with(b"</") {
                self.pos += 2;
                let close = self.parse_name()?;
                self.skip_whitespace();
                if self.peek() != Some(b'>') {
                    return Err(self.malformed());
                }
                self.pos += 1;
                if close != tag {
                    return Err(FragmentError::UnmatchedClose(close));
                }
                return Ok(Element { tag, attrs, children });
            }
            children.push(self.parse_element()?);
        }
    }

    fn parse_name(&mut self) -> Result<String, FragmentError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .map(|s| s.to_string())
            .map_err(|_| self.malformed())
    }

    fn parse_quoted_value(&mut self) -> Result<String, FragmentError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.malformed()),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == quote {
                let raw = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| self.malformed())?;
                self.pos += 1;
                return Ok(unescape(raw));
            }
            self.pos += 1;
        }
        Err(FragmentError::UnexpectedEof)
    }

    fn malformed(&self) -> FragmentError {
        let rest = &self.bytes[self.pos..self.bytes.len().min(self.pos + 24)];
        FragmentError::MalformedTag(String::from_utf8_lossy(rest).into_owned())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
