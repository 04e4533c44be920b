//! Minimal HTML-to-PDF layout.
//!
//! Understands the tag vocabulary emitted by the markdown stage (headings,
//! paragraphs, emphasis, code, lists, block quotes, tables, rules, line
//! breaks) and lays it out with the base-14 fonts, so no font files are
//! embedded. Unknown tags are dropped and their text kept.

use anyhow::{anyhow, bail, Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

const LIST_INDENT: f32 = 18.0;
const QUOTE_INDENT: f32 = 18.0;
const LINE_HEIGHT: f32 = 1.35;
const BLOCK_GAP: f32 = 0.6;

/// Page geometry in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub font_size: f32,
}

impl Default for PageLayout {
    /// US Letter with one-inch margins.
    fn default() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
            margin: 72.0,
            font_size: 11.0,
        }
    }
}

impl PageLayout {
    fn text_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    /// The text column must fit at least one line of body text.
    fn validate(&self) -> Result<()> {
        if !(self.font_size > 0.0) {
            bail!("font size must be positive, got {}", self.font_size);
        }
        let min_height = 2.0 * self.margin + self.font_size * LINE_HEIGHT;
        if self.text_width() < self.font_size || self.height < min_height {
            bail!(
                "page {}x{} with margin {} leaves no room for text",
                self.width,
                self.height,
                self.margin
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

impl Face {
    const ALL: [Face; 5] = [
        Face::Regular,
        Face::Bold,
        Face::Italic,
        Face::BoldItalic,
        Face::Mono,
    ];

    fn resource_name(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
            Face::Italic => "F3",
            Face::BoldItalic => "F4",
            Face::Mono => "F5",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Face::Regular => "Helvetica",
            Face::Bold => "Helvetica-Bold",
            Face::Italic => "Helvetica-Oblique",
            Face::BoldItalic => "Helvetica-BoldOblique",
            Face::Mono => "Courier",
        }
    }

    /// Approximate advance width in ems, good enough for line breaking.
    fn char_width(self, c: char) -> f32 {
        if self == Face::Mono {
            return 0.6;
        }
        let base = match c {
            ' ' | 'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '!' | '|' | '\'' => 0.278,
            'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' | '/' => 0.333,
            'm' | 'w' | 'M' | 'W' | '@' | '%' => 0.833,
            c if c.is_ascii_uppercase() => 0.667,
            c if c.is_ascii_digit() => 0.556,
            _ => 0.556,
        };
        match self {
            Face::Bold | Face::BoldItalic => base * 1.06,
            _ => base,
        }
    }

    fn with_style(bold: bool, italic: bool, mono: bool) -> Self {
        match (mono, bold, italic) {
            (true, _, _) => Face::Mono,
            (false, true, true) => Face::BoldItalic,
            (false, true, false) => Face::Bold,
            (false, false, true) => Face::Italic,
            (false, false, false) => Face::Regular,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Span {
    text: String,
    face: Face,
}

impl Span {
    const BREAK: &'static str = "\n";

    fn line_break() -> Self {
        Self {
            text: Self::BREAK.to_string(),
            face: Face::Regular,
        }
    }

    /// Breaks stand alone; text is never merged into them.
    fn is_break(&self) -> bool {
        self.text == Self::BREAK
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Text {
        spans: Vec<Span>,
        size: f32,
        indent: f32,
    },
    Preformatted {
        text: String,
        indent: f32,
    },
    Rule,
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Bullet,
    /// Number for the next item.
    Ordered(u64),
}

/// Walks HTML and collects layout blocks.
struct BlockBuilder {
    base_size: f32,
    blocks: Vec<Block>,
    spans: Vec<Span>,
    open: Vec<String>,
    bold: u32,
    italic: u32,
    code: u32,
    heading: Option<u8>,
    pre: Option<String>,
    lists: Vec<ListKind>,
    quote_depth: u32,
    pending_marker: Option<String>,
}

impl BlockBuilder {
    fn new(base_size: f32) -> Self {
        Self {
            base_size,
            blocks: Vec::new(),
            spans: Vec::new(),
            open: Vec::new(),
            bold: 0,
            italic: 0,
            code: 0,
            heading: None,
            pre: None,
            lists: Vec::new(),
            quote_depth: 0,
            pending_marker: None,
        }
    }

    fn indent(&self) -> f32 {
        self.lists.len() as f32 * LIST_INDENT + self.quote_depth as f32 * QUOTE_INDENT
    }

    fn face(&self) -> Face {
        Face::with_style(self.bold > 0 || self.heading.is_some(), self.italic > 0, self.code > 0)
    }

    fn push_text(&mut self, text: &str) {
        if let Some(pre) = self.pre.as_mut() {
            pre.push_str(text);
            return;
        }
        let collapsed = collapse_whitespace(text);
        let at_line_start = self.spans.last().map_or(true, Span::is_break);
        let text = if at_line_start {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        if text.is_empty() {
            return;
        }
        let face = self.face();
        match self.spans.last_mut() {
            Some(last) if last.face == face && !last.is_break() => last.text.push_str(text),
            _ => self.spans.push(Span {
                text: text.to_string(),
                face,
            }),
        }
    }

    fn line_break(&mut self) {
        if let Some(pre) = self.pre.as_mut() {
            pre.push('\n');
        } else {
            self.spans.push(Span::line_break());
        }
    }

    fn flush(&mut self) {
        let mut spans = std::mem::take(&mut self.spans);
        while spans.last().map_or(false, |s| s.is_break() || s.text.trim().is_empty()) {
            spans.pop();
        }
        if spans.is_empty() {
            return;
        }
        if let Some(marker) = self.pending_marker.take() {
            spans.insert(
                0,
                Span {
                    text: marker,
                    face: Face::Regular,
                },
            );
        }
        let size = match self.heading {
            Some(level) => heading_size(self.base_size, level),
            None => self.base_size,
        };
        self.blocks.push(Block::Text {
            spans,
            size,
            indent: self.indent(),
        });
    }

    fn open_tag(&mut self, name: &str, attrs: &str) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                self.heading = name[1..].parse().ok();
            }
            "p" | "tr" => self.flush(),
            "blockquote" => {
                self.flush();
                self.quote_depth += 1;
            }
            "ul" => {
                self.flush();
                self.lists.push(ListKind::Bullet);
            }
            "ol" => {
                self.flush();
                let start = attribute(attrs, "start")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(1);
                self.lists.push(ListKind::Ordered(start));
            }
            "li" => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(ListKind::Ordered(next)) => {
                        let marker = format!("{next}. ");
                        *next = next.saturating_add(1);
                        marker
                    }
                    _ => "\u{2022} ".to_string(),
                };
                self.pending_marker = Some(marker);
            }
            "pre" => {
                self.flush();
                self.pre = Some(String::new());
            }
            "td" | "th" => {
                if !self.spans.is_empty() {
                    self.push_text(" | ");
                }
                if name == "th" {
                    self.bold += 1;
                }
            }
            "strong" | "b" => self.bold += 1,
            "em" | "i" => self.italic += 1,
            "code" => self.code += 1,
            _ => {}
        }
        self.open.push(name.to_string());
    }

    fn close_tag(&mut self, name: &str) -> Result<()> {
        match self.open.pop() {
            Some(open) if open == name => {}
            Some(open) => bail!("mismatched closing tag </{name}> (expected </{open}>)"),
            None => bail!("unexpected closing tag </{name}>"),
        }
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                self.heading = None;
            }
            "p" | "li" | "tr" => self.flush(),
            "blockquote" => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "pre" => {
                if let Some(text) = self.pre.take() {
                    self.blocks.push(Block::Preformatted {
                        text: text.trim_end_matches('\n').to_string(),
                        indent: self.indent(),
                    });
                }
            }
            "strong" | "b" | "th" => self.bold = self.bold.saturating_sub(1),
            "em" | "i" => self.italic = self.italic.saturating_sub(1),
            "code" => self.code = self.code.saturating_sub(1),
            _ => {}
        }
        Ok(())
    }

    fn void_tag(&mut self, name: &str) {
        match name {
            "br" => self.line_break(),
            "hr" => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Result<Vec<Block>> {
        if let Some(open) = self.open.last() {
            bail!("unclosed tag <{open}>");
        }
        self.flush();
        Ok(self.blocks)
    }
}

fn heading_size(base: f32, level: u8) -> f32 {
    match level {
        1 => base * 1.8,
        2 => base * 1.5,
        3 => base * 1.25,
        4 => base * 1.1,
        _ => base,
    }
}

fn is_void(name: &str) -> bool {
    matches!(name, "br" | "hr" | "img" | "input" | "meta" | "link")
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse HTML into layout blocks, rejecting malformed markup.
fn parse_blocks(html: &str, base_size: f32) -> Result<Vec<Block>> {
    let mut builder = BlockBuilder::new(base_size);
    let mut rest = html;
    while !rest.is_empty() {
        let Some(lt) = rest.find('<') else {
            builder.push_text(&decode_entities(rest));
            break;
        };
        if lt > 0 {
            builder.push_text(&decode_entities(&rest[..lt]));
        }
        let tag_src = &rest[lt..];
        let gt = tag_src
            .find('>')
            .ok_or_else(|| anyhow!("unterminated tag near `{}`", preview(tag_src)))?;
        let inner = tag_src[1..gt].trim();
        rest = &tag_src[gt + 1..];

        if inner.starts_with('!') || inner.starts_with('?') {
            continue;
        }
        let (closing, inner) = match inner.strip_prefix('/') {
            Some(stripped) => (true, stripped),
            None => (false, inner),
        };
        let self_closing = inner.ends_with('/');
        let body = inner.trim_end_matches('/');
        let (name, attrs) = body
            .split_once(char::is_whitespace)
            .unwrap_or((body, ""));
        let name = name.to_ascii_lowercase();
        if name.is_empty() {
            bail!("empty tag near `{}`", preview(tag_src));
        }

        if closing {
            if !is_void(&name) {
                builder.close_tag(&name)?;
            }
        } else if self_closing || is_void(&name) {
            builder.void_tag(&name);
        } else {
            builder.open_tag(&name, attrs);
        }
    }
    builder.finish()
}

/// Value of `key="..."` (or single-quoted) in a tag's attribute text.
fn attribute<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    let mut rest = attrs;
    while let Some(pos) = rest.find(key) {
        let boundary = rest[..pos]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after = rest[pos + key.len()..].trim_start();
        if let (true, Some(value)) = (boundary, after.strip_prefix('=')) {
            let value = value.trim_start();
            let quote = value.chars().next()?;
            if quote == '"' || quote == '\'' {
                let value = &value[1..];
                return value.find(quote).map(|end| &value[..end]);
            }
            return value.split(char::is_whitespace).next();
        }
        rest = &rest[pos + key.len()..];
    }
    None
}

fn preview(text: &str) -> String {
    text.chars().take(24).collect()
}

/// One laid-out line: x offset from the margin and face-tagged segments.
#[derive(Debug, Default)]
struct Line {
    indent: f32,
    segments: Vec<Span>,
}

fn wrap_spans(spans: &[Span], size: f32, width: f32, indent: f32) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current = Line {
        indent,
        segments: Vec::new(),
    };
    let mut used = 0.0f32;

    let push_piece = |line: &mut Line, text: &str, face: Face| match line.segments.last_mut() {
        Some(last) if last.face == face => last.text.push_str(text),
        _ => line.segments.push(Span {
            text: text.to_string(),
            face,
        }),
    };

    for span in spans {
        if span.is_break() {
            lines.push(std::mem::replace(
                &mut current,
                Line {
                    indent,
                    segments: Vec::new(),
                },
            ));
            used = 0.0;
            continue;
        }
        for token in split_keep_spaces(&span.text) {
            let token_width: f32 = token.chars().map(|c| span.face.char_width(c) * size).sum();
            let is_space = token.trim().is_empty();
            if is_space && current.segments.is_empty() {
                continue;
            }
            if used + token_width > width && !current.segments.is_empty() {
                lines.push(std::mem::replace(
                    &mut current,
                    Line {
                        indent,
                        segments: Vec::new(),
                    },
                ));
                used = 0.0;
                if is_space {
                    continue;
                }
            }
            if token_width > width {
                // Break tokens wider than the line on character boundaries.
                for c in token.chars() {
                    let w = span.face.char_width(c) * size;
                    if used + w > width && !current.segments.is_empty() {
                        lines.push(std::mem::replace(
                            &mut current,
                            Line {
                                indent,
                                segments: Vec::new(),
                            },
                        ));
                        used = 0.0;
                    }
                    push_piece(&mut current, &c.to_string(), span.face);
                    used += w;
                }
                continue;
            }
            push_piece(&mut current, token, span.face);
            used += token_width;
        }
    }
    if !current.segments.is_empty() {
        lines.push(current);
    }
    lines
}

/// Hard-wrap a line of code at the monospace column limit, keeping indentation.
fn wrap_preformatted(raw: &str, size: f32, width: f32, indent: f32) -> Vec<Line> {
    let columns = ((width / (Face::Mono.char_width(' ') * size)).floor() as usize).max(1);
    let chars: Vec<char> = raw.chars().collect();
    if chars.is_empty() {
        return vec![Line {
            indent,
            segments: vec![Span {
                text: String::new(),
                face: Face::Mono,
            }],
        }];
    }
    chars
        .chunks(columns)
        .map(|chunk| Line {
            indent,
            segments: vec![Span {
                text: chunk.iter().collect(),
                face: Face::Mono,
            }],
        })
        .collect()
}

fn split_keep_spaces(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space = None;
    for (idx, c) in text.char_indices() {
        let space = c == ' ';
        match in_space {
            Some(prev) if prev != space => {
                tokens.push(&text[start..idx]);
                start = idx;
            }
            _ => {}
        }
        in_space = Some(space);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Encode text for a WinAnsi-encoded base-14 font.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\u{20ac}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

/// Accumulates page content streams while tracking the cursor.
struct PageWriter {
    layout: PageLayout,
    pages: Vec<Vec<Operation>>,
    cursor_y: f32,
}

impl PageWriter {
    fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            pages: vec![Vec::new()],
            cursor_y: layout.height - layout.margin,
        }
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.cursor_y - needed < self.layout.margin && !self.current().is_empty() {
            self.pages.push(Vec::new());
            self.cursor_y = self.layout.height - self.layout.margin;
        }
    }

    fn current(&mut self) -> &mut Vec<Operation> {
        // `pages` always holds at least one page.
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn text_line(&mut self, line: &Line, size: f32) {
        let leading = size * LINE_HEIGHT;
        self.ensure_room(leading);
        self.cursor_y -= leading;
        let x = self.layout.margin + line.indent;
        let y = self.cursor_y + (leading - size);
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), x.into(), y.into()],
            ),
        ];
        for segment in &line.segments {
            ops.push(Operation::new(
                "Tf",
                vec![segment.face.resource_name().into(), size.into()],
            ));
            ops.push(Operation::new(
                "Tj",
                vec![Object::string_literal(encode_win_ansi(&segment.text))],
            ));
        }
        ops.push(Operation::new("ET", vec![]));
        self.current().extend(ops);
    }

    fn rule(&mut self) {
        let gap = self.layout.font_size * BLOCK_GAP;
        self.ensure_room(gap * 2.0);
        self.cursor_y -= gap;
        let left = self.layout.margin;
        let right = self.layout.width - self.layout.margin;
        let y = self.cursor_y;
        self.current().extend([
            Operation::new("q", vec![]),
            Operation::new("w", vec![0.75f32.into()]),
            Operation::new("m", vec![left.into(), y.into()]),
            Operation::new("l", vec![right.into(), y.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
        self.cursor_y -= gap;
    }

    fn gap(&mut self, size: f32) {
        self.cursor_y -= size * BLOCK_GAP;
    }
}

fn layout_blocks(blocks: &[Block], layout: PageLayout) -> Vec<Vec<Operation>> {
    let mut writer = PageWriter::new(layout);
    let full_width = layout.text_width();
    for block in blocks {
        match block {
            Block::Text {
                spans,
                size,
                indent,
            } => {
                for line in wrap_spans(spans, *size, full_width - indent, *indent) {
                    writer.text_line(&line, *size);
                }
                writer.gap(layout.font_size);
            }
            Block::Preformatted { text, indent } => {
                let size = layout.font_size * 0.85;
                for raw in text.lines() {
                    for line in wrap_preformatted(raw, size, full_width - indent, *indent) {
                        writer.text_line(&line, size);
                    }
                }
                writer.gap(layout.font_size);
            }
            Block::Rule => writer.rule(),
        }
    }
    writer.pages
}

fn font_dictionary(doc: &mut Document) -> lopdf::Dictionary {
    let mut fonts = lopdf::Dictionary::new();
    for face in Face::ALL {
        let id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => face.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(face.resource_name(), id);
    }
    fonts
}

/// Lay out `html` and serialize the resulting document.
pub fn html_to_pdf(html: &str, layout: PageLayout) -> Result<Vec<u8>> {
    layout.validate()?;
    let blocks = parse_blocks(html, layout.font_size).context("failed to parse report HTML")?;
    let pages = layout_blocks(&blocks, layout);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let fonts = font_dictionary(&mut doc);
    let resources_id = doc.add_object(dictionary! { "Font" => fonts });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let encoded = content.encode().context("failed to encode page content")?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let media_box: Vec<Object> = vec![
        0.into(),
        0.into(),
        layout.width.into(),
        layout.height.into(),
    ];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .context("failed to serialize PDF document")?;
    Ok(bytes)
}
