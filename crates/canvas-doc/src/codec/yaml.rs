//! Writer and reader for `.pa.yaml` source files.
//!
//! The format is a small, line-oriented YAML subset:
//!
//! ```text
//! Screen:
//! Name: Screen1
//! Properties:
//!   Text: I am a screen
//! Controls:
//! - Button: 2.1.0
//!   Name: Button1
//!   Properties:
//!     X: 100
//! ```
//!
//! The first line of every node is its header: `App: `, `Screen: `,
//! `Control: <uri>` for custom controls, or `<Template>: <version>` for
//! built-ins. Scalars that plain YAML would misread are written as
//! double-quoted JSON strings. Output uses LF; CRLF input is accepted.

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::{Control, ControlKind, PropertyMap, PropertyValue, Screen, TemplateRef};

pub const APP_HEADER: &str = "App";
pub const SCREEN_HEADER: &str = "Screen";
pub const CUSTOM_HEADER: &str = "Control";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum YamlError {
    /// The text is not in the supported YAML subset.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    /// Well-formed text describing an invalid node.
    #[error("line {line}: {message}")]
    Validation { line: usize, message: String },
}

fn syntax(line: usize, message: impl Into<String>) -> YamlError {
    YamlError::Syntax {
        line,
        message: message.into(),
    }
}

fn invalid(line: usize, message: impl Into<String>) -> YamlError {
    YamlError::Validation {
        line,
        message: message.into(),
    }
}

/// Top-level content of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFile {
    App { properties: PropertyMap },
    Screen(Screen),
    Control(Control),
}

// ── Writer ────────────────────────────────────────────────────────────────

pub fn write_app(properties: &PropertyMap) -> String {
    let mut out = String::new();
    out.push_str(APP_HEADER);
    out.push_str(": \n");
    write_properties(&mut out, 0, properties);
    out
}

pub fn write_screen(screen: &Screen) -> String {
    let mut out = String::new();
    out.push_str(SCREEN_HEADER);
    out.push_str(": \n");
    write_field(&mut out, 0, "Name", screen.name());
    write_properties(&mut out, 0, screen.properties());
    write_children(&mut out, 0, screen.controls());
    out
}

pub fn write_control(control: &Control) -> String {
    let mut out = String::new();
    write_control_at(&mut out, 0, None, control);
    out
}

/// `first_line_prefix` replaces the indentation of the header line, for
/// sequence items.
fn write_control_at(
    out: &mut String,
    indent: usize,
    first_line_prefix: Option<&str>,
    control: &Control,
) {
    let (header, value) = match control.kind() {
        ControlKind::BuiltIn(template) => (template.name.as_str(), template.version.as_str()),
        ControlKind::Custom { uri } => (CUSTOM_HEADER, uri.as_str()),
    };
    match first_line_prefix {
        Some(prefix) => out.push_str(prefix),
        None => push_indent(out, indent),
    }
    out.push_str(&scalar(header));
    out.push_str(": ");
    if !value.is_empty() {
        out.push_str(&scalar(value));
    }
    out.push('\n');
    write_field(out, indent, "Name", control.name());
    write_properties(out, indent, control.properties());
    write_children(out, indent, control.children());
}

fn write_field(out: &mut String, indent: usize, key: &str, value: &str) {
    push_indent(out, indent);
    out.push_str(key);
    out.push_str(": ");
    out.push_str(&scalar(value));
    out.push('\n');
}

fn write_properties(out: &mut String, indent: usize, properties: &PropertyMap) {
    if properties.is_empty() {
        return;
    }
    push_indent(out, indent);
    out.push_str("Properties:\n");
    for (key, value) in properties {
        push_indent(out, indent + 2);
        out.push_str(&scalar(key));
        out.push_str(": ");
        out.push_str(&scalar(value.text()));
        out.push('\n');
    }
}

fn write_children(out: &mut String, indent: usize, children: &[Control]) {
    if children.is_empty() {
        return;
    }
    push_indent(out, indent);
    out.push_str("Controls:\n");
    let prefix = format!("{}- ", " ".repeat(indent));
    for child in children {
        write_control_at(out, indent + 2, Some(&prefix), child);
    }
}

fn push_indent(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

/// Plain scalar when it reads back verbatim, JSON-quoted otherwise.
fn scalar(text: &str) -> String {
    if needs_quotes(text) {
        serde_json::Value::String(text.to_string()).to_string()
    } else {
        text.to_string()
    }
}

fn needs_quotes(text: &str) -> bool {
    let Some(first) = text.chars().next() else {
        return true;
    };
    text.trim() != text
        || text.chars().any(char::is_control)
        || "\"'-#{}[]|>&*!%@`?:,".contains(first)
        || text.contains(": ")
        || text.contains(" #")
        || text.ends_with(':')
}

// ── Reader ────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Line {
    number: usize,
    /// Column of the key.
    indent: usize,
    /// Line opens a sequence item (`- `).
    item: bool,
    key: String,
    value: String,
}

fn tokenize(text: &str) -> Result<Vec<Line>, YamlError> {
    let mut lines = Vec::new();
    for (i, raw) in text.split('\n').enumerate() {
        let number = i + 1;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let body = raw.trim_start_matches(' ');
        if body.trim().is_empty() || body.starts_with('#') {
            continue;
        }
        if body.starts_with('\t') {
            return Err(syntax(number, "tabs are not allowed in indentation"));
        }
        let mut indent = raw.len() - body.len();
        let mut item = false;
        let mut rest = body;
        if let Some(after_dash) = body.strip_prefix("- ") {
            let trimmed = after_dash.trim_start_matches(' ');
            indent += 2 + (after_dash.len() - trimmed.len());
            item = true;
            rest = trimmed;
        }
        let (key, value) = split_entry(number, rest)?;
        lines.push(Line {
            number,
            indent,
            item,
            key,
            value,
        });
    }
    Ok(lines)
}

fn split_entry(number: usize, text: &str) -> Result<(String, String), YamlError> {
    let (key, rest) = if text.starts_with('"') {
        let end = quoted_end(text).ok_or_else(|| syntax(number, "unterminated quoted key"))?;
        let key = unquote(number, &text[..end])?;
        let rest = text[end..]
            .strip_prefix(':')
            .ok_or_else(|| syntax(number, "expected `:` after quoted key"))?;
        (key, rest)
    } else if let Some((key, rest)) = text.split_once(": ") {
        (key.to_string(), rest)
    } else if let Some(key) = text.strip_suffix(':') {
        (key.to_string(), "")
    } else {
        return Err(syntax(number, format!("expected `key: value`, found `{text}`")));
    };
    let rest = rest.trim_matches(' ');
    let value = if rest.starts_with('"') {
        if quoted_end(rest) != Some(rest.len()) {
            return Err(syntax(number, "unexpected text after quoted value"));
        }
        unquote(number, rest)?
    } else {
        rest.to_string()
    };
    Ok((key, value))
}

/// Byte offset just past the closing quote of a leading quoted string.
fn quoted_end(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i + 1),
            _ => {}
        }
    }
    None
}

fn unquote(number: usize, quoted: &str) -> Result<String, YamlError> {
    serde_json::from_str(quoted).map_err(|e| syntax(number, format!("invalid quoted scalar: {e}")))
}

#[derive(Debug)]
struct RawNode {
    line: usize,
    header: String,
    header_value: String,
    name: Option<String>,
    properties: IndexMap<String, String>,
    children: Vec<RawNode>,
}

struct Parser {
    lines: Vec<Line>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Line> {
        self.lines.get(self.pos)
    }

    /// Parse the node whose header is the current line.
    fn node(&mut self) -> Result<RawNode, YamlError> {
        let head = &self.lines[self.pos];
        let indent = head.indent;
        let mut node = RawNode {
            line: head.number,
            header: head.key.clone(),
            header_value: head.value.clone(),
            name: None,
            properties: IndexMap::new(),
            children: Vec::new(),
        };
        self.pos += 1;

        while let Some(line) = self.peek() {
            if line.indent < indent || (line.indent == indent && line.item) {
                break;
            }
            if line.indent > indent || line.item {
                return Err(syntax(line.number, "unexpected indentation"));
            }
            let number = line.number;
            let key = line.key.clone();
            let value = line.value.clone();
            self.pos += 1;
            match key.as_str() {
                "Name" => {
                    if node.name.replace(value).is_some() {
                        return Err(invalid(number, "duplicate `Name`"));
                    }
                }
                "Properties" => {
                    expect_block(number, &key, &value)?;
                    self.properties(indent + 2, &mut node.properties)?;
                }
                "Controls" => {
                    expect_block(number, &key, &value)?;
                    self.children(indent, &mut node.children)?;
                }
                other => return Err(invalid(number, format!("unknown field `{other}`"))),
            }
        }
        Ok(node)
    }

    fn properties(
        &mut self,
        indent: usize,
        into: &mut IndexMap<String, String>,
    ) -> Result<(), YamlError> {
        while let Some(line) = self.peek() {
            if line.indent != indent || line.item {
                break;
            }
            if into.insert(line.key.clone(), line.value.clone()).is_some() {
                return Err(invalid(line.number, format!("duplicate property `{}`", line.key)));
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn children(&mut self, indent: usize, into: &mut Vec<RawNode>) -> Result<(), YamlError> {
        let Some(first) = self.peek() else {
            return Ok(());
        };
        if !first.item || first.indent <= indent {
            return Ok(());
        }
        let item_indent = first.indent;
        while let Some(line) = self.peek() {
            if !line.item || line.indent != item_indent {
                break;
            }
            into.push(self.node()?);
        }
        Ok(())
    }
}

fn expect_block(number: usize, key: &str, value: &str) -> Result<(), YamlError> {
    if value.is_empty() {
        Ok(())
    } else {
        Err(syntax(number, format!("`{key}` takes an indented block, not a value")))
    }
}

pub fn parse(text: &str) -> Result<SourceFile, YamlError> {
    let lines = tokenize(text)?;
    let Some(first) = lines.first() else {
        return Err(invalid(1, "empty source file"));
    };
    if first.indent != 0 || first.item {
        return Err(syntax(first.number, "the header must start at column 0"));
    }
    let mut parser = Parser { lines, pos: 0 };
    let root = parser.node()?;
    if let Some(extra) = parser.peek() {
        return Err(syntax(extra.number, "unexpected content after the top-level node"));
    }

    match root.header.as_str() {
        APP_HEADER => {
            if let Some(child) = root.children.first() {
                return Err(invalid(child.line, "the app cannot own controls"));
            }
            Ok(SourceFile::App {
                properties: into_properties(root.properties),
            })
        }
        SCREEN_HEADER => {
            let name = required_name(&root)?;
            let controls = root
                .children
                .into_iter()
                .map(into_control)
                .collect::<Result<Vec<_>, _>>()?;
            let mut screen = Screen::new(name).with_controls(controls);
            for (key, value) in root.properties {
                screen = screen.with_property(key, value);
            }
            Ok(SourceFile::Screen(screen))
        }
        _ => into_control(root).map(SourceFile::Control),
    }
}

fn required_name(node: &RawNode) -> Result<String, YamlError> {
    node.name
        .clone()
        .ok_or_else(|| invalid(node.line, format!("`{}` node has no `Name`", node.header)))
}

fn into_properties(properties: IndexMap<String, String>) -> PropertyMap {
    properties
        .into_iter()
        .map(|(k, v)| (k, PropertyValue::Formula(v)))
        .collect()
}

fn into_control(node: RawNode) -> Result<Control, YamlError> {
    let name = required_name(&node)?;
    let kind = match node.header.as_str() {
        APP_HEADER | SCREEN_HEADER => {
            return Err(invalid(node.line, format!("`{}` cannot be nested", node.header)));
        }
        CUSTOM_HEADER => ControlKind::Custom { uri: node.header_value },
        template => ControlKind::BuiltIn(TemplateRef::new(template, node.header_value)),
    };
    let children = node
        .children
        .into_iter()
        .map(into_control)
        .collect::<Result<Vec<_>, _>>()?;
    let mut control = Control::new(name, kind).with_children(children);
    for (key, value) in node.properties {
        control = control.with_property(key, value);
    }
    Ok(control)
}
