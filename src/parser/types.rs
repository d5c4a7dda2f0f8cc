//! Editable block/attribute tree of a parsed configuration file
//!
//! The tree keeps byte spans into the original source. Edits are recorded on
//! the tree and applied as text replacements when the file is rendered, so
//! everything that was not edited (comments, spacing, ordering) is written
//! back byte for byte.

use std::ops::Range;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

/// One parsed configuration file
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    source: String,
    blocks: Vec<Block>,
}

impl ConfigFile {
    pub fn new(path: PathBuf, source: String, blocks: Vec<Block>) -> Self {
        Self {
            path,
            source,
            blocks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Top-level blocks of the given kind (e.g., "module", "terraform")
    pub fn blocks_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    pub fn blocks_of_kind_mut<'a>(
        &'a mut self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a mut Block> + 'a {
        self.blocks.iter_mut().filter(move |b| b.kind == kind)
    }

    /// Whether any attribute anywhere in the file was changed
    pub fn is_modified(&self) -> bool {
        self.blocks.iter().any(Block::is_modified)
    }

    /// Source text with all recorded edits applied
    pub fn render(&self) -> String {
        let mut edits = Vec::new();
        for block in &self.blocks {
            block.collect_edits(&mut edits);
        }
        edits.sort_by_key(|edit| (edit.range.start, edit.seq));

        let mut output = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for edit in edits {
            if edit.range.start < cursor {
                continue;
            }
            output.push_str(&self.source[cursor..edit.range.start]);
            output.push_str(&edit.text);
            cursor = edit.range.end;
        }
        output.push_str(&self.source[cursor..]);
        output
    }
}

#[derive(Debug)]
struct Edit {
    range: Range<usize>,
    text: String,
    seq: usize,
}

/// Byte layout of a block needed to insert new attributes
#[derive(Debug, Clone, Default)]
pub struct BlockLayout {
    /// Offset at which new attribute lines are inserted
    pub insert_at: usize,
    /// Whether the closing brace shares a line with other content
    pub inline_close: bool,
    /// Indentation of the block's own line
    pub indent: String,
    /// Indentation used for attributes inside the block
    pub attribute_indent: String,
}

/// A labeled block with its attributes and nested blocks
#[derive(Debug, Clone)]
pub struct Block {
    kind: String,
    labels: Vec<String>,
    attributes: IndexMap<String, Attribute>,
    added: IndexMap<String, String>,
    blocks: Vec<Block>,
    layout: BlockLayout,
}

impl Block {
    pub fn new(
        kind: String,
        labels: Vec<String>,
        attributes: IndexMap<String, Attribute>,
        blocks: Vec<Block>,
        layout: BlockLayout,
    ) -> Self {
        Self {
            kind,
            labels,
            attributes,
            added: IndexMap::new(),
            blocks,
            layout,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Nested blocks of the given kind
    pub fn blocks_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    pub fn blocks_of_kind_mut<'a>(
        &'a mut self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a mut Block> + 'a {
        self.blocks.iter_mut().filter(move |b| b.kind == kind)
    }

    /// Attribute as parsed, unless it was removed
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .get(name)
            .filter(|attr| !matches!(attr.state, AttributeState::Removed))
    }

    /// Current expression text of an attribute, including pending edits
    pub fn expression(&self, name: &str) -> Option<&str> {
        if let Some(expr) = self.added.get(name) {
            return Some(expr);
        }
        self.attribute(name).map(Attribute::expression)
    }

    /// Set an attribute to a raw expression, replacing or appending it.
    /// Setting the current expression again is not an edit.
    pub fn set_attribute_raw(&mut self, name: &str, expression: String) {
        if self.expression(name) == Some(expression.as_str()) {
            return;
        }
        match self.attributes.get_mut(name) {
            Some(attr) => attr.state = AttributeState::Replaced(expression),
            None => {
                self.added.insert(name.to_string(), expression);
            }
        }
    }

    /// Set an attribute to a quoted string literal
    pub fn set_attribute_string(&mut self, name: &str, value: &str) {
        self.set_attribute_raw(name, quote(value));
    }

    /// Set an attribute to an object of string values, keys sorted and aligned
    pub fn set_attribute_object(&mut self, name: &str, entries: &[(&str, &str)]) {
        let indent = self
            .attributes
            .get(name)
            .map(|attr| attr.indent.clone())
            .unwrap_or_else(|| self.layout.attribute_indent.clone());
        self.set_attribute_raw(name, render_object(entries, &indent));
    }

    /// Remove an attribute, returning whether it was present
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        if self.added.shift_remove(name).is_some() {
            return true;
        }
        match self.attributes.get_mut(name) {
            Some(attr) if !matches!(attr.state, AttributeState::Removed) => {
                attr.state = AttributeState::Removed;
                true
            }
            _ => false,
        }
    }

    pub fn is_modified(&self) -> bool {
        !self.added.is_empty()
            || self
                .attributes
                .values()
                .any(|attr| !matches!(attr.state, AttributeState::Original))
            || self.blocks.iter().any(Block::is_modified)
    }

    fn collect_edits(&self, edits: &mut Vec<Edit>) {
        for attr in self.attributes.values() {
            match &attr.state {
                AttributeState::Original => {}
                AttributeState::Replaced(expression) => edits.push(Edit {
                    range: attr.value_span.clone(),
                    text: expression.clone(),
                    seq: edits.len(),
                }),
                AttributeState::Removed => edits.push(Edit {
                    range: attr.line_span.clone(),
                    text: String::new(),
                    seq: edits.len(),
                }),
            }
        }

        if !self.added.is_empty() {
            let indent = &self.layout.attribute_indent;
            let mut text = String::new();
            if self.layout.inline_close {
                text.push('\n');
            }
            for (name, expression) in &self.added {
                text.push_str(&format!("{indent}{name} = {expression}\n"));
            }
            if self.layout.inline_close {
                text.push_str(&self.layout.indent);
            }
            edits.push(Edit {
                range: self.layout.insert_at..self.layout.insert_at,
                text,
                seq: edits.len(),
            });
        }

        for block in &self.blocks {
            block.collect_edits(edits);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeState {
    Original,
    Replaced(String),
    Removed,
}

/// A `name = expression` attribute
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    /// Expression text as written in the source
    raw: String,
    /// Full `name = expression` text
    text: String,
    /// Object elements as (unquoted key, raw value) when the value is an object
    entries: Vec<(String, String)>,
    value_span: Range<usize>,
    line_span: Range<usize>,
    indent: String,
    state: AttributeState,
}

impl Attribute {
    pub fn new(
        name: String,
        raw: String,
        text: String,
        entries: Vec<(String, String)>,
        value_span: Range<usize>,
        line_span: Range<usize>,
        indent: String,
    ) -> Self {
        Self {
            name,
            raw,
            text,
            entries,
            value_span,
            line_span,
            indent,
            state: AttributeState::Original,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current expression text, including a pending replacement
    pub fn expression(&self) -> &str {
        match &self.state {
            AttributeState::Replaced(expression) => expression,
            _ => &self.raw,
        }
    }

    /// Leading whitespace of the attribute's line
    pub fn indent(&self) -> &str {
        &self.indent
    }

    /// Full attribute text as it appears in the source
    pub fn source_text(&self) -> &str {
        &self.text
    }

    /// Decoded value when the expression is a plain string literal
    pub fn string_value(&self) -> Option<String> {
        unquote(self.expression())
    }

    /// Raw value of an object element
    pub fn entry(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded value of an object element holding a plain string literal
    pub fn entry_string(&self, key: &str) -> Option<String> {
        self.entry(key).and_then(unquote)
    }
}

/// Render a string as a quoted literal, escaping template sequences
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Decode a plain quoted string literal; interpolated or non-string
/// expressions yield `None`.
pub fn unquote(expression: &str) -> Option<String> {
    let trimmed = expression.trim();
    let inner = trimmed.strip_prefix('"')?.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                other => out.push(other),
            },
            '"' => return None,
            '$' | '%' if chars.peek() == Some(&'{') => return None,
            '$' | '%' if chars.peek() == Some(&c) => {
                chars.next();
                if chars.peek() == Some(&'{') {
                    out.push(c);
                } else {
                    out.push(c);
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    Some(out)
}

fn render_object(entries: &[(&str, &str)], indent: &str) -> String {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let width = sorted.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

    let mut out = String::from("{\n");
    for (key, value) in sorted {
        out.push_str(&format!(
            "{indent}  {key:<width$} = {}\n",
            quote(value),
            width = width
        ));
    }
    out.push_str(indent);
    out.push('}');
    out
}
