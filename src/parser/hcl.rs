//! HCL configuration parser
//!
//! Builds the editable [`ConfigFile`] tree from a tree-sitter HCL syntax
//! tree. Only blocks are kept at the top level; attributes are kept inside
//! blocks together with the byte spans needed to rewrite them in place.

use std::ops::Range;
use std::path::Path;

use indexmap::IndexMap;
use tree_sitter::Node;
use tracing::warn;

use crate::config::CONFIG_FILE_SUFFIX;
use crate::parser::traits::{ConfigParser, ParseError};
use crate::parser::types::{Attribute, Block, BlockLayout, ConfigFile, unquote};

/// Parser for `.tf` files
pub struct HclParser;

impl HclParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HclParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigParser for HclParser {
    fn can_parse(&self, file_name: &str) -> bool {
        file_name.ends_with(CONFIG_FILE_SUFFIX)
    }

    fn parse(&self, path: &Path, content: &str) -> Result<ConfigFile, ParseError> {
        let mut parser = tree_sitter::Parser::new();
        let language = tree_sitter_hcl::LANGUAGE;
        parser.set_language(&language.into()).map_err(|e| {
            warn!("Failed to set HCL language for tree-sitter: {}", e);
            ParseError::TreeSitter(e.to_string())
        })?;

        let tree = parser.parse(content, None).ok_or_else(|| {
            warn!("Failed to parse HCL content");
            ParseError::ParseFailed(format!("Failed to parse {}", path.display()))
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let position = first_error(root)
                .map(|node| node.start_position())
                .unwrap_or_else(|| root.start_position());
            return Err(ParseError::InvalidSyntax(format!(
                "{}:{}:{}",
                path.display(),
                position.row + 1,
                position.column + 1
            )));
        }

        let mut blocks = Vec::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() == "body" {
                let mut attributes = IndexMap::new();
                self.parse_body(child, content, &mut attributes, &mut blocks);
            }
        }

        Ok(ConfigFile::new(
            path.to_path_buf(),
            content.to_string(),
            blocks,
        ))
    }
}

impl HclParser {
    fn parse_body(
        &self,
        body: Node,
        content: &str,
        attributes: &mut IndexMap<String, Attribute>,
        blocks: &mut Vec<Block>,
    ) {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            match child.kind() {
                "attribute" => {
                    if let Some(attribute) = self.parse_attribute(child, content) {
                        attributes.insert(attribute.name().to_string(), attribute);
                    }
                }
                "block" => blocks.push(self.parse_block(child, content)),
                _ => {}
            }
        }
    }

    fn parse_block(&self, node: Node, content: &str) -> Block {
        let mut kind: Option<String> = None;
        let mut labels = Vec::new();
        let mut attributes = IndexMap::new();
        let mut blocks = Vec::new();
        let mut block_end: Option<usize> = None;

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let text = &content[child.byte_range()];
            match child.kind() {
                "identifier" if kind.is_none() => kind = Some(text.to_string()),
                "identifier" => labels.push(text.to_string()),
                "string_lit" => labels.push(
                    unquote(text).unwrap_or_else(|| text.trim_matches('"').to_string()),
                ),
                "body" => self.parse_body(child, content, &mut attributes, &mut blocks),
                "block_end" => block_end = Some(child.start_byte()),
                _ => {}
            }
        }

        let indent = line_indent(content, node.start_byte());
        let attribute_indent = attributes
            .values()
            .next()
            .map(|attr| attr.indent().to_string())
            .unwrap_or_else(|| format!("{indent}  "));

        let close = block_end.unwrap_or_else(|| node.end_byte().saturating_sub(1));
        let close_line = line_start(content, close);
        let layout = if close_line > node.start_byte() && content[close_line..close].trim().is_empty()
        {
            BlockLayout {
                insert_at: close_line,
                inline_close: false,
                indent,
                attribute_indent,
            }
        } else {
            BlockLayout {
                insert_at: close,
                inline_close: true,
                indent,
                attribute_indent,
            }
        };

        Block::new(
            kind.unwrap_or_default(),
            labels,
            attributes,
            blocks,
            layout,
        )
    }

    fn parse_attribute(&self, node: Node, content: &str) -> Option<Attribute> {
        let mut name: Option<String> = None;
        let mut expression: Option<Node> = None;

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "identifier" if name.is_none() => {
                    name = Some(content[child.byte_range()].to_string());
                }
                "expression" => expression = Some(child),
                _ => {}
            }
        }

        let name = name?;
        let expression = expression?;

        Some(Attribute::new(
            name,
            content[expression.byte_range()].to_string(),
            content[node.byte_range()].to_string(),
            object_entries(expression, content),
            expression.byte_range(),
            line_span(content, node.byte_range()),
            line_indent(content, node.start_byte()),
        ))
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

/// Elements of an object expression as (unquoted key, raw value)
fn object_entries(expression: Node, content: &str) -> Vec<(String, String)> {
    let Some(object) = find_object(expression) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut cursor = object.walk();
    for element in object.named_children(&mut cursor) {
        if element.kind() != "object_elem" {
            continue;
        }

        let mut element_cursor = element.walk();
        let parts: Vec<Node> = element
            .named_children(&mut element_cursor)
            .filter(|n| n.kind() != "comment")
            .collect();
        let (Some(key), Some(value)) = (parts.first(), parts.last()) else {
            continue;
        };
        if parts.len() < 2 {
            continue;
        }

        let key_text = &content[key.byte_range()];
        let key = unquote(key_text).unwrap_or_else(|| key_text.trim().to_string());
        entries.push((key, content[value.byte_range()].to_string()));
    }

    entries
}

fn find_object(node: Node) -> Option<Node> {
    match node.kind() {
        "object" => Some(node),
        "expression" | "collection_value" => {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            children.into_iter().find_map(find_object)
        }
        _ => None,
    }
}

fn line_start(content: &str, offset: usize) -> usize {
    content[..offset].rfind('\n').map_or(0, |i| i + 1)
}

/// Leading whitespace of the line at `offset`, empty if other text precedes it
fn line_indent(content: &str, offset: usize) -> String {
    let prefix = &content[line_start(content, offset)..offset];
    if prefix.chars().all(char::is_whitespace) {
        prefix.to_string()
    } else {
        String::new()
    }
}

/// Span to delete when removing the node at `range`: whole lines when the
/// node stands alone on them, including a trailing line comment.
fn line_span(content: &str, range: Range<usize>) -> Range<usize> {
    let start_of_line = line_start(content, range.start);
    let alone_before = content[start_of_line..range.start].trim().is_empty();

    if content[..range.end].ends_with('\n') {
        return if alone_before {
            start_of_line..range.end
        } else {
            range
        };
    }

    let end_of_line = content[range.end..]
        .find('\n')
        .map_or(content.len(), |i| range.end + i + 1);
    let rest = content[range.end..end_of_line].trim();
    let alone_after = rest.is_empty() || rest.starts_with('#') || rest.starts_with("//");

    if alone_before && alone_after {
        start_of_line..end_of_line
    } else {
        range
    }
}
