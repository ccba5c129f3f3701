//! Unit-language grammar binding

use crate::error::CompileError;
use tree_sitter::{Node, Parser, Tree};

/// Language synthesized units are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    /// Restricted Python subset
    #[default]
    Python,
}

impl Language {
    /// Tree-sitter grammar for the language
    #[inline]
    #[must_use]
    pub fn tree_sitter_language(&self) -> tree_sitter::Language {
        match self {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
        }
    }

    /// Parse `source` into a concrete syntax tree
    ///
    /// A tree is returned even when it contains error nodes; callers decide
    /// whether that is acceptable (see [`first_error`]).
    ///
    /// # Errors
    /// Returns error if the grammar cannot be loaded or parsing is aborted
    pub fn parse(&self, source: &str) -> Result<Tree, CompileError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.tree_sitter_language())
            .map_err(|e| CompileError::parse(0, format!("grammar unavailable: {e}")))?;
        parser
            .parse(source, None)
            .ok_or_else(|| CompileError::parse(0, "parser returned no tree"))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => f.write_str("Python"),
        }
    }
}

/// 1-based line of a node
#[inline]
#[must_use]
pub fn line_of(node: &Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Text of a node
#[inline]
#[must_use]
pub fn text_of<'s>(node: &Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// First error or missing node in the tree, depth first
#[must_use]
pub fn first_error<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error).or(Some(node))
}

/// Named children of a node, without comments
#[must_use]
pub fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Every child of a node, anonymous tokens included, without comments
#[must_use]
pub fn all_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_function() {
        let tree = Language::Python.parse("def f(a):\n    return a\n").unwrap();
        let root = tree.root_node();
        assert_eq!(root.kind(), "module");
        assert!(first_error(root).is_none());
        let defs = named_children(&root);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind(), "function_definition");
    }

    #[test]
    fn reports_error_line() {
        let tree = Language::Python.parse("def f(a):\n    return (a +\n").unwrap();
        let err = first_error(tree.root_node()).unwrap();
        assert!(line_of(&err) >= 1);
    }

    #[test]
    fn comments_are_skipped() {
        let source = "# leading\ndef f():\n    return 1\n";
        let tree = Language::Python.parse(source).unwrap();
        let root = tree.root_node();
        let kinds: Vec<_> = named_children(&root).iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["function_definition"]);
        assert_eq!(text_of(&named_children(&root)[0], source).lines().next(), Some("def f():"));
    }
}
