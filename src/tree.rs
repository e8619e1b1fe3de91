//! Parse tree nodes.
//!
//! A node never stores its text: the range indexes the [`Source`] the tree
//! was built from, so the text is sliced on demand. Skipped and voided text
//! inside the range is recorded as gaps and left out.

use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::ops::Range;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::annotations::RuleAnnotations;
use crate::source::Source;
use crate::token::Token;

/// The read-only contract every node shape offers to tree consumers.
pub trait TreeNode: Clone + fmt::Debug + Send + Sized {
    fn create(
        token: Token,
        range: Range<usize>,
        gaps: Vec<Range<usize>>,
        children: Vec<Self>,
        annotations: &RuleAnnotations,
        source: &Source,
    ) -> Self;

    fn token(&self) -> &Token;

    fn range(&self) -> Range<usize>;

    /// Excluded regions inside the range.
    fn gaps(&self) -> &[Range<usize>];

    fn children(&self) -> &[Self];

    fn annotations(&self) -> &RuleAnnotations;

    fn matched_string<'s>(&self, source: &'s Source) -> Cow<'s, str> {
        source.slice_without(self.range(), self.gaps())
    }

    /// Depth-first search for the first node produced for `name`.
    fn find(&self, name: &str) -> Option<&Self> {
        if self.token().name() == Some(name) {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(name))
    }
}

// ============================================================================
// HOMOGENEOUS NODES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub token: Token,
    pub range: Range<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<Range<usize>>,
    pub children: Vec<Node>,
    #[serde(skip_serializing_if = "RuleAnnotations::is_empty")]
    pub annotations: RuleAnnotations,
}

impl TreeNode for Node {
    fn create(
        token: Token,
        range: Range<usize>,
        gaps: Vec<Range<usize>>,
        children: Vec<Self>,
        annotations: &RuleAnnotations,
        _source: &Source,
    ) -> Self {
        Node {
            token,
            range,
            gaps,
            children,
            annotations: annotations.clone(),
        }
    }

    fn token(&self) -> &Token {
        &self.token
    }

    fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    fn gaps(&self) -> &[Range<usize>] {
        &self.gaps
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn annotations(&self) -> &RuleAnnotations {
        &self.annotations
    }
}

// ============================================================================
// HETEROGENEOUS NODES
// ============================================================================

/// A typed leaf value, chosen by the `@type` annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeValue {
    None,
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl NodeValue {
    /// Converts matched text. `type_name` is the `@type` annotation value;
    /// without one, leaves hold their text and inner nodes hold nothing.
    /// Text that does not convert falls back to a string.
    pub fn from_text(text: &str, type_name: Option<&str>, is_leaf: bool) -> Self {
        let converted = match type_name {
            Some("int") | Some("integer") => text.trim().parse().ok().map(NodeValue::Int),
            Some("double") | Some("float") | Some("number") => {
                text.trim().parse().ok().map(NodeValue::Double)
            }
            Some("bool") | Some("boolean") => text.trim().parse().ok().map(NodeValue::Bool),
            Some("none") | Some("void") => Some(NodeValue::None),
            Some(_) => None,
            None if is_leaf => None,
            None => Some(NodeValue::None),
        };
        converted.unwrap_or_else(|| NodeValue::String(text.to_string()))
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::None => write!(f, "nil"),
            NodeValue::String(s) => write!(f, "{:?}", s),
            NodeValue::Int(i) => write!(f, "{}", i),
            NodeValue::Double(d) => write!(f, "{}", d),
            NodeValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeterogeneousNode {
    pub token: Token,
    pub range: Range<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<Range<usize>>,
    pub value: NodeValue,
    pub children: Vec<HeterogeneousNode>,
    #[serde(skip_serializing_if = "RuleAnnotations::is_empty")]
    pub annotations: RuleAnnotations,
}

impl TreeNode for HeterogeneousNode {
    fn create(
        token: Token,
        range: Range<usize>,
        gaps: Vec<Range<usize>>,
        children: Vec<Self>,
        annotations: &RuleAnnotations,
        source: &Source,
    ) -> Self {
        let value = NodeValue::from_text(
            &source.slice_without(range.clone(), &gaps),
            annotations.type_name(),
            children.is_empty(),
        );
        HeterogeneousNode {
            token,
            range,
            gaps,
            value,
            children,
            annotations: annotations.clone(),
        }
    }

    fn token(&self) -> &Token {
        &self.token
    }

    fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    fn gaps(&self) -> &[Range<usize>] {
        &self.gaps
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn annotations(&self) -> &RuleAnnotations {
        &self.annotations
    }
}

// ============================================================================
// TREES
// ============================================================================

/// The nodes of a completed parse, together with the text they index.
#[derive(Debug, Clone)]
pub struct Tree<N = Node> {
    pub source: Source,
    pub nodes: Vec<N>,
}

impl<N: TreeNode> Tree<N> {
    pub fn new(source: Source, nodes: Vec<N>) -> Self {
        Self { source, nodes }
    }

    /// The first top-level node.
    pub fn root(&self) -> Option<&N> {
        self.nodes.first()
    }

    pub fn text(&self, node: &N) -> Cow<'_, str> {
        node.matched_string(&self.source)
    }

    pub fn find(&self, name: &str) -> Option<&N> {
        self.nodes.iter().find_map(|node| node.find(name))
    }

    /// An indented, one node per line rendering.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            render_node(&mut out, node, &self.source, 0);
        }
        out
    }
}

fn render_node<N: TreeNode>(out: &mut String, node: &N, source: &Source, depth: usize) {
    let range = node.range();
    let _ = write!(out, "{:indent$}{}", "", node.token(), indent = depth * 2);
    if node.children().is_empty() {
        let _ = write!(out, " {:?}", node.matched_string(source));
    }
    let _ = writeln!(out, " [{}..{}]", range.start, range.end);
    for child in node.children() {
        render_node(out, child, source, depth + 1);
    }
}

/// Serializes a node together with its matched text.
struct NodeView<'a, N> {
    node: &'a N,
    source: &'a Source,
}

impl<N: TreeNode> Serialize for NodeView<'_, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let children: Vec<NodeView<'_, N>> = self
            .node
            .children()
            .iter()
            .map(|node| NodeView {
                node,
                source: self.source,
            })
            .collect();
        let range = self.node.range();

        let mut state = serializer.serialize_struct("Node", 5)?;
        state.serialize_field("token", self.node.token())?;
        state.serialize_field("range", &[range.start, range.end])?;
        state.serialize_field("text", &self.node.matched_string(self.source))?;
        state.serialize_field("annotations", self.node.annotations())?;
        state.serialize_field("children", &children)?;
        state.end()
    }
}

impl<N: TreeNode> Serialize for Tree<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.nodes.iter().map(|node| NodeView {
            node,
            source: &self.source,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{RuleAnnotation, RuleAnnotationValue};

    fn token(name: &str) -> Token {
        Token::new(1, name)
    }

    #[test]
    fn typed_leaf_values() {
        let source = Source::new("42 x");
        let typed = RuleAnnotations::new().with(
            RuleAnnotation::Type,
            RuleAnnotationValue::String("int".into()),
        );

        let number = HeterogeneousNode::create(token("n"), 0..2, vec![], vec![], &typed, &source);
        assert_eq!(number.value, NodeValue::Int(42));

        let fallback = HeterogeneousNode::create(token("n"), 3..4, vec![], vec![], &typed, &source);
        assert_eq!(fallback.value, NodeValue::String("x".into()));

        let parent = HeterogeneousNode::create(
            token("p"),
            0..4,
            vec![],
            vec![number],
            &RuleAnnotations::new(),
            &source,
        );
        assert_eq!(parent.value, NodeValue::None);
    }

    #[test]
    fn pretty_rendering() {
        let source = Source::new("ab");
        let none = RuleAnnotations::new();
        let leaf = Node::create(token("a"), 0..1, vec![], vec![], &none, &source);
        let tree = Tree::new(
            source.clone(),
            vec![Node::create(token("pair"), 0..2, vec![], vec![leaf], &none, &source)],
        );

        assert_eq!(tree.pretty(), "pair [0..2]\n  a \"a\" [0..1]\n");
        assert_eq!(tree.find("a").map(|n| tree.text(n)).as_deref(), Some("a"));
    }

    #[test]
    fn json_includes_text() {
        let source = Source::new("hi");
        let tree = Tree::new(
            source.clone(),
            vec![Node::create(
                token("word"),
                0..2,
                vec![],
                vec![],
                &RuleAnnotations::new(),
                &source,
            )],
        );

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["token"], "word");
        assert_eq!(json[0]["text"], "hi");
        assert_eq!(json[0]["range"][1], 2);
    }

    #[test]
    fn gaps_are_left_out_of_text() {
        let source = Source::new("1_000");
        let typed = RuleAnnotations::new().with(
            RuleAnnotation::Type,
            RuleAnnotationValue::String("int".into()),
        );
        let number = HeterogeneousNode::create(token("n"), 0..5, vec![1..2], vec![], &typed, &source);
        assert_eq!(number.value, NodeValue::Int(1000));

        let tree = Tree::new(source.clone(), vec![number]);
        assert_eq!(tree.text(&tree.nodes[0]), "1000");
        assert_eq!(tree.pretty(), "n \"1000\" [0..5]\n");
    }
}
