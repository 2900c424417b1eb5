//! Newick tree text, read and written against the canonical numbering.
//!
//! Parsing assigns tip ids left to right and internal ids in preorder, so a
//! parsed tree always passes [`crate::tree::validate::check_edges`] unless
//! the file itself is inconsistent (duplicate labels, negative lengths).
//! Bracketed comments are skipped; quoted labels keep their spacing, with
//! `''` as the embedded-quote escape.

use thiserror::Error;

use crate::tree::{Edge, PhyloTree};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NewickError {
    #[error("empty input")]
    Empty,
    #[error("tree text must start with '(' (byte {pos})")]
    RootNotGroup { pos: usize },
    #[error("expected ',' or ')' at byte {pos}")]
    UnbalancedParens { pos: usize },
    #[error("expected a taxon label at byte {pos}")]
    MissingLabel { pos: usize },
    #[error("malformed branch length at byte {pos}")]
    BadNumber { pos: usize },
    #[error("missing ';' at byte {pos}")]
    MissingSemicolon { pos: usize },
    #[error("unexpected text after ';' at byte {pos}")]
    TrailingInput { pos: usize },
    #[error("unterminated quoted label starting at byte {pos}")]
    UnterminatedQuote { pos: usize },
    #[error("unterminated comment starting at byte {pos}")]
    UnterminatedComment { pos: usize },
    #[error("some branches have lengths and some do not")]
    PartialLengths,
}

#[derive(Default)]
struct TmpNode {
    label: Option<String>,
    children: Vec<usize>,
    length: Option<f64>,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    // Whitespace and [bracketed comments] can appear between any tokens.
    fn skip_trivia(&mut self) -> Result<(), NewickError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'[') => {
                    let start = self.pos;
                    self.pos += 1;
                    let mut closed = false;
                    while let Some(b) = self.peek() {
                        self.pos += 1;
                        if b == b']' {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(NewickError::UnterminatedComment { pos: start });
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_label(&mut self) -> Result<Option<String>, NewickError> {
        self.skip_trivia()?;
        if self.peek() == Some(b'\'') {
            let start = self.pos;
            self.pos += 1;
            let mut out = String::new();
            loop {
                let rest = &self.src.as_bytes()[self.pos..];
                match rest.iter().position(|&b| b == b'\'') {
                    None => return Err(NewickError::UnterminatedQuote { pos: start }),
                    Some(q) => {
                        out.push_str(&self.src[self.pos..self.pos + q]);
                        self.pos += q + 1;
                        if self.peek() == Some(b'\'') {
                            out.push('\'');
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            return Ok(Some(out));
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b"()[],;:'\"".contains(&b) || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            Ok(None)
        } else {
            Ok(Some(self.src[start..self.pos].to_string()))
        }
    }

    fn parse_number(&mut self) -> Result<f64, NewickError> {
        self.skip_trivia()?;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map_err(|_| NewickError::BadNumber { pos: start })
    }

    fn parse_subtree(&mut self, arena: &mut Vec<TmpNode>) -> Result<usize, NewickError> {
        self.skip_trivia()?;
        let idx = if self.peek() == Some(b'(') {
            self.pos += 1;
            let node = arena.len();
            arena.push(TmpNode::default());
            let mut children = Vec::new();
            loop {
                let child = self.parse_subtree(arena)?;
                children.push(child);
                self.skip_trivia()?;
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(NewickError::UnbalancedParens { pos: self.pos }),
                }
            }
            arena[node].children = children;
            // internal labels (support values, usually) are not kept
            let _ = self.parse_label()?;
            node
        } else {
            let label = match self.parse_label()? {
                Some(l) => l,
                None => return Err(NewickError::MissingLabel { pos: self.pos }),
            };
            let node = arena.len();
            arena.push(TmpNode {
                label: Some(label),
                children: Vec::new(),
                length: None,
            });
            node
        };
        self.skip_trivia()?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            let value = self.parse_number()?;
            arena[idx].length = Some(value);
        }
        Ok(idx)
    }
}

/// Parse one Newick tree.
pub fn parse(text: &str) -> Result<PhyloTree, NewickError> {
    let mut parser = Parser { src: text, pos: 0 };
    parser.skip_trivia()?;
    if parser.peek().is_none() {
        return Err(NewickError::Empty);
    }
    if parser.peek() != Some(b'(') {
        return Err(NewickError::RootNotGroup { pos: parser.pos });
    }
    let mut arena: Vec<TmpNode> = Vec::new();
    let root = parser.parse_subtree(&mut arena)?;
    parser.skip_trivia()?;
    match parser.peek() {
        Some(b';') => parser.pos += 1,
        _ => return Err(NewickError::MissingSemicolon { pos: parser.pos }),
    }
    parser.skip_trivia()?;
    if parser.peek().is_some() {
        return Err(NewickError::TrailingInput { pos: parser.pos });
    }
    build(arena, root)
}

fn build(arena: Vec<TmpNode>, root: usize) -> Result<PhyloTree, NewickError> {
    let n = arena.iter().filter(|t| t.children.is_empty()).count() as u32;
    let any_length = arena
        .iter()
        .enumerate()
        .any(|(i, t)| i != root && t.length.is_some());
    if any_length {
        for (i, t) in arena.iter().enumerate() {
            if i != root && t.length.is_none() {
                return Err(NewickError::PartialLengths);
            }
        }
    }

    let mut edges: Vec<Edge> = Vec::with_capacity(arena.len().saturating_sub(1));
    let mut lens: Vec<f64> = Vec::new();
    let mut tip_labels: Vec<String> = Vec::with_capacity(n as usize);
    let mut id_of: Vec<u32> = vec![0; arena.len()];
    let mut next_tip = 0u32;
    let mut next_internal = n + 1;
    id_of[root] = next_internal;

    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    while let Some((node, child_idx)) = stack.pop() {
        if child_idx >= arena[node].children.len() {
            continue;
        }
        let child = arena[node].children[child_idx];
        stack.push((node, child_idx + 1));
        let cid = if arena[child].children.is_empty() {
            next_tip += 1;
            tip_labels.push(arena[child].label.clone().unwrap_or_default());
            next_tip
        } else {
            next_internal += 1;
            next_internal
        };
        id_of[child] = cid;
        edges.push(Edge::new(id_of[node], cid));
        if any_length {
            lens.push(arena[child].length.unwrap_or(0.0));
        }
        stack.push((child, 0));
    }

    Ok(PhyloTree {
        edges,
        edge_lengths: if any_length { Some(lens) } else { None },
        tip_labels,
        internal_count: next_internal - n,
        root_edge: arena[root].length,
    })
}

fn needs_quoting(label: &str) -> bool {
    label.is_empty()
        || label
            .chars()
            .any(|c| c.is_whitespace() || "()[]:;,'\"".contains(c))
}

fn escape_label(label: &str) -> String {
    if needs_quoting(label) {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

/// Render a tree as Newick text. Assumes the tree passes `check_edges`;
/// edge rows drive the child order.
pub fn write(tree: &PhyloTree) -> String {
    let mut out = String::new();
    write_node(tree, tree.root_id(), &mut out);
    if let Some(stem) = tree.root_edge {
        out.push(':');
        out.push_str(&format!("{}", stem));
    }
    out.push(';');
    out
}

fn write_node(tree: &PhyloTree, node: u32, out: &mut String) {
    if let Some(label) = tree.tip_label(node) {
        out.push_str(&escape_label(label));
        return;
    }
    out.push('(');
    let children: Vec<u32> = tree.children(node).collect();
    for (i, &child) in children.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_node(tree, child, out);
        if let Some(lens) = &tree.edge_lengths {
            if let Some(row) = tree.edge_index(node, child) {
                if let Some(len) = lens.get(row) {
                    out.push(':');
                    out.push_str(&format!("{}", len));
                }
            }
        }
    }
    out.push(')');
}
