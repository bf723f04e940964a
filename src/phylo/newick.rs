use super::node::Kind;
use super::node::Node;
use super::tree::Phylogeny;
use crate::error::Error;
use petgraph::graph::NodeIndex;

/// newick text with branch lengths and optional bracketed taxon group
/// ids, `(chimp:6[1],human:6[1])`. parse and write round trip
/// topology, names, branch lengths, and taxon ids.

pub fn parse(text: &str) -> Result<Phylogeny, Error> {
    parse_named(text, "<newick>")
}

pub fn parse_named(text: &str, file: &str) -> Result<Phylogeny, Error> {
    let mut cursor = Cursor {
        text: text.trim().as_bytes(),
        at: 0,
        file,
    };
    let sprout = cursor.node()?;
    cursor.eat(b';');
    cursor.finished()?;
    let mut tree = Phylogeny::new(sprout.node);
    let root = tree.root();
    graft(&mut tree, root, sprout.children);
    Ok(tree)
}

pub fn write(tree: &Phylogeny) -> String {
    let mut out = String::new();
    write_node(tree, tree.root(), true, &mut out);
    out.push(';');
    out
}

struct Sprout {
    node: Node,
    children: Vec<Sprout>,
}

fn graft(tree: &mut Phylogeny, parent: NodeIndex, children: Vec<Sprout>) {
    for sprout in children {
        let child = tree.attach(parent, sprout.node);
        graft(tree, child, sprout.children);
    }
}

fn write_node(tree: &Phylogeny, index: NodeIndex, is_root: bool, out: &mut String) {
    let node = tree.node(index);
    match &node.kind {
        Kind::Leaf { species, .. } => out.push_str(species),
        Kind::Internal { label } => {
            out.push('(');
            for (nth, child) in tree.children(index).into_iter().enumerate() {
                if nth > 0 {
                    out.push(',');
                }
                write_node(tree, child, false, out);
            }
            out.push(')');
            if let Some(label) = label {
                out.push_str(label);
            }
        }
    }
    if !is_root {
        out.push(':');
        out.push_str(&format!("{}", node.branch));
        if node.taxon != 0 {
            out.push_str(&format!("[{}]", node.taxon));
        }
    }
}

struct Cursor<'a> {
    text: &'a [u8],
    at: usize,
    file: &'a str,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.text.get(self.at).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), Error> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.fail(format!("expected '{}'", byte as char)))
        }
    }

    fn fail(&self, what: String) -> Error {
        let line = 1 + self.text[..self.at].iter().filter(|b| **b == b'\n').count();
        Error::parse(self.file, line, format!("{} at byte {}", what, self.at))
    }

    fn finished(&self) -> Result<(), Error> {
        if self.at == self.text.len() {
            Ok(())
        } else {
            Err(self.fail("trailing input".to_string()))
        }
    }

    fn node(&mut self) -> Result<Sprout, Error> {
        let children = if self.peek() == Some(b'(') {
            self.children()?
        } else {
            Vec::new()
        };
        let name = self.name();
        let branch = if self.eat(b':') { self.number()? } else { 0.0 };
        let taxon = if self.eat(b'[') { self.taxon()? } else { 0 };
        if branch < 0.0 {
            return Err(self.fail(format!("negative branch length {}", branch)));
        }
        let mut node = if children.is_empty() {
            if name.is_empty() {
                return Err(self.fail("leaf without a name".to_string()));
            }
            Node::leaf(name, branch)
        } else {
            let mut node = Node::internal(branch);
            if !name.is_empty() {
                node.kind = Kind::Internal { label: Some(name) };
            }
            node
        };
        node.taxon = taxon;
        Ok(Sprout { node, children })
    }

    fn children(&mut self) -> Result<Vec<Sprout>, Error> {
        self.expect(b'(')?;
        let mut children = vec![self.node()?];
        while self.eat(b',') {
            children.push(self.node()?);
        }
        self.expect(b')')?;
        Ok(children)
    }

    fn name(&mut self) -> String {
        let from = self.at;
        while let Some(byte) = self.peek() {
            if matches!(byte, b':' | b',' | b'(' | b')' | b'[' | b']' | b';') {
                break;
            }
            self.at += 1;
        }
        String::from_utf8_lossy(&self.text[from..self.at])
            .trim()
            .to_string()
    }

    fn number(&mut self) -> Result<f64, Error> {
        let from = self.at;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E') {
                self.at += 1;
            } else {
                break;
            }
        }
        let token = String::from_utf8_lossy(&self.text[from..self.at]).to_string();
        token
            .parse::<f64>()
            .map_err(|_| self.fail(format!("bad branch length '{}'", token)))
    }

    fn taxon(&mut self) -> Result<i64, Error> {
        let from = self.at;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'0'..=b'9' | b'-' | b'+') {
                self.at += 1;
            } else {
                break;
            }
        }
        let token = String::from_utf8_lossy(&self.text[from..self.at]).to_string();
        let taxon = token
            .parse::<i64>()
            .map_err(|_| self.fail(format!("bad taxon id '{}'", token)))?;
        self.expect(b']')?;
        Ok(taxon)
    }
}
