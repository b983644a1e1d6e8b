//! GML topology reader.
//!
//! Reads `graph [ directed 0|1 node [...] edge [...] ]` files into a
//! [`GmlGraph`] and converts that into the routing [`Topology`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use color_eyre::eyre::{eyre, Result, WrapErr};
use log::debug;

use crate::topology::{EdgeAttributes, NodeId, Topology};

/// A node in a GML graph
#[derive(Debug, Clone)]
pub struct GmlNode {
    pub id: u32,
    pub label: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl GmlNode {
    /// Routing identifier: the label when present, else the numeric id
    pub fn name(&self) -> NodeId {
        self.label.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// An edge in a GML graph
#[derive(Debug, Clone)]
pub struct GmlEdge {
    pub source: u32,
    pub target: u32,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct GmlGraph {
    pub directed: bool,
    pub nodes: Vec<GmlNode>,
    pub edges: Vec<GmlEdge>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Key(String),
    Number(String),
    Text(String),
    Open,
    Close,
    End,
}

struct Lexer {
    chars: Vec<char>,
    position: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        self.position += 1;
        ch
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == '#' {
                // Comment runs to end of line
                while let Some(ch) = self.bump() {
                    if ch == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn quoted(&mut self) -> Result<String> {
        self.bump();
        let mut text = String::new();
        while let Some(ch) = self.bump() {
            match ch {
                '"' => return Ok(text),
                '\\' => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                    None => break,
                },
                _ => text.push(ch),
            }
        }
        Err(eyre!("Unterminated string literal"))
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '+') {
                word.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();
        let token = match self.peek() {
            None => Token::End,
            Some('[') => {
                self.bump();
                Token::Open
            }
            Some(']') => {
                self.bump();
                Token::Close
            }
            Some('"') => Token::Text(self.quoted()?),
            Some(ch) if ch.is_alphabetic() || ch == '_' => Token::Key(self.word()),
            Some(ch) if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.') => Token::Number(self.word()),
            Some(ch) => return Err(eyre!("Unexpected character '{}' at offset {}", ch, self.position)),
        };
        Ok(token)
    }
}

struct Parser {
    lexer: Lexer,
    current: Token,
}

impl Parser {
    fn new(mut lexer: Lexer) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.current != expected {
            return Err(eyre!("Expected {:?}, found {:?}", expected, self.current));
        }
        self.advance()
    }

    /// Scalar value of a key; nested lists (e.g. `graphics [...]`) yield `None`
    fn value(&mut self) -> Result<Option<String>> {
        match std::mem::replace(&mut self.current, Token::End) {
            Token::Key(value) | Token::Number(value) | Token::Text(value) => {
                self.advance()?;
                Ok(Some(value))
            }
            Token::Open => {
                self.advance()?;
                self.skip_list()?;
                Ok(None)
            }
            other => Err(eyre!("Expected value, found {:?}", other)),
        }
    }

    fn skip_list(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.current {
                Token::Open => depth += 1,
                Token::Close => depth -= 1,
                Token::End => return Err(eyre!("Unterminated list")),
                _ => {}
            }
            self.advance()?;
        }
        Ok(())
    }

    /// `key value` pairs up to the closing bracket of the current list
    fn pairs(&mut self, context: &str) -> Result<HashMap<String, String>> {
        let mut pairs = HashMap::new();
        while self.current != Token::Close {
            let Token::Key(key) = self.current.clone() else {
                return Err(eyre!("Expected attribute name in {}, found {:?}", context, self.current));
            };
            self.advance()?;
            if let Some(value) = self.value()? {
                pairs.insert(key, value);
            }
        }
        self.expect(Token::Close)?;
        Ok(pairs)
    }

    fn node(&mut self) -> Result<GmlNode> {
        self.expect(Token::Open)?;
        let mut attributes = self.pairs("node")?;

        let id = attributes
            .remove("id")
            .ok_or_else(|| eyre!("Node missing required 'id' attribute"))?;
        let id = id.parse::<u32>().map_err(|_| eyre!("Invalid node id: {}", id))?;
        let label = attributes.remove("label");

        Ok(GmlNode { id, label, attributes })
    }

    fn edge(&mut self) -> Result<GmlEdge> {
        self.expect(Token::Open)?;
        let mut attributes = self.pairs("edge")?;

        let mut endpoint = |key: &str| -> Result<u32> {
            let value = attributes
                .remove(key)
                .ok_or_else(|| eyre!("Edge missing required '{}' attribute", key))?;
            value.parse::<u32>().map_err(|_| eyre!("Invalid edge {}: {}", key, value))
        };
        let source = endpoint("source")?;
        let target = endpoint("target")?;

        Ok(GmlEdge {
            source,
            target,
            attributes,
        })
    }

    fn graph(&mut self) -> Result<GmlGraph> {
        self.expect(Token::Key("graph".to_string()))?;
        self.expect(Token::Open)?;

        let mut graph = GmlGraph::default();
        while self.current != Token::Close {
            let Token::Key(keyword) = self.current.clone() else {
                return Err(eyre!("Expected keyword in graph, found {:?}", self.current));
            };
            self.advance()?;
            match keyword.as_str() {
                "node" => graph.nodes.push(self.node()?),
                "edge" => graph.edges.push(self.edge()?),
                _ => {
                    if let Some(value) = self.value()? {
                        graph.attributes.insert(keyword, value);
                    }
                }
            }
        }
        self.expect(Token::Close)?;

        graph.directed = graph
            .attributes
            .get("directed")
            .is_some_and(|value| value.trim() == "1");
        Ok(graph)
    }
}

/// Parse GML text
pub fn parse_gml_str(content: &str) -> Result<GmlGraph> {
    let mut parser = Parser::new(Lexer::new(content))?;
    parser.graph()
}

/// Parse a GML file and return a GmlGraph object
pub fn parse_gml_file(path: &Path) -> Result<GmlGraph> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read GML file '{}'", path.display()))?;
    parse_gml_str(&content).wrap_err_with(|| format!("Failed to parse GML file '{}'", path.display()))
}

/// Check ids and edge endpoints
pub fn validate_topology(graph: &GmlGraph) -> Result<(), String> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for node in &graph.nodes {
        if !ids.insert(node.id) {
            return Err(format!("Duplicate node ID: {}", node.id));
        }
        if !names.insert(node.name()) {
            return Err(format!("Duplicate node label: {}", node.name()));
        }
    }

    for edge in &graph.edges {
        if !ids.contains(&edge.source) {
            return Err(format!("Edge references non-existent source node: {}", edge.source));
        }
        if !ids.contains(&edge.target) {
            return Err(format!("Edge references non-existent target node: {}", edge.target));
        }
    }

    Ok(())
}

/// Bandwidth in Mbit. Plain numbers are taken as Mbit already.
pub fn parse_bandwidth(value: &str) -> Result<f64> {
    let value = value.trim();
    let split = value
        .find(|ch: char| ch.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let number: f64 = number
        .trim()
        .parse()
        .map_err(|_| eyre!("Invalid bandwidth: {}", value))?;
    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "mbit" | "mbps" => 1.0,
        "kbit" | "kbps" => 1e-3,
        "gbit" | "gbps" => 1e3,
        other => return Err(eyre!("Unknown bandwidth unit '{}' in {}", other, value)),
    };
    Ok(number * scale)
}

fn edge_number(edge: &GmlEdge, key: &str, default: f64) -> Result<f64> {
    match edge.attributes.get(key) {
        Some(value) if key == "bandwidth" => parse_bandwidth(value),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| eyre!("Invalid {} '{}' on edge {} -> {}", key, value, edge.source, edge.target)),
        None => Ok(default),
    }
}

/// Build the routing topology. Undirected graphs get one edge per
/// direction for every GML edge.
pub fn to_topology(graph: &GmlGraph) -> Result<Topology> {
    validate_topology(graph).map_err(|e| eyre!(e))?;

    let names: HashMap<u32, NodeId> = graph.nodes.iter().map(|node| (node.id, node.name())).collect();
    let mut topology = Topology::new();
    for node in &graph.nodes {
        topology.add_node(node.name());
    }

    for edge in &graph.edges {
        let attributes = EdgeAttributes::new(
            edge_number(edge, "weight", 1.0)?,
            edge_number(edge, "bandwidth", 1.0)?,
        );
        let (source, target) = (&names[&edge.source], &names[&edge.target]);
        topology.add_edge(source.as_str(), target.as_str(), attributes.clone());
        if !graph.directed && source != target {
            topology.add_edge(target.as_str(), source.as_str(), attributes);
        }
    }

    debug!(
        "Loaded {} topology with {} nodes and {} edges",
        if graph.directed { "directed" } else { "undirected" },
        topology.number_of_nodes(),
        topology.number_of_edges()
    );
    Ok(topology)
}

/// Read a GML file straight into a topology
pub fn load_topology(path: &Path) -> Result<Topology> {
    let graph = parse_gml_file(path)?;
    to_topology(&graph).wrap_err_with(|| format!("Invalid topology in '{}'", path.display()))
}
