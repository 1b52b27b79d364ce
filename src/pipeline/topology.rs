//! Declarative processing topology: nodes, properties and link order

use std::collections::HashSet;
use std::fmt;

use crate::error::{HeadcountError, HeadcountResult};

/// What a node does in the graph, independent of the element factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Capture,
    RawFormatFilter,
    GenericConvert,
    AcceleratedConvert,
    NvmmCapsFilter,
    FileRead,
    Parse,
    Decode,
    Batcher,
    Inference,
    PostConvert,
    Osd,
    HardwareTransform,
    RenderSink,
}

/// Property value, rendered to the string form GStreamer deserializes
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    UInt(u64),
    Int(i64),
    Bool(bool),
    Caps(String),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) | PropValue::Caps(s) => write!(f, "{}", s),
            PropValue::UInt(v) => write!(f, "{}", v),
            PropValue::Int(v) => write!(f, "{}", v),
            PropValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub factory: String,
    pub role: NodeRole,
    pub properties: Vec<(String, PropValue)>,
}

impl NodeSpec {
    pub fn property(&self, key: &str) -> Option<&PropValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Element-level link through always-present pads
    Static,
    /// Upstream `src` pad onto a pad requested from the downstream node
    RequestPad(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub upstream: String,
    pub downstream: String,
    pub kind: LinkKind,
}

/// Muxer pad the single source stream is attached to
pub const BATCHER_SINK_PAD: &str = "sink_0";

/// The complete graph for one run. Built once by the planner, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphTopology {
    name: String,
    nodes: Vec<NodeSpec>,
    links: Vec<LinkSpec>,
    probe_node: String,
}

impl GraphTopology {
    /// Join a source chain to a sink chain. Links follow node order inside
    /// each chain; the source tail feeds the sink head through a requested pad.
    pub(crate) fn assemble(
        name: &str,
        source_chain: Vec<NodeSpec>,
        sink_chain: Vec<NodeSpec>,
        probe_role: NodeRole,
    ) -> HeadcountResult<Self> {
        let (Some(source_tail), Some(sink_head)) = (source_chain.last(), sink_chain.first())
        else {
            return Err(HeadcountError::InvalidTopology(
                "source and sink chains must not be empty".to_string(),
            ));
        };

        let mut links = chain_links(&source_chain);
        links.push(LinkSpec {
            upstream: source_tail.name.clone(),
            downstream: sink_head.name.clone(),
            kind: LinkKind::RequestPad(BATCHER_SINK_PAD.to_string()),
        });
        links.extend(chain_links(&sink_chain));

        let probe_node = sink_chain
            .iter()
            .find(|node| node.role == probe_role)
            .map(|node| node.name.clone())
            .ok_or_else(|| {
                HeadcountError::InvalidTopology(format!("no {:?} node to probe", probe_role))
            })?;

        let mut nodes = source_chain;
        nodes.extend(sink_chain);

        let topology = Self {
            name: name.to_string(),
            nodes,
            links,
            probe_node,
        };
        topology.validate()?;
        Ok(topology)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    /// Node whose sink pad receives the batch metadata probe
    pub fn probe_node(&self) -> &str {
        &self.probe_node
    }

    pub fn roles(&self) -> Vec<NodeRole> {
        self.nodes.iter().map(|node| node.role).collect()
    }

    pub fn contains(&self, role: NodeRole) -> bool {
        self.nodes.iter().any(|node| node.role == role)
    }

    pub fn count(&self, role: NodeRole) -> usize {
        self.nodes.iter().filter(|node| node.role == role).count()
    }

    pub fn position(&self, role: NodeRole) -> Option<usize> {
        self.nodes.iter().position(|node| node.role == role)
    }

    pub fn node(&self, role: NodeRole) -> Option<&NodeSpec> {
        self.nodes.iter().find(|node| node.role == role)
    }

    /// Unique node names, every link endpoint declared, probe node present
    pub fn validate(&self) -> HeadcountResult<()> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(HeadcountError::InvalidTopology(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }
        for link in &self.links {
            for end in [&link.upstream, &link.downstream] {
                if !names.contains(end.as_str()) {
                    return Err(HeadcountError::InvalidTopology(format!(
                        "link references undeclared node '{}'",
                        end
                    )));
                }
            }
        }
        if !names.contains(self.probe_node.as_str()) {
            return Err(HeadcountError::InvalidTopology(format!(
                "probe node '{}' is not part of the graph",
                self.probe_node
            )));
        }
        Ok(())
    }
}

fn chain_links(chain: &[NodeSpec]) -> Vec<LinkSpec> {
    chain
        .windows(2)
        .map(|pair| LinkSpec {
            upstream: pair[0].name.clone(),
            downstream: pair[1].name.clone(),
            kind: LinkKind::Static,
        })
        .collect()
}

impl fmt::Display for GraphTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for node in &self.nodes {
            write!(f, "  {} ({})", node.name, node.factory)?;
            for (key, value) in &node.properties {
                write!(f, " {}={}", key, value)?;
            }
            writeln!(f)?;
        }
        for link in &self.links {
            match &link.kind {
                LinkKind::Static => writeln!(f, "  {} -> {}", link.upstream, link.downstream)?,
                LinkKind::RequestPad(pad) => {
                    writeln!(f, "  {} -> {}.{}", link.upstream, link.downstream, pad)?
                }
            }
        }
        Ok(())
    }
}
