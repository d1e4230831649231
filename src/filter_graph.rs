//! An in-memory model of an ffmpeg `-filter_complex` graph.
//!
//! Nodes are appended in order and wired together through pads: either a stream of a numbered
//! renderer input (`[2:a]`) or a named label produced by an earlier node (`[bg]`). The graph
//! checks its own wiring as it grows, so a compiled directive never references an undefined
//! label, defines a label twice, or consumes one label from two places.

use std::collections::HashSet;
use std::fmt;

use crate::{Error, Result};

/// Which elementary stream of a renderer input a pad refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn specifier(self) -> char {
        match self {
            StreamKind::Video => 'v',
            StreamKind::Audio => 'a',
        }
    }
}

/// One end of an edge in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pad {
    /// A stream of the renderer input at `index` (in `-i` order).
    Input { index: usize, stream: StreamKind },
    /// A label produced by an earlier node.
    Label(String),
}

impl Pad {
    pub fn video(index: usize) -> Self {
        Pad::Input {
            index,
            stream: StreamKind::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        Pad::Input {
            index,
            stream: StreamKind::Audio,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Pad::Label(name.into())
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pad::Input { index, stream } => write!(f, "[{index}:{}]", stream.specifier()),
            Pad::Label(name) => write!(f, "[{name}]"),
        }
    }
}

/// The role a node plays in a reel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Background,
    AudioConcat,
    ImageScale,
    Overlay,
    Headline,
    Subtitles,
}

/// A single filter chain: input pads, the filter expression, output labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub kind: NodeKind,
    pub inputs: Vec<Pad>,
    pub filter: String,
    pub outputs: Vec<String>,
}

impl FilterNode {
    pub fn new(
        kind: NodeKind,
        inputs: Vec<Pad>,
        filter: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            inputs,
            filter: filter.into(),
            outputs: vec![output.into()],
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "{pad}")?;
        }
        f.write_str(&self.filter)?;
        for out in &self.outputs {
            write!(f, "[{out}]")?;
        }
        Ok(())
    }
}

/// An ordered, validated filter graph.
#[derive(Debug, Clone, Default)]
pub struct FilterGraphSpec {
    nodes: Vec<FilterNode>,
    defined: HashSet<String>,
    consumed: HashSet<String>,
}

impl FilterGraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, rejecting wiring mistakes.
    pub fn push(&mut self, node: FilterNode) -> Result<()> {
        for pad in &node.inputs {
            let Pad::Label(name) = pad else {
                continue;
            };
            if !self.defined.contains(name) {
                return Err(Error::msg(format!(
                    "filter graph label '{name}' is used before it is defined"
                )));
            }
            if self.consumed.contains(name) {
                return Err(Error::msg(format!(
                    "filter graph label '{name}' is consumed more than once"
                )));
            }
        }

        for out in &node.outputs {
            if self.defined.contains(out) {
                return Err(Error::msg(format!(
                    "filter graph label '{out}' is defined twice"
                )));
            }
        }

        for pad in &node.inputs {
            if let Pad::Label(name) = pad {
                self.consumed.insert(name.clone());
            }
        }
        self.defined.extend(node.outputs.iter().cloned());
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &FilterNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Labels that no node consumes; these are the graph's outputs and must be mapped.
    pub fn dangling_labels(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .flat_map(|n| n.outputs.iter())
            .filter(|label| !self.consumed.contains(*label))
            .map(String::as_str)
            .collect()
    }

    /// Serialize into the text passed to `-filter_complex`.
    pub fn to_directive(&self) -> String {
        self.nodes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_render_in_ffmpeg_syntax() {
        assert_eq!(Pad::video(0).to_string(), "[0:v]");
        assert_eq!(Pad::audio(3).to_string(), "[3:a]");
        assert_eq!(Pad::label("bg").to_string(), "[bg]");
    }

    #[test]
    fn directive_joins_nodes_in_order() -> anyhow::Result<()> {
        let mut graph = FilterGraphSpec::new();
        graph.push(FilterNode::new(
            NodeKind::Background,
            vec![Pad::video(0)],
            "scale=1080:1920",
            "bg",
        ))?;
        graph.push(FilterNode::new(
            NodeKind::Subtitles,
            vec![Pad::label("bg")],
            "subtitles='/tmp/s.srt'",
            "v",
        ))?;

        assert_eq!(
            graph.to_directive(),
            "[0:v]scale=1080:1920[bg];[bg]subtitles='/tmp/s.srt'[v]"
        );
        assert_eq!(graph.dangling_labels(), vec!["v"]);
        Ok(())
    }

    #[test]
    fn duplicate_labels_are_rejected() -> anyhow::Result<()> {
        let mut graph = FilterGraphSpec::new();
        graph.push(FilterNode::new(NodeKind::Background, vec![Pad::video(0)], "null", "bg"))?;
        let err = graph
            .push(FilterNode::new(NodeKind::Background, vec![Pad::video(1)], "null", "bg"))
            .unwrap_err();
        assert!(err.to_string().contains("defined twice"));
        assert_eq!(graph.len(), 1);
        Ok(())
    }

    #[test]
    fn undefined_labels_are_rejected() {
        let mut graph = FilterGraphSpec::new();
        let err = graph
            .push(FilterNode::new(NodeKind::Overlay, vec![Pad::label("bg")], "null", "ov0"))
            .unwrap_err();
        assert!(err.to_string().contains("before it is defined"));
        assert!(graph.is_empty());
    }

    #[test]
    fn labels_are_consumed_once() -> anyhow::Result<()> {
        let mut graph = FilterGraphSpec::new();
        graph.push(FilterNode::new(NodeKind::Background, vec![Pad::video(0)], "null", "bg"))?;
        graph.push(FilterNode::new(NodeKind::Subtitles, vec![Pad::label("bg")], "null", "v"))?;
        let err = graph
            .push(FilterNode::new(NodeKind::Overlay, vec![Pad::label("bg")], "null", "v2"))
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
        Ok(())
    }
}
