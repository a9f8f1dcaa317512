use spira_domain::{ArtifactNode, ArtifactType};
use tokio::sync::broadcast;

use crate::aggregator::{ArtifactAggregator, TreeChanged};

/// Command invoked when a leaf is selected.
pub const SHOW_INFO_COMMAND: &str = "spira.info";

/// Presentation record for one tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    pub label: String,
    pub collapsible: bool,
    pub tooltip: Option<String>,
    pub command: Option<&'static str>,
}

/// Two-level view over the aggregator: root → category headers → artifacts.
#[derive(Clone)]
pub struct ArtifactTree {
    aggregator: ArtifactAggregator,
}

impl ArtifactTree {
    pub fn new(aggregator: ArtifactAggregator) -> Self {
        Self { aggregator }
    }

    pub fn roots(&self) -> Vec<ArtifactNode> {
        self.children(None)
    }

    /// Children of `node`; `None` addresses the root. Always re-read from
    /// the aggregator.
    pub fn children(&self, node: Option<&ArtifactNode>) -> Vec<ArtifactNode> {
        match node {
            None => self
                .aggregator
                .headers()
                .into_iter()
                .map(ArtifactNode::Header)
                .collect(),
            Some(ArtifactNode::Header(category)) => self.leaves(*category),
            Some(ArtifactNode::Leaf(_)) => Vec::new(),
        }
    }

    pub fn leaves(&self, category: ArtifactType) -> Vec<ArtifactNode> {
        self.aggregator
            .category_items(category)
            .into_iter()
            .map(ArtifactNode::Leaf)
            .collect()
    }

    pub fn tree_item(&self, node: &ArtifactNode) -> TreeItem {
        match node {
            ArtifactNode::Header(category) => TreeItem {
                label: category.header_label().to_owned(),
                collapsible: true,
                tooltip: None,
                command: None,
            },
            ArtifactNode::Leaf(artifact) => {
                let tooltip = [artifact.status.as_str(), artifact.priority_name.as_str()]
                    .into_iter()
                    .filter(|value| !value.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(" · ");
                TreeItem {
                    label: artifact.name.clone(),
                    collapsible: false,
                    tooltip: (!tooltip.is_empty()).then_some(tooltip),
                    command: Some(SHOW_INFO_COMMAND),
                }
            }
        }
    }

    /// Fires once per completed cycle; re-query from the root on each event.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeChanged> {
        self.aggregator.subscribe()
    }

    /// Finds a leaf by category and remote identifier.
    pub fn find(&self, category: ArtifactType, artifact_id: i64) -> Option<ArtifactNode> {
        self.leaves(category)
            .into_iter()
            .find(|node| node.artifact_id() == Some(artifact_id))
    }
}
