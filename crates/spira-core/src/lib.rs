//! Artifact aggregation core: refresh cycles over the three categories and
//! the tree exposed to consumers.

pub mod aggregator;
pub mod tree;

pub use aggregator::{
    ArtifactAggregator, ArtifactView, CycleId, TreeChanged, CREDENTIALS_ERROR_MESSAGE,
};
pub use tree::{ArtifactTree, TreeItem, SHOW_INFO_COMMAND};
