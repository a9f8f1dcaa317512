use serde::{Deserialize, Serialize};

/// Literal kind reported by header nodes.
pub const HEADER_KIND: &str = "header";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactType {
    Requirement,
    Task,
    Incident,
}

impl ArtifactType {
    /// Header evaluation order.
    pub const ALL: [ArtifactType; 3] = [
        ArtifactType::Requirement,
        ArtifactType::Task,
        ArtifactType::Incident,
    ];

    pub const fn header_label(self) -> &'static str {
        match self {
            Self::Requirement => "REQUIREMENTS",
            Self::Task => "TASKS",
            Self::Incident => "INCIDENTS",
        }
    }

    /// Collection segment of the REST endpoint serving this category.
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Requirement => "requirements",
            Self::Task => "tasks",
            Self::Incident => "incidents",
        }
    }

    pub const fn as_key(self) -> &'static str {
        match self {
            Self::Requirement => "requirement",
            Self::Task => "task",
            Self::Incident => "incident",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Requirement => 0,
            Self::Task => 1,
            Self::Incident => 2,
        }
    }

    /// Accepts the stable key, the collection name or the header label,
    /// ignoring case.
    pub fn from_key(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|category| {
            normalized == category.as_key()
                || normalized == category.collection()
                || normalized == category.header_label().to_ascii_lowercase()
        })
    }
}

/// One work item assigned to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub artifact_type: ArtifactType,
    pub project_id: i64,
    pub project_name: String,
    pub artifact_id: i64,
    pub description: String,
    pub priority_name: String,
    pub status: String,
    /// Remote category-type name, e.g. `Feature` or `Bug`.
    pub kind: String,
}

/// A node of the two-level artifact tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactNode {
    Header(ArtifactType),
    Leaf(Artifact),
}

impl ArtifactNode {
    pub fn is_header(&self) -> bool {
        matches!(self, Self::Header(_))
    }

    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Self::Header(category) => *category,
            Self::Leaf(artifact) => artifact.artifact_type,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Header(category) => category.header_label(),
            Self::Leaf(artifact) => artifact.name.as_str(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Header(_) => HEADER_KIND,
            Self::Leaf(artifact) => artifact.kind.as_str(),
        }
    }

    /// Remote identifier; headers have none.
    pub fn artifact_id(&self) -> Option<i64> {
        match self {
            Self::Header(_) => None,
            Self::Leaf(artifact) => Some(artifact.artifact_id),
        }
    }

    pub fn project_id(&self) -> i64 {
        match self {
            Self::Header(_) => 0,
            Self::Leaf(artifact) => artifact.project_id,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Header(_) => None,
            Self::Leaf(artifact) => Some(artifact),
        }
    }
}

impl From<Artifact> for ArtifactNode {
    fn from(value: Artifact) -> Self {
        Self::Leaf(value)
    }
}
