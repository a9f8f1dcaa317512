//! Shared vocabulary for the Spira artifact radar: the artifact data model,
//! the tree node variant, the polling run flag and the collaborator seams the
//! aggregation core depends on.

pub mod artifact;
pub mod collaborators;
pub mod error;
pub mod run_flag;

pub use artifact::{Artifact, ArtifactNode, ArtifactType, HEADER_KIND};
pub use collaborators::{ArtifactSource, CredentialProvider, SettingsProvider, UserNotifier};
pub use error::CoreError;
pub use run_flag::RunFlag;
