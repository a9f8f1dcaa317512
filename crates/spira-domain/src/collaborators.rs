use async_trait::async_trait;

use crate::{Artifact, ArtifactType, CoreError};

/// Fetches the artifacts of one category assigned to the configured user.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch_assigned(&self, category: ArtifactType) -> Result<Vec<Artifact>, CoreError>;
}

/// Connection parameters for the remote service. Values may be absent until
/// the user runs the credential setup command.
pub trait CredentialProvider: Send + Sync {
    fn url(&self) -> Option<String>;
    fn username(&self) -> Option<String>;
    fn token(&self) -> Option<String>;
}

pub trait SettingsProvider: Send + Sync {
    fn show_category(&self, category: ArtifactType) -> bool;

    /// Automatic refresh period in seconds. `None` or a value `<= 0` disables
    /// rescheduling.
    fn refresh_interval_secs(&self) -> Option<i64>;
}

/// Surface for messages the user has to act on.
pub trait UserNotifier: Send + Sync {
    fn show_error(&self, message: &str);
}
