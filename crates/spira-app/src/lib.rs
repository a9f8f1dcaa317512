use std::sync::Arc;

use integration_spira::SpiraArtifactClient;
use spira_config::ConfigStore;
use spira_core::{ArtifactAggregator, ArtifactTree, TreeChanged};
use spira_domain::{
    ArtifactNode, ArtifactSource, CoreError, CredentialProvider, SettingsProvider, UserNotifier,
};
use spira_poller::{PollingController, RefreshTarget};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

mod command_dispatch;

pub use command_dispatch::{
    parse_command_line, Command, HELP_TEXT, REFRESH_COMMAND, SETUP_CREDENTIALS_COMMAND,
};
pub use spira_core::SHOW_INFO_COMMAND;

/// Surfaces user-facing errors on stderr and in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl UserNotifier for ConsoleNotifier {
    fn show_error(&self, message: &str) {
        tracing::error!(notification = message, "reported error to user");
        eprintln!("error: {message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Output(String),
    Silent,
    Quit,
}

pub struct App {
    store: Arc<ConfigStore>,
    tree: ArtifactTree,
    poller: PollingController,
}

impl App {
    /// Wires the REST client, aggregator and poller around the config store.
    pub fn new(
        store: Arc<ConfigStore>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Result<Self, CoreError> {
        let credentials: Arc<dyn CredentialProvider> = store.clone();
        let client = SpiraArtifactClient::new(credentials)?;
        Ok(Self::with_source(store, Arc::new(client), notifier))
    }

    pub fn with_source(
        store: Arc<ConfigStore>,
        source: Arc<dyn ArtifactSource>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        let settings: Arc<dyn SettingsProvider> = store.clone();
        let aggregator =
            ArtifactAggregator::new(source, Arc::clone(&settings), notifier, Default::default());
        let run_flag = aggregator.run_flag().clone();
        let target: Arc<dyn RefreshTarget> = Arc::new(aggregator.clone());
        Self {
            store,
            tree: ArtifactTree::new(aggregator),
            poller: PollingController::new(target, settings, run_flag),
        }
    }

    pub fn tree(&self) -> &ArtifactTree {
        &self.tree
    }

    pub fn poller(&self) -> &PollingController {
        &self.poller
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChanged> {
        self.tree.subscribe()
    }

    pub fn activate(&self) {
        info!(config = %self.store.path().display(), "starting spira artifact polling");
        self.poller.activate();
    }

    pub fn shutdown(&self) {
        self.poller.stop();
    }

    pub fn dispatch(&self, command: Command) -> Result<DispatchOutcome, CoreError> {
        match command {
            Command::Refresh => {
                if let Err(error) = self.store.reload() {
                    warn!(error = %error, "keeping previous configuration after reload failure");
                }
                self.poller.request_refresh();
                Ok(DispatchOutcome::Silent)
            }
            Command::Info {
                category,
                artifact_id: None,
            } => {
                debug!(category = category.as_key(), "ignoring info request for header");
                Ok(DispatchOutcome::Silent)
            }
            Command::Info {
                category,
                artifact_id: Some(artifact_id),
            } => {
                let node = self.tree.find(category, artifact_id).ok_or_else(|| {
                    CoreError::InvalidCommand(format!(
                        "No {} with id {artifact_id} is currently assigned to you.",
                        category.as_key()
                    ))
                })?;
                Ok(DispatchOutcome::Output(render_info(&node)?))
            }
            Command::SetupCredentials {
                url,
                username,
                token,
            } => {
                self.store
                    .update_credentials(&url, &username, &token)
                    .map_err(|error| CoreError::Configuration(error.to_string()))?;
                info!(url = %url.trim(), username = %username.trim(), "saved spira credentials");
                Ok(DispatchOutcome::Output(format!(
                    "Saved Spira credentials to {}. They apply from the next refresh.",
                    self.store.path().display()
                )))
            }
            Command::Tree => Ok(DispatchOutcome::Output(render_tree(&self.tree))),
            Command::Help => Ok(DispatchOutcome::Output(HELP_TEXT.to_owned())),
            Command::Quit => {
                self.shutdown();
                Ok(DispatchOutcome::Quit)
            }
        }
    }
}

fn render_info(node: &ArtifactNode) -> Result<String, CoreError> {
    let Some(artifact) = node.as_artifact() else {
        return Ok(String::new());
    };
    serde_json::to_string_pretty(artifact).map_err(|error| render_error(node, &error))
}

fn render_error(node: &ArtifactNode, error: &serde_json::Error) -> CoreError {
    CoreError::InvalidCommand(format!(
        "Cannot display details of {} {}: {error}",
        node.artifact_type().as_key(),
        node.artifact_id().unwrap_or_default()
    ))
}

/// Plain-text rendering of the whole tree, one header per category with its
/// leaves indented below.
pub fn render_tree(tree: &ArtifactTree) -> String {
    let roots = tree.roots();
    if roots.is_empty() {
        return "No assigned artifacts.".to_owned();
    }

    let mut lines = Vec::new();
    for header in &roots {
        lines.push(tree.tree_item(header).label);
        for leaf in tree.children(Some(header)) {
            let item = tree.tree_item(&leaf);
            let id = leaf.artifact_id().unwrap_or_default();
            match item.tooltip {
                Some(tooltip) => lines.push(format!("  #{id} {} [{tooltip}]", item.label)),
                None => lines.push(format!("  #{id} {}", item.label)),
            }
        }
    }
    lines.join("\n")
}
