use std::sync::{Arc, RwLock};

use spira_domain::{
    Artifact, ArtifactSource, ArtifactType, CoreError, RunFlag, SettingsProvider, UserNotifier,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const CREDENTIALS_ERROR_MESSAGE: &str =
    "Please verify your credentials and try again. Check them by running 'spira.setupCredentials'.";

const CHANGE_BUFFER_CAPACITY: usize = 16;

pub type CycleId = u64;

/// Fired whenever the published tree was replaced as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeChanged;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CategorySlot {
    enabled: bool,
    items: Vec<Artifact>,
    failed: bool,
    settled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CycleRecord {
    id: CycleId,
    slots: [CategorySlot; 3],
    completed: bool,
}

impl CycleRecord {
    fn all_settled(&self) -> bool {
        self.slots.iter().all(|slot| slot.settled)
    }

    /// True when at least one category is enabled and every enabled one failed.
    fn all_enabled_failed(&self) -> bool {
        let mut enabled = self.slots.iter().filter(|slot| slot.enabled).peekable();
        enabled.peek().is_some() && enabled.all(|slot| slot.failed)
    }

    fn slot_mut(&mut self, category: ArtifactType) -> &mut CategorySlot {
        &mut self.slots[category.index()]
    }
}

/// State of the last completed cycle; the only state tree readers see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactView {
    pub headers: Vec<ArtifactType>,
    items: [Vec<Artifact>; 3],
}

impl ArtifactView {
    fn from_cycle(cycle: &CycleRecord) -> Self {
        let items = [
            cycle.slots[0].items.clone(),
            cycle.slots[1].items.clone(),
            cycle.slots[2].items.clone(),
        ];
        let headers = ArtifactType::ALL
            .into_iter()
            .filter(|category| !items[category.index()].is_empty())
            .collect();
        Self { headers, items }
    }

    pub fn items(&self, category: ArtifactType) -> &[Artifact] {
        &self.items[category.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[derive(Debug, Default)]
struct AggregatorState {
    cycle: CycleRecord,
    view: ArtifactView,
}

enum CycleOutcome {
    Pending,
    Published,
    TotalFailure,
}

/// Owns the three category collections and merges them into one view per
/// refresh cycle.
#[derive(Clone)]
pub struct ArtifactAggregator {
    source: Arc<dyn ArtifactSource>,
    settings: Arc<dyn SettingsProvider>,
    notifier: Arc<dyn UserNotifier>,
    run_flag: RunFlag,
    state: Arc<RwLock<AggregatorState>>,
    changes: broadcast::Sender<TreeChanged>,
}

impl ArtifactAggregator {
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        settings: Arc<dyn SettingsProvider>,
        notifier: Arc<dyn UserNotifier>,
        run_flag: RunFlag,
    ) -> Self {
        let (changes, _receiver) = broadcast::channel(CHANGE_BUFFER_CAPACITY);
        Self {
            source,
            settings,
            notifier,
            run_flag,
            state: Arc::new(RwLock::new(AggregatorState::default())),
            changes,
        }
    }

    pub fn run_flag(&self) -> &RunFlag {
        &self.run_flag
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChanged> {
        self.changes.subscribe()
    }

    pub fn current_cycle(&self) -> CycleId {
        self.state
            .read()
            .expect("aggregator state read lock")
            .cycle
            .id
    }

    pub fn headers(&self) -> Vec<ArtifactType> {
        self.state
            .read()
            .expect("aggregator state read lock")
            .view
            .headers
            .clone()
    }

    pub fn category_items(&self, category: ArtifactType) -> Vec<Artifact> {
        self.state
            .read()
            .expect("aggregator state read lock")
            .view
            .items(category)
            .to_vec()
    }

    pub fn view(&self) -> ArtifactView {
        self.state
            .read()
            .expect("aggregator state read lock")
            .view
            .clone()
    }

    /// Starts a new cycle and spawns one fetch per enabled category.
    ///
    /// Must be called from within a tokio runtime. Returns without waiting
    /// for any fetch; completions of older cycles are ignored from now on.
    pub fn refresh(&self) -> CycleId {
        self.start_cycle(false)
    }

    /// Raises the run flag and starts a new cycle under one lock, so a
    /// completion of an older cycle can never lower the flag afterwards.
    pub fn resume_and_refresh(&self) -> CycleId {
        self.start_cycle(true)
    }

    fn start_cycle(&self, resume: bool) -> CycleId {
        let enabled = ArtifactType::ALL.map(|category| self.settings.show_category(category));

        let (cycle_id, outcome) = {
            let mut state = self.state.write().expect("aggregator state write lock");
            if resume {
                self.run_flag.resume();
            }
            let id = state.cycle.id.wrapping_add(1);
            state.cycle = CycleRecord {
                id,
                slots: enabled.map(|enabled| CategorySlot {
                    enabled,
                    items: Vec::new(),
                    failed: false,
                    settled: !enabled,
                }),
                completed: false,
            };
            let outcome = if state.cycle.all_settled() {
                publish_cycle(&mut state)
            } else {
                CycleOutcome::Pending
            };
            (id, outcome)
        };
        debug!(cycle_id, ?enabled, "starting artifact refresh cycle");

        for category in ArtifactType::ALL {
            if !enabled[category.index()] {
                continue;
            }
            let aggregator = self.clone();
            tokio::spawn(async move {
                let outcome = aggregator.source.fetch_assigned(category).await;
                aggregator.on_category_fetch_result(cycle_id, category, outcome);
            });
        }

        self.announce(cycle_id, outcome);
        cycle_id
    }

    /// Applies one category completion to the cycle it belongs to.
    pub fn on_category_fetch_result(
        &self,
        cycle_id: CycleId,
        category: ArtifactType,
        outcome: Result<Vec<Artifact>, CoreError>,
    ) {
        let cycle_outcome = {
            let mut state = self.state.write().expect("aggregator state write lock");
            if state.cycle.id != cycle_id || state.cycle.completed {
                debug!(
                    cycle_id,
                    current_cycle_id = state.cycle.id,
                    category = category.as_key(),
                    "discarding completion from superseded cycle"
                );
                return;
            }

            let slot = state.cycle.slot_mut(category);
            if !slot.enabled || slot.settled {
                debug!(
                    cycle_id,
                    category = category.as_key(),
                    "ignoring completion for a category that is not awaiting results"
                );
                return;
            }

            let just_failed = match outcome {
                Ok(items) => {
                    debug!(
                        cycle_id,
                        category = category.as_key(),
                        count = items.len(),
                        "category fetch settled"
                    );
                    slot.items = items;
                    slot.failed = false;
                    slot.settled = true;
                    false
                }
                Err(error) => {
                    warn!(
                        cycle_id,
                        category = category.as_key(),
                        error = %error,
                        "category fetch failed"
                    );
                    slot.items.clear();
                    slot.failed = true;
                    slot.settled = true;
                    true
                }
            };

            if just_failed && state.cycle.all_enabled_failed() {
                escalate_total_failure(&mut state, &self.run_flag)
            } else if state.cycle.all_settled() {
                publish_cycle(&mut state)
            } else {
                CycleOutcome::Pending
            }
        };

        self.announce(cycle_id, cycle_outcome);
    }

    fn announce(&self, cycle_id: CycleId, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Pending => {}
            CycleOutcome::Published => {
                let _ = self.changes.send(TreeChanged);
            }
            CycleOutcome::TotalFailure => {
                let _ = self.changes.send(TreeChanged);
                warn!(cycle_id, "every enabled category failed; automatic polling halted");
                self.notifier.show_error(CREDENTIALS_ERROR_MESSAGE);
            }
        }
    }
}

fn publish_cycle(state: &mut AggregatorState) -> CycleOutcome {
    state.view = ArtifactView::from_cycle(&state.cycle);
    state.cycle.completed = true;
    info!(
        cycle_id = state.cycle.id,
        headers = state.view.headers.len(),
        "artifact tree refreshed"
    );
    CycleOutcome::Published
}

/// Runs under the state write lock; the run flag is lowered there too.
fn escalate_total_failure(state: &mut AggregatorState, run_flag: &RunFlag) -> CycleOutcome {
    run_flag.halt();
    for slot in &mut state.cycle.slots {
        slot.items.clear();
        slot.failed = false;
    }
    state.view = ArtifactView::default();
    state.cycle.completed = true;
    CycleOutcome::TotalFailure
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(3);

    #[derive(Debug, Default)]
    struct StubSource {
        responses: Mutex<HashMap<ArtifactType, Result<Vec<Artifact>, CoreError>>>,
        calls: Mutex<Vec<ArtifactType>>,
    }

    impl StubSource {
        fn respond(&self, category: ArtifactType, response: Result<Vec<Artifact>, CoreError>) {
            self.responses
                .lock()
                .expect("stub responses lock")
                .insert(category, response);
        }

        fn calls(&self) -> Vec<ArtifactType> {
            self.calls.lock().expect("stub calls lock").clone()
        }
    }

    #[async_trait]
    impl ArtifactSource for StubSource {
        async fn fetch_assigned(&self, category: ArtifactType) -> Result<Vec<Artifact>, CoreError> {
            self.calls.lock().expect("stub calls lock").push(category);
            self.responses
                .lock()
                .expect("stub responses lock")
                .get(&category)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Never completes; tests drive completions by hand.
    #[derive(Debug, Default)]
    struct PendingSource;

    #[async_trait]
    impl ArtifactSource for PendingSource {
        async fn fetch_assigned(
            &self,
            _category: ArtifactType,
        ) -> Result<Vec<Artifact>, CoreError> {
            std::future::pending().await
        }
    }

    #[derive(Debug)]
    struct StubSettings {
        enabled: [bool; 3],
    }

    impl StubSettings {
        fn all() -> Self {
            Self { enabled: [true; 3] }
        }

        fn only(category: ArtifactType) -> Self {
            let mut enabled = [false; 3];
            enabled[category.index()] = true;
            Self { enabled }
        }
    }

    impl SettingsProvider for StubSettings {
        fn show_category(&self, category: ArtifactType) -> bool {
            self.enabled[category.index()]
        }

        fn refresh_interval_secs(&self) -> Option<i64> {
            Some(60)
        }
    }

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().expect("notifier lock").clone()
        }
    }

    impl UserNotifier for RecordingNotifier {
        fn show_error(&self, message: &str) {
            self.messages
                .lock()
                .expect("notifier lock")
                .push(message.to_owned());
        }
    }

    fn artifact(category: ArtifactType, id: i64, name: &str) -> Artifact {
        Artifact {
            name: name.to_owned(),
            artifact_type: category,
            project_id: 1,
            project_name: "Library Information System".to_owned(),
            artifact_id: id,
            description: String::new(),
            priority_name: String::new(),
            status: "Open".to_owned(),
            kind: "Feature".to_owned(),
        }
    }

    fn server_error() -> CoreError {
        CoreError::RemoteStatus {
            status: 500,
            body: "Internal Server Error".to_owned(),
        }
    }

    fn aggregator_with(
        source: Arc<dyn ArtifactSource>,
        settings: StubSettings,
        notifier: Arc<RecordingNotifier>,
    ) -> ArtifactAggregator {
        ArtifactAggregator::new(source, Arc::new(settings), notifier, RunFlag::default())
    }

    async fn next_change(receiver: &mut broadcast::Receiver<TreeChanged>) {
        timeout(TEST_TIMEOUT, receiver.recv())
            .await
            .expect("tree change within timeout")
            .expect("tree change channel open");
    }

    #[tokio::test]
    async fn single_enabled_category_yields_one_header_with_all_items() {
        let source = Arc::new(StubSource::default());
        source.respond(
            ArtifactType::Task,
            Ok(vec![
                artifact(ArtifactType::Task, 1, "one"),
                artifact(ArtifactType::Task, 2, "two"),
                artifact(ArtifactType::Task, 3, "three"),
            ]),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(
            source.clone(),
            StubSettings::only(ArtifactType::Task),
            notifier.clone(),
        );
        let mut changes = aggregator.subscribe();

        aggregator.refresh();
        next_change(&mut changes).await;

        assert_eq!(aggregator.headers(), vec![ArtifactType::Task]);
        assert_eq!(aggregator.category_items(ArtifactType::Task).len(), 3);
        assert_eq!(source.calls(), vec![ArtifactType::Task]);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn empty_categories_get_no_header() {
        let source = Arc::new(StubSource::default());
        source.respond(
            ArtifactType::Requirement,
            Ok(vec![artifact(ArtifactType::Requirement, 7, "Fix login")]),
        );
        let aggregator = aggregator_with(
            source,
            StubSettings::all(),
            Arc::new(RecordingNotifier::default()),
        );
        let mut changes = aggregator.subscribe();

        aggregator.refresh();
        next_change(&mut changes).await;

        assert_eq!(aggregator.headers(), vec![ArtifactType::Requirement]);
        let requirements = aggregator.category_items(ArtifactType::Requirement);
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].name, "Fix login");
        assert!(aggregator.category_items(ArtifactType::Task).is_empty());
    }

    #[tokio::test]
    async fn total_failure_clears_tree_notifies_once_and_halts_polling() {
        let source = Arc::new(StubSource::default());
        for category in ArtifactType::ALL {
            source.respond(category, Err(server_error()));
        }
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(source, StubSettings::all(), notifier.clone());
        let mut changes = aggregator.subscribe();

        aggregator.refresh();
        next_change(&mut changes).await;

        assert!(aggregator.headers().is_empty());
        for category in ArtifactType::ALL {
            assert!(aggregator.category_items(category).is_empty());
        }
        assert_eq!(notifier.messages(), vec![CREDENTIALS_ERROR_MESSAGE.to_owned()]);
        assert!(!aggregator.run_flag().is_running());
        assert!(
            changes.try_recv().is_err(),
            "total failure emits a single change"
        );
    }

    #[tokio::test]
    async fn sole_enabled_category_failing_is_total_failure() {
        let source = Arc::new(StubSource::default());
        source.respond(ArtifactType::Requirement, Err(server_error()));
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(
            source,
            StubSettings::only(ArtifactType::Requirement),
            notifier.clone(),
        );
        let mut changes = aggregator.subscribe();

        aggregator.refresh();
        next_change(&mut changes).await;

        assert!(aggregator.view().is_empty());
        assert_eq!(notifier.messages().len(), 1);
        assert!(!aggregator.run_flag().is_running());
    }

    #[tokio::test]
    async fn partial_failure_is_tolerated_silently() {
        let source = Arc::new(StubSource::default());
        source.respond(
            ArtifactType::Requirement,
            Ok(vec![artifact(ArtifactType::Requirement, 7, "Fix login")]),
        );
        source.respond(ArtifactType::Task, Err(server_error()));
        source.respond(
            ArtifactType::Incident,
            Ok(vec![artifact(ArtifactType::Incident, 40, "Crash on save")]),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(source, StubSettings::all(), notifier.clone());
        let mut changes = aggregator.subscribe();

        aggregator.refresh();
        next_change(&mut changes).await;

        assert_eq!(
            aggregator.headers(),
            vec![ArtifactType::Requirement, ArtifactType::Incident]
        );
        assert!(aggregator.category_items(ArtifactType::Task).is_empty());
        assert!(notifier.messages().is_empty());
        assert!(aggregator.run_flag().is_running());
    }

    #[tokio::test]
    async fn repeated_refresh_without_server_change_is_idempotent() {
        let source = Arc::new(StubSource::default());
        source.respond(
            ArtifactType::Requirement,
            Ok(vec![
                artifact(ArtifactType::Requirement, 7, "Fix login"),
                artifact(ArtifactType::Requirement, 8, "Add audit log"),
            ]),
        );
        source.respond(
            ArtifactType::Incident,
            Ok(vec![artifact(ArtifactType::Incident, 40, "Crash on save")]),
        );
        let aggregator = aggregator_with(
            source,
            StubSettings::all(),
            Arc::new(RecordingNotifier::default()),
        );
        let mut changes = aggregator.subscribe();

        aggregator.refresh();
        next_change(&mut changes).await;
        let first = aggregator.view();

        aggregator.refresh();
        next_change(&mut changes).await;
        let second = aggregator.view();

        assert_eq!(first, second);
        assert_eq!(aggregator.current_cycle(), 2);
    }

    #[tokio::test]
    async fn view_is_published_only_after_every_category_settles() {
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(Arc::new(PendingSource), StubSettings::all(), notifier);
        let mut changes = aggregator.subscribe();

        let cycle = aggregator.refresh();
        aggregator.on_category_fetch_result(
            cycle,
            ArtifactType::Incident,
            Ok(vec![artifact(ArtifactType::Incident, 40, "Crash on save")]),
        );
        aggregator.on_category_fetch_result(
            cycle,
            ArtifactType::Requirement,
            Ok(vec![artifact(ArtifactType::Requirement, 7, "Fix login")]),
        );

        assert!(changes.try_recv().is_err());
        assert!(aggregator.headers().is_empty());

        aggregator.on_category_fetch_result(cycle, ArtifactType::Task, Ok(Vec::new()));

        assert_eq!(changes.try_recv(), Ok(TreeChanged));
        assert_eq!(
            aggregator.headers(),
            vec![ArtifactType::Requirement, ArtifactType::Incident]
        );
    }

    #[tokio::test]
    async fn stale_cycle_completions_are_discarded() {
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(
            Arc::new(PendingSource),
            StubSettings::only(ArtifactType::Requirement),
            notifier.clone(),
        );
        let mut changes = aggregator.subscribe();

        let stale = aggregator.refresh();
        let current = aggregator.refresh();
        assert!(current > stale);

        aggregator.on_category_fetch_result(stale, ArtifactType::Requirement, Err(server_error()));
        assert!(changes.try_recv().is_err());
        assert!(notifier.messages().is_empty());
        assert!(aggregator.run_flag().is_running());

        aggregator.on_category_fetch_result(
            current,
            ArtifactType::Requirement,
            Ok(vec![artifact(ArtifactType::Requirement, 7, "Fix login")]),
        );
        assert_eq!(changes.try_recv(), Ok(TreeChanged));

        aggregator.on_category_fetch_result(
            stale,
            ArtifactType::Requirement,
            Ok(vec![artifact(ArtifactType::Requirement, 99, "Old result")]),
        );
        let items = aggregator.category_items(ArtifactType::Requirement);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].artifact_id, 7);
    }

    #[tokio::test]
    async fn completions_for_disabled_or_settled_categories_are_ignored() {
        let aggregator = aggregator_with(
            Arc::new(PendingSource),
            StubSettings::only(ArtifactType::Task),
            Arc::new(RecordingNotifier::default()),
        );
        let mut changes = aggregator.subscribe();

        let cycle = aggregator.refresh();
        aggregator.on_category_fetch_result(
            cycle,
            ArtifactType::Incident,
            Ok(vec![artifact(ArtifactType::Incident, 40, "Crash on save")]),
        );
        assert!(changes.try_recv().is_err());

        aggregator.on_category_fetch_result(
            cycle,
            ArtifactType::Task,
            Ok(vec![artifact(ArtifactType::Task, 3, "Write docs")]),
        );
        assert_eq!(changes.try_recv(), Ok(TreeChanged));

        aggregator.on_category_fetch_result(cycle, ArtifactType::Task, Err(server_error()));
        assert!(changes.try_recv().is_err());
        assert_eq!(aggregator.headers(), vec![ArtifactType::Task]);
    }

    #[tokio::test]
    async fn cycle_with_every_category_disabled_publishes_an_empty_tree() {
        let source = Arc::new(StubSource::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(
            source.clone(),
            StubSettings {
                enabled: [false; 3],
            },
            notifier.clone(),
        );
        let mut changes = aggregator.subscribe();

        aggregator.refresh();

        assert_eq!(changes.try_recv(), Ok(TreeChanged));
        assert!(aggregator.view().is_empty());
        assert!(source.calls().is_empty());
        assert!(notifier.messages().is_empty());
        assert!(aggregator.run_flag().is_running());
    }

    #[tokio::test]
    async fn refresh_after_total_failure_starts_a_clean_cycle() {
        let source = Arc::new(StubSource::default());
        source.respond(ArtifactType::Requirement, Err(server_error()));
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(
            source.clone(),
            StubSettings::only(ArtifactType::Requirement),
            notifier.clone(),
        );
        let mut changes = aggregator.subscribe();

        aggregator.refresh();
        next_change(&mut changes).await;
        assert!(!aggregator.run_flag().is_running());

        source.respond(
            ArtifactType::Requirement,
            Ok(vec![artifact(ArtifactType::Requirement, 7, "Fix login")]),
        );
        aggregator.resume_and_refresh();
        next_change(&mut changes).await;

        assert_eq!(aggregator.headers(), vec![ArtifactType::Requirement]);
        assert!(aggregator.run_flag().is_running());
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn late_failure_of_a_superseded_cycle_never_halts_a_resumed_refresh() {
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = aggregator_with(
            Arc::new(PendingSource),
            StubSettings::only(ArtifactType::Requirement),
            notifier.clone(),
        );
        let barrier = Arc::new(std::sync::Barrier::new(2));

        for round in 0..2_000 {
            let stale_cycle = aggregator.refresh();
            let completer = {
                let aggregator = aggregator.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    aggregator.on_category_fetch_result(
                        stale_cycle,
                        ArtifactType::Requirement,
                        Err(server_error()),
                    );
                })
            };

            barrier.wait();
            let resumed_cycle = aggregator.resume_and_refresh();
            completer.join().expect("completer thread");

            assert!(resumed_cycle > stale_cycle);
            assert!(
                aggregator.run_flag().is_running(),
                "round {round}: resumed refresh ended with polling halted"
            );
        }
    }

    #[test]
    fn all_enabled_failed_ignores_disabled_categories() {
        let mut cycle = CycleRecord::default();
        assert!(!cycle.all_enabled_failed());

        cycle.slots[0] = CategorySlot {
            enabled: true,
            items: Vec::new(),
            failed: true,
            settled: true,
        };
        cycle.slots[1].settled = true;
        cycle.slots[2].settled = true;
        assert!(cycle.all_enabled_failed());
        assert!(cycle.all_settled());

        cycle.slots[2].enabled = true;
        assert!(!cycle.all_enabled_failed());
    }
}
