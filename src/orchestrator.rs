use std::sync::Mutex;

use tracing::{info, warn};

use crate::config::ReviewSettings;
use crate::error::{Error, Result};
use crate::extract::{RemoteChanges, Scope, extract_changes};
use crate::gemini::ModelClient;
use crate::page::PageSnapshot;
use crate::present::Presenter;
use crate::prompt::build_prompt;
use crate::review::parse_review_output;
use crate::store::{ReviewStats, StatsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Reviewing,
}

/// Drives one review pass: extract, prompt, call the model, parse, present,
/// persist.
///
/// At most one pass runs at a time. A start request while a pass is active
/// fails synchronously with `Error::ReviewInProgress` and changes nothing.
/// The busy flag is cleared on every exit path, success or failure.
pub struct Orchestrator<M, R> {
    model: M,
    remote: R,
    settings: ReviewSettings,
    store: StatsStore,
    state: Mutex<RunState>,
}

impl<M: ModelClient, R: RemoteChanges> Orchestrator<M, R> {
    pub fn new(model: M, remote: R, settings: ReviewSettings, store: StatsStore) -> Self {
        Self {
            model,
            remote,
            settings,
            store,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.lock_state() == RunState::Reviewing
    }

    /// Run one full review pass over the page.
    ///
    /// On success the pass stats are persisted and returned. A model failure
    /// aborts the pass: stats are not persisted, but results already
    /// presented stay presented.
    pub fn run_review(
        &self,
        scope: Scope,
        page: &PageSnapshot,
        presenter: &mut dyn Presenter,
    ) -> Result<ReviewStats> {
        self.run_review_with(scope, page, &self.settings, presenter)
    }

    /// Like `run_review` but with settings supplied per request, for callers
    /// that receive them over the command protocol.
    pub fn run_review_with(
        &self,
        scope: Scope,
        page: &PageSnapshot,
        settings: &ReviewSettings,
        presenter: &mut dyn Presenter,
    ) -> Result<ReviewStats> {
        self.begin()?;
        let result = self.run_pass(scope, page, settings, presenter);
        self.finish();

        match result {
            Ok(stats) => {
                info!(
                    files = stats.files,
                    issues = stats.total_issues(),
                    "review pass complete"
                );
                Ok(stats)
            }
            Err(e) => {
                warn!(error = %e, "review pass failed");
                presenter.pass_failed(&e.to_string());
                Err(e)
            }
        }
    }

    fn run_pass(
        &self,
        scope: Scope,
        page: &PageSnapshot,
        settings: &ReviewSettings,
        presenter: &mut dyn Presenter,
    ) -> Result<ReviewStats> {
        let records = extract_changes(scope, page, &self.remote);
        if records.is_empty() {
            return Err(Error::NoChangesFound);
        }

        presenter.pass_started(records.len());

        let mut stats = ReviewStats::default();
        for record in &records {
            info!(
                file = record.filename,
                source = record.source.name(),
                "reviewing file"
            );
            let prompt = build_prompt(settings, record)?;
            let reply = self.model.generate(&prompt)?;
            let result = parse_review_output(&reply);
            stats.add_result(&result);
            presenter.file_reviewed(record, &result);
        }

        self.store.record_pass(&stats)?;
        presenter.pass_completed(&stats);
        Ok(stats)
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.lock_state();
        if *state == RunState::Reviewing {
            return Err(Error::ReviewInProgress);
        }
        *state = RunState::Reviewing;
        Ok(())
    }

    fn finish(&self) {
        *self.lock_state() = RunState::Idle;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RunState> {
        // The guarded value is a plain enum, safe to reuse after a panic
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn mark_busy(&self) {
        *self.lock_state() = RunState::Reviewing;
    }
}
