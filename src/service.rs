use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ReviewSettings;
use crate::error::{Error, Result};
use crate::extract::{RemoteChanges, Scope};
use crate::gemini::ModelClient;
use crate::orchestrator::Orchestrator;
use crate::page::PageSnapshot;
use crate::present::{Notifier, NoticeKind, Panel, Presenter};
use crate::protocol::{Command, Reply, decode_command};
use crate::review::ReviewResult;
use crate::store::ReviewStats;

/// Line-oriented command service over stdin/stdout.
///
/// Command replies and review progress events share one output stream, each
/// as its own JSON line. Commands are handled in arrival order; a review
/// pass runs off the protocol loop so the service stays responsive while the
/// model works. The panel and notifier are shared with the running pass:
/// `clearComments` resets them, `ping` reports the active notice.
pub struct Service<M, R> {
    orchestrator: Arc<Orchestrator<M, R>>,
    defaults: ReviewSettings,
    page: Option<Arc<PageSnapshot>>,
    panel: Arc<Mutex<Panel>>,
    notices: Arc<Mutex<Notifier>>,
    events: mpsc::UnboundedSender<String>,
    active: Option<tokio::task::JoinHandle<()>>,
}

// The guarded values are plain render state, safe to reuse after a panic
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Presenter that renders into the shared panel and emits progress as JSON
/// event lines.
struct EventPresenter {
    page: Arc<PageSnapshot>,
    panel: Arc<Mutex<Panel>>,
    notices: Arc<Mutex<Notifier>>,
    events: mpsc::UnboundedSender<String>,
}

impl EventPresenter {
    fn emit(&self, event: serde_json::Value) {
        // A closed channel means the service is shutting down; drop silently
        let _ = self.events.send(event.to_string());
    }
}

impl Presenter for EventPresenter {
    fn pass_started(&mut self, files: usize) {
        self.emit(serde_json::json!({"event": "reviewStarted", "files": files}));
    }

    fn file_reviewed(&mut self, record: &crate::extract::ChangeRecord, result: &ReviewResult) {
        let annotations = {
            let mut panel = lock(&self.panel);
            panel.push_result(record, result);
            panel.annotate(&self.page, record, &result.issues)
        };
        self.emit(serde_json::json!({
            "event": "fileReviewed",
            "file": record.filename,
            "source": record.source.name(),
            "summary": result.summary,
            "issues": result.issues,
            "annotations": annotations,
        }));
    }

    fn pass_completed(&mut self, stats: &ReviewStats) {
        lock(&self.notices).show(
            format!(
                "Review complete: {} issue(s) in {} file(s)",
                stats.total_issues(),
                stats.files
            ),
            NoticeKind::Info,
        );
        self.emit(serde_json::json!({"event": "reviewCompleted", "stats": stats}));
    }

    fn pass_failed(&mut self, message: &str) {
        lock(&self.notices).show(message, NoticeKind::Error);
        self.emit(serde_json::json!({"event": "reviewFailed", "error": message}));
    }
}

impl<M, R> Service<M, R>
where
    M: ModelClient + Send + Sync + 'static,
    R: RemoteChanges + Send + Sync + 'static,
{
    pub fn new(
        orchestrator: Orchestrator<M, R>,
        defaults: ReviewSettings,
        events: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            defaults,
            page: None,
            panel: Arc::new(Mutex::new(Panel::new())),
            notices: Arc::new(Mutex::new(Notifier::new())),
            events,
            active: None,
        }
    }

    /// Serve until stdin closes.
    pub async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<String>) -> Result<()> {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        info!("command service started");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = line.map_err(|e| Error::Protocol(format!("stdin read failed: {e}")))?;
                    match line {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => {
                            let reply = self.handle_line(&line);
                            write_line(&mut stdout, &reply.encode()).await?;
                        }
                        None => break,
                    }
                }
                Some(event) = events_rx.recv() => {
                    write_line(&mut stdout, &event).await?;
                }
            }
        }
        info!("stdin closed, command service stopping");
        Ok(())
    }

    /// Handle one inbound line. Bad input never ends the session.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        match decode_command(line) {
            Ok(command) => self.handle_command(command),
            Err(e) => {
                warn!(error = %e, "rejected protocol line");
                Reply::err(e.to_string())
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Reply {
        match command {
            Command::Ping => {
                let mut reply = Reply::ok_with("status", serde_json::json!("alive"));
                if let Some(notice) = lock(&self.notices).active(Instant::now()) {
                    reply
                        .extras
                        .insert("notice".to_string(), serde_json::json!(notice.message));
                }
                reply
            }
            Command::Snapshot { page } => {
                info!(url = page.url, "page snapshot captured");
                self.page = Some(Arc::new(page));
                Reply::ok()
            }
            Command::StartReview {
                review_type,
                settings,
            } => self.start_review(review_type, settings),
            Command::ClearComments => {
                lock(&self.panel).clear();
                lock(&self.notices).dismiss();
                Reply::ok_with("cleared", serde_json::json!(true))
            }
        }
    }

    fn start_review(
        &mut self,
        review_type: Option<String>,
        settings: Option<ReviewSettings>,
    ) -> Reply {
        let scope = match review_type {
            Some(ref raw) => match Scope::parse(raw) {
                Some(scope) => scope,
                None => return Reply::err(format!("unknown review type: {raw}")),
            },
            None => Scope::All,
        };

        let Some(page) = self.page.clone() else {
            return Reply::err("no page snapshot captured");
        };

        let settings = settings.unwrap_or_else(|| self.defaults.clone());
        if let Err(e) = settings.validate() {
            return Reply::err(e.to_string());
        }

        // Commands are handled one at a time, so this check cannot race with
        // another start
        if self.active.as_ref().is_some_and(|h| !h.is_finished()) || self.orchestrator.is_busy() {
            return Reply::err(Error::ReviewInProgress.to_string());
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let panel = Arc::clone(&self.panel);
        let notices = Arc::clone(&self.notices);
        let events = self.events.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut presenter = EventPresenter {
                page: Arc::clone(&page),
                panel,
                notices,
                events,
            };
            // Failures are already reported through the presenter
            let _ = orchestrator.run_review_with(scope, &page, &settings, &mut presenter);
        });
        self.active = Some(handle);

        Reply::ok_with("status", serde_json::json!("started"))
    }

    #[cfg(test)]
    async fn wait_idle(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.await.unwrap();
        }
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> Result<()> {
    stdout
        .write_all(line.as_bytes())
        .await
        .map_err(|e| Error::Protocol(format!("stdout write failed: {e}")))?;
    stdout
        .write_all(b"\n")
        .await
        .map_err(|e| Error::Protocol(format!("stdout write failed: {e}")))?;
    stdout
        .flush()
        .await
        .map_err(|e| Error::Protocol(format!("stdout flush failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::NoRemote;
    use crate::store::StatsStore;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedModel(String);

    impl ModelClient for FixedModel {
        fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    /// Model that parks until released, to hold a pass open.
    struct GatedModel {
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ModelClient for GatedModel {
        fn generate(&self, _prompt: &str) -> Result<String> {
            let _ = self.gate.lock().unwrap().recv();
            Ok("{}".to_string())
        }
    }

    fn settings() -> ReviewSettings {
        ReviewSettings {
            api_key: "k".to_string(),
            ..Default::default()
        }
    }

    fn service_with<M: ModelClient + Send + Sync + 'static>(
        dir: &TempDir,
        model: M,
    ) -> (Service<M, NoRemote>, mpsc::UnboundedReceiver<String>) {
        let orchestrator = Orchestrator::new(
            model,
            NoRemote,
            settings(),
            StatsStore::new(dir.path().join("state")),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        (Service::new(orchestrator, settings(), tx), rx)
    }

    const SNAPSHOT_LINE: &str = r#"{"action": "snapshot", "page": {
        "url": "https://dev.azure.com/o/p/_git/r/pullrequest/1",
        "root": {"tag": "body", "children": [
            {"tag": "div", "classes": ["repos-line-addition"], "text": "let x = 1;"}
        ]}
    }}"#;

    const ONE_ISSUE: &str = r#"{"issues": [{"line": 1, "severity": "critical", "title": "t", "description": "d"}]}"#;

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));
        let reply = service.handle_line(r#"{"action": "ping"}"#);
        assert!(reply.success);
    }

    #[tokio::test]
    async fn test_start_without_snapshot_fails() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));
        let reply = service.handle_line(r#"{"action": "startReview"}"#);
        assert!(!reply.success);
        assert!(reply.error.unwrap().contains("no page snapshot"));
    }

    #[tokio::test]
    async fn test_snapshot_then_review_emits_events() {
        let dir = TempDir::new().unwrap();
        let (mut service, mut rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));

        assert!(service.handle_line(SNAPSHOT_LINE).success);
        let reply = service.handle_line(r#"{"action": "startReview"}"#);
        assert!(reply.success, "error: {:?}", reply.error);
        service.wait_idle().await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events[0].contains("reviewStarted"));
        assert!(events.iter().any(|e| e.contains("fileReviewed")));
        assert!(events.iter().any(|e| e.contains("\"annotations\"")));
        assert!(events.iter().any(|e| e.contains("reviewCompleted")));
    }

    #[tokio::test]
    async fn test_review_failure_arrives_as_event() {
        let dir = TempDir::new().unwrap();
        let (mut service, mut rx) = service_with(&dir, FixedModel("{}".to_string()));

        // A snapshot with nothing extractable
        let empty = r#"{"action": "snapshot", "page": {"url": "https://x.test", "root": {"tag": "body"}}}"#;
        assert!(service.handle_line(empty).success);
        assert!(service.handle_line(r#"{"action": "startReview"}"#).success);
        service.wait_idle().await;

        let event = rx.recv().await.unwrap();
        assert!(event.contains("reviewFailed"));
        assert!(event.contains("No code changes found"));
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_busy() {
        let dir = TempDir::new().unwrap();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let (mut service, _rx) = service_with(
            &dir,
            GatedModel {
                gate: Mutex::new(release_rx),
            },
        );

        assert!(service.handle_line(SNAPSHOT_LINE).success);
        assert!(service.handle_line(r#"{"action": "startReview"}"#).success);

        let reply = service.handle_line(r#"{"action": "startReview"}"#);
        assert!(!reply.success);
        assert!(reply.error.unwrap().contains("already in progress"));

        release_tx.send(()).unwrap();
        service.wait_idle().await;

        // Idle again: a new pass is accepted
        assert!(service.handle_line(r#"{"action": "startReview"}"#).success);
        drop(release_tx); // unblocks the gated model immediately
        service.wait_idle().await;
    }

    #[tokio::test]
    async fn test_unknown_review_type_rejected() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));
        service.handle_line(SNAPSHOT_LINE);
        let reply = service.handle_line(r#"{"action": "startReview", "reviewType": "everything"}"#);
        assert!(!reply.success);
        assert!(reply.error.unwrap().contains("unknown review type"));
    }

    #[tokio::test]
    async fn test_settings_override_is_validated() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));
        service.handle_line(SNAPSHOT_LINE);
        let line = r#"{"action": "startReview", "settings": {"apiKey": ""}}"#;
        let reply = service.handle_line(line);
        assert!(!reply.success);
        assert!(reply.error.unwrap().contains("api key"));
    }

    #[tokio::test]
    async fn test_bad_line_keeps_session_alive() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));
        assert!(!service.handle_line("garbage").success);
        assert!(!service.handle_line(r#"{"action": "unknown"}"#).success);
        assert!(service.handle_line(r#"{"action": "ping"}"#).success);
    }

    #[tokio::test]
    async fn test_clear_comments_acknowledged() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));
        let reply = service.handle_line(r#"{"action": "clearComments"}"#);
        assert!(reply.success);
    }

    #[tokio::test]
    async fn test_clear_comments_resets_panel() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel(ONE_ISSUE.to_string()));

        assert!(service.handle_line(SNAPSHOT_LINE).success);
        assert!(service.handle_line(r#"{"action": "startReview"}"#).success);
        service.wait_idle().await;

        // The pass rendered into the shared panel
        {
            let panel = lock(&service.panel);
            assert_eq!(panel.counts().critical, 1);
            assert_eq!(panel.visible().len(), 1);
        }

        let reply = service.handle_line(r#"{"action": "clearComments"}"#);
        assert!(reply.success);

        let panel = lock(&service.panel);
        assert!(panel.visible().is_empty());
        assert_eq!(panel.counts().total_issues(), 0);
        assert!(panel.summaries().is_empty());
    }

    #[tokio::test]
    async fn test_ping_carries_notice_until_cleared() {
        let dir = TempDir::new().unwrap();
        let (mut service, _rx) = service_with(&dir, FixedModel("{}".to_string()));

        // A pass over an empty page fails and leaves an error notice behind
        let empty = r#"{"action": "snapshot", "page": {"url": "https://x.test", "root": {"tag": "body"}}}"#;
        assert!(service.handle_line(empty).success);
        assert!(service.handle_line(r#"{"action": "startReview"}"#).success);
        service.wait_idle().await;

        let reply = service.handle_line(r#"{"action": "ping"}"#);
        assert!(reply.success);
        let notice = reply.extras.get("notice").and_then(|n| n.as_str());
        assert!(notice.is_some_and(|n| n.contains("No code changes found")));

        service.handle_line(r#"{"action": "clearComments"}"#);
        let reply = service.handle_line(r#"{"action": "ping"}"#);
        assert!(reply.success);
        assert!(!reply.extras.contains_key("notice"));
    }
}
