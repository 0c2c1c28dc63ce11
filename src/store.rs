use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::review::{ReviewResult, Severity};

/// Counts from one review pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ReviewStats {
    pub files: u64,
    pub critical: u64,
    pub warnings: u64,
    pub suggestions: u64,
}

impl ReviewStats {
    /// Tally one parsed review into the pass counters.
    pub fn add_result(&mut self, result: &ReviewResult) {
        self.files += 1;
        for issue in &result.issues {
            match issue.severity {
                Severity::Critical => self.critical += 1,
                Severity::Warning => self.warnings += 1,
                Severity::Suggestion => self.suggestions += 1,
            }
        }
    }

    pub fn total_issues(&self) -> u64 {
        self.critical + self.warnings + self.suggestions
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatsData {
    #[serde(default)]
    pub totals: ReviewStats,
    /// Number of completed review passes.
    #[serde(default)]
    pub passes: u64,
}

/// Review statistics persisted as TOML under the state directory.
///
/// Counters only ever grow. A pass that fails partway through is never
/// recorded, so persisted totals always describe completed passes.
pub struct StatsStore {
    state_dir: PathBuf,
}

impl StatsStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn stats_file(&self) -> PathBuf {
        self.state_dir.join("stats.toml")
    }

    /// Load stats from disk. Returns default stats if the file is missing or
    /// corrupted.
    pub fn load(&self) -> StatsData {
        let path = self.stats_file();
        if !path.exists() {
            return StatsData::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<StatsData>(&content) {
                Ok(stats) => stats,
                Err(e) => {
                    warn!("corrupted stats file {}: {e}, resetting", path.display());
                    StatsData::default()
                }
            },
            Err(e) => {
                warn!(
                    "failed to read stats file {}: {e}, resetting",
                    path.display()
                );
                StatsData::default()
            }
        }
    }

    fn save(&self, stats: &StatsData) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| Error::State(format!("failed to create state dir: {e}")))?;

        let content = toml::to_string_pretty(stats)
            .map_err(|e| Error::State(format!("failed to serialize stats: {e}")))?;

        std::fs::write(self.stats_file(), content)
            .map_err(|e| Error::State(format!("failed to write stats file: {e}")))?;

        Ok(())
    }

    /// Fold one completed pass into the persisted totals.
    pub fn record_pass(&self, pass: &ReviewStats) -> Result<()> {
        let mut stats = self.load();
        stats.totals.files += pass.files;
        stats.totals.critical += pass.critical;
        stats.totals.warnings += pass.warnings;
        stats.totals.suggestions += pass.suggestions;
        stats.passes += 1;
        self.save(&stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::Issue;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, StatsStore) {
        let dir = TempDir::new().unwrap();
        let store = StatsStore::new(dir.path().join("state"));
        (dir, store)
    }

    fn pass(files: u64, critical: u64, warnings: u64, suggestions: u64) -> ReviewStats {
        ReviewStats {
            files,
            critical,
            warnings,
            suggestions,
        }
    }

    #[test]
    fn test_load_empty_returns_default() {
        let (_dir, store) = test_store();
        assert_eq!(store.load(), StatsData::default());
    }

    #[test]
    fn test_record_pass_accumulates() {
        let (_dir, store) = test_store();
        store.record_pass(&pass(2, 1, 3, 0)).unwrap();
        store.record_pass(&pass(1, 0, 1, 2)).unwrap();

        let stats = store.load();
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.totals.files, 3);
        assert_eq!(stats.totals.critical, 1);
        assert_eq!(stats.totals.warnings, 4);
        assert_eq!(stats.totals.suggestions, 2);
    }

    #[test]
    fn test_corrupted_stats_returns_default() {
        let (_dir, store) = test_store();
        std::fs::create_dir_all(&store.state_dir).unwrap();
        std::fs::write(store.stats_file(), "not valid toml [[[").unwrap();

        assert_eq!(store.load(), StatsData::default());
    }

    #[test]
    fn test_record_after_corruption_starts_fresh() {
        let (_dir, store) = test_store();
        std::fs::create_dir_all(&store.state_dir).unwrap();
        std::fs::write(store.stats_file(), "garbage").unwrap();

        store.record_pass(&pass(1, 0, 0, 1)).unwrap();
        let stats = store.load();
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.totals.suggestions, 1);
    }

    #[test]
    fn test_stats_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        {
            let store = StatsStore::new(&path);
            store.record_pass(&pass(4, 2, 0, 1)).unwrap();
        }
        {
            let store = StatsStore::new(&path);
            let stats = store.load();
            assert_eq!(stats.totals.files, 4);
            assert_eq!(stats.totals.critical, 2);
        }
    }

    #[test]
    fn test_add_result_counts_by_severity() {
        let mut stats = ReviewStats::default();
        let result = ReviewResult {
            summary: None,
            issues: vec![
                Issue {
                    severity: Severity::Critical,
                    ..Default::default()
                },
                Issue {
                    severity: Severity::Warning,
                    ..Default::default()
                },
                Issue {
                    severity: Severity::Suggestion,
                    ..Default::default()
                },
                Issue {
                    severity: Severity::Suggestion,
                    ..Default::default()
                },
            ],
        };
        stats.add_result(&result);

        assert_eq!(stats.files, 1);
        assert_eq!(stats.critical, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.suggestions, 2);
        assert_eq!(stats.total_issues(), 4);
    }

    #[test]
    fn test_stats_file_is_valid_toml() {
        let (_dir, store) = test_store();
        store.record_pass(&pass(1, 1, 1, 1)).unwrap();

        let content = std::fs::read_to_string(store.stats_file()).unwrap();
        let _: toml::Value = toml::from_str(&content).unwrap();
    }
}
