use anyhow::{Context, Result};
use critpath_core::config::AnalysisConfig;
use critpath_core::{
    load_traces, BlockingPolicy, Config, CriticalPath, CriticalPathAnalyzer, CriticalPathCache,
    Trace,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Analyzer plus optional memoization, shared by every file of one run.
pub struct Session {
    analyzer: CriticalPathAnalyzer,
    cache: Option<CriticalPathCache>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self::with_policy(config, None)
    }

    /// Like `new`, with `policy` replacing the configured blocking policy.
    pub fn with_policy(config: &Config, policy: Option<BlockingPolicy>) -> Self {
        let analysis = AnalysisConfig {
            blocking_policy: policy.unwrap_or(config.analysis.blocking_policy),
        };
        let analyzer = CriticalPathAnalyzer::new(analysis);
        let cache = config
            .cache
            .enabled
            .then(|| CriticalPathCache::new(analyzer.clone(), config.cache.capacity));

        Self { analyzer, cache }
    }

    pub fn policy(&self) -> BlockingPolicy {
        self.analyzer.config().blocking_policy
    }

    pub fn cache(&self) -> Option<&CriticalPathCache> {
        self.cache.as_ref()
    }

    pub fn analyze(&self, trace: &Trace) -> critpath_core::Result<CriticalPath> {
        match &self.cache {
            Some(cache) => cache.get_or_compute(trace),
            None => self.analyzer.analyze_trace(trace),
        }
    }

    /// Critical paths of every trace in a JSON document, in document order.
    pub fn analyze_document(&self, json: &str) -> critpath_core::Result<Vec<CriticalPath>> {
        load_traces(json)?
            .iter()
            .map(|trace| self.analyze(trace))
            .collect()
    }
}

/// Outcome of analyzing one input file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub critical_paths: Vec<CriticalPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn new(file: &Path, outcome: Result<Vec<CriticalPath>>) -> Self {
        let file = file.display().to_string();
        match outcome {
            Ok(critical_paths) => Self {
                file,
                critical_paths,
                error: None,
            },
            Err(e) => Self {
                file,
                critical_paths: Vec::new(),
                error: Some(format!("{:#}", e)),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub fn analyze_file(session: &Session, path: &Path) -> Result<Vec<CriticalPath>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file {}", path.display()))?;
    session
        .analyze_document(&contents)
        .with_context(|| format!("Failed to analyze {}", path.display()))
}

/// Analyze `files` concurrently, one blocking task per file.
///
/// Reports come back in the order of `files`; a failing file yields a report
/// carrying its error rather than aborting the others.
pub async fn analyze_files(session: Arc<Session>, files: Vec<PathBuf>) -> Vec<FileReport> {
    let mut reports: Vec<FileReport> = files
        .iter()
        .map(|file| FileReport::new(file, Err(anyhow::anyhow!("analysis task did not complete"))))
        .collect();

    let mut tasks = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        let session = Arc::clone(&session);
        tasks.spawn_blocking(move || {
            let outcome = analyze_file(&session, &file);
            (index, FileReport::new(&file, outcome))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, report)) => reports[index] = report,
            Err(e) => tracing::error!("Trace analysis task failed: {}", e),
        }
    }

    tracing::debug!(files = reports.len(), "batch analysis finished");
    reports
}
