use crate::analysis::{CriticalPath, CriticalPathAnalyzer};
use crate::error::Result;
use crate::trace::Trace;
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct CachedPath {
    fingerprint: u64,
    path: CriticalPath,
}

/// Bounded cache of computed critical paths keyed by trace id.
///
/// An entry is only reused while the trace's spans hash to the same
/// fingerprint, so a trace that gained spans is recomputed. Results are
/// cloned out; callers never share a mutable path.
///
/// # Example
/// ```
/// use critpath_core::{CriticalPathAnalyzer, CriticalPathCache, RawSpan, Trace};
///
/// let cache = CriticalPathCache::new(CriticalPathAnalyzer::default(), 16);
/// let trace = Trace::new("t1", vec![RawSpan::new("root", 0, 10)]);
///
/// let first = cache.get_or_compute(&trace).unwrap();
/// let second = cache.get_or_compute(&trace).unwrap();
/// assert_eq!(first, second);
/// assert_eq!(cache.len(), 1);
/// ```
pub struct CriticalPathCache {
    analyzer: CriticalPathAnalyzer,
    entries: Mutex<LruCache<String, CachedPath>>,
}

impl CriticalPathCache {
    /// A capacity of zero is treated as one.
    pub fn new(analyzer: CriticalPathAnalyzer, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            analyzer,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_or_compute(&self, trace: &Trace) -> Result<CriticalPath> {
        let fingerprint = fingerprint(trace);

        if let Some(cached) = self.entries().get(&trace.trace_id) {
            if cached.fingerprint == fingerprint {
                tracing::trace!(trace_id = %trace.trace_id, "critical path cache hit");
                return Ok(cached.path.clone());
            }
        }

        let path = self.analyzer.analyze_trace(trace)?;
        self.entries().put(
            trace.trace_id.clone(),
            CachedPath {
                fingerprint,
                path: path.clone(),
            },
        );
        Ok(path)
    }

    pub fn invalidate(&self, trace_id: &str) -> bool {
        self.entries().pop(trace_id).is_some()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries().cap().get()
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<String, CachedPath>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hash of everything in a trace that can change its critical path.
fn fingerprint(trace: &Trace) -> u64 {
    let mut hasher = DefaultHasher::new();
    trace.spans.len().hash(&mut hasher);
    for span in &trace.spans {
        span.span_id.hash(&mut hasher);
        span.parent_reference().hash(&mut hasher);
        span.start_time.hash(&mut hasher);
        span.duration.hash(&mut hasher);
        span.span_kind().hash(&mut hasher);
    }
    hasher.finish()
}
