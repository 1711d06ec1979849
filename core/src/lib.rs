pub mod analysis;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod root;
pub mod sanitize;
pub mod trace;
pub mod walker;

pub use analysis::{critical_path_for_trace, CriticalPath, CriticalPathAnalyzer};
pub use cache::CriticalPathCache;
pub use classify::{classify, mark_blocking, BlockingPolicy};
pub use config::Config;
pub use error::{CriticalPathError, Result};
pub use graph::{CPSpan, SpanMap};
pub use root::locate_root;
pub use sanitize::sanitize;
pub use trace::{load_traces, RawSpan, RefType, SpanKind, SpanReference, Trace};
pub use walker::{last_finishing_child, walk, CriticalPathSection};
