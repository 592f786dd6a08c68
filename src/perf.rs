use serde_json::json;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Opt-in timing log. Spans go to the log as they happen; on drop a sibling
/// `<stem>_hot.log` ranks span names by total time.
#[derive(Clone)]
pub struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, page: Option<usize>, ms: f64) {
        let record = json!({
            "type": "perf.span",
            "name": name,
            "page": page,
            "unit": "ms",
            "ms": (ms * 1000.0).round() / 1000.0,
        });
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{record}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let hot_path = hot_path_for(&self.path);
        let Ok(file) = File::create(&hot_path) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (name, ms)) in spans.into_iter().take(100).enumerate() {
            let count = *self.span_counts.get(name).unwrap_or(&1);
            let avg = if count == 0 { 0.0 } else { ms / count as f64 };
            let record = json!({
                "type": "perf.hot.span",
                "rank": rank + 1,
                "name": name,
                "unit": "ms",
                "agg": "sum",
                "ms": ms,
                "count": count,
                "avg_ms": avg,
            });
            let _ = writeln!(writer, "{record}");
        }
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("hagaki_perf.log");
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn hot_log_sits_next_to_the_perf_log() {
        assert_eq!(
            hot_path_for(Path::new("/tmp/run.perf.jsonl")),
            PathBuf::from("/tmp/run.perf_hot.log")
        );
        assert_eq!(
            hot_path_for(Path::new("/tmp/perf")),
            PathBuf::from("/tmp/perf_hot.log")
        );
    }

    #[test]
    fn spans_are_ranked_on_drop() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "hagaki_perf_{}_{}.jsonl",
            std::process::id(),
            nanos
        ));
        {
            let logger = PerfLogger::new(&path).unwrap();
            logger.log_span_ms("compose", Some(1), 1.0);
            logger.log_span_ms("compose", Some(2), 2.0);
            logger.log_span_ms("serialize", None, 10.0);
        }
        let spans = std::fs::read_to_string(&path).unwrap();
        assert_eq!(spans.lines().count(), 3);

        let hot_path = hot_path_for(&path);
        let hot = std::fs::read_to_string(&hot_path).unwrap();
        let first: serde_json::Value = serde_json::from_str(hot.lines().next().unwrap()).unwrap();
        assert_eq!(first["name"], "serialize");
        assert_eq!(first["rank"], 1);
        let second: serde_json::Value = serde_json::from_str(hot.lines().nth(1).unwrap()).unwrap();
        assert_eq!(second["count"], 2);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&hot_path);
    }
}
