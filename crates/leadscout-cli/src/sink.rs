//! Pending-update sink backed by a local approval-queue file.
//!
//! The approval dashboard that owns pending updates lives outside this
//! repository; for CLI and batch runs the hand-off is a JSONL file the
//! dashboard importer watches. One line per update, append-only.

use std::path::PathBuf;
use std::sync::Mutex;

use leadscout_core::error::SinkError;
use leadscout_core::model::PendingUpdate;
use leadscout_core::pipeline::PendingUpdateSink;

/// Appends pending updates to a JSONL file, one record per line.
pub struct FileUpdateSink {
    path: PathBuf,
    counter: Mutex<u64>,
}

impl FileUpdateSink {
    /// A sink writing to the given file (created on first enqueue).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            counter: Mutex::new(0),
        }
    }
}

#[async_trait::async_trait]
impl PendingUpdateSink for FileUpdateSink {
    async fn enqueue(&self, update: &PendingUpdate) -> Result<String, SinkError> {
        let line = serde_json::to_string(update).map_err(|e| SinkError::Rejected {
            message: format!("unserializable update: {e}"),
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::Transport {
                    message: e.to_string(),
                })?;
        }

        let mut contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(SinkError::Transport {
                    message: e.to_string(),
                });
            }
        };
        contents.push_str(&line);
        contents.push('\n');
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| SinkError::Transport {
                message: e.to_string(),
            })?;

        let mut counter = self.counter.lock().expect("sink counter lock");
        *counter += 1;
        Ok(format!("{}:{}", update.run_id, counter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use leadscout_core::model::RecordType;

    fn update(run_id: &str) -> PendingUpdate {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), serde_json::json!("CFO"));
        PendingUpdate {
            record_type: RecordType::Lead,
            account_id: "A1".to_string(),
            fields,
            run_id: run_id.to_string(),
            provenance: vec![],
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        let sink = FileUpdateSink::new(&path);

        let id1 = sink.enqueue(&update("run-1")).await.unwrap();
        let id2 = sink.enqueue(&update("run-1")).await.unwrap();
        assert_ne!(id1, id2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: PendingUpdate = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.account_id, "A1");
    }
}
