//! Debug transcripts under `<config_dir>/transcripts/`.
//!
//! With `debug = true` every model exchange is written to its own directory:
//! the outgoing messages, the raw reply and a small metadata file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::core::types::ChatMessage;

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeMeta {
    pub session: String,
    pub exchange: u32,
    pub model: String,
    /// Summary of the scanned reply, see `ParsedResponse`'s `Display`.
    pub parsed: String,
    /// Corrective message when the reply broke the tag rules.
    pub violation: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TranscriptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub request_path: PathBuf,
    pub response_path: PathBuf,
}

impl TranscriptPaths {
    pub fn new(root: &Path, session: &str, exchange: u32) -> Self {
        let dir = root
            .join("transcripts")
            .join(session)
            .join(exchange.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            request_path: dir.join("request.json"),
            response_path: dir.join("response.txt"),
        }
    }
}

pub struct Exchange<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub response: &'a str,
    pub parsed: String,
    pub violation: Option<String>,
    pub duration_ms: u64,
}

/// Numbers exchanges within one process run.
#[derive(Debug, Clone)]
pub struct Transcript {
    root: PathBuf,
    session: String,
    next: u32,
}

impl Transcript {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            session: Utc::now().format("%Y%m%dT%H%M%S").to_string(),
            next: 1,
        }
    }

    pub fn record(&mut self, exchange: &Exchange<'_>) -> Result<TranscriptPaths> {
        let paths = TranscriptPaths::new(&self.root, &self.session, self.next);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create transcript dir {}", paths.dir.display()))?;

        let meta = ExchangeMeta {
            session: self.session.clone(),
            exchange: self.next,
            model: exchange.model.to_string(),
            parsed: exchange.parsed.clone(),
            violation: exchange.violation.clone(),
            duration_ms: exchange.duration_ms,
        };
        write_json(&paths.meta_path, &meta)?;
        write_json(&paths.request_path, &exchange.messages)?;
        write_text(&paths.response_path, exchange.response)?;

        self.next += 1;
        Ok(paths)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TranscriptPaths::new(temp.path(), "20260101T000000", 3);

        assert!(
            paths
                .dir
                .ends_with(Path::new("transcripts/20260101T000000/3"))
        );
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.request_path.ends_with("request.json"));
        assert!(paths.response_path.ends_with("response.txt"));
    }

    #[test]
    fn exchanges_are_numbered_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut transcript = Transcript::new(temp.path());
        let messages = vec![ChatMessage::assistant("system"), ChatMessage::user("hi")];

        let first = transcript
            .record(&Exchange {
                model: "m",
                messages: &messages,
                response: "hello <RequestAccomplished>1</RequestAccomplished>",
                parsed: "accomplished=true".to_string(),
                violation: None,
                duration_ms: 12,
            })
            .expect("record");
        let second = transcript
            .record(&Exchange {
                model: "m",
                messages: &messages,
                response: "",
                parsed: String::new(),
                violation: Some("AI Error: no tags".to_string()),
                duration_ms: 1,
            })
            .expect("record");

        assert!(first.dir.ends_with("1"));
        assert!(second.dir.ends_with("2"));
        let request = fs::read_to_string(&first.request_path).expect("read request");
        assert!(request.contains("\"from_user\": true"));
        let meta = fs::read_to_string(&second.meta_path).expect("read meta");
        assert!(meta.contains("AI Error: no tags"));
    }
}
