//! JSON-lines request protocol spoken by `tagdedup serve`.
//!
//! One request object per line, tagged by `"op"`. Every request produces exactly one
//! response line, `{"ok":true,...}` or `{"ok":false,"error":"..."}`. Only fatal cache errors
//! stop the session.

use std::io::{BufRead, Write};

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tagdedup_core::{DedupCache, DedupError};
use tracing::{debug, error, warn};

/// A decoded request line.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Replace the ignore-list used for buckets created afterwards.
    Configure {
        #[serde(default)]
        ignored_attributes: Vec<String>,
    },
    /// Record a point.
    Add {
        bucket: String,
        point: Map<String, Value>,
        #[serde(default)]
        display: bool,
    },
    /// Look a point up without recording it.
    Contains {
        bucket: String,
        point: Map<String, Value>,
    },
    /// Forget a point.
    Remove {
        bucket: String,
        point: Map<String, Value>,
    },
    /// Destroy a bucket.
    DropBucket { bucket: String },
    /// Name every bucket.
    ListBuckets,
    /// Report cache statistics.
    Stats,
}

/// Converts a JSON object into (tag, value) pairs.
///
/// String values are taken as-is; any other value is rendered as compact JSON text.
pub fn point_pairs(point: &Map<String, Value>) -> Vec<(&str, String)> {
    point
        .iter()
        .map(|(tag, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (tag.as_str(), text)
        })
        .collect()
}

/// A serve session bound to one cache.
pub struct Session {
    cache: DedupCache,
}

impl Session {
    /// Wraps `cache`.
    pub fn new(cache: DedupCache) -> Self {
        Self { cache }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// Executes one request. Only canonicalization and capacity failures are errors.
    pub fn handle(&mut self, request: Request) -> Result<Value, DedupError> {
        match request {
            Request::Configure { ignored_attributes } => {
                self.cache.configure(ignored_attributes);
                Ok(json!({ "ok": true }))
            }
            Request::Add {
                bucket,
                point,
                display,
            } => {
                let pairs = point_pairs(&point);
                let outcome = self.cache.add(&bucket, &pairs, display)?;
                let mut reply = json!({ "ok": true, "is_new": outcome.is_new });
                if let Some(text) = outcome.display {
                    reply["display"] = Value::String(text);
                }
                Ok(reply)
            }
            Request::Contains { bucket, point } => {
                let pairs = point_pairs(&point);
                let found = self.cache.contains(&bucket, &pairs);
                Ok(json!({ "ok": true, "found": found }))
            }
            Request::Remove { bucket, point } => {
                let pairs = point_pairs(&point);
                let removed = self.cache.remove(&bucket, &pairs);
                Ok(json!({ "ok": true, "removed": removed }))
            }
            Request::DropBucket { bucket } => {
                let dropped = self.cache.drop_bucket(&bucket);
                Ok(json!({ "ok": true, "dropped": dropped }))
            }
            Request::ListBuckets => {
                let mut buckets = self.cache.list_buckets();
                buckets.sort();
                Ok(json!({ "ok": true, "buckets": buckets }))
            }
            Request::Stats => Ok(json!({ "ok": true, "stats": self.cache.stats() })),
        }
    }

    /// Parses and executes one request line.
    ///
    /// Malformed lines and recoverable cache errors become error replies; a fatal cache
    /// error is returned alongside the reply that reports it.
    pub fn handle_line(&mut self, line: &str) -> (Value, Option<DedupError>) {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed request");
                return (error_reply(format!("invalid request: {}", e)), None);
            }
        };
        debug!(?request, "handling request");

        match self.handle(request) {
            Ok(reply) => (reply, None),
            Err(e) if e.is_fatal() => (error_reply(e.to_string()), Some(e)),
            Err(e) => (error_reply(e.to_string()), None),
        }
    }

    /// Answers every non-blank line of `input` on `output` until input ends or a fatal error.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (reply, fatal) = self.handle_line(&line);
            writeln!(output, "{}", reply)?;
            output.flush()?;
            if let Some(e) = fatal {
                error!(error = %e, "stopping session");
                return Err(e.into());
            }
        }
        Ok(())
    }
}

fn error_reply(message: String) -> Value {
    json!({ "ok": false, "error": message })
}
