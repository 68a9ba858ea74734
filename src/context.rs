//! Data passed between the bridge and its workers.
//!
//! This module defines the virtual file mapping handed to the synthesis tool
//! and the request/response envelopes that cross the worker boundary. Every
//! envelope carries a [`RequestId`] so replies can be matched to the caller
//! that issued them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Correlation ID for a single bridge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// In-memory files exchanged with the synthesis tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFiles {
    files: HashMap<String, Vec<u8>>,
}

impl VirtualFiles {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mapping holding a single text file
    pub fn single(name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut files = Self::new();
        files.insert_text(name, content);
        files
    }

    /// Insert raw bytes, replacing any previous content
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), content.into());
    }

    /// Insert text content
    pub fn insert_text(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.insert(name, content.into().into_bytes());
    }

    /// Raw content of a file
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Content of a file as text; invalid UTF-8 is replaced
    pub fn read_text(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Remove a file and return its text content
    pub fn take_text(&mut self, name: &str) -> Option<String> {
        self.files.remove(name).map(|bytes| match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Whether a file exists
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// File names in arbitrary order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Iterate over name/content pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_slice()))
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Request posted from the bridge to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Correlation ID echoed in the response
    pub id: RequestId,
    /// Verilog source text, forwarded verbatim
    pub source: String,
}

impl WorkerRequest {
    /// Create a request with a fresh ID
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            source: source.into(),
        }
    }
}

/// Reply carried by a [`WorkerResponse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reply {
    /// Synthesis ran; `content` is the output file, if it was produced
    Output {
        /// Output file content
        content: Option<String>,
    },
    /// The worker could not service the request
    Unavailable {
        /// Why the worker is unavailable
        reason: String,
    },
}

/// Response posted from a worker back to the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// ID of the request being answered
    pub id: RequestId,
    /// The reply
    pub reply: Reply,
}

impl WorkerResponse {
    /// Response carrying synthesis output
    pub fn output(id: RequestId, content: Option<String>) -> Self {
        Self {
            id,
            reply: Reply::Output { content },
        }
    }

    /// Response for a request the worker could not service
    pub fn unavailable(id: RequestId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reply: Reply::Unavailable {
                reason: reason.into(),
            },
        }
    }
}
