//! Document digesting and fixed-window chunking.
//!
//! Turns one schema-free JSON document into the text chunks that get
//! embedded. Three digest modes are supported:
//!
//! | Mode | Body |
//! |------|------|
//! | `verbatim` | the raw file text, unchanged |
//! | `canonical` | compact JSON with keys sorted at every level |
//! | `pathlines` | one `keypath: value` line per leaf, sorted by keypath |
//!
//! The body is split into windows of `chunk_size` characters that advance
//! by `chunk_size - chunk_overlap`. Slicing is purely positional and counts
//! Unicode scalar values, never bytes. Every chunk is prefixed with a
//! [`FILE_PATH_HEADER`] line naming its source file.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::value_text;

/// Prefix of the header line carried by every chunk.
pub const FILE_PATH_HEADER: &str = "__FILE_PATH__=";

/// Upper bound on flattened leaves kept per document.
pub const DEFAULT_MAX_FLATTEN_ITEMS: usize = 50_000;

/// Which textual representation of a document gets embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestMode {
    Verbatim,
    Canonical,
    #[default]
    Pathlines,
}

impl FromStr for DigestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "verbatim" => Ok(Self::Verbatim),
            "canonical" => Ok(Self::Canonical),
            "pathlines" => Ok(Self::Pathlines),
            other => Err(format!(
                "Unknown digest mode: '{}'. Must be verbatim, canonical, or pathlines.",
                other
            )),
        }
    }
}

impl fmt::Display for DigestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Verbatim => "verbatim",
            Self::Canonical => "canonical",
            Self::Pathlines => "pathlines",
        };
        f.write_str(s)
    }
}

/// Digest settings, decoupled from application config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestOptions {
    pub mode: DigestMode,
    /// Window size in characters. `0` keeps the whole body as one chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub chunk_overlap: usize,
    pub max_flatten_items: usize,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            mode: DigestMode::Pathlines,
            chunk_size: 2000,
            chunk_overlap: 200,
            max_flatten_items: DEFAULT_MAX_FLATTEN_ITEMS,
        }
    }
}

/// Produce the embeddable chunks for one document.
///
/// `raw_text` is only read in [`DigestMode::Verbatim`]; the other modes
/// derive their body from the parsed `doc`.
pub fn digest_for_embedding(
    doc: &Value,
    raw_text: &str,
    file_path: &str,
    opts: &DigestOptions,
) -> Vec<String> {
    let body = match opts.mode {
        DigestMode::Verbatim => raw_text.to_string(),
        DigestMode::Canonical => canonical_json(doc),
        DigestMode::Pathlines => pathlines(doc, opts.max_flatten_items),
    };
    let header = format!("{}{}\n", FILE_PATH_HEADER, file_path);

    chunk_text(&body, opts.chunk_size, opts.chunk_overlap)
        .into_iter()
        .map(|c| format!("{}{}", header, c))
        .collect()
}

/// Flatten a document into `keypath -> leaf text` pairs.
///
/// Object keys are joined with `.`, array positions render as `[i]`.
/// Empty objects and arrays contribute nothing. Once `max_items` leaves
/// have been collected, further leaves are dropped.
pub fn flatten_json(value: &Value, max_items: usize) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(value, "", &mut out, max_items);
    out
}

fn flatten_into(value: &Value, prefix: &str, out: &mut BTreeMap<String, String>, max: usize) {
    if out.len() >= max {
        return;
    }
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten_into(v, &key, out, max);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(v, &format!("{}[{}]", prefix, i), out, max);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), value_text(leaf));
        }
    }
}

/// Render flattened pairs as sorted `keypath: value` lines.
pub fn pathlines(doc: &Value, max_items: usize) -> String {
    flatten_json(doc, max_items)
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact JSON with object keys sorted at every nesting level.
///
/// Non-ASCII text is emitted as-is, not escaped.
pub fn canonical_json(doc: &Value) -> String {
    sort_keys(doc).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Character-offset windows `[start, end)` covering `len` characters.
///
/// The final window is clipped to `len`. A `size` of 0 yields one window
/// over everything. An overlap that would stall progress is ignored.
pub fn chunk_spans(len: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    if size == 0 || len == 0 {
        return vec![(0, len)];
    }
    let mut spans = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        spans.push((start, end));
        if end == len {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    spans
}

/// Split text into overlapping character windows.
///
/// Always returns at least one chunk; an empty body yields one empty chunk
/// so the document's header line still gets indexed.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let char_len = offsets.len();
    offsets.push(text.len());

    chunk_spans(char_len, size, overlap)
        .into_iter()
        .map(|(s, e)| &text[offsets[s]..offsets[e]])
        .collect()
}
