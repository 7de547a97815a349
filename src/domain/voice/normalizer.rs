//! Walks loosely-shaped voice metadata (upstream listings, manifests, upload
//! logs) and pulls out identifier/path pairs.
//!
//! Accepted shapes include a list of strings, a list of objects, an
//! id-keyed object, and any of those nested under a `results`/`voices`/
//! `data`/`items` wrapper.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const KEY_FIELDS: &[&str] = &[
    "id",
    "voice_id",
    "voice",
    "name",
    "label",
    "display_name",
    "title",
];
pub const PATH_FIELDS: &[&str] = &["audio_prompt_path", "file_path", "path", "sample_path"];
const WRAPPER_FIELDS: &[&str] = &["results", "voices", "data", "items"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac", "m4a", "opus", "aac"];
const MAX_DEPTH: usize = 8;

/// Every name a voice is known by, plus its sample path when one is given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceEntry {
    pub keys: Vec<String>,
    pub path: Option<PathBuf>,
}

impl VoiceEntry {
    pub fn primary(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }
}

pub fn collect_entries(value: &Value) -> Vec<VoiceEntry> {
    let mut entries = Vec::new();
    walk(value, None, 0, &mut entries);
    entries
}

pub fn is_audio_file_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn looks_like_path(value: &str) -> bool {
    value.contains('/') || value.contains('\\') || is_audio_file_name(value)
}

fn walk(value: &Value, outer_key: Option<&str>, depth: usize, out: &mut Vec<VoiceEntry>) {
    if depth > MAX_DEPTH {
        return;
    }

    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return;
            }
            match outer_key {
                Some(key) if looks_like_path(s) => out.push(VoiceEntry {
                    keys: vec![key.to_string()],
                    path: Some(PathBuf::from(s)),
                }),
                Some(key) => out.push(VoiceEntry {
                    keys: dedup_keys([key, s]),
                    path: None,
                }),
                None => out.push(VoiceEntry {
                    keys: vec![s.to_string()],
                    path: None,
                }),
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, None, depth + 1, out);
            }
        }
        Value::Object(map) => {
            if let Some(entry) = entry_from_object(map, outer_key) {
                out.push(entry);
                return;
            }

            let mut descended = false;
            for field in WRAPPER_FIELDS {
                if let Some(inner) = map.get(*field) {
                    walk(inner, None, depth + 1, out);
                    descended = true;
                }
            }
            if descended {
                return;
            }

            // id-keyed object: { "<voice>": {...} | "<path>" | "<name>" }
            for (key, inner) in map {
                walk(inner, Some(key), depth + 1, out);
            }
        }
        _ => {}
    }
}

fn entry_from_object(map: &Map<String, Value>, outer_key: Option<&str>) -> Option<VoiceEntry> {
    let mut keys: Vec<String> = Vec::new();
    if let Some(key) = outer_key {
        keys.push(key.to_string());
    }
    for field in KEY_FIELDS {
        let candidate = match map.get(*field) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !candidate.is_empty() && !keys.contains(&candidate) {
            keys.push(candidate);
        }
    }

    let path = PATH_FIELDS
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    let has_own_fields = keys.len() > usize::from(outer_key.is_some()) || path.is_some();
    let is_wrapper = WRAPPER_FIELDS.iter().any(|f| map.contains_key(*f));

    if has_own_fields || (outer_key.is_some() && !is_wrapper) {
        Some(VoiceEntry { keys, path })
    } else {
        None
    }
}

fn dedup_keys<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in candidates {
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}
