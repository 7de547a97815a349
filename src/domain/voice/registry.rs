use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::error::VoiceError;
use super::normalizer::{collect_entries, is_audio_file_name, VoiceEntry};
use crate::domain::audio::AudioFormat;
use crate::infrastructure::config::VoiceConfig;

type VoiceMap = HashMap<String, PathBuf>;

/// Case-insensitive, whitespace-trimmed lookup key
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Splits `<id>_<alias>` at the first underscore; the alias keeps any later ones.
fn split_prefixed(name: &str) -> Option<(&str, &str)> {
    name.split_once('_')
        .filter(|(id, alias)| !id.is_empty() && !alias.is_empty())
}

#[derive(Debug, Default)]
struct RefreshState {
    /// Merged result of the last filesystem/manifest/env scan
    local: VoiceMap,
    /// Voices registered at runtime (uploads)
    registered: VoiceMap,
    /// Voices discovered from upstream listings
    remote: VoiceMap,
    last_local: Option<Instant>,
    last_remote: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct StoredVoice {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// Resolves caller voice identifiers to local audio-prompt files.
///
/// Sources, lowest precedence first: files in the asset directory, the JSON
/// upload log, the JSON manifest, the static env mapping, runtime
/// registrations, and voices discovered from upstream listings. Lookups read
/// an immutable snapshot; refreshes rebuild it under `state` and swap it in.
pub struct VoiceRegistry {
    config: VoiceConfig,
    snapshot: RwLock<Arc<VoiceMap>>,
    state: Mutex<RefreshState>,
}

impl VoiceRegistry {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            config,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.config.asset_dir
    }

    /// Resolve to a path that exists right now. Entries whose file has been
    /// removed resolve to `None`, which lets upstream-native voices pass
    /// through by identifier alone.
    pub fn resolve(&self, voice: &str) -> Option<PathBuf> {
        let path = self.lookup(voice)?;
        if path.is_file() {
            Some(path)
        } else {
            tracing::debug!(
                voice = voice,
                path = %path.display(),
                "Voice sample no longer on disk, treating as unresolved"
            );
            None
        }
    }

    /// In-memory lookup with `<id>_<alias>` suffix fallback, no disk check.
    pub fn lookup(&self, voice: &str) -> Option<PathBuf> {
        let key = normalize_key(voice);
        if key.is_empty() {
            return None;
        }
        let snapshot = self.snapshot.read().clone();
        if let Some(path) = snapshot.get(&key) {
            return Some(path.clone());
        }
        let (_, alias) = split_prefixed(&key)?;
        snapshot.get(alias).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Known voices grouped by sample file, keys sorted.
    pub fn entries(&self) -> Vec<VoiceEntry> {
        let snapshot = self.snapshot.read().clone();
        let mut by_path: BTreeMap<&PathBuf, Vec<String>> = BTreeMap::new();
        for (key, path) in snapshot.iter() {
            by_path.entry(path).or_default().push(key.clone());
        }
        by_path
            .into_iter()
            .map(|(path, mut keys)| {
                keys.sort();
                VoiceEntry {
                    keys,
                    path: Some(path.clone()),
                }
            })
            .collect()
    }

    /// Register one sample under several names at runtime.
    pub fn register(&self, keys: &[&str], path: impl Into<PathBuf>) {
        let path = self.absolutize(&path.into());
        let mut state = self.state.lock();
        for key in keys {
            let key = normalize_key(key);
            if !key.is_empty() {
                state.registered.insert(key, path.clone());
            }
        }
        self.publish(&state);
    }

    /// Rescan local sources at most once per `local_refresh_interval`.
    pub fn refresh_local_if_stale(&self) -> bool {
        let mut state = self.state.lock();
        let stale = state
            .last_local
            .map(|at| at.elapsed() >= self.config.local_refresh_interval)
            .unwrap_or(true);
        if stale {
            self.rescan(&mut state);
        }
        stale
    }

    pub fn refresh_local(&self) {
        let mut state = self.state.lock();
        self.rescan(&mut state);
    }

    /// True when an upstream listing should be fetched now.
    pub fn remote_refresh_due(&self, force: bool) -> bool {
        if force {
            return true;
        }
        self.state
            .lock()
            .last_remote
            .map(|at| at.elapsed() >= self.config.remote_refresh_interval)
            .unwrap_or(true)
    }

    /// Record a remote refresh attempt that produced nothing, so failures are
    /// not retried on every request.
    pub fn mark_remote_attempt(&self) {
        self.state.lock().last_remote = Some(Instant::now());
    }

    /// Replace the remote layer with voices parsed from an upstream listing.
    pub fn merge_remote(&self, listing: &Value) -> Vec<VoiceEntry> {
        let entries = collect_entries(listing);
        let mut remote = HashMap::new();
        for entry in &entries {
            if let Some(path) = &entry.path {
                self.insert_entry(&mut remote, &entry.keys, path);
            }
        }

        let mut state = self.state.lock();
        tracing::info!(
            voices = entries.len(),
            with_samples = remote.len(),
            "Merged upstream voice listing"
        );
        state.remote = remote;
        state.last_remote = Some(Instant::now());
        self.publish(&state);
        entries
    }

    /// Persist an uploaded sample as `<uuid>_<name>.<ext>`, log it, and make
    /// it resolvable immediately.
    pub fn store_upload(
        &self,
        name: &str,
        bytes: &[u8],
        format: AudioFormat,
    ) -> Result<StoredVoice, VoiceError> {
        let name = sanitize_name(name).ok_or(VoiceError::InvalidName)?;
        let id = Uuid::new_v4().to_string();
        let path = self
            .absolutize(&self.config.asset_dir)
            .join(format!("{}_{}.{}", id, name, format.as_str()));

        fs::create_dir_all(&self.config.asset_dir)?;
        fs::write(&path, bytes)?;

        if let Some(log_path) = &self.config.upload_log {
            append_upload_log(log_path, &id, &name, &path)?;
        }

        let file_key = format!("{}_{}", id, name);
        self.register(&[id.as_str(), name.as_str(), file_key.as_str()], &path);

        tracing::info!(
            voice_id = %id,
            name = %name,
            path = %path.display(),
            size = bytes.len(),
            "Voice sample stored"
        );

        Ok(StoredVoice { id, name, path })
    }

    fn rescan(&self, state: &mut RefreshState) {
        let mut local = HashMap::new();

        self.scan_asset_dir(&mut local);
        if let Some(path) = &self.config.upload_log {
            self.load_json_source(path, &mut local);
        }
        if let Some(path) = &self.config.manifest {
            self.load_json_source(path, &mut local);
        }
        for (alias, path) in &self.config.static_map {
            self.insert_entry(&mut local, &[alias.clone()], path);
        }

        tracing::debug!(entries = local.len(), "Local voice sources rescanned");
        state.local = local;
        state.last_local = Some(Instant::now());
        self.publish(state);
    }

    fn publish(&self, state: &RefreshState) {
        let mut merged = state.local.clone();
        merged.extend(state.registered.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(state.remote.iter().map(|(k, v)| (k.clone(), v.clone())));
        *self.snapshot.write() = Arc::new(merged);
    }

    fn scan_asset_dir(&self, map: &mut VoiceMap) {
        let dir = &self.config.asset_dir;
        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Voice directory not readable");
                return;
            }
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || !is_audio_file_name(file_name) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let mut keys = vec![stem.to_string()];
            if let Some((id, alias)) = split_prefixed(stem) {
                keys.push(id.to_string());
                keys.push(alias.to_string());
            }
            self.insert_entry(map, &keys, &path);
        }
    }

    fn load_json_source(&self, path: &Path, map: &mut VoiceMap) {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable voice metadata");
                return;
            }
        };

        for entry in collect_entries(&value) {
            if let Some(sample) = &entry.path {
                self.insert_entry(map, &entry.keys, sample);
            }
        }
    }

    fn insert_entry(&self, map: &mut VoiceMap, keys: &[String], path: &Path) {
        let path = self.absolutize(path);
        for key in keys {
            let key = normalize_key(key);
            if !key.is_empty() {
                map.insert(key, path.clone());
            }
        }
    }

    /// Relative sample paths are taken relative to the asset directory.
    fn absolutize(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else if path.starts_with(&self.config.asset_dir) {
            path.to_path_buf()
        } else {
            self.config.asset_dir.join(path)
        };
        if joined.is_absolute() {
            joined
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&joined))
                .unwrap_or(joined)
        }
    }
}

fn sanitize_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn append_upload_log(log_path: &Path, id: &str, name: &str, path: &Path) -> Result<(), VoiceError> {
    let mut records = match fs::read_to_string(log_path) {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(other) => vec![other],
            Err(_) => Vec::new(),
        },
        Err(_) => Vec::new(),
    };

    records.push(json!({
        "id": id,
        "name": name,
        "file_path": path.to_string_lossy(),
        "uploaded_at": chrono::Utc::now().to_rfc3339(),
    }));

    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialized = serde_json::to_vec_pretty(&Value::Array(records))
        .map_err(|e| VoiceError::Metadata(e.to_string()))?;
    fs::write(log_path, serialized)?;
    Ok(())
}
