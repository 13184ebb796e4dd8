//! Durable, append-only, ID-indexed event store.
//!
//! Each event is one file named `event-{idx:05}-{event_id}.json` under a
//! directory. The index lives in the filename, not in a separate index
//! file: enumerating the directory and sorting gives you ordered
//! access for free, and the embedded id lets a human (or a test) cross
//! check a file against what the in-memory maps think it holds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex_lite_match::EVENT_FILE_RE;

use crate::error::{ConversationError, Result};
use crate::event::{Event, EventId, EventRecord, Source};

/// Pluggable backing store so tests can run entirely in memory.
pub trait FileStore: Send + Sync {
    fn read(&self, path: &str) -> std::io::Result<String>;
    fn write(&self, path: &str, contents: &str) -> std::io::Result<()>;
    fn list(&self, dir: &str) -> std::io::Result<Vec<String>>;
}

/// The shipped [`FileStore`] implementation: plain `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

impl FileStore for LocalFileStore {
    fn read(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &str, contents: &str) -> std::io::Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn list(&self, dir: &str) -> std::io::Result<Vec<String>> {
        if !Path::new(dir).exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// An in-memory [`FileStore`], used by tests that don't want real I/O.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: parking_lot::Mutex<HashMap<String, String>>,
}

impl FileStore for MemoryFileStore {
    fn read(&self, path: &str) -> std::io::Result<String> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
    }

    fn write(&self, path: &str, contents: &str) -> std::io::Result<()> {
        self.files.lock().insert(path.to_string(), contents.to_string());
        Ok(())
    }

    fn list(&self, dir: &str) -> std::io::Result<Vec<String>> {
        let prefix = format!("{dir}/");
        Ok(self
            .files
            .lock()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|s| s.to_string())
            .collect())
    }
}

fn event_path(dir: &str, idx: usize, id: &EventId) -> String {
    format!("{dir}/event-{idx:05}-{id}.json")
}

/// Ordered, append-only, ID-indexed event sequence backed by a
/// [`FileStore`].
pub struct EventLog {
    store: Box<dyn FileStore>,
    dir: String,
    length: usize,
    id_to_idx: HashMap<EventId, usize>,
    idx_to_id: HashMap<usize, EventId>,
}

impl EventLog {
    /// Open (or create) an event log rooted at `dir`, scanning existing
    /// files to rebuild the index/id maps.
    pub fn open(store: Box<dyn FileStore>, dir: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        let mut log = Self {
            store,
            dir,
            length: 0,
            id_to_idx: HashMap::new(),
            idx_to_id: HashMap::new(),
        };
        log.scan_and_build_index()?;
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Append a new event. Fails if `record.id` is already present.
    pub fn append(&mut self, record: EventRecord) -> Result<()> {
        if self.id_to_idx.contains_key(&record.id) {
            let existing = self.id_to_idx[&record.id];
            return Err(ConversationError::DuplicateEventId {
                id: record.id.0.clone(),
                existing_index: existing,
            });
        }
        let idx = self.length;
        let path = event_path(&self.dir, idx, &record.id);
        let json = serde_json::to_string(&record)?;
        self.store.write(&path, &json)?;
        self.id_to_idx.insert(record.id.clone(), idx);
        self.idx_to_id.insert(idx, record.id);
        self.length += 1;
        Ok(())
    }

    /// Random access by index. O(1) file read.
    pub fn get(&self, idx: usize) -> Result<EventRecord> {
        if idx >= self.length {
            return Err(ConversationError::IndexOutOfRange { index: idx, length: self.length });
        }
        let id = self
            .idx_to_id
            .get(&idx)
            .expect("index within length must have an id");
        let path = event_path(&self.dir, idx, id);
        let raw = self.store.read(&path)?;
        let record: EventRecord = serde_json::from_str(&raw)?;
        Ok(record)
    }

    pub fn get_by_id(&self, id: &EventId) -> Result<EventRecord> {
        let idx = self
            .id_to_idx
            .get(id)
            .ok_or_else(|| ConversationError::EventNotFound(id.0.clone()))?;
        self.get(*idx)
    }

    pub fn index_of(&self, id: &EventId) -> Option<usize> {
        self.id_to_idx.get(id).copied()
    }

    /// Iterate the whole log in index order.
    pub fn iter(&self) -> impl Iterator<Item = Result<EventRecord>> + '_ {
        (0..self.length).map(move |i| self.get(i))
    }

    /// Materialize the full log into a `Vec`, propagating the first
    /// read error encountered.
    pub fn to_vec(&self) -> Result<Vec<EventRecord>> {
        self.iter().collect()
    }

    /// Enumerate `dir`, match filenames against the event pattern,
    /// and rebuild the index/id maps. Stops at the first missing
    /// index; a higher index present past the gap is a warning, not a
    /// hard failure (the gap itself still truncates loading).
    fn scan_and_build_index(&mut self) -> Result<()> {
        let names = self.store.list(&self.dir)?;
        let mut by_idx: HashMap<usize, EventId> = HashMap::new();

        for name in &names {
            match EVENT_FILE_RE.captures(name) {
                Some((idx, id)) => {
                    by_idx.insert(idx, EventId(id));
                }
                None => {
                    tracing::warn!(file = %name, dir = %self.dir, "unrecognized file in events directory, ignoring");
                }
            }
        }

        let mut n = 0usize;
        while by_idx.contains_key(&n) {
            n += 1;
        }
        if by_idx.keys().any(|&i| i >= n) {
            tracing::warn!(dir = %self.dir, stopped_at = n, "gap detected in event log, truncating load at the gap");
        }

        let mut id_to_idx = HashMap::new();
        let mut idx_to_id = HashMap::new();
        for i in 0..n {
            let id = by_idx.remove(&i).expect("index below n must be present");
            if id_to_idx.insert(id.clone(), i).is_some() {
                tracing::warn!(id = %id, "duplicate event id encountered while rebuilding index, keeping first occurrence");
                continue;
            }
            idx_to_id.insert(i, id);
        }

        self.length = n;
        self.id_to_idx = id_to_idx;
        self.idx_to_id = idx_to_id;
        Ok(())
    }
}

/// Returns the events (in index order) that occur at or after the
/// index of the last user message, or the whole log if there is none.
pub fn tail_after_last_user_message(events: &[EventRecord]) -> &[EventRecord] {
    let last_user = events
        .iter()
        .rposition(|e| matches!(e.source, Source::User) && e.event.is_user_message());
    match last_user {
        Some(idx) => &events[idx..],
        None => events,
    }
}

/// Tiny hand-rolled matcher for `event-{idx:05}-{id}.json` so this
/// crate doesn't need a `regex` dependency for one fixed pattern.
mod regex_lite_match {
    pub struct EventFileRe;

    pub static EVENT_FILE_RE: EventFileRe = EventFileRe;

    impl EventFileRe {
        /// Returns `Some((index, event_id))` if `name` matches
        /// `event-NNNNN-ID.json`.
        pub fn captures(&self, name: &str) -> Option<(usize, String)> {
            let rest = name.strip_prefix("event-")?;
            let rest = rest.strip_suffix(".json")?;
            let (idx_str, id) = rest.split_once('-')?;
            if idx_str.len() != 5 || !idx_str.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let idx: usize = idx_str.parse().ok()?;
            if id.is_empty() {
                return None;
            }
            Some((idx, id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MessageRole, SecurityRisk};

    fn log() -> EventLog {
        EventLog::open(Box::new(MemoryFileStore::default()), "events").unwrap()
    }

    fn msg(text: &str) -> EventRecord {
        EventRecord::new(
            Source::User,
            Event::Message {
                role: MessageRole::User,
                content: vec![text.into()],
                activated_skills: vec![],
                sender: None,
                reasoning_content: None,
                thinking_blocks: vec![],
            },
        )
    }

    #[test]
    fn append_and_get_round_trips() {
        let mut log = log();
        let rec = msg("hello");
        let id = rec.id.clone();
        log.append(rec).unwrap();
        assert_eq!(log.len(), 1);
        let back = log.get(0).unwrap();
        assert_eq!(back.id, id);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut log = log();
        let rec = msg("hi");
        let dup = EventRecord { id: rec.id.clone(), ..msg("bye") };
        log.append(rec).unwrap();
        let err = log.append(dup).unwrap_err();
        assert!(matches!(err, ConversationError::DuplicateEventId { .. }));
    }

    #[test]
    fn index_and_id_maps_agree() {
        let mut log = log();
        for i in 0..5 {
            log.append(msg(&format!("m{i}"))).unwrap();
        }
        for i in 0..5 {
            let rec = log.get(i).unwrap();
            assert_eq!(log.index_of(&rec.id), Some(i));
        }
    }

    #[test]
    fn reopen_reconstructs_sequence() {
        let store = std::sync::Arc::new(MemoryFileStore::default());
        struct Shared(std::sync::Arc<MemoryFileStore>);
        impl FileStore for Shared {
            fn read(&self, p: &str) -> std::io::Result<String> {
                self.0.read(p)
            }
            fn write(&self, p: &str, c: &str) -> std::io::Result<()> {
                self.0.write(p, c)
            }
            fn list(&self, d: &str) -> std::io::Result<Vec<String>> {
                self.0.list(d)
            }
        }

        let mut log = EventLog::open(Box::new(Shared(store.clone())), "events").unwrap();
        log.append(msg("one")).unwrap();
        log.append(msg("two")).unwrap();

        let reopened = EventLog::open(Box::new(Shared(store)), "events").unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(0).unwrap().event.stuck_eq(&log.get(0).unwrap().event), true);
    }

    #[test]
    fn get_out_of_range_errors() {
        let log = log();
        let err = log.get(0).unwrap_err();
        assert!(matches!(err, ConversationError::IndexOutOfRange { .. }));
    }

    #[test]
    fn file_pattern_matcher_rejects_unrecognized_names() {
        use super::regex_lite_match::EVENT_FILE_RE;
        assert!(EVENT_FILE_RE.captures("event-00000-abc123.json").is_some());
        assert!(EVENT_FILE_RE.captures("base_state.json").is_none());
        assert!(EVENT_FILE_RE.captures("event-0-abc.json").is_none());
    }
}
