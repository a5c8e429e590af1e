//! User preferences layered over versioned defaults.
//!
//! Persisted blobs may come from an older schema. [`merge`] keeps every top-level key of the
//! defaults, overlays persisted values one level deep, and drops keys the defaults no longer
//! know. [`PreferenceStore`] then reconciles the component bookkeeping against the panels that
//! actually exist.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use crate::infra::storage::PreferenceBackend;

/// Storage key of the current preference schema.
pub const STORAGE_KEY: &str = "dompick-prefs-v1";

const COMPONENTS: &str = "components";
const COMPONENT_ORDER: &str = "component_order";

/// How [`PreferenceStore::save`] reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Dispatch the write on the rayon pool and return immediately. Writes are serialized and
    /// only the newest pending tree is written.
    #[default]
    Background,
    /// Write inline before returning.
    Blocking,
}

/// Default preference tree for the given component ids.
pub fn defaults<S: AsRef<str>>(components: &[S]) -> Value {
    let states: Map<String, Value> = components
        .iter()
        .map(|id| (id.as_ref().to_owned(), default_component_state()))
        .collect();
    let order: Vec<Value> = components
        .iter()
        .map(|id| Value::String(id.as_ref().to_owned()))
        .collect();
    let active = components
        .first()
        .map(|id| id.as_ref().to_owned())
        .unwrap_or_default();

    json!({
        "ui": { "compact": false },
        "active_tab": active,
        "components": states,
        "component_order": order,
    })
}

fn default_component_state() -> Value {
    json!({ "enabled": true, "show_in_toolbar": true })
}

/// Merge a persisted tree over `defaults`.
///
/// Object-valued defaults take persisted keys over default keys, one level deep. Other defaults
/// take the persisted value when it is present and of the same JSON type. Keys absent from
/// `defaults` are dropped.
pub fn merge(defaults: &Value, persisted: Option<&Value>) -> Value {
    let Value::Object(default_map) = defaults else {
        return defaults.clone();
    };
    let persisted_map = persisted.and_then(Value::as_object);

    let mut merged = Map::with_capacity(default_map.len());
    for (key, default_value) in default_map {
        let stored = persisted_map.and_then(|map| map.get(key));
        let value = match (default_value, stored) {
            (Value::Object(base), Some(Value::Object(overlay))) => {
                let mut combined = base.clone();
                for (inner_key, inner_value) in overlay {
                    combined.insert(inner_key.clone(), inner_value.clone());
                }
                Value::Object(combined)
            }
            (default_value, Some(stored)) if same_kind(default_value, stored) => stored.clone(),
            (default_value, _) => default_value.clone(),
        };
        merged.insert(key.clone(), value);
    }

    if let Some(map) = persisted_map {
        let stale: Vec<&str> = map
            .keys()
            .filter(|key| !default_map.contains_key(*key))
            .map(String::as_str)
            .collect();
        if !stale.is_empty() {
            tracing::debug!(?stale, "dropping stale preference keys");
        }
    }

    Value::Object(merged)
}

fn same_kind(left: &Value, right: &Value) -> bool {
    std::mem::discriminant(left) == std::mem::discriminant(right)
}

/// Align `component_order` and `components` with the ids that currently exist.
pub fn reconcile<S: AsRef<str>>(prefs: &mut Value, known: &[S]) {
    let Some(root) = prefs.as_object_mut() else {
        return;
    };

    let order_matches = root
        .get(COMPONENT_ORDER)
        .and_then(Value::as_array)
        .is_some_and(|order| {
            order.len() == known.len()
                && known
                    .iter()
                    .all(|id| order.iter().any(|entry| entry.as_str() == Some(id.as_ref())))
        });
    if !order_matches {
        tracing::debug!("regenerating component order");
        let order = known
            .iter()
            .map(|id| Value::String(id.as_ref().to_owned()))
            .collect();
        root.insert(COMPONENT_ORDER.to_owned(), Value::Array(order));
    }

    if let Some(states) = root.get_mut(COMPONENTS).and_then(Value::as_object_mut) {
        states.retain(|id, _| known.iter().any(|known_id| known_id.as_ref() == id));
    }
}

/// Latest unsaved tree plus the lock every write holds while it touches the backend.
#[derive(Default)]
struct SaveQueue {
    pending: Mutex<Option<Value>>,
    writer: Mutex<()>,
}

impl SaveQueue {
    fn push(&self, snapshot: Value) {
        *self.pending.lock() = Some(snapshot);
    }

    /// Write the pending tree, if any. A tree taken by another writer is already on its way.
    fn drain(&self, backend: &dyn PreferenceBackend, key: &str) {
        let _writer = self.writer.lock();
        let Some(snapshot) = self.pending.lock().take() else {
            return;
        };
        if let Err(err) = backend.set(key, &snapshot) {
            tracing::warn!(key = %key, error = %format!("{err:#}"), "failed to save preferences");
        }
    }
}

/// In-memory preference tree backed by a [`PreferenceBackend`].
pub struct PreferenceStore {
    backend: Arc<dyn PreferenceBackend>,
    key: String,
    components: Vec<String>,
    mode: WriteMode,
    prefs: Value,
    queue: Arc<SaveQueue>,
}

impl PreferenceStore {
    pub fn new<I, S>(backend: Arc<dyn PreferenceBackend>, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        let prefs = defaults(&components);
        Self {
            backend,
            key: STORAGE_KEY.to_owned(),
            components,
            mode: WriteMode::default(),
            prefs,
            queue: Arc::default(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn defaults(&self) -> Value {
        defaults(&self.components)
    }

    /// The whole preference tree.
    pub fn prefs(&self) -> &Value {
        &self.prefs
    }

    /// Read persisted preferences, merge them over the defaults, and write the result back.
    pub fn load(&mut self) -> &Value {
        let persisted = self.backend.get_or(&self.key, Value::Null);
        let persisted = (!persisted.is_null()).then_some(persisted);

        let mut prefs = merge(&self.defaults(), persisted.as_ref());
        reconcile(&mut prefs, &self.components);
        self.prefs = prefs;
        tracing::debug!(key = %self.key, restored = persisted.is_some(), "preferences loaded");

        self.save();
        &self.prefs
    }

    /// Persist the current tree. Failures are logged, never returned.
    pub fn save(&self) {
        self.queue.push(self.prefs.clone());
        match self.mode {
            WriteMode::Background => {
                let backend = Arc::clone(&self.backend);
                let key = self.key.clone();
                let queue = Arc::clone(&self.queue);
                rayon::spawn(move || queue.drain(backend.as_ref(), &key));
            }
            WriteMode::Blocking => self.flush(),
        }
    }

    /// Block until the newest saved tree has reached the backend.
    pub fn flush(&self) {
        self.queue.drain(self.backend.as_ref(), &self.key);
    }

    /// Value at a dotted path such as `ui.size.width`.
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        dotted
            .split('.')
            .try_fold(&self.prefs, |current, segment| current.get(segment))
    }

    pub fn get_str(&self, dotted: &str) -> Option<&str> {
        self.get(dotted).and_then(Value::as_str)
    }

    /// Store `value` at a dotted path, creating intermediate objects, then save.
    ///
    /// Intermediate values that are not objects are replaced by empty objects.
    pub fn set(&mut self, dotted: &str, value: Value) {
        let segments: Vec<&str> = dotted.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            tracing::warn!(key = dotted, "ignoring malformed preference key");
            return;
        }
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.prefs;
        for segment in parents {
            current = object_entry(current, segment);
        }
        if let Some(map) = ensure_object(current) {
            map.insert((*last).to_owned(), value);
        }
        self.save();
    }

    /// Replace everything with the defaults and save.
    pub fn reset(&mut self) {
        self.prefs = self.defaults();
        self.save();
    }

    pub fn component_state(&self, id: &str) -> Option<&Value> {
        self.prefs.get(COMPONENTS).and_then(|states| states.get(id))
    }

    pub fn set_component_state(&mut self, id: &str, state: Value) {
        if let Some(states) = ensure_object(object_entry(&mut self.prefs, COMPONENTS)) {
            states.insert(id.to_owned(), state);
        }
        self.save();
    }
}

impl Drop for PreferenceStore {
    fn drop(&mut self) {
        self.flush();
    }
}

fn ensure_object(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

fn object_entry<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map
            .entry(key.to_owned())
            .or_insert_with(|| Value::Object(Map::new())),
        other => other,
    }
}
