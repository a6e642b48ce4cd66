//! Persisted dialog stack: [`SessionState`] and [`StackEntry`].
//!
//! The callstack only changes through `push`, `pop`, and `truncate`; the engine
//! never edits it in place. The top entry's `state` is the "current dialog data".

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::consts::{self, NAMESPACE_SEPARATOR};
use crate::types::DataMap;

/// One active (dialog id, per-dialog state) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackEntry {
    /// Fully qualified id, "library:dialogId".
    pub id: String,
    #[serde(default)]
    pub state: DataMap,
}

impl StackEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: DataMap::new(),
        }
    }

    /// Library part of the id.
    pub fn library(&self) -> &str {
        split_dialog_id(&self.id).0
    }
}

/// Selects a stack entry for cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogTarget {
    Id(String),
    Index(usize),
}

impl From<&str> for DialogTarget {
    fn from(id: &str) -> Self {
        DialogTarget::Id(id.to_string())
    }
}

impl From<String> for DialogTarget {
    fn from(id: String) -> Self {
        DialogTarget::Id(id)
    }
}

impl From<usize> for DialogTarget {
    fn from(index: usize) -> Self {
        DialogTarget::Index(index)
    }
}

/// Per-conversation state persisted between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub callstack: Vec<StackEntry>,
    /// Milliseconds since the Unix epoch of the last routed turn.
    #[serde(default)]
    pub last_access: i64,
    #[serde(default)]
    pub version: f64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            callstack: Vec::new(),
            last_access: Utc::now().timestamp_millis(),
            version: 0.0,
        }
    }
}

impl SessionState {
    pub fn depth(&self) -> usize {
        self.callstack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callstack.is_empty()
    }

    pub fn current(&self) -> Option<&StackEntry> {
        self.callstack.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut StackEntry> {
        self.callstack.last_mut()
    }

    pub fn push(&mut self, entry: StackEntry) {
        self.callstack.push(entry);
    }

    /// Pops the top entry and returns the new top, if any.
    pub fn pop(&mut self) -> Option<&StackEntry> {
        self.callstack.pop();
        self.callstack.last()
    }

    /// Removes `index` and everything above it.
    pub fn truncate(&mut self, index: usize) {
        self.callstack.truncate(index);
    }

    pub fn clear(&mut self) {
        self.callstack.clear();
    }

    /// Index of the innermost entry matching `target`.
    ///
    /// Ids match exactly; qualify bare ids with [`SessionState::resolve_dialog_id`] first.
    pub fn find(&self, target: &DialogTarget) -> Option<usize> {
        match target {
            DialogTarget::Index(i) => (*i < self.callstack.len()).then_some(*i),
            DialogTarget::Id(id) => self.callstack.iter().rposition(|e| e.id == *id),
        }
    }

    /// Qualifies `id` with a library name.
    ///
    /// Ids containing a namespace are returned unchanged. Bare ids inherit the
    /// library of the active entry, or the default library when nothing is
    /// active or the caller is running in the middleware phase.
    pub fn resolve_dialog_id(&self, id: &str, in_middleware: bool) -> String {
        self.resolve_dialog_id_at(id, self.depth(), in_middleware)
    }

    /// Like [`SessionState::resolve_dialog_id`], as if only the bottom `depth` entries existed.
    pub fn resolve_dialog_id_at(&self, id: &str, depth: usize, in_middleware: bool) -> String {
        if id.contains(NAMESPACE_SEPARATOR) {
            return id.to_string();
        }
        let top = depth.min(self.depth()).checked_sub(1).map(|i| &self.callstack[i]);
        let library = match top {
            Some(cur) if !in_middleware => cur.library(),
            _ => consts::library::DEFAULT,
        };
        format!("{}{}{}", library, NAMESPACE_SEPARATOR, id)
    }
}

/// Splits "library:dialog" into its parts; a missing library means the default library.
pub fn split_dialog_id(id: &str) -> (&str, &str) {
    match id.split_once(NAMESPACE_SEPARATOR) {
        Some(("", dialog)) => (consts::library::DEFAULT, dialog),
        Some((library, dialog)) => (library, dialog),
        None => (consts::library::DEFAULT, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(ids: &[&str]) -> SessionState {
        let mut ss = SessionState::default();
        for id in ids {
            ss.push(StackEntry::new(*id));
        }
        ss
    }

    #[test]
    fn test_resolve_is_idempotent_for_namespaced_ids() {
        let ss = stack(&["lib:a"]);
        assert_eq!(ss.resolve_dialog_id("other:b", false), "other:b");
        let once = ss.resolve_dialog_id("b", false);
        assert_eq!(ss.resolve_dialog_id(&once, false), once);
    }

    #[test]
    fn test_resolve_inherits_current_library() {
        let ss = stack(&["lib:a"]);
        assert_eq!(ss.resolve_dialog_id("b", false), "lib:b");
    }

    #[test]
    fn test_resolve_uses_default_library_in_middleware_or_empty() {
        let ss = stack(&["lib:a"]);
        assert_eq!(ss.resolve_dialog_id("b", true), "*:b");
        assert_eq!(SessionState::default().resolve_dialog_id("/", false), "*:/");
    }

    #[test]
    fn test_resolve_at_depth_uses_entry_below() {
        let ss = stack(&["lib:a", "other:b"]);
        assert_eq!(ss.resolve_dialog_id_at("c", 1, false), "lib:c");
        assert_eq!(ss.resolve_dialog_id_at("c", 0, false), "*:c");
    }

    #[test]
    fn test_find_by_id_and_index() {
        let ss = stack(&["*:A", "*:B", "*:C"]);
        assert_eq!(ss.find(&DialogTarget::from("*:A")), Some(0));
        assert_eq!(ss.find(&DialogTarget::from("*:C")), Some(2));
        assert_eq!(ss.find(&DialogTarget::from(1usize)), Some(1));
        assert_eq!(ss.find(&DialogTarget::from(3usize)), None);
        assert_eq!(ss.find(&DialogTarget::from("Z")), None);
    }

    #[test]
    fn test_find_matches_exact_id_only() {
        let ss = stack(&["*:A", "BotBuilder:help"]);
        assert_eq!(ss.find(&DialogTarget::from("help")), None);
        assert_eq!(ss.find(&DialogTarget::from("*:help")), None);
        let id = ss.resolve_dialog_id_at("A", 1, false);
        assert_eq!(ss.find(&DialogTarget::from(id)), Some(0));
    }

    #[test]
    fn test_pop_returns_new_top() {
        let mut ss = stack(&["*:A", "*:B"]);
        assert_eq!(ss.pop().map(|e| e.id.clone()), Some("*:A".to_string()));
        assert!(ss.pop().is_none());
        assert!(ss.is_empty());
    }

    #[test]
    fn test_split_dialog_id() {
        assert_eq!(split_dialog_id("BotBuilder:Prompts"), ("BotBuilder", "Prompts"));
        assert_eq!(split_dialog_id(":x"), ("*", "x"));
        assert_eq!(split_dialog_id("x"), ("*", "x"));
    }

    #[test]
    fn test_state_serializes_last_access_camel_case() {
        let ss = stack(&["*:/"]);
        let v = serde_json::to_value(&ss).unwrap();
        assert!(v.get("lastAccess").is_some());
        assert_eq!(v["callstack"][0]["id"], "*:/");
    }
}
