//! Namespaced, hierarchical dialog registry.
//!
//! A [`Library`] maps dialog ids to dialogs and owns named child libraries.
//! Lookups search the library itself, then its children depth first; the
//! first match wins and every library is visited at most once.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::consts::NAMESPACE_SEPARATOR;
use crate::dialog::{Dialog, DialogSession};
use crate::error::{BotError, Result};
use crate::stack::split_dialog_id;

pub struct Library<S: DialogSession> {
    name: String,
    locale_path: Option<PathBuf>,
    dialogs: HashMap<String, Arc<dyn Dialog<S>>>,
    libraries: Vec<Arc<Library<S>>>,
}

impl<S: DialogSession> Clone for Library<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            locale_path: self.locale_path.clone(),
            dialogs: self.dialogs.clone(),
            libraries: self.libraries.clone(),
        }
    }
}

impl<S: DialogSession> std::fmt::Debug for Library<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("dialogs", &self.dialog_ids())
            .field(
                "libraries",
                &self.libraries.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<S: DialogSession> Library<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale_path: None,
            dialogs: HashMap::new(),
            libraries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locale_path(&self) -> Option<&Path> {
        self.locale_path.as_deref()
    }

    pub fn set_locale_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.locale_path = Some(path.into());
        self
    }

    /// Registers `dialog` under `id`. A namespace prefix on `id` is ignored.
    pub fn register(&mut self, id: &str, dialog: Arc<dyn Dialog<S>>) -> Result<()> {
        let id = match id.split_once(NAMESPACE_SEPARATOR) {
            Some((_, bare)) => bare,
            None => id,
        };
        if self.dialogs.contains_key(id) {
            return Err(BotError::AlreadyExists(format!(
                "Dialog[{}] already exists in library[{}].",
                id, self.name
            )));
        }
        debug!(library = %self.name, dialog_id = %id, "library.register");
        self.dialogs.insert(id.to_string(), dialog);
        Ok(())
    }

    /// Dialog registered directly in this library.
    pub fn dialog(&self, id: &str) -> Option<Arc<dyn Dialog<S>>> {
        self.dialogs.get(id).cloned()
    }

    pub fn dialog_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.dialogs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Adds a child library, replacing any child with the same name.
    pub fn add_library(&mut self, library: Arc<Library<S>>) -> &mut Self {
        self.libraries.retain(|l| l.name() != library.name());
        self.libraries.push(library);
        self
    }

    pub fn libraries(&self) -> &[Arc<Library<S>>] {
        &self.libraries
    }

    /// Finds a library by name: this library, a direct child, or a descendant.
    pub fn library(&self, name: &str) -> Option<&Library<S>> {
        let mut seen = HashSet::new();
        self.search(name, &mut seen)
    }

    fn search<'a>(&'a self, name: &str, seen: &mut HashSet<*const Library<S>>) -> Option<&'a Library<S>> {
        if !seen.insert(self as *const Library<S>) {
            return None;
        }
        if self.name == name {
            return Some(self);
        }
        if let Some(child) = self.libraries.iter().find(|l| l.name() == name) {
            return Some(child.as_ref());
        }
        self.libraries
            .iter()
            .find_map(|child| child.search(name, seen))
    }

    pub fn find_dialog(&self, library: &str, dialog_id: &str) -> Option<Arc<dyn Dialog<S>>> {
        self.library(library).and_then(|l| l.dialog(dialog_id))
    }

    /// Resolves a fully qualified "library:dialog" id.
    pub fn find_qualified(&self, id: &str) -> Option<Arc<dyn Dialog<S>>> {
        let (library, dialog_id) = split_dialog_id(id);
        self.find_dialog(library, dialog_id)
    }

    /// Locale directories of this library tree, children before parents, each library once.
    pub fn locale_paths(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        self.collect_locale_paths(&mut seen, &mut paths);
        paths
    }

    fn collect_locale_paths(&self, seen: &mut HashSet<String>, paths: &mut Vec<PathBuf>) {
        if !seen.insert(self.name.clone()) {
            return;
        }
        for child in &self.libraries {
            child.collect_locale_paths(seen, paths);
        }
        if let Some(path) = &self.locale_path {
            paths.push(path.clone());
        }
    }
}
