//! Named interrupt actions ("help", "cancel", menu commands) that compete with the active dialog.
//!
//! An action matches either a regular expression (score = matched length / text length) or an
//! explicit `action?name[=data]` utterance produced by a button (score 1.0). Actions are attached
//! globally to the bot or to a dialog, in which case they stay live while the dialog is anywhere
//! on the stack.

use dbot_core::consts::ACTION_PREFIX;
use dbot_core::{DialogSession, DialogTarget, Message, RecognizeResult, Result};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Pushes a dialog on top of the stack; the interrupted dialog resumes when it ends.
    BeginDialog { id: String, args: Option<Value> },
    /// Ends the conversation, optionally saying goodbye.
    EndConversation { message: Option<String> },
    /// Cancels the dialog owning the action (the whole conversation for global actions).
    Cancel { message: Option<String> },
    /// Restarts the dialog owning the action.
    Reload { message: Option<String>, args: Option<Value> },
}

#[derive(Debug, Clone)]
pub struct NamedAction {
    pub name: String,
    pub matches: Option<Regex>,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Default)]
pub struct ActionSet {
    actions: Vec<NamedAction>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the action called `name`.
    pub fn add(&mut self, name: impl Into<String>, matches: Option<Regex>, kind: ActionKind) {
        let name = name.into();
        self.actions.retain(|a| a.name != name);
        self.actions.push(NamedAction {
            name,
            matches,
            kind,
        });
    }

    pub fn begin_dialog_action(mut self, name: &str, dialog_id: &str, matches: Option<Regex>) -> Self {
        self.add(
            name,
            matches,
            ActionKind::BeginDialog {
                id: dialog_id.to_string(),
                args: None,
            },
        );
        self
    }

    pub fn end_conversation_action(mut self, name: &str, message: Option<&str>, matches: Option<Regex>) -> Self {
        self.add(
            name,
            matches,
            ActionKind::EndConversation {
                message: message.map(str::to_string),
            },
        );
        self
    }

    pub fn cancel_action(mut self, name: &str, message: Option<&str>, matches: Option<Regex>) -> Self {
        self.add(
            name,
            matches,
            ActionKind::Cancel {
                message: message.map(str::to_string),
            },
        );
        self
    }

    pub fn reload_action(mut self, name: &str, message: Option<&str>, matches: Option<Regex>) -> Self {
        self.add(
            name,
            matches,
            ActionKind::Reload {
                message: message.map(str::to_string),
                args: None,
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&NamedAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Best-scoring action for `message`; score 0 when nothing matches.
    pub fn recognize_action(&self, message: &Message) -> RecognizeResult {
        let text = message.text.as_str();
        if let Some(rest) = text.strip_prefix(ACTION_PREFIX) {
            let (name, data) = match rest.split_once('=') {
                Some((name, data)) => (name, Some(data.to_string())),
                None => (rest, None),
            };
            return match self.get(name) {
                Some(action) => RecognizeResult {
                    action: Some(action.name.clone()),
                    data,
                    ..RecognizeResult::with_score(1.0)
                },
                None => RecognizeResult::default(),
            };
        }

        let len = text.chars().count();
        let mut best = RecognizeResult::default();
        if len == 0 {
            return best;
        }
        for action in &self.actions {
            let Some(m) = action.matches.as_ref().and_then(|re| re.find(text)) else {
                continue;
            };
            let score = m.as_str().chars().count() as f64 / len as f64;
            if score > best.score {
                best = RecognizeResult {
                    action: Some(action.name.clone()),
                    matched: vec![m.as_str().to_string()],
                    ..RecognizeResult::with_score(score)
                };
            }
        }
        best
    }

    /// Runs the action named in `result`. `dialog_id`/`dialog_index` identify the owning dialog.
    pub async fn invoke_action<S: DialogSession>(&self, session: &mut S, result: RecognizeResult) -> Result<()> {
        let name = result.action.clone().unwrap_or_default();
        let Some(action) = self.get(&name) else {
            warn!(action = %name, "unknown action");
            return Ok(());
        };
        info!(action = %name, dialog_id = ?result.dialog_id, "action invoked");

        match &action.kind {
            ActionKind::BeginDialog { id, args } => {
                let args = args.clone().or_else(|| result.data.clone().map(|d| json!({ "data": d })));
                // Bare ids belong to the library of the dialog that owns the action.
                let id = match result.dialog_index {
                    Some(index) => session.session_state().resolve_dialog_id_at(id, index + 1, false),
                    None => id.clone(),
                };
                session.begin_dialog(&id, args).await
            }
            ActionKind::EndConversation { message } => {
                session.end_conversation_with_text(message.as_deref()).await
            }
            ActionKind::Cancel { message } => {
                if let Some(text) = message {
                    session.send_text(text);
                }
                match result.dialog_index {
                    Some(index) => session.cancel_dialog(DialogTarget::Index(index), None).await,
                    None => session.end_conversation_with_text(None).await,
                }
            }
            ActionKind::Reload { message, args } => {
                if let Some(text) = message {
                    session.send_text(text);
                }
                match (result.dialog_index, result.dialog_id) {
                    (Some(index), Some(id)) => {
                        session
                            .cancel_dialog(DialogTarget::Index(index), Some((id, args.clone())))
                            .await
                    }
                    _ => {
                        warn!(action = %name, "reload action without an owning dialog");
                        Ok(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions() -> ActionSet {
        ActionSet::new()
            .begin_dialog_action("help", "/help", Some(Regex::new("(?i)^help").unwrap()))
            .cancel_action("cancel", Some("Canceled."), Some(Regex::new("(?i)cancel").unwrap()))
    }

    #[test]
    fn test_explicit_action_scores_one() {
        let r = actions().recognize_action(&Message::text("action?help=topics"));
        assert_eq!(r.score, 1.0);
        assert_eq!(r.action.as_deref(), Some("help"));
        assert_eq!(r.data.as_deref(), Some("topics"));
    }

    #[test]
    fn test_unknown_explicit_action_scores_zero() {
        let r = actions().recognize_action(&Message::text("action?nope"));
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn test_regex_scores_by_ratio() {
        let r = actions().recognize_action(&Message::text("please cancel"));
        assert_eq!(r.action.as_deref(), Some("cancel"));
        assert!((r.score - 6.0 / 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_replaces_same_name() {
        let mut set = actions();
        set.add("help", None, ActionKind::EndConversation { message: None });
        assert!(matches!(set.get("help").unwrap().kind, ActionKind::EndConversation { .. }));
        assert_eq!(set.recognize_action(&Message::text("help")).score, 0.0);
    }
}
