//! Unit tests for FirstRun.

use std::sync::Arc;

use dbot_core::consts::data::FIRST_RUN_VERSION;
use dbot_core::DataMap;
use serde_json::json;

use super::{run_turn, stack};
use crate::FirstRun;

fn seen(version: f64) -> DataMap {
    let mut data = DataMap::new();
    data.insert(FIRST_RUN_VERSION.to_string(), json!(version));
    data
}

/// **Test: A brand-new user is sent to the onboarding dialog and the version is recorded.**
///
/// **Setup:** FirstRun(1.0, "welcome"); no stored state or user data.
/// **Action:** User says "hi".
/// **Expected:** "welcome" is active; user data records 1.0.
#[tokio::test(start_paused = true)]
async fn test_new_user_gets_onboarding() {
    let mw = Arc::new(FirstRun::new(1.0, "welcome"));
    let (session, outbox) = run_turn(mw, None, DataMap::new(), "hi").await;

    assert_eq!(outbox.texts(), vec!["welcome"]);
    assert_eq!(session.state().callstack[0].id, "*:welcome");
    assert_eq!(session.user_data[FIRST_RUN_VERSION], json!(1.0));
}

/// **Test: A minor version bump uses the upgrade dialog when one is configured.**
///
/// **Setup:** FirstRun(1.1, "welcome") with upgrade "upgrade"; user last saw 1.0.
/// **Action:** User says "hi".
/// **Expected:** "upgrade" is active.
#[tokio::test(start_paused = true)]
async fn test_minor_bump_uses_upgrade_dialog() {
    let mw = Arc::new(FirstRun::new(1.1, "welcome").with_upgrade_dialog("upgrade"));
    let (session, _outbox) = run_turn(mw, None, seen(1.0), "hi").await;

    assert_eq!(session.state().callstack[0].id, "*:upgrade");
}

/// **Test: Returning users and active conversations pass straight through.**
///
/// **Setup:** FirstRun(1.0, "welcome"); user saw 1.0 / user with an active root dialog.
/// **Action:** User says "hi" in each case.
/// **Expected:** Root handles both turns.
#[tokio::test(start_paused = true)]
async fn test_returning_user_is_routed_normally() {
    let mw = Arc::new(FirstRun::new(1.0, "welcome"));
    let (_, outbox) = run_turn(mw.clone(), None, seen(1.0), "hi").await;
    assert_eq!(outbox.texts(), vec!["root"]);

    let (_, outbox) = run_turn(mw, Some(stack(&["*:/"], 0.0)), DataMap::new(), "hi").await;
    assert_eq!(outbox.texts(), vec!["root"]);
}
