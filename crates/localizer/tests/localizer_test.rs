//! Integration tests for [`dbot_localizer::DefaultLocalizer`] reading locale directories.

use std::fs;

use dbot_core::Localizer;
use dbot_localizer::DefaultLocalizer;

/// **Test: Region locales fall back to the language, then the default locale.**
///
/// **Setup:** `en/index.json` {greeting, bye}, `fr/index.json` {greeting}, `fr-ca/index.json` {}.
/// **Action:** load "fr-CA"; look up both ids.
/// **Expected:** greeting from fr; bye from en; unknown ids returned unchanged.
#[tokio::test]
async fn test_locale_fallback_chain() {
    let dir = tempfile::tempdir().unwrap();
    for (locale, body) in [
        ("en", r#"{"greeting": "Hello", "bye": "Goodbye"}"#),
        ("fr", r#"{"greeting": "Bonjour"}"#),
        ("fr-ca", r#"{}"#),
    ] {
        fs::create_dir_all(dir.path().join(locale)).unwrap();
        fs::write(dir.path().join(locale).join("index.json"), body).unwrap();
    }

    let localizer = DefaultLocalizer::new(vec![dir.path().to_path_buf()], "en");
    localizer.load("fr-CA").await.unwrap();

    assert_eq!(localizer.gettext("fr-ca", "greeting", None), "Bonjour");
    assert_eq!(localizer.gettext("fr-ca", "bye", None), "Goodbye");
    assert_eq!(localizer.gettext("fr-ca", "unknown", None), "unknown");
}

/// **Test: Namespaced files are keyed by lowercase namespace; bad files are skipped.**
///
/// **Setup:** `en/MyLib.json` with one entry, `en/broken.json` with invalid JSON.
/// **Expected:** load succeeds; the entry resolves under namespace "MyLib" or "mylib".
#[tokio::test]
async fn test_namespaced_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("en")).unwrap();
    fs::write(dir.path().join("en").join("MyLib.json"), r#"{"ask": "What now?"}"#).unwrap();
    fs::write(dir.path().join("en").join("broken.json"), "{not json").unwrap();

    let localizer = DefaultLocalizer::new(vec![dir.path().to_path_buf()], "en");
    localizer.load("en").await.unwrap();

    assert_eq!(localizer.gettext("en", "ask", Some("MyLib")), "What now?");
    assert_eq!(localizer.gettext("en", "ask", Some("mylib")), "What now?");
    assert_eq!(localizer.gettext("en", "ask", None), "ask");
}

/// **Test: Missing locale directories are not an error.**
#[tokio::test]
async fn test_missing_directory_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let localizer = DefaultLocalizer::new(vec![dir.path().join("nowhere")], "en");
    localizer.load("de").await.unwrap();
    assert_eq!(localizer.gettext("de", "confirm_no", Some("BotBuilder")), "no");
}

/// **Test: ngettext picks singular for one and plural otherwise.**
#[tokio::test]
async fn test_ngettext() {
    let localizer = DefaultLocalizer::new(Vec::new(), "en");
    localizer
        .add_entries("en", None, r#"{"item": "one item", "items": "%d items"}"#)
        .unwrap();
    assert_eq!(localizer.ngettext("en", "item", "items", 1, None), "one item");
    assert_eq!(localizer.ngettext("en", "item", "items", 3, None), "%d items");
}
