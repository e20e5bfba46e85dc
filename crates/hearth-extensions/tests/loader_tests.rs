//! Startup scan tests over user and bundled extension directories

mod common;

use common::*;

#[cfg(test)]
mod loader_tests {
    use super::*;
    use hearth_extensions::{ExtensionKind, Origin};

    #[test]
    fn test_user_and_bundled_are_both_loaded() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, "mine", Some(r#"{"id":"mine","version":"1.0.0"}"#))
            .unwrap();
        ws.place(&ws.bundled, "core", Some(r#"{"id":"core","version":"3.0.0"}"#))
            .unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        assert_eq!(result.extensions.len(), 2);
        assert_eq!(result.extensions["mine"].origin, Origin::User);
        assert_eq!(result.extensions["core"].origin, Origin::Bundled);
        assert!(!result.has_outdated());
    }

    #[test]
    fn test_newer_copy_in_same_directory_wins() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, "foo-old", Some(r#"{"id":"foo","version":"1.0.0"}"#))
            .unwrap();
        ws.place(&ws.plugins, "foo-new", Some(r#"{"id":"foo","version":"2.0.0"}"#))
            .unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        assert_eq!(result.extensions["foo"].version, "2.0.0");
        assert_eq!(result.outdated.len(), 1);
        assert_eq!(result.outdated[0].version, "1.0.0");
        assert!(result.outdated[0].outdated);
    }

    #[test]
    fn test_user_copy_shadows_newer_bundled_copy() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, "foo", Some(r#"{"id":"foo","version":"1.0.0"}"#))
            .unwrap();
        ws.place(&ws.bundled, "foo", Some(r#"{"id":"foo","version":"1.2.0"}"#))
            .unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        let active = &result.extensions["foo"];
        assert_eq!(active.origin, Origin::User);
        assert_eq!(active.version, "1.0.0");
        assert!(active.outdated);
        assert!(result.has_outdated());
    }

    #[test]
    fn test_user_copy_newer_than_bundled_is_current() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, "foo", Some(r#"{"id":"foo","version":"2.0.0"}"#))
            .unwrap();
        ws.place(&ws.bundled, "foo", Some(r#"{"id":"foo","version":"1.0.0"}"#))
            .unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        assert!(!result.extensions["foo"].outdated);
        assert!(!result.has_outdated());
    }

    #[test]
    fn test_empty_manifest_uses_folder_defaults() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.bundled, "plain", None).unwrap();
        std::fs::write(ws.bundled.join("plain").join("info.json"), "{}").unwrap();
        ws.place(&ws.bundled, "bare", None).unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        let plain = &result.extensions["plain"];
        assert_eq!(plain.name, "plain");
        assert_eq!(plain.version, "0.0.0");
        assert_eq!(plain.author, "Unknown");
        assert_eq!(plain.namespace, "plain");
        // an entry script alone is not a full extension
        assert!(!result.extensions.contains_key("bare"));
    }

    #[test]
    fn test_disabled_extensions_are_skipped() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, "foo", Some(r#"{"id":"foo"}"#)).unwrap();
        ws.place(&ws.plugins, "bar", Some(r#"{"id":"bar"}"#)).unwrap();
        ws.state().set_enabled("foo", false).unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        assert!(!result.extensions.contains_key("foo"));
        assert!(result.extensions.contains_key("bar"));
        assert!(ws.plugins.join("foo").exists());
    }

    #[test]
    fn test_translation_layout_is_recognized() {
        let ws = Workspace::new().unwrap();
        let dir = ws.plugins.join("german");
        std::fs::create_dir_all(dir.join("de")).unwrap();
        std::fs::write(dir.join("de").join("common.json"), "{}").unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        assert_eq!(result.extensions["german"].kind, ExtensionKind::Translation);
    }

    #[test]
    fn test_hidden_and_temp_directories_are_ignored() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, ".foo.installing-abc", Some(r#"{"id":"foo"}"#))
            .unwrap();

        let result = ws.loader().scan(&ws.roots()).unwrap();

        assert!(result.extensions.is_empty());
    }

    #[tokio::test]
    async fn test_registry_reflects_enable_toggle_after_refresh() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, "foo", Some(r#"{"id":"foo"}"#)).unwrap();
        let registry = ws.registry();
        assert!(registry.get("foo").await.unwrap().is_some());

        registry.state().set_enabled("foo", false).unwrap();
        registry.force_refresh().await.unwrap();
        assert!(registry.get("foo").await.unwrap().is_none());

        registry.state().set_enabled("foo", true).unwrap();
        registry.force_refresh().await.unwrap();
        assert!(registry.get("foo").await.unwrap().is_some());
    }

    #[test]
    fn test_flagged_extension_stays_removed_when_folder_differs_from_id() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.plugins, "foo-1.0", Some(r#"{"id":"foo","version":"1.0.0"}"#))
            .unwrap();
        ws.state().mark_for_removal("foo").unwrap();

        let first = ws.loader().scan(&ws.roots()).unwrap();
        assert!(!first.extensions.contains_key("foo"));
        assert!(!ws.plugins.join("foo-1.0").exists());

        let second = ws.loader().scan(&ws.roots()).unwrap();
        assert!(!second.extensions.contains_key("foo"));
        assert!(ws.state().load().unwrap().is_empty());
    }

    #[test]
    fn test_removal_flag_never_touches_bundled_copy() {
        let ws = Workspace::new().unwrap();
        ws.place(&ws.bundled, "core", Some(r#"{"id":"core"}"#)).unwrap();
        ws.state().mark_for_removal("core").unwrap();

        ws.loader().scan(&ws.roots()).unwrap();
        assert!(ws.bundled.join("core").exists());

        let after = ws.loader().scan(&ws.roots()).unwrap();
        assert!(after.extensions.contains_key("core"));
    }
}
