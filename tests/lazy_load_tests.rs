//! Lazy loading tests.
//!
//! Lazy plugins are only armed at `add` time; these tests fire their
//! triggers through `Manager::load` and `Manager::trigger` and check that the
//! plugin is fetched and registered once and the user's action is replayed.

mod common;

use std::time::Duration;

use common::{FakeVcs, Harness, url};
use lazyplug::{
    Error, KeySpec, LazySpec, MemoryHost, PluginSpec, PluginState, Trigger, TriggerBinding,
};

const ENTIRE: &str = "kana/vim-textobj-entire";

fn entire_with(key: KeySpec) -> PluginSpec {
    PluginSpec::new(ENTIRE).lazy(LazySpec::new().key(key))
}

// ============================================================================
// Key triggers
// ============================================================================

mod key_tests {
    use super::*;

    #[tokio::test]
    async fn test_lazy_plugin_is_armed_not_fetched() {
        let h = Harness::new();
        let plugin = h
            .manager
            .add(entire_with(
                KeySpec::new("ae").rhs("<Plug>(textobj-entire-a)").modes(["o", "x"]),
            ))
            .await
            .unwrap();

        assert_eq!(plugin.state(), PluginState::Added);
        assert!(plugin.is_lazy());
        assert_eq!(h.vcs.clone_count(), 0);
        assert!(h.host.search_path().is_empty());
        assert_eq!(
            h.host.triggers(),
            vec![TriggerBinding::Key {
                url: url(ENTIRE),
                lhs: "ae".into(),
                rhs: Some("<Plug>(textobj-entire-a)".into()),
                modes: vec!["o".into(), "x".into()],
            }]
        );
        assert_eq!(h.manager.armed_triggers(ENTIRE).len(), 1);
        assert_eq!(h.manager.metrics().armed_triggers, 1);
    }

    #[tokio::test]
    async fn test_key_trigger_loads_and_returns_declared_rhs() {
        let h = Harness::new();
        h.manager
            .add(entire_with(
                KeySpec::new("ae").rhs("<Plug>(textobj-entire-a)").modes(["o", "x"]),
            ))
            .await
            .unwrap();

        let keys = h.manager.load(ENTIRE, Trigger::key("ae")).await.unwrap();

        assert_eq!(keys.as_deref(), Some("<Plug>(textobj-entire-a)"));
        assert_eq!(h.vcs.clone_count(), 1);
        assert!(h.host.triggers().is_empty());
        assert!(h.manager.armed_triggers(ENTIRE).is_empty());
        assert_eq!(h.host.search_path(), vec![h.dst(ENTIRE)]);
        assert_eq!(
            h.manager.plugin(ENTIRE).unwrap().state(),
            PluginState::Loaded
        );

        let metrics = h.manager.metrics();
        assert_eq!(metrics.lazy_loads, 1);
        assert_eq!(metrics.armed_triggers, 0);
    }

    #[tokio::test]
    async fn test_key_replay_uses_mapping_defined_by_plugin() {
        let host = MemoryHost::new().map_on_source(
            "vim-textobj-entire.vim",
            "o",
            "ae",
            "<Plug>(textobj-entire-a)",
        );
        let h = Harness::build(host, FakeVcs::new(), |c| c);
        h.manager
            .add(entire_with(KeySpec::new("ae").modes(["o"])))
            .await
            .unwrap();

        let keys = h.manager.load(ENTIRE, Trigger::key("ae")).await.unwrap();
        assert_eq!(keys.as_deref(), Some("<Plug>(textobj-entire-a)"));
    }

    #[tokio::test]
    async fn test_key_replay_falls_back_to_lhs() {
        let h = Harness::new();
        h.manager
            .add(entire_with(KeySpec::new("ae")))
            .await
            .unwrap();

        let keys = h
            .manager
            .load(ENTIRE, Trigger::key_in("x", "ae"))
            .await
            .unwrap();
        assert_eq!(keys.as_deref(), Some("ae"));
    }

    #[tokio::test]
    async fn test_racing_triggers_load_once() {
        let h = Harness::build(
            MemoryHost::new(),
            FakeVcs::new().with_delay(Duration::from_millis(50)),
            |c| c,
        );
        h.manager
            .add(entire_with(KeySpec::new("ae").rhs("<Plug>(entire)")))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            h.manager.load(ENTIRE, Trigger::key("ae")),
            h.manager.load(ENTIRE, Trigger::key("ae")),
        );

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(h.vcs.clone_count(), 1);
        assert_eq!(h.manager.metrics().lazy_loads, 1);
        let script = h.dst(ENTIRE).join("plugin/vim-textobj-entire.vim");
        assert_eq!(
            h.host.sourced().iter().filter(|p| **p == script).count(),
            1
        );
    }
}

// ============================================================================
// Command and autocommand triggers
// ============================================================================

mod command_tests {
    use super::*;

    #[tokio::test]
    async fn test_command_is_replayed_with_bang_and_args() {
        let h = Harness::new();
        h.manager
            .add(PluginSpec::new(ENTIRE).lazy(LazySpec::new().command("Entire")))
            .await
            .unwrap();

        let keys = h
            .manager
            .load(ENTIRE, Trigger::command_with("Entire", "arg", true))
            .await
            .unwrap();

        assert!(keys.is_none());
        assert_eq!(h.host.executed(), vec!["Entire! arg"]);
    }

    #[tokio::test]
    async fn test_autocmd_is_reemitted() {
        let h = Harness::new();
        h.manager
            .add(PluginSpec::new("a/insert").lazy(LazySpec::new().autocmd("InsertEnter")))
            .await
            .unwrap();

        h.manager
            .load("a/insert", Trigger::autocmd("InsertEnter"))
            .await
            .unwrap();

        assert_eq!(h.host.events(), vec!["InsertEnter"]);
        assert!(h.manager.plugin("a/insert").unwrap().is_loaded());
    }

    #[tokio::test]
    async fn test_trigger_resolves_owner() {
        let h = Harness::new();
        h.manager
            .add(PluginSpec::new("a/foo").lazy(LazySpec::new().command("Foo")))
            .await
            .unwrap();
        h.manager
            .add(PluginSpec::new("a/bar").lazy(LazySpec::new().command("Bar")))
            .await
            .unwrap();

        h.manager.trigger(Trigger::command("Foo")).await.unwrap();

        assert_eq!(h.vcs.cloned_urls(), vec![url("a/foo")]);
        assert_eq!(h.host.executed(), vec!["Foo"]);
        assert_eq!(h.manager.armed_triggers("a/bar").len(), 1);

        let err = h
            .manager
            .trigger(Trigger::command("Baz"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

// ============================================================================
// Failures and dependencies
// ============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_load_rearms_triggers() {
        let h = Harness::new();
        h.vcs.fail_clone(&url(ENTIRE));
        h.manager
            .add(entire_with(KeySpec::new("ae").rhs("<Plug>(entire)")))
            .await
            .unwrap();

        let err = h
            .manager
            .load(ENTIRE, Trigger::key("ae"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstallFailure { .. }));
        assert_eq!(h.host.triggers().len(), 1);
        assert_eq!(h.manager.armed_triggers(ENTIRE).len(), 1);
        assert_eq!(
            h.manager.plugin(ENTIRE).unwrap().state(),
            PluginState::InstallFailed
        );

        h.vcs.succeed_clone(&url(ENTIRE));
        let keys = h.manager.load(ENTIRE, Trigger::key("ae")).await.unwrap();
        assert_eq!(keys.as_deref(), Some("<Plug>(entire)"));
        assert!(h.host.triggers().is_empty());
        assert_eq!(h.vcs.clone_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_racing_failed_load_leaves_nothing_armed() {
        let h = Harness::build(
            MemoryHost::new(),
            FakeVcs::new().with_delay(Duration::from_millis(30)),
            |c| c,
        );
        h.vcs.fail_clone_once(&url(ENTIRE));
        h.manager
            .add(entire_with(KeySpec::new("ae").rhs("<Plug>(entire)")))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            h.manager.load(ENTIRE, Trigger::key("ae")),
            h.manager.load(ENTIRE, Trigger::key("ae")),
        );

        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
        assert_eq!(h.vcs.clone_count(), 2);
        let plugin = h.manager.plugin(ENTIRE).unwrap();
        assert!(plugin.is_loaded());
        assert_eq!(plugin.state(), PluginState::Loaded);
        assert!(h.host.triggers().is_empty());
        assert!(h.manager.armed_triggers(ENTIRE).is_empty());
        assert_eq!(h.manager.metrics().armed_triggers, 0);
    }

    #[tokio::test]
    async fn test_disabled_lazy_plugin_is_not_armed() {
        let h = Harness::new();
        let plugin = h
            .manager
            .add(entire_with(KeySpec::new("ae")).enabled(false))
            .await
            .unwrap();

        assert_eq!(plugin.state(), PluginState::Disabled);
        assert!(h.host.triggers().is_empty());
    }

    #[tokio::test]
    async fn test_dependencies_of_lazy_plugin_wait_for_trigger() {
        let h = Harness::new();
        h.manager
            .add(
                PluginSpec::new("a/lazy")
                    .lazy(LazySpec::new().command("Lazy"))
                    .dependency(PluginSpec::new("a/dep")),
            )
            .await
            .unwrap();

        assert_eq!(h.vcs.clone_count(), 0);
        assert_eq!(
            h.manager.plugin("a/dep").unwrap().state(),
            PluginState::Added
        );

        h.manager
            .load("a/lazy", Trigger::command("Lazy"))
            .await
            .unwrap();

        assert_eq!(h.vcs.cloned_urls(), vec![url("a/dep"), url("a/lazy")]);
        assert_eq!(
            h.manager.search_path().await.entries(),
            &[h.dst("a/dep"), h.dst("a/lazy")]
        );
        for shorthand in ["a/dep", "a/lazy"] {
            assert_eq!(
                h.manager.plugin(shorthand).unwrap().state(),
                PluginState::Loaded,
                "{}",
                shorthand
            );
        }
    }

    #[tokio::test]
    async fn test_lazy_plugin_loaded_when_eager_plugin_needs_it() {
        let h = Harness::new();
        h.manager
            .add(entire_with(KeySpec::new("ae")))
            .await
            .unwrap();
        assert_eq!(h.host.triggers().len(), 1);

        h.manager
            .add(PluginSpec::new("a/user").dependency(PluginSpec::new(ENTIRE)))
            .await
            .unwrap();

        assert!(h.host.triggers().is_empty());
        assert_eq!(
            h.manager.plugin(ENTIRE).unwrap().state(),
            PluginState::Registered
        );
        assert_eq!(
            h.host.search_path(),
            vec![h.dst(ENTIRE), h.dst("a/user")]
        );
    }
}
