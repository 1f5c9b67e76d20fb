//! 引擎单元测试
//!
//! 覆盖模块记忆化、循环依赖检测、脚本超时与注册表语义

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;

use crate::engine::{
    executor, Engine, EngineError, Environment, Executable, Project, StaticHost, Unit, Value,
};
use crate::store::StoreSpace;
use crate::tree::Instance;
use crate::util::config::EngineConfig;

/// 查找同级对象（相当于 `script.Parent.<name>`）
fn sibling(
    env: &Environment,
    name: &str,
) -> anyhow::Result<Instance> {
    env.script()
        .parent()
        .and_then(|parent| parent.find_first_child(name))
        .ok_or_else(|| anyhow!("'{}' has no sibling '{}'", env.script().full_name(), name))
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// 在独立的存储空间中构建项目
fn build(
    root: &Instance,
    host: &StaticHost,
    config: EngineConfig,
) -> Project {
    Project::with_space(
        vec![root.clone()],
        Arc::new(host.clone()),
        config,
        &StoreSpace::new(),
    )
    .unwrap()
}

/// 定义一个计数并返回固定值的模块
fn define_value(
    host: &StaticHost,
    name: &str,
    calls: &Arc<AtomicUsize>,
    value: i64,
) {
    let calls = calls.clone();
    host.define(name, move |_| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Some(Value::new(value)))
        }
    });
}

/// 定义一个依次 require 同级模块后返回自身名字的模块
fn define_requiring(
    host: &StaticHost,
    name: &str,
    requires: &'static [&'static str],
    calls: &Arc<AtomicUsize>,
) {
    let calls = calls.clone();
    let own = name.to_string();
    host.define(name, move |env| {
        let calls = calls.clone();
        let own = own.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            for dependency in requires {
                env.require(&sibling(&env, dependency)?).await?;
            }
            Ok(Some(Value::new(own)))
        }
    });
}

#[cfg(test)]
mod module_tests {
    use super::*;

    #[tokio::test]
    async fn test_module_executes_once_sequentially() {
        let host = StaticHost::new();
        let calls = counter();
        define_value(&host, "util", &calls, 42);

        let root = Instance::folder("Pkg");
        let util = Instance::module("Util", "util");
        root.add_child(util.clone());
        let project = build(&root, &host, EngineConfig::default());

        let first = project.require(&util).await.unwrap();
        let second = project.require(&util).await.unwrap();

        assert_eq!(first.downcast_ref::<i64>(), Some(&42));
        assert!(first.ptr_eq(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_callers_share_execution() {
        let host = StaticHost::new();
        let calls = counter();
        define_value(&host, "util", &calls, 7);

        let root = Instance::folder("Pkg");
        let util = Instance::module("Util", "util");
        root.add_child(util.clone());
        let project = Arc::new(build(&root, &host, EngineConfig::default()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let project = project.clone();
            let util = util.clone();
            handles.push(tokio::spawn(async move { project.require(&util).await }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|value| value.ptr_eq(&values[0])));
    }

    #[tokio::test]
    async fn test_dependents_observe_one_result() {
        let host = StaticHost::new();
        let calls = counter();
        let unused = counter();
        define_value(&host, "shared", &calls, 1);
        define_requiring(&host, "left", &["Shared"], &unused);
        define_requiring(&host, "right", &["Shared"], &unused);

        let root = Instance::folder("Pkg");
        let shared = Instance::module("Shared", "shared");
        let left = Instance::module("Left", "left");
        let right = Instance::module("Right", "right");
        root.add_child(shared.clone());
        root.add_child(left.clone());
        root.add_child(right.clone());
        let project = build(&root, &host, EngineConfig::default());

        let (l, r) = tokio::join!(project.require(&left), project.require(&right));
        assert!(l.is_ok() && r.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(project.engine().validator().is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_fails_and_stays_failed() {
        let host = StaticHost::new();
        let calls = counter();
        let sink = calls.clone();
        host.define("empty", move |_| {
            let sink = sink.clone();
            async move {
                sink.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        });

        let root = Instance::folder("Pkg");
        let empty = Instance::module("Empty", "empty");
        root.add_child(empty.clone());
        let project = build(&root, &host, EngineConfig::default());

        for _ in 0..2 {
            match project.require(&empty).await {
                Err(EngineError::EmptyModuleResult { module }) => assert_eq!(module, "Pkg.Empty"),
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_executor_error_is_wrapped_with_identity() {
        let host = StaticHost::new();
        host.define("broken", |_| async { Err(anyhow!("attempt to index nil")) });

        let root = Instance::folder("Pkg");
        let broken = Instance::module("Broken", "broken");
        root.add_child(broken.clone());
        let project = build(&root, &host, EngineConfig::default());

        match project.require(&broken).await {
            Err(EngineError::ExecutorFailed { unit, message }) => {
                assert_eq!(unit, "Pkg.Broken");
                assert_eq!(message, "attempt to index nil");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_executor_can_inspect_own_result() {
        let host = StaticHost::new();
        host.define("introspect", |env| {
            let pending = env
                .engine()
                .registry()
                .get_module(env.script())
                .map(|module| module.result().is_none());
            async move { Ok(Some(Value::new(pending))) }
        });

        let root = Instance::folder("Pkg");
        let object = Instance::module("Introspect", "introspect");
        root.add_child(object.clone());
        let project = build(&root, &host, EngineConfig::default());

        let value = project.require(&object).await.unwrap();
        assert_eq!(value.downcast_ref::<Option<bool>>(), Some(&Some(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_module_still_caches_result() {
        let host = StaticHost::new();
        let calls = counter();
        let sink = calls.clone();
        host.define("slow", move |_| {
            let sink = sink.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                sink.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Value::new("slow")))
            }
        });

        let root = Instance::folder("Pkg");
        let slow = Instance::module("Slow", "slow");
        root.add_child(slow.clone());
        let project = build(&root, &host, EngineConfig::default());
        let unit = project.engine().registry().get(&slow).unwrap();

        let err = unit.deferred_execute(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("Module 'Pkg.Slow' reached execution timeout"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let module = unit.as_module().unwrap();
        assert!(matches!(module.result(), Some(Ok(_))));

        let value = project.require(&slow).await.unwrap();
        assert_eq!(value.downcast_ref::<&str>(), Some(&"slow"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[cfg(test)]
mod cycle_tests {
    use super::*;

    fn cyclic_project(
        host: &StaticHost,
        calls: &Arc<AtomicUsize>,
    ) -> (Project, Instance) {
        define_requiring(host, "a", &["B"], calls);
        define_requiring(host, "b", &["C"], calls);
        define_requiring(host, "c", &["A"], calls);

        let root = Instance::folder("Pkg");
        let a = Instance::module("A", "a");
        root.add_child(a.clone());
        root.add_child(Instance::module("B", "b"));
        root.add_child(Instance::module("C", "c"));
        (build(&root, host, EngineConfig::default()), a)
    }

    #[tokio::test]
    async fn test_cycle_reports_full_chain() {
        let host = StaticHost::new();
        let calls = counter();
        let (project, a) = cyclic_project(&host, &calls);

        let result = tokio::time::timeout(Duration::from_secs(5), project.require(&a))
            .await
            .expect("cyclic require must not deadlock");

        match result {
            Err(EngineError::CyclicDependency { module, chain }) => {
                assert_eq!(module, "Pkg.A");
                assert_eq!(chain, vec!["Pkg.A", "Pkg.B", "Pkg.C", "Pkg.A"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // A, B and C each ran exactly once
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(project.engine().validator().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_failure_is_cached() {
        let host = StaticHost::new();
        let calls = counter();
        let (project, a) = cyclic_project(&host, &calls);

        assert!(project.require(&a).await.unwrap_err().is_cyclic());
        assert!(project.require(&a).await.unwrap_err().is_cyclic());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_self_require_is_cyclic() {
        let host = StaticHost::new();
        let calls = counter();
        define_requiring(&host, "me", &["Me"], &calls);

        let root = Instance::folder("Pkg");
        let me = Instance::module("Me", "me");
        root.add_child(me.clone());
        let project = build(&root, &host, EngineConfig::default());

        match project.require(&me).await {
            Err(EngineError::CyclicDependency { chain, .. }) => {
                assert_eq!(chain, vec!["Pkg.Me", "Pkg.Me"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_dependency_releases_edge() {
        let host = StaticHost::new();
        let calls = counter();
        host.define("bad", |_| async { Err(anyhow!("bad module")) });
        define_requiring(&host, "first", &["Bad"], &calls);
        define_requiring(&host, "second", &["Bad"], &calls);

        let root = Instance::folder("Pkg");
        let first = Instance::module("First", "first");
        let second = Instance::module("Second", "second");
        root.add_child(Instance::module("Bad", "bad"));
        root.add_child(first.clone());
        root.add_child(second.clone());
        let project = build(&root, &host, EngineConfig::default());

        let err = project.require(&first).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutorFailed { ref unit, .. } if unit == "Pkg.Bad"));
        assert!(project.engine().validator().is_empty());

        let err = project.require(&second).await.unwrap_err();
        assert!(!err.is_cyclic());
        assert!(project.engine().validator().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_mode_skips_tracking() {
        let host = StaticHost::new();
        let seen_edges = counter();
        let sink = seen_edges.clone();
        host.define("leaf", move |env| {
            let sink = sink.clone();
            async move {
                sink.store(env.engine().validator().len(), Ordering::SeqCst);
                Ok(Some(Value::new(())))
            }
        });
        let calls = counter();
        define_requiring(&host, "top", &["Leaf"], &calls);

        let root = Instance::folder("Pkg");
        let top = Instance::module("Top", "top");
        root.add_child(top.clone());
        root.add_child(Instance::module("Leaf", "leaf"));
        let config = EngineConfig {
            validate_dependencies: false,
            ..EngineConfig::default()
        };
        let project = build(&root, &host, config);

        project.require(&top).await.unwrap();
        assert_eq!(seen_edges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_edge_is_visible_while_loading() {
        let host = StaticHost::new();
        let seen_edges = counter();
        let sink = seen_edges.clone();
        host.define("leaf", move |env| {
            let sink = sink.clone();
            async move {
                sink.store(env.engine().validator().len(), Ordering::SeqCst);
                Ok(Some(Value::new(())))
            }
        });
        let calls = counter();
        define_requiring(&host, "top", &["Leaf"], &calls);

        let root = Instance::folder("Pkg");
        let top = Instance::module("Top", "top");
        root.add_child(top.clone());
        root.add_child(Instance::module("Leaf", "leaf"));
        let project = build(&root, &host, EngineConfig::default());

        project.require(&top).await.unwrap();
        assert_eq!(seen_edges.load(Ordering::SeqCst), 1);
        assert!(project.engine().validator().is_empty());
    }
}

#[cfg(test)]
mod script_tests {
    use super::*;

    #[tokio::test]
    async fn test_script_is_not_requirable() {
        let host = StaticHost::new();
        let calls = counter();
        host.define("main", |_| async { Ok(None) });
        define_requiring(&host, "needs_main", &["Main"], &calls);

        let root = Instance::folder("Pkg");
        let main = Instance::script("Main", "main");
        let needs_main = Instance::module("NeedsMain", "needs_main");
        root.add_child(main.clone());
        root.add_child(needs_main.clone());
        let project = build(&root, &host, EngineConfig::default());

        match project.require(&needs_main).await {
            Err(EngineError::NotRequirable { script }) => assert_eq!(script, "Pkg.Main"),
            other => panic!("unexpected result: {other:?}"),
        }

        // Project-level require only accepts modules
        match project.require(&main).await {
            Err(EngineError::NotAModule { instance }) => assert_eq!(instance, "Pkg.Main"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_script_not_requirable_after_running() {
        let host = StaticHost::new();
        host.define("main", |_| async { Ok(Some(Value::new(1u8))) });

        let root = Instance::folder("Pkg");
        let main = Instance::script("Main", "main");
        let caller = Instance::module("Caller", "");
        root.add_child(main.clone());
        let project = build(&root, &host, EngineConfig::default());
        let unit = project.engine().registry().get(&main).unwrap();

        assert!(unit.require_as_dependency(&caller).await.is_err());
        project.start().await.unwrap();
        assert!(unit.has_executed());
        assert!(matches!(
            unit.require_as_dependency(&caller).await,
            Err(EngineError::NotRequirable { .. })
        ));
    }

    #[tokio::test]
    async fn test_script_execute_reruns() {
        let host = StaticHost::new();
        let calls = counter();
        let sink = calls.clone();
        host.define("main", move |_| {
            let sink = sink.clone();
            async move {
                sink.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        });

        let root = Instance::script("Main", "main");
        let project = build(&root, &host, EngineConfig::default());
        let script = project.scripts().next().unwrap().clone();

        script.execute().await.unwrap();
        script.execute().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

#[cfg(test)]
mod project_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_affect_sibling() {
        let host = StaticHost::new();
        host.define("hang", |_| async {
            std::future::pending::<anyhow::Result<Option<Value>>>().await
        });
        host.define("quick", |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Some(Value::new("quick")))
        });

        let root = Instance::folder("Pkg");
        root.add_child(Instance::script("Hang", "hang"));
        root.add_child(Instance::script("Quick", "quick"));
        let config = EngineConfig {
            script_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let project = build(&root, &host, config);

        let started = tokio::time::Instant::now();
        let runs = project.start().await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
        assert_eq!(runs.len(), 2);

        let hang = runs.iter().find(|run| run.script.name() == "Hang").unwrap();
        assert!(matches!(&hang.result, Err(err) if err.is_timeout()));

        let quick = runs.iter().find(|run| run.script.name() == "Quick").unwrap();
        let value = quick.result.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(value.downcast_ref::<&str>(), Some(&"quick"));
    }

    #[tokio::test]
    async fn test_start_runs_scripts_once() {
        let host = StaticHost::new();
        let calls = counter();
        for name in ["one", "two", "three"] {
            let sink = calls.clone();
            host.define(name, move |_| {
                let sink = sink.clone();
                async move {
                    sink.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            });
        }

        let root = Instance::folder("Pkg");
        let nested = Instance::folder("Nested");
        root.add_child(Instance::script("One", "one"));
        root.add_child(nested.clone());
        nested.add_child(Instance::script("Two", "two"));
        nested.add_child(Instance::script("Three", "three"));
        let project = build(&root, &host, EngineConfig::default());

        let first = project.start().await.unwrap();
        let second = project.start().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_script_failure_fails_start_without_halting_siblings() {
        let host = StaticHost::new();
        let calls = counter();
        host.define("bad", |_| async { Err(anyhow!("broken")) });
        let sink = calls.clone();
        host.define("good", move |_| {
            let sink = sink.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                sink.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        });

        let root = Instance::folder("Pkg");
        root.add_child(Instance::script("Bad", "bad"));
        root.add_child(Instance::script("Good", "good"));
        let project = build(&root, &host, EngineConfig::default());

        match project.start().await {
            Err(EngineError::ExecutorFailed { unit, message }) => {
                assert_eq!(unit, "Pkg.Bad");
                assert_eq!(message, "broken");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(project.start().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_tree() {
        let host = Arc::new(StaticHost::new());
        let space = StoreSpace::new();

        let err = Project::with_space(vec![], host.clone(), EngineConfig::default(), &space)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTree { found: 0 }));

        let two = vec![Instance::folder("A"), Instance::folder("B")];
        let err = Project::with_space(two, host, EngineConfig::default(), &space).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTree { found: 2 }));
    }

    #[test]
    fn test_discovers_root_and_descendants() {
        let host = StaticHost::new();
        host.define("x", |_| async { Ok(None) });

        let root = Instance::module("Root", "x");
        let folder = Instance::folder("Folder");
        root.add_child(folder.clone());
        folder.add_child(Instance::script("Main", "x"));
        folder.add_child(Instance::new("Config", crate::tree::ClassKind::Other("StringValue".into())));
        let project = build(&root, &host, EngineConfig::default());

        assert_eq!(project.units().len(), 2);
        assert_eq!(project.modules().count(), 1);
        assert_eq!(project.scripts().count(), 1);
        assert_eq!(project.instance(), &root);
    }

    #[test]
    fn test_missing_chunk_is_load_failure() {
        let host = StaticHost::new();
        let root = Instance::folder("Pkg");
        root.add_child(Instance::module("Util", "nowhere"));

        let err = Project::with_space(
            vec![root],
            Arc::new(host),
            EngineConfig::default(),
            &StoreSpace::new(),
        )
        .unwrap_err();
        match err {
            EngineError::LoadFailed { unit, message } => {
                assert_eq!(unit, "Pkg.Util");
                assert!(message.contains("=Pkg.Util"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_projects_share_registry_in_one_space() {
        let host = StaticHost::new();
        let calls = counter();
        define_value(&host, "util", &calls, 5);

        let space = StoreSpace::new();
        let root = Instance::folder("Pkg");
        let util = Instance::module("Util", "util");
        root.add_child(util.clone());
        let first = Project::with_space(
            vec![root],
            Arc::new(host.clone()),
            EngineConfig::default(),
            &space,
        )
        .unwrap();

        let other = Instance::folder("Other");
        let second = Project::with_space(
            vec![other],
            Arc::new(host),
            EngineConfig::default(),
            &space,
        )
        .unwrap();

        let a = first.require(&util).await.unwrap();
        let b = second.require(&util).await.unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_native_fallback_for_unmanaged_objects() {
        let host = StaticHost::new();
        let external = Instance::module("External", "");
        let missing = Instance::module("Missing", "");
        host.define_native(&external, Value::new(99u32));

        let (ext, miss) = (external.clone(), missing.clone());
        host.define("user", move |env| {
            let (ext, miss) = (ext.clone(), miss.clone());
            async move {
                let value = env.require(&ext).await?;
                let err = env.require(&miss).await.unwrap_err();
                assert!(matches!(err, EngineError::NativeRequireFailed { .. }));
                Ok(Some(value))
            }
        });

        let root = Instance::folder("Pkg");
        let user = Instance::module("User", "user");
        root.add_child(user.clone());
        let project = build(&root, &host, EngineConfig::default());

        let value = project.require(&user).await.unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&99));
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    fn engine(space: &StoreSpace) -> Engine {
        Engine::new(space, Arc::new(StaticHost::new()), EngineConfig::default())
    }

    fn noop() -> crate::engine::Executor {
        executor(|_| async { Ok(Some(Value::new(()))) })
    }

    #[test]
    fn test_last_write_wins() {
        let engine = engine(&StoreSpace::new());
        let object = Instance::module("Util", "");

        let first = engine.wrap(&object, noop()).unwrap();
        let second = engine.wrap(&object, noop()).unwrap();

        let found = engine.registry().get(&object).unwrap();
        assert!(found.ptr_eq(&second));
        assert!(!found.ptr_eq(&first));
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn test_has_and_delete() {
        let engine = engine(&StoreSpace::new());
        let object = Instance::script("Main", "");
        assert!(!engine.registry().has(&object));

        engine.wrap(&object, noop()).unwrap();
        assert!(engine.registry().has(&object));
        assert!(engine.registry().get_script(&object).is_some());
        assert!(engine.registry().get_module(&object).is_none());

        assert!(engine.registry().delete(&object));
        assert!(!engine.registry().has(&object));
        assert!(!engine.registry().delete(&object));
    }

    #[test]
    fn test_engines_in_one_space_share_registry() {
        let space = StoreSpace::new();
        let object = Instance::module("Util", "");
        engine(&space).wrap(&object, noop()).unwrap();

        assert!(engine(&space).registry().has(&object));
        assert!(!engine(&StoreSpace::new()).registry().has(&object));
    }

    #[test]
    fn test_destruct_removes_backing_store() {
        let space = StoreSpace::new();
        let engine = engine(&space);
        engine.wrap(&Instance::module("Util", ""), noop()).unwrap();

        engine.registry().clear();
        assert!(engine.registry().is_empty());
        assert!(space.contains(&EngineConfig::default().registry_id));

        engine.registry().destruct();
        assert!(!space.contains(&EngineConfig::default().registry_id));
    }

    #[test]
    fn test_only_code_can_be_wrapped() {
        let engine = engine(&StoreSpace::new());
        let err = engine.wrap(&Instance::folder("Folder"), noop()).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedInstance { .. }));
    }

    #[test]
    fn test_from_instance_loads_through_host() {
        let host = StaticHost::new();
        host.define("util", |_| async { Ok(Some(Value::new(1u8))) });
        let engine = Engine::new(&StoreSpace::new(), Arc::new(host), EngineConfig::default());
        let object = Instance::module("Util", "util");

        let unit = Unit::from_instance(&object, &engine).unwrap();
        assert!(unit.is_module());
        assert_eq!(unit.identify(), "Util");
        assert!(engine.registry().get(&object).unwrap().ptr_eq(&unit));
    }

    #[tokio::test]
    async fn test_set_executor_before_and_after_execution() {
        let engine = engine(&StoreSpace::new());
        let object = Instance::module("Util", "");
        let unit = engine.wrap(&object, noop()).unwrap();

        unit.set_executor(executor(|_| async { Ok(Some(Value::new(2u8))) }))
            .unwrap();
        let value = unit.execute().await.unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u8>(), Some(&2));

        let err = unit.set_executor(noop()).unwrap_err();
        assert!(matches!(err, EngineError::ExecutorLocked { .. }));

        // Still the original result
        let again = unit.execute().await.unwrap().unwrap();
        assert!(again.ptr_eq(&value));
    }
}

#[cfg(test)]
mod validator_tests {
    use super::*;
    use crate::engine::ModuleUnit;
    use proptest::prelude::*;

    fn modules(
        engine: &Engine,
        count: usize,
    ) -> Vec<Arc<ModuleUnit>> {
        (0..count)
            .map(|i| {
                let object = Instance::module(format!("M{i}"), "");
                let unit = engine
                    .wrap(&object, executor(|_| async { Ok(Some(Value::new(()))) }))
                    .unwrap();
                unit.as_module().unwrap().clone()
            })
            .collect()
    }

    fn engine() -> Engine {
        Engine::new(
            &StoreSpace::new(),
            Arc::new(StaticHost::new()),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_untrack_only_matching_edge() {
        let engine = engine();
        let validator = engine.validator();
        let m = modules(&engine, 3);
        let caller = m[0].instance().clone();

        let stale = validator.track(&caller, &m[1]);
        std::mem::forget(stale);
        let _current = validator.track(&caller, &m[2]);

        assert!(!validator.untrack(&caller, &m[1]));
        assert!(Arc::ptr_eq(&validator.current(&caller).unwrap(), &m[2]));
        assert!(validator.untrack(&caller, &m[2]));
        assert!(validator.current(&caller).is_none());
    }

    #[test]
    fn test_guard_releases_edge() {
        let engine = engine();
        let validator = engine.validator();
        let m = modules(&engine, 2);

        {
            let _edge = validator.track(m[0].instance(), &m[1]);
            assert_eq!(validator.len(), 1);
        }
        assert!(validator.is_empty());
    }

    #[test]
    fn test_traceback_without_cycle() {
        let engine = engine();
        let validator = engine.validator();
        let m = modules(&engine, 3);

        let _ab = validator.track(m[0].instance(), &m[1]);
        let _bc = validator.track(m[1].instance(), &m[2]);

        let chain = validator.traceback(&m[0]).unwrap();
        let names: Vec<String> = chain.iter().map(|unit| unit.identify()).collect();
        assert_eq!(names, vec!["M0", "M1", "M2"]);
    }

    #[test]
    fn test_traceback_ignores_cycle_not_through_start() {
        let engine = engine();
        let validator = engine.validator();
        let m = modules(&engine, 3);

        let _ab = validator.track(m[0].instance(), &m[1]);
        let _bc = validator.track(m[1].instance(), &m[2]);
        let _cb = validator.track(m[2].instance(), &m[1]);

        assert!(validator.traceback(&m[0]).is_ok());
    }

    proptest! {
        #[test]
        fn prop_open_chain_has_no_cycle_and_closing_it_does(len in 1usize..12) {
            let engine = engine();
            let validator = engine.validator();
            let m = modules(&engine, len + 1);

            let mut edges: Vec<_> = m
                .windows(2)
                .map(|pair| validator.track(pair[0].instance(), &pair[1]))
                .collect();

            let chain = validator.traceback(&m[0]).unwrap();
            prop_assert_eq!(chain.len(), len + 1);

            edges.push(validator.track(m[len].instance(), &m[0]));
            match validator.traceback(&m[0]) {
                Err(EngineError::CyclicDependency { chain, .. }) => {
                    prop_assert_eq!(chain.len(), len + 2);
                    prop_assert_eq!(chain.first(), chain.last());
                }
                other => prop_assert!(false, "expected a cycle, got {:?}", other.map(|c| c.len())),
            }

            drop(edges);
            prop_assert!(validator.is_empty());
        }
    }
}
