//! End-to-end tests for extension activation

use async_trait::async_trait;
use serde_json::json;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;
use vessel_api::DirEntry;
use vessel_host::{
    CapabilityBuilder, ContributionRegistry, ContributionScope, DirectoryHandle, DisposableList,
    ExtensionError, ExtensionId, ExtensionRuntime, FailurePolicy, FileSystem, HostServices,
    MemoryFs, MemoryStyleSink, NativeFs, RecordingErrorSink, ScriptExecutor, StoreKey, UiLoader,
    UiStore, VesselConfig,
};

struct Host {
    errors: RecordingErrorSink,
    styles: MemoryStyleSink,
    registry: ContributionRegistry,
    runtime: ExtensionRuntime,
}

impl Host {
    fn new() -> Self {
        Self::with_config(VesselConfig::default())
    }

    fn with_config(config: VesselConfig) -> Self {
        let errors = RecordingErrorSink::new();
        let styles = MemoryStyleSink::new();
        let registry = ContributionRegistry::new();
        let services = HostServices::new(
            Rc::new(errors.clone()),
            Rc::new(styles.clone()),
            registry.clone(),
        );
        Self {
            runtime: ExtensionRuntime::with_services(config, services),
            errors,
            styles,
            registry,
        }
    }

    fn commands(&self, id: &str) -> Vec<(String, serde_json::Value)> {
        self.registry
            .list(&ContributionScope::Extension(ExtensionId::new(id)), "command")
    }
}

const PANEL: &str = r#"<template>
  <v-card>
    <h1>{{ title }}</h1>
    <VBtn @click="save">Save</VBtn>
  </v-card>
</template>

<script lang="ts">
interface State { title: string }
export default {
  data(): State { return { title: "Panel" }; },
  methods: { save(): void {} },
}
</script>

<style>
.panel { padding: 4px; }
</style>
"#;

#[tokio::test]
async fn test_activate_publishes_components_and_runs_scripts() {
    let host = Host::new();
    let fs = MemoryFs::from_files([
        ("ui/panels/main.vue", PANEL.to_string()),
        (
            "scripts/init.ts",
            "const c = require('@vessel/contributions');\nconst n: number = 1;\nc.register('command', 'hello', { n });".to_string(),
        ),
    ]);

    let activation = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs), false)
        .await
        .unwrap();

    assert!(host.errors.is_empty(), "{:?}", host.errors.reports());
    assert_eq!(activation.ui_store().keys(), vec![StoreKey::new(["panels", "main"])]);

    let definition = activation.component("panels/main").await.unwrap().unwrap();
    assert_eq!(definition.name, "main.vue");
    assert_eq!(definition.path, "ui/panels/main.vue");
    assert_eq!(definition.data().unwrap(), json!({ "title": "Panel" }));
    assert_eq!(definition.render.interpolations(), vec!["title"]);
    assert!(definition.option("methods").unwrap().is_some());
    assert!(definition.components.contains_key("VBtn"));

    assert_eq!(host.styles.len(), 1);
    assert_eq!(activation.scripts().executed, vec!["scripts/init.ts"]);
    assert_eq!(host.commands("demo"), vec![("hello".to_string(), json!({ "n": 1 }))]);
}

#[tokio::test]
async fn test_nested_component_resolves_data_and_markup() {
    let host = Host::new();
    let fs = MemoryFs::new().with_file(
        "ui/panels/main.vue",
        "<script>export default { data(){return {x:1}} }</script><template><p>hi</p></template>",
    );

    let activation = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs), false)
        .await
        .unwrap();

    let key = StoreKey::new(["panels", "main"]);
    assert_eq!(activation.ui_store().keys(), vec![key.clone()]);
    let definition = activation.ui_store().resolve(&key).await.unwrap().unwrap();
    assert_eq!(definition.data().unwrap(), json!({ "x": 1 }));
    assert_eq!(definition.render.to_markup(), "<p>hi</p>");
    assert!(host.errors.is_empty(), "{:?}", host.errors.reports());
}

#[tokio::test]
async fn test_non_ascii_and_doctype_templates_load() {
    let host = Host::new();
    let fs = MemoryFs::from_files([
        ("ui/uni.vue", "<template><p>ünïcödé {{ a }}</p></template>".to_string()),
        ("ui/doc.vue", "<template><!DOCTYPE html><p>x</p></template>".to_string()),
        ("ui/ok.vue", "<template><b>ok</b></template>".to_string()),
    ]);

    let activation = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs), false)
        .await
        .unwrap();

    assert!(host.errors.is_empty(), "{:?}", host.errors.reports());
    let uni = activation.component("uni").await.unwrap().unwrap();
    assert_eq!(uni.render.to_markup(), "<p>ünïcödé {{ a }}</p>");
    let doc = activation.component("doc").await.unwrap().unwrap();
    assert_eq!(doc.render.to_markup(), "<p>x</p>");
    assert!(activation.component("ok").await.unwrap().is_ok());
}

#[tokio::test]
async fn test_non_component_file_is_reported_once() {
    let host = Host::new();
    let fs = MemoryFs::new().with_file("ui/bad.txt", "not a component");

    let activation = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs), false)
        .await
        .unwrap();

    assert!(activation.ui_store().is_empty());
    assert_eq!(activation.ui_store().revision(), 0);
    assert_eq!(
        host.errors.messages(),
        vec!["Provided UI file \"bad.txt\" is not a recognized component file".to_string()]
    );
}

#[tokio::test]
async fn test_missing_roots_load_nothing() {
    let host = Host::new();

    let activation = host
        .runtime
        .activate(ExtensionId::new("empty"), Rc::new(MemoryFs::new()), false)
        .await
        .unwrap();

    assert!(activation.ui_store().is_empty());
    assert_eq!(activation.ui_store().revision(), 0);
    assert_eq!(activation.scripts().total_found(), 0);
    assert!(host.errors.is_empty());
}

#[tokio::test]
async fn test_parse_errors_are_reported_in_order_and_withdrawn() {
    let host = Host::new();
    let fs = MemoryFs::new().with_file(
        "ui/dup.vue",
        "<template><p/></template>\n<template><b/></template>\n<script>export default {}</script>\n<script></script>\n",
    );

    let activation = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs), false)
        .await
        .unwrap();

    let messages = host.errors.messages();
    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(messages[0].contains("only one <template> element (line 2)"));
    assert!(messages[1].contains("only one <script> element (line 4)"));
    assert!(activation.ui_store().is_empty());
}

#[tokio::test]
async fn test_sibling_failures_are_isolated() {
    let host = Host::new();
    let fs = MemoryFs::from_files([
        ("ui/good.vue", "<template><p>ok</p></template>".to_string()),
        ("ui/broken.vue", "<script>throw new Error('broken')</script>".to_string()),
        (
            "scripts/ok.js",
            "require('@vessel/contributions').register('command', 'ok', 1);".to_string(),
        ),
        ("scripts/fail.js", "require('fs');".to_string()),
    ]);

    let activation = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs), false)
        .await
        .unwrap();

    assert!(activation.component("good").await.unwrap().is_ok());
    assert!(activation.component("broken").await.unwrap().is_err());
    assert_eq!(activation.scripts().executed, vec!["scripts/ok.js"]);
    assert_eq!(activation.scripts().failures.len(), 1);
    assert_eq!(host.errors.len(), 2);
    assert_eq!(host.commands("demo").len(), 1);
}

#[tokio::test]
async fn test_fail_fast_releases_everything() {
    let mut config = VesselConfig::default();
    config.loader.failure_policy = FailurePolicy::FailFast;
    let host = Host::with_config(config);
    let fs = MemoryFs::from_files([
        ("ui/styled.vue", "<template><p/></template><style>p { margin: 0 }</style>".to_string()),
        (
            "scripts/a.js",
            "require('@vessel/contributions').register('command', 'a', 1);".to_string(),
        ),
        ("scripts/z.js", "throw new Error('stop');".to_string()),
    ]);

    let err = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs), false)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtensionError::Script(_)));
    assert_eq!(err.path(), Some("scripts/z.js"));
    assert!(host.styles.is_empty());
    assert!(host.registry.is_empty());
}

#[tokio::test]
async fn test_global_extensions_see_global_registry() {
    let host = Host::new();
    let fs = MemoryFs::new().with_file(
        "scripts/theme.js",
        "const c = require('@vessel/contributions');\nif (typeof c.registerGlobal !== 'function') throw new Error('missing');\nc.registerGlobal('theme', 'dark', { base: 'vs-dark' });",
    );

    host.runtime
        .activate(ExtensionId::new("themes"), Rc::new(fs.clone()), true)
        .await
        .unwrap();
    assert_eq!(
        host.registry.list(&ContributionScope::Global, "theme"),
        vec![("dark".to_string(), json!({ "base": "vs-dark" }))]
    );

    let local = host
        .runtime
        .activate(ExtensionId::new("local"), Rc::new(fs), false)
        .await
        .unwrap();
    assert_eq!(local.scripts().failures.len(), 1);
    assert!(host.errors.messages()[0].contains("missing"));
}

#[tokio::test]
async fn test_reload_and_deactivate() {
    let host = Host::new();
    let fs = MemoryFs::from_files([
        (
            "ui/main.vue",
            "<template><p>{{ n }}</p></template><script>export default { data: () => ({ n: 1 }) }</script><style>p {}</style>".to_string(),
        ),
        ("ui/old.vue", "<template><p/></template>".to_string()),
    ]);
    let activation = host
        .runtime
        .activate(ExtensionId::new("demo"), Rc::new(fs.clone()), false)
        .await
        .unwrap();
    assert_eq!(activation.ui_store().len(), 2);

    fs.insert(
        "ui/main.vue",
        "<template><p>{{ n }}</p></template><script>export default { data: () => ({ n: 2 }) }</script>",
    );
    fs.remove("ui/old.vue");
    fs.insert(
        "scripts/late.js",
        "require('@vessel/contributions').register('command', 'late', true);",
    );

    let summary = activation
        .reload(&[
            "ui/main.vue".to_string(),
            "ui/old.vue".to_string(),
            "scripts/late.js".to_string(),
            "README.md".to_string(),
        ])
        .await
        .unwrap();

    assert_eq!(summary.components, vec!["ui/main.vue"]);
    assert_eq!(summary.removed, vec![StoreKey::parse("old")]);
    assert_eq!(summary.scripts.executed, vec!["scripts/late.js"]);

    let definition = activation.component("main").await.unwrap().unwrap();
    assert_eq!(definition.data().unwrap(), json!({ "n": 2 }));
    assert!(activation.component("old").await.is_none());
    assert_eq!(host.commands("demo").len(), 1);

    let disposed = activation.deactivate();
    assert_eq!(disposed, 2);
    assert!(host.styles.is_empty());
    assert!(host.registry.is_empty());
}

#[tokio::test]
async fn test_activate_from_native_directory() {
    let temp = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("ui/views")).unwrap();
    std::fs::create_dir_all(temp.path().join("scripts")).unwrap();
    std::fs::write(
        temp.path().join("ui/views/list.vue"),
        "<template><ul><li>{{ item }}</li></ul></template>",
    )
    .unwrap();
    std::fs::write(
        temp.path().join("scripts/boot.js"),
        "const env = require('@vessel/env');\nrequire('@vessel/contributions').register('command', env.extensionId, 0);",
    )
    .unwrap();

    let host = Host::new();
    let activation = host
        .runtime
        .activate(ExtensionId::new("native"), Rc::new(NativeFs::new(temp.path())), false)
        .await
        .unwrap();

    assert!(host.errors.is_empty(), "{:?}", host.errors.reports());
    assert!(activation.component("views/list").await.unwrap().is_ok());
    assert_eq!(host.commands("native"), vec![("native".to_string(), json!(0))]);
}

/// Serves successive versions of each file, each after its own delay
#[derive(Clone, Default)]
struct DelayedFs {
    versions: Rc<RefCell<VecDeque<(Duration, String)>>>,
}

#[async_trait(?Send)]
impl FileSystem for DelayedFs {
    async fn read_dir(&self, _path: &str) -> io::Result<Vec<DirEntry>> {
        Ok(Vec::new())
    }

    async fn read_file(&self, _path: &str) -> io::Result<String> {
        let next = self.versions.borrow_mut().pop_front();
        let (delay, text) = next.ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        tokio::time::sleep(delay).await;
        Ok(text)
    }

    async fn directory(&self, _path: &str) -> io::Result<Rc<dyn DirectoryHandle>> {
        Err(io::Error::from(io::ErrorKind::NotFound))
    }
}

#[tokio::test]
async fn test_last_settled_load_wins() {
    let fs = DelayedFs::default();
    fs.versions.borrow_mut().extend([
        (
            Duration::from_millis(80),
            "<script>export default { data: () => ({ v: 'slow' }) }</script>".to_string(),
        ),
        (
            Duration::from_millis(0),
            "<script>export default { data: () => ({ v: 'fast' }) }</script>".to_string(),
        ),
    ]);
    let fs: Rc<dyn FileSystem> = Rc::new(fs);

    let loader = UiLoader::new(ScriptExecutor::default(), CapabilityBuilder::default());
    let (store, disposables) = (UiStore::new(), DisposableList::new());
    let id = ExtensionId::new("race");

    futures::join!(
        loader.load_ui_component(&fs, "ui/race.vue", &id, &store, &disposables),
        loader.load_ui_component(&fs, "ui/race.vue", &id, &store, &disposables),
    );

    let definition = store.resolve(&StoreKey::parse("race")).await.unwrap().unwrap();
    assert_eq!(definition.data().unwrap(), json!({ "v": "slow" }));
}
