use std::path::Path;
use std::sync::{Arc, Mutex};

use bringup::core::backend::{
    BuildBackend, ClusterBackend, ImageBuildRequest, LocalCompileRequest, ManifestApplyRequest,
    MinimalImageRequest, PortForwardRequest, SecretApplyRequest, SyncBackend, SyncRequest,
};
use bringup::core::dispatch::{DispatchOptions, Dispatcher};
use bringup::core::manifest::{Platform, MANIFEST_FILE};
use bringup::{Error, ErrorCode, Result};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

struct MockBackend {
    recorder: Arc<Recorder>,
    /// Component whose image build is forced to fail.
    fail_build: Option<String>,
    /// Component whose sync is forced to fail.
    fail_sync: Option<String>,
}

impl MockBackend {
    fn new(recorder: Arc<Recorder>) -> Self {
        Self {
            recorder,
            fail_build: None,
            fail_sync: None,
        }
    }
}

impl BuildBackend for MockBackend {
    fn build_image(&self, req: &ImageBuildRequest) -> Result<()> {
        if self.fail_build.as_deref() == Some(req.component_id.as_str()) {
            return Err(Error::build_image_failed(
                &req.component_id,
                "docker build",
                Some(1),
                None,
            ));
        }
        self.recorder
            .push(format!("build_image {} {}", req.component_id, req.image));
        Ok(())
    }

    fn build_minimal_image(&self, req: &MinimalImageRequest) -> Result<()> {
        self.recorder.push(format!(
            "build_minimal {} {}",
            req.component_id,
            req.binary.display()
        ));
        Ok(())
    }

    fn compile(&self, req: &LocalCompileRequest) -> Result<()> {
        self.recorder
            .push(format!("compile {} {}", req.component_id, req.command));
        Ok(())
    }
}

impl ClusterBackend for MockBackend {
    fn apply_secret(&self, req: &SecretApplyRequest) -> Result<()> {
        self.recorder.push(format!("apply_secret {}", req.name));
        Ok(())
    }

    fn apply_manifest(&self, req: &ManifestApplyRequest) -> Result<()> {
        self.recorder
            .push(format!("apply {} {}", req.component_id, req.resource));
        Ok(())
    }

    fn delete_manifest(&self, req: &ManifestApplyRequest) -> Result<()> {
        self.recorder.push(format!("delete {}", req.component_id));
        Ok(())
    }

    fn port_forward(&self, req: &PortForwardRequest) -> Result<u32> {
        self.recorder
            .push(format!("forward {} {}", req.component_id, req.forwards.len()));
        Ok(4242)
    }
}

impl SyncBackend for MockBackend {
    fn sync(&self, req: &SyncRequest) -> Result<()> {
        if self.fail_sync.as_deref() == Some(req.component_id.as_str()) {
            return Err(Error::sync_restart_failed(
                &req.component_id,
                req.restart_command.join(" "),
                "container not ready",
            ));
        }
        self.recorder.push(format!(
            "sync {} pairs={} restart={}",
            req.component_id,
            req.pairs.len(),
            req.restart_command.join(" ")
        ));
        Ok(())
    }
}

fn write_platform(dir: &Path, manifest: &str) -> Platform {
    std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
    Platform::load(Some(dir)).unwrap()
}

fn dispatcher_with(
    platform: Platform,
    backend: MockBackend,
    options: DispatchOptions,
) -> Dispatcher {
    let backend = Arc::new(backend);
    Dispatcher::new(
        platform,
        backend.clone(),
        backend.clone(),
        backend,
        options,
    )
}

fn standard_manifest() -> &'static str {
    r#"{
        "platform": "architus",
        "settings": {
            "image_prefix": "archit.us",
            "secrets": {"name": "architus-secrets", "file": "secrets.json"}
        },
        "features": [
            {"id": "core", "components": ["db", "gateway"]}
        ],
        "components": [
            {
                "id": "db",
                "path": "db",
                "manifest": "kube/db.yaml",
                "port_forwards": [{"local": 5432, "remote": 5432}]
            },
            {"id": "gateway", "path": "gateway", "manifest": "kube/gateway.yaml"}
        ]
    }"#
}

fn hot_manifest() -> &'static str {
    r#"{
        "platform": "architus",
        "features": [
            {"id": "core", "components": ["gateway"]}
        ],
        "components": [
            {
                "id": "gateway",
                "path": "gateway",
                "manifest": "kube/gateway.yaml",
                "hot_reload": {
                    "build_target": "gateway",
                    "build_command": "cargo build -p gateway",
                    "binary": "target/debug/gateway",
                    "dockerfile": "gateway/Dockerfile.dev",
                    "sync": [
                        {"local": "target/debug/gateway", "remote": "/app/gateway"}
                    ],
                    "config": {
                        "path": "gateway/config.local.toml",
                        "template": "gateway/config.example.toml"
                    }
                }
            }
        ]
    }"#
}

fn hot_setup(dir: &TempDir) -> Platform {
    std::fs::create_dir_all(dir.path().join("gateway")).unwrap();
    std::fs::write(dir.path().join("gateway/config.example.toml"), "port = 8080\n").unwrap();
    write_platform(dir.path(), hot_manifest())
}

#[test]
fn secret_is_applied_once_before_any_deploy() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("secrets.json"), r#"{"db_password": "hunter2"}"#).unwrap();
    let platform = write_platform(dir.path(), standard_manifest());

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions {
            serial: true,
            ..Default::default()
        },
    );

    let report = dispatcher
        .up(&["db".to_string(), "gateway".to_string()])
        .unwrap();

    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.secret.as_deref(), Some("architus-secrets"));

    let events = recorder.events();
    assert_eq!(events[0], "apply_secret architus-secrets");
    assert_eq!(events.iter().filter(|e| e.starts_with("apply_secret")).count(), 1);
    let first_apply = events.iter().position(|e| e.starts_with("apply ")).unwrap();
    assert!(first_apply > 0);
}

#[test]
fn standard_pipeline_builds_applies_and_forwards_in_order() {
    let dir = tempdir().unwrap();
    let platform = write_platform(
        dir.path(),
        r#"{
            "platform": "architus",
            "features": [{"id": "core", "components": ["db"]}],
            "components": [
                {
                    "id": "db",
                    "path": "db",
                    "manifest": "kube/db.yaml",
                    "port_forwards": [{"local": 5432, "remote": 5432}]
                }
            ]
        }"#,
    );

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions::default(),
    );

    let report = dispatcher.up(&["db".to_string()]).unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.results[0].status, "deployed");
    assert_eq!(report.results[0].port_forward_pid, Some(4242));
    assert_eq!(report.results[0].image.as_deref(), Some("local/db:dev"));

    assert_eq!(
        recorder.events(),
        vec![
            "build_image db local/db:dev".to_string(),
            "apply db db".to_string(),
            "forward db 1".to_string(),
        ]
    );
}

#[test]
fn one_failing_component_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("secrets.json"), r#"{"k": "v"}"#).unwrap();
    let platform = write_platform(dir.path(), standard_manifest());

    let recorder = Arc::new(Recorder::default());
    let mut backend = MockBackend::new(recorder.clone());
    backend.fail_build = Some("db".to_string());

    let dispatcher = dispatcher_with(
        platform,
        backend,
        DispatchOptions {
            serial: true,
            ..Default::default()
        },
    );

    let report = dispatcher
        .up(&["db".to_string(), "gateway".to_string()])
        .unwrap();

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.succeeded, 1);

    let db = report.results.iter().find(|r| r.id == "db").unwrap();
    assert_eq!(db.status, "failed");
    assert_eq!(db.error.as_ref().unwrap().code, ErrorCode::BuildImageFailed);

    let gateway = report.results.iter().find(|r| r.id == "gateway").unwrap();
    assert_eq!(gateway.status, "deployed");

    // The failed component never reached the cluster.
    assert!(!recorder.events().iter().any(|e| e == "apply db db"));
}

#[test]
fn hot_reload_pipeline_compiles_and_packages_instead_of_building_from_source() {
    let dir = tempdir().unwrap();
    let platform = hot_setup(&dir);

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions {
            hot_reload: true,
            ..Default::default()
        },
    );

    let report = dispatcher.up(&["gateway".to_string()]).unwrap();
    assert_eq!(report.summary.succeeded, 1);

    let events = recorder.events();
    assert!(events
        .iter()
        .any(|e| e.starts_with("compile gateway cargo build -p gateway")));
    assert!(events.iter().any(|e| e.starts_with("build_minimal gateway")));
    assert!(!events.iter().any(|e| e.starts_with("build_image")));
    assert_eq!(events.last().unwrap(), "apply gateway gateway");

    // The editable config was seeded from the template.
    let config = dir.path().join("gateway/config.local.toml");
    assert_eq!(std::fs::read_to_string(&config).unwrap(), "port = 8080\n");
}

#[test]
fn hot_reload_flag_without_spec_support_stays_standard() {
    let dir = tempdir().unwrap();
    let platform = write_platform(
        dir.path(),
        r#"{
            "platform": "architus",
            "features": [{"id": "core", "components": ["db"]}],
            "components": [{"id": "db", "path": "db", "manifest": "kube/db.yaml"}]
        }"#,
    );

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions {
            hot_reload: true,
            ..Default::default()
        },
    );

    dispatcher.up(&["db".to_string()]).unwrap();
    assert!(recorder
        .events()
        .iter()
        .any(|e| e.starts_with("build_image db")));
}

#[test]
fn seeded_config_is_never_overwritten() {
    let dir = tempdir().unwrap();
    let platform = hot_setup(&dir);

    let config = dir.path().join("gateway/config.local.toml");
    std::fs::write(&config, "port = 9999 # my edits\n").unwrap();

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder),
        DispatchOptions {
            hot_reload: true,
            ..Default::default()
        },
    );

    dispatcher.up(&["gateway".to_string()]).unwrap();
    assert_eq!(
        std::fs::read_to_string(&config).unwrap(),
        "port = 9999 # my edits\n"
    );
}

#[test]
fn dry_run_plans_without_touching_backends() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("secrets.json"), r#"{"k": "v"}"#).unwrap();
    let platform = write_platform(dir.path(), standard_manifest());

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions {
            dry_run: true,
            ..Default::default()
        },
    );

    let report = dispatcher
        .up(&["db".to_string(), "gateway".to_string()])
        .unwrap();

    assert!(recorder.events().is_empty());
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.succeeded, 0);
    assert!(report.results.iter().all(|r| r.status == "planned"));
}

#[test]
fn sync_cycle_recompiles_copies_and_restarts() {
    let dir = tempdir().unwrap();
    let platform = hot_setup(&dir);

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions {
            hot_reload: true,
            ..Default::default()
        },
    );

    // The binary does not exist, so the component is stale.
    let report = dispatcher.sync_cycle(&["gateway".to_string()]).unwrap();
    assert_eq!(report.results[0].status, "synced");

    let events = recorder.events();
    assert!(events.iter().any(|e| e.starts_with("compile gateway")));
    assert!(events
        .iter()
        .any(|e| e == "sync gateway pairs=1 restart=kill 1"));
    let compile_at = events.iter().position(|e| e.starts_with("compile")).unwrap();
    let sync_at = events.iter().position(|e| e.starts_with("sync")).unwrap();
    assert!(compile_at < sync_at);
}

#[test]
fn failed_sync_is_retried_on_the_next_cycle() {
    let dir = tempdir().unwrap();
    hot_setup(&dir);

    // Binary newer than every trigger, so staleness alone would skip.
    let binary = dir.path().join("target/debug/gateway");
    std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
    std::fs::write(&binary, "bin").unwrap();
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(3600);
    let file = std::fs::File::options().write(true).open(&binary).unwrap();
    file.set_modified(future).unwrap();

    let recorder = Arc::new(Recorder::default());
    let options = DispatchOptions {
        hot_reload: true,
        ..Default::default()
    };

    // First cycle: the compile succeeds but the delivery fails.
    let mut backend = MockBackend::new(recorder.clone());
    backend.fail_sync = Some("gateway".to_string());
    let dispatcher = dispatcher_with(Platform::load(Some(dir.path())).unwrap(), backend, options);
    let report = dispatcher.sync_cycle(&["gateway".to_string()]).unwrap();
    assert_eq!(report.results[0].status, "failed");
    assert_eq!(
        report.results[0].error.as_ref().unwrap().code,
        ErrorCode::SyncRestartFailed
    );

    // Second cycle: nothing recompiled, but the undelivered binary
    // must be synced again.
    let dispatcher = dispatcher_with(
        Platform::load(Some(dir.path())).unwrap(),
        MockBackend::new(recorder.clone()),
        options,
    );
    let report = dispatcher.sync_cycle(&["gateway".to_string()]).unwrap();
    assert_eq!(report.results[0].status, "synced");
    let syncs = |events: &[String]| events.iter().filter(|e| e.starts_with("sync ")).count();
    assert_eq!(syncs(&recorder.events()), 1);

    // Third cycle: the delivered binary is now up to date.
    let dispatcher = dispatcher_with(
        Platform::load(Some(dir.path())).unwrap(),
        MockBackend::new(recorder.clone()),
        options,
    );
    let report = dispatcher.sync_cycle(&["gateway".to_string()]).unwrap();
    assert_eq!(report.results[0].status, "skipped");
    assert_eq!(report.results[0].note.as_deref(), Some("binary is up to date"));
    assert_eq!(syncs(&recorder.events()), 1);
}

#[test]
fn empty_enabled_set_never_touches_the_cluster() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("secrets.json"), r#"{"k": "v"}"#).unwrap();
    let platform = write_platform(dir.path(), standard_manifest());

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions::default(),
    );

    let report = dispatcher.up(&[]).unwrap();
    assert_eq!(report.summary.total, 0);
    assert!(report.secret.is_none());
    assert!(recorder.events().is_empty());
}

#[test]
fn sync_skips_components_without_hot_reload() {
    let dir = tempdir().unwrap();
    let platform = write_platform(
        dir.path(),
        r#"{
            "platform": "architus",
            "features": [{"id": "core", "components": ["db"]}],
            "components": [{"id": "db", "path": "db", "manifest": "kube/db.yaml"}]
        }"#,
    );

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions::default(),
    );

    let report = dispatcher.sync_cycle(&["db".to_string()]).unwrap();
    assert_eq!(report.results[0].status, "skipped");
    assert_eq!(
        report.results[0].note.as_deref(),
        Some("no hot-reload support")
    );
    assert_eq!(report.summary.skipped, 1);
    assert!(recorder.events().is_empty());
}

#[test]
fn down_deletes_every_enabled_manifest() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("secrets.json"), r#"{"k": "v"}"#).unwrap();
    let platform = write_platform(dir.path(), standard_manifest());

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions::default(),
    );

    let report = dispatcher
        .down(&["db".to_string(), "gateway".to_string()])
        .unwrap();

    assert!(report.results.iter().all(|r| r.status == "deleted"));
    let events = recorder.events();
    assert!(events.contains(&"delete db".to_string()));
    assert!(events.contains(&"delete gateway".to_string()));
    // Teardown never applies the secret.
    assert!(!events.iter().any(|e| e.starts_with("apply_secret")));
}

#[test]
fn unknown_component_aborts_with_no_backend_calls() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("secrets.json"), r#"{"k": "v"}"#).unwrap();
    let platform = write_platform(dir.path(), standard_manifest());

    let recorder = Arc::new(Recorder::default());
    let dispatcher = dispatcher_with(
        platform,
        MockBackend::new(recorder.clone()),
        DispatchOptions::default(),
    );

    let err = dispatcher.up(&["ghost".to_string()]).unwrap_err();
    assert_eq!(err.code, ErrorCode::ComponentUnknown);
    assert!(recorder.events().is_empty());
}
