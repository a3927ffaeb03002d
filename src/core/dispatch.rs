use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::backend::{
    BuildBackend, ClusterBackend, ImageBuildRequest, LocalCompileRequest, ManifestApplyRequest,
    MinimalImageRequest, PortForwardRequest, SecretApplyRequest, SyncBackend, SyncRequest,
};
use crate::core::component::ComponentDescriptor;
use crate::core::backend::cargo;
use crate::core::context_filter::ContextFilter;
use crate::core::manifest::Platform;
use crate::core::materialize;
use crate::core::secrets::SecretBundle;
use crate::core::{Error, Result};

/// Which pipeline a component is driven through. Decided per component
/// per dispatch cycle, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    Standard,
    HotReload,
}

impl BuildMode {
    /// Hot reload requires both the global flag and a descriptor that
    /// supports it; everything else is a standard build.
    pub fn select(hot_reload_requested: bool, descriptor: &ComponentDescriptor) -> Self {
        if hot_reload_requested && descriptor.supports_hot_reload() {
            BuildMode::HotReload
        } else {
            BuildMode::Standard
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub hot_reload: bool,
    pub dry_run: bool,
    /// Run component pipelines one at a time instead of in parallel.
    pub serial: bool,
}

/// Outcome for one component in one dispatch cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRunResult {
    pub id: String,
    pub mode: BuildMode,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_forward_pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl ComponentRunResult {
    fn new(descriptor: &ComponentDescriptor, mode: BuildMode) -> Self {
        Self {
            id: descriptor.id.clone(),
            mode,
            status: String::new(),
            image: None,
            resource: descriptor.resource_name().to_string(),
            port_forward_pid: None,
            note: None,
            error: None,
        }
    }

    fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    fn with_port_forward_pid(mut self, pid: Option<u32>) -> Self {
        self.port_forward_pid = pid;
        self
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Report for one `up` dispatch cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpReport {
    pub command: String,
    pub platform: String,
    pub run_id: String,
    pub started_at: String,
    pub hot_reload: bool,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub results: Vec<ComponentRunResult>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub command: String,
    pub platform: String,
    pub run_id: String,
    pub started_at: String,
    pub results: Vec<ComponentRunResult>,
    pub summary: RunSummary,
}

/// One generic loop over component descriptors; per-component
/// differences are data, not control flow.
pub struct Dispatcher {
    platform: Platform,
    build: Arc<dyn BuildBackend>,
    cluster: Arc<dyn ClusterBackend>,
    sync: Arc<dyn SyncBackend>,
    options: DispatchOptions,
}

struct ComponentPlan {
    descriptor: ComponentDescriptor,
    mode: BuildMode,
    image: String,
}

impl Dispatcher {
    pub fn new(
        platform: Platform,
        build: Arc<dyn BuildBackend>,
        cluster: Arc<dyn ClusterBackend>,
        sync: Arc<dyn SyncBackend>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            platform,
            build,
            cluster,
            sync,
            options,
        }
    }

    /// Plan every enabled component before touching any backend, so a
    /// bad enabled set aborts the whole run up front.
    fn plan(&self, enabled: &[String]) -> Result<Vec<ComponentPlan>> {
        let settings = self.platform.settings();
        enabled
            .iter()
            .map(|id| {
                let descriptor = self.platform.descriptor(id)?.clone();
                let mode = BuildMode::select(self.options.hot_reload, &descriptor);
                let image = descriptor.image_ref(&settings.image_prefix, &settings.image_tag);
                Ok(ComponentPlan {
                    descriptor,
                    mode,
                    image,
                })
            })
            .collect()
    }

    fn report(&self, command: &str, results: Vec<ComponentRunResult>) -> CycleReport {
        let summary = summarize(&results);
        CycleReport {
            command: command.to_string(),
            platform: self.platform.manifest.platform.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            results,
            summary,
        }
    }

    /// Bring the enabled set up: secret barrier, then every component
    /// through its selected pipeline. Per-component failures are
    /// recorded and do not stop the remaining components.
    pub fn up(&self, enabled: &[String]) -> Result<UpReport> {
        let plans = self.plan(enabled)?;

        if self.options.dry_run {
            let results: Vec<ComponentRunResult> = plans
                .iter()
                .map(|plan| {
                    ComponentRunResult::new(&plan.descriptor, plan.mode)
                        .with_status("planned")
                        .with_image(plan.image.clone())
                })
                .collect();
            let summary = RunSummary {
                total: results.len() as u32,
                succeeded: 0,
                failed: 0,
                skipped: 0,
            };
            return Ok(self.up_report(results, summary, None));
        }

        // One-time barrier: the cluster secret must exist before any
        // component's deploy request is issued. An empty enabled set
        // issues no deploys and must not touch the cluster either.
        let secret = if plans.is_empty() {
            None
        } else {
            self.apply_secret_barrier()?
        };

        let results = self.run_all(&plans, |plan| self.bring_up(plan));
        let summary = summarize(&results);
        Ok(self.up_report(results, summary, secret))
    }

    fn up_report(
        &self,
        results: Vec<ComponentRunResult>,
        summary: RunSummary,
        secret: Option<String>,
    ) -> UpReport {
        UpReport {
            command: "up.run".to_string(),
            platform: self.platform.manifest.platform.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            hot_reload: self.options.hot_reload,
            dry_run: self.options.dry_run,
            secret,
            results,
            summary,
        }
    }

    /// One explicit sync cycle: for each enabled hot-reload component
    /// with a stale binary, recompile, copy the declared pairs into
    /// the running workload, and restart it in place.
    pub fn sync_cycle(&self, enabled: &[String]) -> Result<CycleReport> {
        let plans = self.plan(enabled)?;
        let results = self.run_all(&plans, |plan| self.sync_component(plan));
        Ok(self.report("sync.run", results))
    }

    /// Operator-driven teardown: delete each enabled component's
    /// deploy manifest. Never triggered automatically by a shrinking
    /// enabled set.
    pub fn down(&self, enabled: &[String]) -> Result<CycleReport> {
        let plans = self.plan(enabled)?;
        let results = self.run_all(&plans, |plan| self.tear_down(plan));
        Ok(self.report("down.run", results))
    }

    /// Run one pipeline per plan, in parallel unless serial was
    /// requested. Components are unrelated resources; only the secret
    /// barrier (already applied) is shared.
    fn run_all<F>(&self, plans: &[ComponentPlan], pipeline: F) -> Vec<ComponentRunResult>
    where
        F: Fn(&ComponentPlan) -> Result<ComponentRunResult> + Sync,
    {
        let isolate = |plan: &ComponentPlan| {
            pipeline(plan).unwrap_or_else(|err| {
                ComponentRunResult::new(&plan.descriptor, plan.mode)
                    .with_status("failed")
                    .with_image(plan.image.clone())
                    .with_error(err)
            })
        };

        if self.options.serial || plans.len() <= 1 {
            return plans.iter().map(isolate).collect();
        }

        std::thread::scope(|scope| {
            let isolate = &isolate;
            let handles: Vec<_> = plans
                .iter()
                .map(|plan| scope.spawn(move || isolate(plan)))
                .collect();
            handles
                .into_iter()
                .zip(plans)
                .map(|(handle, plan)| {
                    handle.join().unwrap_or_else(|_| {
                        ComponentRunResult::new(&plan.descriptor, plan.mode)
                            .with_status("failed")
                            .with_error(Error::internal_unexpected(format!(
                                "pipeline thread panicked for '{}'",
                                plan.descriptor.id
                            )))
                    })
                })
                .collect()
        })
    }

    fn apply_secret_barrier(&self) -> Result<Option<String>> {
        let Some(config) = &self.platform.settings().secrets else {
            return Ok(None);
        };

        let file = self.platform.resolve_path(&config.file);
        let bundle = SecretBundle::load(config, &file)?;
        let manifest_yaml = bundle.render_manifest(self.platform.settings().namespace.as_deref())?;

        crate::log_status!("secret", "applying secret '{}'", bundle.name);
        self.cluster.apply_secret(&SecretApplyRequest {
            name: bundle.name.clone(),
            manifest_yaml,
        })?;

        Ok(Some(bundle.name))
    }

    fn bring_up(&self, plan: &ComponentPlan) -> Result<ComponentRunResult> {
        match plan.mode {
            BuildMode::Standard => self.standard_pipeline(plan),
            BuildMode::HotReload => self.hot_reload_pipeline(plan),
        }
    }

    /// Standard pipeline: scoped from-source image build, manifest
    /// apply, declared port forwards.
    fn standard_pipeline(&self, plan: &ComponentPlan) -> Result<ComponentRunResult> {
        let descriptor = &plan.descriptor;
        let filter = ContextFilter::for_component(descriptor);

        self.build.build_image(&ImageBuildRequest {
            component_id: descriptor.id.clone(),
            image: plan.image.clone(),
            context_dir: self.platform.root.clone(),
            dockerfile: self.platform.resolve_path(&descriptor.dockerfile_path()),
            dockerignore: filter.render(),
            build_env: descriptor.env.clone().into_iter().collect(),
        })?;

        self.apply_and_forward(plan)
    }

    /// Hot-reload pipeline: materialize the editable config, compile
    /// locally with its triggers spelled out, package the minimal
    /// runtime image, deploy it.
    fn hot_reload_pipeline(&self, plan: &ComponentPlan) -> Result<ComponentRunResult> {
        let descriptor = &plan.descriptor;
        let hot = descriptor.hot_reload.as_ref().ok_or_else(|| {
            Error::internal_unexpected(format!(
                "hot-reload mode selected for '{}' without a spec",
                descriptor.id
            ))
        })?;

        let config = self.materialize_config(descriptor)?;
        let compile = self.compile_request(plan)?;
        self.build.compile(&compile)?;

        self.build.build_minimal_image(&MinimalImageRequest {
            component_id: descriptor.id.clone(),
            image: plan.image.clone(),
            dockerfile: self.platform.resolve_path(&hot.dockerfile),
            binary: compile.binary,
            config,
            entrypoint_args: hot.args.clone(),
        })?;

        self.apply_and_forward(plan)
    }

    fn materialize_config(
        &self,
        descriptor: &ComponentDescriptor,
    ) -> Result<Option<std::path::PathBuf>> {
        let Some(hot) = &descriptor.hot_reload else {
            return Ok(None);
        };
        let Some(seed) = &hot.config else {
            return Ok(None);
        };

        let target = self.platform.resolve_path(&seed.path);
        let template = self.platform.resolve_path(&seed.template);
        if materialize::ensure(&descriptor.id, &target, &template)? {
            crate::log_status!(
                "up",
                "{}: seeded editable config at {}",
                descriptor.id,
                target.display()
            );
        }
        Ok(Some(target))
    }

    fn compile_request(&self, plan: &ComponentPlan) -> Result<LocalCompileRequest> {
        let descriptor = &plan.descriptor;
        let hot = descriptor.hot_reload.as_ref().ok_or_else(|| {
            Error::internal_unexpected(format!("'{}' has no hot-reload spec", descriptor.id))
        })?;

        // The target's package name is only needed when the descriptor
        // leaves the command or binary to be derived.
        let package = if hot.build_command.is_none() || hot.binary.is_none() {
            Some(cargo::package_name(&self.platform, descriptor)?)
        } else {
            None
        };

        let command = match &hot.build_command {
            Some(command) => command.clone(),
            None => cargo::default_build_command(package.as_deref().unwrap_or_default()),
        };
        let binary = match &hot.binary {
            Some(binary) => self.platform.resolve_path(binary),
            None => self
                .platform
                .root
                .join(cargo::derived_binary(package.as_deref().unwrap_or_default())),
        };

        Ok(LocalCompileRequest {
            component_id: descriptor.id.clone(),
            command,
            workdir: self.platform.root.clone(),
            triggers: cargo::collect_triggers(&self.platform, hot),
            binary,
            env: descriptor.env.clone().into_iter().collect(),
        })
    }

    fn apply_and_forward(&self, plan: &ComponentPlan) -> Result<ComponentRunResult> {
        let descriptor = &plan.descriptor;

        self.cluster.apply_manifest(&ManifestApplyRequest {
            component_id: descriptor.id.clone(),
            manifest: self.platform.resolve_path(&descriptor.manifest),
            resource: descriptor.resource_name().to_string(),
        })?;

        let pid = if descriptor.port_forwards.is_empty() {
            None
        } else {
            Some(self.cluster.port_forward(&PortForwardRequest {
                component_id: descriptor.id.clone(),
                resource: descriptor.resource_name().to_string(),
                forwards: descriptor.port_forwards.clone(),
            })?)
        };

        Ok(ComponentRunResult::new(descriptor, plan.mode)
            .with_status("deployed")
            .with_image(plan.image.clone())
            .with_port_forward_pid(pid))
    }

    /// Deployed → Syncing → Deployed: the self-loop fired by a later
    /// recompilation. A compilation fully completes before its syncs,
    /// and all syncs complete before the in-place restart.
    fn sync_component(&self, plan: &ComponentPlan) -> Result<ComponentRunResult> {
        let descriptor = &plan.descriptor;
        let Some(hot) = descriptor.hot_reload.clone() else {
            return Ok(ComponentRunResult::new(descriptor, plan.mode)
                .with_status("skipped")
                .with_note("no hot-reload support"));
        };

        self.materialize_config(descriptor)?;
        let compile = self.compile_request(plan)?;

        // A fresh binary alone is not enough to skip: the marker
        // records whether that binary actually reached the workload,
        // so a cycle that failed after compiling is retried.
        let marker = self.sync_marker(&descriptor.id);
        if !cargo::is_stale(&compile.binary, &compile.triggers)
            && sync_is_current(&marker, &compile.binary)
        {
            return Ok(ComponentRunResult::new(descriptor, plan.mode)
                .with_status("skipped")
                .with_note("binary is up to date"));
        }

        self.build.compile(&compile)?;

        let pairs = hot
            .sync
            .iter()
            .map(|pair| (self.platform.resolve_path(&pair.local), pair.remote.clone()))
            .collect();

        self.sync.sync(&SyncRequest {
            component_id: descriptor.id.clone(),
            resource: descriptor.resource_name().to_string(),
            pairs,
            restart_command: hot.restart_command(),
        })?;

        record_sync(&marker, &compile.binary)?;
        Ok(ComponentRunResult::new(descriptor, plan.mode).with_status("synced"))
    }

    /// Per-component marker recording the last successfully delivered
    /// binary, kept under the platform work dir.
    fn sync_marker(&self, component_id: &str) -> PathBuf {
        self.platform.work_dir().join("sync").join(component_id)
    }

    fn tear_down(&self, plan: &ComponentPlan) -> Result<ComponentRunResult> {
        let descriptor = &plan.descriptor;
        self.cluster.delete_manifest(&ManifestApplyRequest {
            component_id: descriptor.id.clone(),
            manifest: self.platform.resolve_path(&descriptor.manifest),
            resource: descriptor.resource_name().to_string(),
        })?;

        Ok(ComponentRunResult::new(descriptor, plan.mode).with_status("deleted"))
    }
}

fn mtime_nanos(path: &Path) -> u128 {
    path.metadata()
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Whether the marker covers the binary as currently built. A missing
/// or stale marker means the last delivery attempt did not complete.
fn sync_is_current(marker: &Path, binary: &Path) -> bool {
    let Ok(recorded) = std::fs::read_to_string(marker) else {
        return false;
    };
    let Ok(recorded) = recorded.trim().parse::<u128>() else {
        return false;
    };
    recorded >= mtime_nanos(binary)
}

fn record_sync(marker: &Path, binary: &Path) -> Result<()> {
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::internal_io(e, Some(format!("create {}", parent.display()))))?;
    }
    std::fs::write(marker, mtime_nanos(binary).to_string())
        .map_err(|e| Error::internal_io(e, Some("write sync marker".to_string())))
}

fn summarize(results: &[ComponentRunResult]) -> RunSummary {
    let failed = results.iter().filter(|r| r.status == "failed").count() as u32;
    let skipped = results.iter().filter(|r| r.status == "skipped").count() as u32;
    RunSummary {
        total: results.len() as u32,
        succeeded: results.len() as u32 - failed - skipped,
        failed,
        skipped,
    }
}
