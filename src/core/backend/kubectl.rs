use std::io::Write;
use std::process::{Command, Stdio};

use serde_json_path::JsonPath;

use crate::core::backend::{
    ClusterBackend, ManifestApplyRequest, PortForwardRequest, SecretApplyRequest, SyncBackend,
    SyncRequest,
};
use crate::core::exec;
use crate::core::manifest::Platform;
use crate::core::shell;
use crate::core::{Error, Result};

/// Cluster and sync backend shelling out to `kubectl`, scoped to the
/// platform's configured namespace and context.
pub struct KubectlBackend {
    namespace: Option<String>,
    context: Option<String>,
}

impl KubectlBackend {
    pub fn new(platform: &Platform) -> Self {
        let settings = platform.settings();
        Self {
            namespace: settings.namespace.clone(),
            context: settings.kube_context.clone(),
        }
    }

    fn base_command(&self) -> String {
        let mut cmd = String::from("kubectl");
        if let Some(context) = &self.context {
            cmd.push_str(&format!(" --context {}", shell::quote_arg(context)));
        }
        if let Some(namespace) = &self.namespace {
            cmd.push_str(&format!(" --namespace {}", shell::quote_arg(namespace)));
        }
        cmd
    }

    /// Name of a running pod for the workload, looked up by the
    /// `app=<resource>` label.
    fn ready_pod(&self, component_id: &str, resource: &str) -> Result<String> {
        let selector = format!("app={resource}");
        let command = format!(
            "{} get pods -l {} -o json",
            self.base_command(),
            shell::quote_arg(&selector)
        );

        let output = exec::run_shell(&command, None, &[])?;
        if !output.success {
            return Err(Error::sync_pod_not_found(component_id, &selector)
                .with_hint(exec::error_text(&output.stderr, &output.stdout)));
        }

        let pods: serde_json::Value = serde_json::from_str(&output.stdout)
            .map_err(|e| Error::internal_json(e, Some("parse kubectl pod list".to_string())))?;

        let path = JsonPath::parse("$.items[?(@.status.phase == 'Running')].metadata.name")
            .map_err(|e| Error::internal_unexpected(format!("pod query: {e}")))?;

        path.query(&pods)
            .first()
            .and_then(|name| name.as_str())
            .map(|name| name.to_string())
            .ok_or_else(|| Error::sync_pod_not_found(component_id, &selector))
    }

    /// Pod reference for `kubectl cp`, namespace-qualified when one is
    /// configured.
    fn pod_ref(&self, pod: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}/{pod}"),
            None => pod.to_string(),
        }
    }
}

impl ClusterBackend for KubectlBackend {
    /// Secret manifests never touch disk; they are piped straight into
    /// `kubectl apply -f -`.
    fn apply_secret(&self, req: &SecretApplyRequest) -> Result<()> {
        let fail = |detail: String| Error::secret_bootstrap_failed(&req.name, detail);

        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.extend(["--context".to_string(), context.clone()]);
        }
        if let Some(namespace) = &self.namespace {
            args.extend(["--namespace".to_string(), namespace.clone()]);
        }
        args.extend(["apply".to_string(), "-f".to_string(), "-".to_string()]);

        let mut child = Command::new("kubectl")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(format!("spawn kubectl: {e}")))?;

        child
            .stdin
            .take()
            .ok_or_else(|| fail("kubectl stdin unavailable".to_string()))?
            .write_all(req.manifest_yaml.as_bytes())
            .map_err(|e| fail(format!("write manifest: {e}")))?;

        let output = child
            .wait_with_output()
            .map_err(|e| fail(format!("wait for kubectl: {e}")))?;

        if !output.status.success() {
            return Err(fail(exec::error_text(
                &String::from_utf8_lossy(&output.stderr),
                &String::from_utf8_lossy(&output.stdout),
            )));
        }
        Ok(())
    }

    fn apply_manifest(&self, req: &ManifestApplyRequest) -> Result<()> {
        crate::log_status!("deploy", "{}: applying {}", req.component_id, req.manifest.display());

        let command = format!(
            "{} apply -f {}",
            self.base_command(),
            shell::quote_path(&req.manifest.to_string_lossy())
        );
        let output = exec::run_shell(&command, None, &[])?;
        if !output.success {
            return Err(Error::deploy_apply_failed(
                &req.component_id,
                req.manifest.display().to_string(),
                exec::error_text(&output.stderr, &output.stdout),
            ));
        }
        Ok(())
    }

    fn delete_manifest(&self, req: &ManifestApplyRequest) -> Result<()> {
        crate::log_status!("down", "{}: deleting {}", req.component_id, req.manifest.display());

        let command = format!(
            "{} delete -f {} --ignore-not-found",
            self.base_command(),
            shell::quote_path(&req.manifest.to_string_lossy())
        );
        let output = exec::run_shell(&command, None, &[])?;
        if !output.success {
            return Err(Error::deploy_apply_failed(
                &req.component_id,
                req.manifest.display().to_string(),
                exec::error_text(&output.stderr, &output.stdout),
            ));
        }
        Ok(())
    }

    /// All of a component's forwards ride one detached `kubectl
    /// port-forward` child, which outlives this process.
    fn port_forward(&self, req: &PortForwardRequest) -> Result<u32> {
        let forwards: Vec<String> = req.forwards.iter().map(|f| f.to_string()).collect();
        crate::log_status!(
            "deploy",
            "{}: forwarding {}",
            req.component_id,
            forwards.join(", ")
        );

        let command = format!(
            "{} port-forward deploy/{} {}",
            self.base_command(),
            shell::quote_arg(&req.resource),
            forwards.join(" ")
        );

        exec::spawn_shell_detached(&command).map_err(|e| {
            Error::deploy_port_forward_failed(
                &req.component_id,
                &req.resource,
                forwards.join(", "),
                e.to_string(),
            )
        })
    }
}

impl SyncBackend for KubectlBackend {
    /// Patch the already-running workload: copy every declared pair
    /// into the pod (staged copy, then an atomic in-container move),
    /// then restart the process in place. The pod is never recreated.
    fn sync(&self, req: &SyncRequest) -> Result<()> {
        let pod = self.ready_pod(&req.component_id, &req.resource)?;
        let pod_ref = self.pod_ref(&pod);

        for (local, remote) in &req.pairs {
            crate::log_status!("sync", "{}: {} -> {}", req.component_id, local.display(), remote);

            let staged = format!("{remote}.bringup-sync");
            let copy_fail = |detail: String| {
                Error::sync_copy_failed(
                    &req.component_id,
                    local.display().to_string(),
                    remote,
                    detail,
                )
            };

            let cp_command = format!(
                "{} cp {} {}",
                self.base_command(),
                shell::quote_path(&local.to_string_lossy()),
                shell::quote_arg(&format!("{pod_ref}:{staged}"))
            );
            let output = exec::run_shell(&cp_command, None, &[])?;
            if !output.success {
                return Err(copy_fail(exec::error_text(&output.stderr, &output.stdout)));
            }

            // A running binary cannot be overwritten in place; move
            // the staged copy over it instead.
            let mv_command = format!(
                "{} exec {} -- mv -f {} {}",
                self.base_command(),
                shell::quote_arg(&pod),
                shell::quote_path(&staged),
                shell::quote_path(remote)
            );
            let output = exec::run_shell(&mv_command, None, &[])?;
            if !output.success {
                return Err(copy_fail(exec::error_text(&output.stderr, &output.stdout)));
            }
        }

        let restart = shell::quote_args(&req.restart_command);
        crate::log_status!("sync", "{}: restarting in place", req.component_id);

        let restart_command = format!(
            "{} exec {} -- {}",
            self.base_command(),
            shell::quote_arg(&pod),
            restart
        );
        let output = exec::run_shell(&restart_command, None, &[])?;
        if !output.success {
            return Err(Error::sync_restart_failed(
                &req.component_id,
                req.restart_command.join(" "),
                exec::error_text(&output.stderr, &output.stdout),
            ));
        }

        Ok(())
    }
}
