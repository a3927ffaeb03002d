use glob_match::glob_match;

use crate::core::component::ComponentDescriptor;

/// Build-context ignore filter for standard from-source builds.
///
/// Excludes the whole platform tree, then re-admits only the
/// component's own source tree, its declared shared paths, and its
/// dockerfile. Unrelated component changes therefore never invalidate
/// this component's build cache.
#[derive(Debug, Clone)]
pub struct ContextFilter {
    allowed: Vec<String>,
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_end_matches('/').to_string()
}

impl ContextFilter {
    pub fn for_component(descriptor: &ComponentDescriptor) -> Self {
        let mut allowed = vec![normalize(&descriptor.path)];
        for shared in &descriptor.shared_paths {
            let entry = normalize(shared);
            if !allowed.contains(&entry) {
                allowed.push(entry);
            }
        }
        let dockerfile = normalize(&descriptor.dockerfile_path());
        let covered = allowed
            .iter()
            .any(|a| dockerfile == *a || dockerfile.starts_with(&format!("{a}/")));
        if !covered {
            allowed.push(dockerfile);
        }
        Self { allowed }
    }

    /// Dockerignore line set: exclude everything, re-include the
    /// allowed paths.
    pub fn dockerignore_lines(&self) -> Vec<String> {
        let mut lines = vec!["*".to_string()];
        for entry in &self.allowed {
            lines.push(format!("!{entry}"));
        }
        lines
    }

    pub fn render(&self) -> String {
        let mut out = String::from("# generated by bringup, do not edit\n");
        for line in self.dockerignore_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Whether a path relative to the build context survives the
    /// filter. Allowed entries match themselves, their subtrees, and
    /// glob patterns (including subtrees of glob-matched directories).
    pub fn allows(&self, rel_path: &str) -> bool {
        let path = normalize(rel_path);
        self.allowed.iter().any(|entry| {
            path == *entry
                || path.starts_with(&format!("{entry}/"))
                || glob_match(entry, &path)
                || glob_match(&format!("{entry}/**"), &path)
        })
    }
}
