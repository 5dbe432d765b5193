//! Staging Director: clones the workspace into a scratch directory so the
//! Publish Executor and Pre-flight Runner can mutate a throwaway copy
//! (patch-table rewriting, README projection) without touching the live
//! tree.

use std::path::{Path, PathBuf};

use crate::config::StripPatches;
use crate::error::LadingError;
use crate::graph::WorkspaceGraph;
use crate::manifest::ManifestDocument;
use crate::plan::PublishPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkPolicy {
    Preserve,
    Dereference,
}

/// An RAII handle over the staging root: dropping it removes the directory
/// when `cleanup` is enabled, matching the `using_temp`-style scoped
/// staging pattern. Call [`StagingContext::detach`] to keep the directory
/// around for inspection instead.
///
/// `dir` always holds the live [`tempfile::TempDir`] guard, regardless of
/// `cleanup` — only `Drop` (via `into_path`) decides whether it actually
/// deletes the directory. Only moving the guard into this struct on the
/// `cleanup = true` path (leaving it as a bare local otherwise) would drop
/// and delete the staging root the instant `prepare` returns, before the
/// caller gets to inspect it.
pub struct StagingContext {
    dir: Option<tempfile::TempDir>,
    path: PathBuf,
    cleanup: bool,
}

impl StagingContext {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the staging root from being removed when this handle drops,
    /// returning its path.
    pub fn detach(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let _ = dir.into_path();
        }
        self.path.clone()
    }
}

impl Drop for StagingContext {
    fn drop(&mut self) {
        if !self.cleanup {
            if let Some(dir) = self.dir.take() {
                // `into_path` consumes the guard without deleting the
                // directory, leaving it on disk for inspection.
                let _ = dir.into_path();
            }
        }
    }
}

/// Create the staging root, copy the workspace into it, strip
/// `[patch.crates-io]` per `strip_patches`, and project the root README
/// into every crate that inherits it.
pub fn prepare(
    graph: &WorkspaceGraph,
    plan: &PublishPlan,
    strip_patches: StripPatches,
    symlink_policy: SymlinkPolicy,
    cleanup: bool,
) -> Result<StagingContext, LadingError> {
    let tempdir = tempfile::Builder::new()
        .prefix("lading-stage-")
        .tempdir()
        .map_err(LadingError::Io)?;
    let staging_root = tempdir.path().to_path_buf();

    copy_tree(&graph.root, &staging_root, symlink_policy)?;

    strip_patch_table(&staging_root.join("Cargo.toml"), strip_patches, plan)?;

    project_readmes(graph, &staging_root)?;

    Ok(StagingContext {
        dir: Some(tempdir),
        path: staging_root,
        cleanup,
    })
}

fn copy_tree(src: &Path, dst: &Path, symlink_policy: SymlinkPolicy) -> Result<(), LadingError> {
    for entry in walkdir::WalkDir::new(src).into_iter() {
        let entry = entry.map_err(|e| {
            LadingError::Staging(format!("walking `{}`: {e}", src.display()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under src");
        let target = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(LadingError::Io)?;
        } else if file_type.is_symlink() {
            match symlink_policy {
                SymlinkPolicy::Dereference => {
                    std::fs::copy(entry.path(), &target).map_err(LadingError::Io)?;
                }
                SymlinkPolicy::Preserve => {
                    let link_target = std::fs::read_link(entry.path()).map_err(LadingError::Io)?;
                    #[cfg(unix)]
                    std::os::unix::fs::symlink(&link_target, &target).map_err(LadingError::Io)?;
                    #[cfg(not(unix))]
                    std::fs::copy(entry.path(), &target).map_err(LadingError::Io)?;
                }
            }
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(LadingError::Io)?;
            }
            std::fs::copy(entry.path(), &target).map_err(LadingError::Io)?;
        }
    }
    Ok(())
}

fn strip_patch_table(
    staged_manifest: &Path,
    strategy: StripPatches,
    plan: &PublishPlan,
) -> Result<(), LadingError> {
    if strategy == StripPatches::None || !staged_manifest.exists() {
        return Ok(());
    }

    let mut doc = ManifestDocument::load(staged_manifest)?;

    match strategy {
        StripPatches::All => {
            doc.remove("patch.crates-io");
        }
        StripPatches::PerCrate => {
            for name in &plan.publishable {
                doc.remove(&format!("patch.crates-io.{name}"));
            }
        }
        StripPatches::None => unreachable!(),
    }

    remove_patch_table_if_empty(&mut doc);
    doc.save()
}

/// After stripping entries, drop an orphaned empty `[patch.crates-io]` (and
/// `[patch]` if it too is left empty).
fn remove_patch_table_if_empty(doc: &mut ManifestDocument) {
    let crates_io_empty = doc
        .get("patch.crates-io")
        .and_then(|item| item.as_table_like())
        .map(|t| t.is_empty())
        .unwrap_or(false);
    if crates_io_empty {
        doc.remove("patch.crates-io");
    }
    let patch_empty = doc
        .get("patch")
        .and_then(|item| item.as_table_like())
        .map(|t| t.is_empty())
        .unwrap_or(false);
    if patch_empty {
        doc.remove("patch");
    }
}

fn project_readmes(graph: &WorkspaceGraph, staging_root: &Path) -> Result<(), LadingError> {
    let inheriting: Vec<&crate::graph::Crate> = graph
        .crates
        .iter()
        .filter(|c| c.readme_inherits_workspace)
        .collect();
    if inheriting.is_empty() {
        return Ok(());
    }

    let root_readme = graph.root.join("README.md");
    if !root_readme.exists() {
        return Err(LadingError::Staging(
            "Workspace README.md is required by crates that set readme.workspace = true"
                .to_string(),
        ));
    }

    for krate in inheriting {
        let crate_dir = krate
            .manifest_path
            .parent()
            .expect("manifest path has a parent directory");
        let relative = crate_dir
            .strip_prefix(&graph.root)
            .expect("crate directory is under the workspace root");
        let staged_readme = staging_root.join(relative).join("README.md");
        std::fs::copy(&root_readme, &staged_readme).map_err(LadingError::Io)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::Crate;

    fn fixture_graph(root: &Path, readme_inherits: bool) -> WorkspaceGraph {
        WorkspaceGraph {
            root: root.to_path_buf(),
            crates: vec![Crate {
                name: "alpha".into(),
                version: "0.1.0".into(),
                manifest_path: root.join("crates/alpha/Cargo.toml"),
                publishable: true,
                readme_inherits_workspace: readme_inherits,
                internal_dependencies: vec![],
            }],
        }
    }

    #[test]
    fn strip_all_removes_patch_table() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("crates/alpha")).unwrap();
        std::fs::write(
            root.join("Cargo.toml"),
            "[workspace]\nmembers = [\"crates/alpha\"]\n\n[patch.crates-io]\nalpha = { path = \"./crates/alpha\" }\n",
        )
        .unwrap();
        std::fs::write(
            root.join("crates/alpha/Cargo.toml"),
            "[package]\nname = \"alpha\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();

        let graph = fixture_graph(root, false);
        let plan = PublishPlan {
            publishable: vec!["alpha".to_string()],
            ..Default::default()
        };

        let ctx = prepare(&graph, &plan, StripPatches::All, SymlinkPolicy::Preserve, true).unwrap();
        let staged_manifest = std::fs::read_to_string(ctx.path().join("Cargo.toml")).unwrap();
        assert!(!staged_manifest.contains("patch"));

        temp.close().unwrap();
    }

    #[test]
    fn cleanup_false_leaves_staging_root_on_disk_after_drop() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("crates/alpha")).unwrap();
        std::fs::write(
            root.join("Cargo.toml"),
            "[workspace]\nmembers = [\"crates/alpha\"]\n",
        )
        .unwrap();
        std::fs::write(
            root.join("crates/alpha/Cargo.toml"),
            "[package]\nname = \"alpha\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();

        let graph = fixture_graph(root, false);
        let plan = PublishPlan {
            publishable: vec!["alpha".to_string()],
            ..Default::default()
        };

        let ctx =
            prepare(&graph, &plan, StripPatches::None, SymlinkPolicy::Preserve, false).unwrap();
        let staging_root = ctx.path().to_path_buf();
        assert!(staging_root.join("Cargo.toml").exists());

        drop(ctx);

        assert!(
            staging_root.join("Cargo.toml").exists(),
            "cleanup=false must leave the staging root on disk past prepare() returning and the \
             context dropping"
        );

        std::fs::remove_dir_all(&staging_root).unwrap();
        temp.close().unwrap();
    }

    #[test]
    fn cleanup_true_removes_staging_root_on_drop() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("crates/alpha")).unwrap();
        std::fs::write(
            root.join("Cargo.toml"),
            "[workspace]\nmembers = [\"crates/alpha\"]\n",
        )
        .unwrap();
        std::fs::write(
            root.join("crates/alpha/Cargo.toml"),
            "[package]\nname = \"alpha\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();

        let graph = fixture_graph(root, false);
        let plan = PublishPlan {
            publishable: vec!["alpha".to_string()],
            ..Default::default()
        };

        let ctx =
            prepare(&graph, &plan, StripPatches::None, SymlinkPolicy::Preserve, true).unwrap();
        let staging_root = ctx.path().to_path_buf();
        assert!(staging_root.exists());

        drop(ctx);

        assert!(!staging_root.exists());
        temp.close().unwrap();
    }

    #[test]
    fn readme_projection_requires_root_readme() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("crates/alpha")).unwrap();
        std::fs::write(
            root.join("Cargo.toml"),
            "[workspace]\nmembers = [\"crates/alpha\"]\n",
        )
        .unwrap();
        std::fs::write(
            root.join("crates/alpha/Cargo.toml"),
            "[package]\nname = \"alpha\"\nversion = \"0.1.0\"\n\n[package.readme]\nworkspace = true\n",
        )
        .unwrap();

        let graph = fixture_graph(root, true);
        let plan = PublishPlan {
            publishable: vec!["alpha".to_string()],
            ..Default::default()
        };

        let err = prepare(&graph, &plan, StripPatches::None, SymlinkPolicy::Preserve, true)
            .unwrap_err();
        match err {
            LadingError::Staging(msg) => {
                assert!(msg.starts_with("Workspace README.md is required"))
            }
            other => panic!("expected Staging error, got {other:?}"),
        }

        temp.close().unwrap();
    }

    #[test]
    fn readme_projection_copies_into_staged_crate() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("crates/alpha")).unwrap();
        std::fs::write(root.join("README.md"), "# Workspace\n").unwrap();
        std::fs::write(
            root.join("Cargo.toml"),
            "[workspace]\nmembers = [\"crates/alpha\"]\n",
        )
        .unwrap();
        std::fs::write(
            root.join("crates/alpha/Cargo.toml"),
            "[package]\nname = \"alpha\"\nversion = \"0.1.0\"\n\n[package.readme]\nworkspace = true\n",
        )
        .unwrap();

        let graph = fixture_graph(root, true);
        let plan = PublishPlan {
            publishable: vec!["alpha".to_string()],
            ..Default::default()
        };

        let ctx = prepare(&graph, &plan, StripPatches::None, SymlinkPolicy::Preserve, true).unwrap();
        let staged_readme =
            std::fs::read_to_string(ctx.path().join("crates/alpha/README.md")).unwrap();
        assert_eq!(staged_readme, "# Workspace\n");

        temp.close().unwrap();
    }
}
