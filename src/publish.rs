//! Publish Executor: iterate a [`PublishPlan`] in order, apply per-crate
//! patch stripping, and run `cargo package` + `cargo publish` against the
//! staged tree.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::StripPatches;
use crate::error::LadingError;
use crate::manifest::ManifestDocument;
use crate::ops::cmd;
use crate::plan::PublishPlan;
use crate::staging::StagingContext;

const ALREADY_PUBLISHED_MARKER: &str = "already uploaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DryRun,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published,
    DryRun,
    AlreadyPublished,
}

#[derive(Debug, Clone)]
pub struct CrateResult {
    pub name: String,
    pub outcome: Outcome,
}

/// Publish every crate in `plan.publishable`, in order, against the staged
/// tree rooted at `staging.path()`.
pub fn run(
    plan: &PublishPlan,
    staging: &StagingContext,
    strip_patches: StripPatches,
    mode: Mode,
) -> Result<Vec<CrateResult>, LadingError> {
    let mut results = Vec::with_capacity(plan.publishable.len());

    for name in &plan.publishable {
        let crate_dir = find_staged_crate_dir(staging.path(), name)?;

        if strip_patches == StripPatches::PerCrate {
            strip_single_patch_entry(&staging.path().join("Cargo.toml"), name)?;
        }

        run_step(&crate_dir, "package", &["package".to_string()])?;

        let mut publish_argv = vec!["publish".to_string()];
        if mode == Mode::DryRun {
            publish_argv.push("--dry-run".to_string());
        }

        let output = cmd::run("cargo", &publish_argv, &crate_dir, &BTreeMap::new())?;
        if output.success() {
            results.push(CrateResult {
                name: name.clone(),
                outcome: if mode == Mode::DryRun {
                    Outcome::DryRun
                } else {
                    Outcome::Published
                },
            });
            continue;
        }

        if output.stderr.contains(ALREADY_PUBLISHED_MARKER) {
            let _ = crate::ops::shell::warn(format!("{name}: already published, skipping"));
            results.push(CrateResult {
                name: name.clone(),
                outcome: Outcome::AlreadyPublished,
            });
            continue;
        }

        return Err(LadingError::PublishStep {
            krate: name.clone(),
            stage: "publish".to_string(),
            exit_code: output.exit_code,
            stderr_tail: output.stderr,
        });
    }

    Ok(results)
}

fn run_step(cwd: &Path, stage: &str, argv: &[String]) -> Result<(), LadingError> {
    let output = cmd::run("cargo", argv, cwd, &BTreeMap::new())?;
    if output.success() {
        return Ok(());
    }
    Err(LadingError::PublishStep {
        krate: cwd.display().to_string(),
        stage: stage.to_string(),
        exit_code: output.exit_code,
        stderr_tail: output.stderr,
    })
}

fn find_staged_crate_dir(staging_root: &Path, name: &str) -> Result<std::path::PathBuf, LadingError> {
    for entry in walkdir::WalkDir::new(staging_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == "Cargo.toml")
    {
        let Ok(doc) = ManifestDocument::load(entry.path()) else {
            continue;
        };
        if doc.get("package.name").and_then(|i| i.as_str()) == Some(name) {
            return Ok(entry
                .path()
                .parent()
                .expect("manifest path has a parent directory")
                .to_path_buf());
        }
    }
    Err(LadingError::PublishPlan(format!(
        "could not locate staged manifest for `{name}`"
    )))
}

fn strip_single_patch_entry(staged_manifest: &Path, name: &str) -> Result<(), LadingError> {
    if !staged_manifest.exists() {
        return Ok(());
    }
    let mut doc = ManifestDocument::load(staged_manifest)?;
    doc.remove(&format!("patch.crates-io.{name}"));
    doc.save()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn already_published_marker_matches_cargo_phrasing() {
        let stderr = "error: failed to publish to registry at https://crates.io\n\ncaused by:\n  crate version `0.1.0` is already uploaded\n";
        assert!(stderr.contains(ALREADY_PUBLISHED_MARKER));
        let stderr_unrelated = "error: failed to verify package tarball\n";
        assert!(!stderr_unrelated.contains(ALREADY_PUBLISHED_MARKER));
    }
}
