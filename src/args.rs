//! CLI argument parsing for `cargo lading bump|publish`.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::Config;
use crate::error::{CliError, LadingError};
use crate::graph::WorkspaceGraph;
use crate::{ops, plan, preflight, publish, staging, version};

#[derive(Debug, Parser)]
#[command(name = "cargo")]
#[command(bin_name = "cargo")]
pub enum Command {
    #[command(name = "lading")]
    #[command(about, author, version)]
    Lading(LadingOpt),
}

#[derive(Debug, Clone, clap::Args)]
pub struct LadingOpt {
    #[command(flatten)]
    pub logging: Verbosity,

    #[command(subcommand)]
    pub step: Step,
}

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Step {
    Bump(BumpArgs),
    Publish(PublishArgs),
}

#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = None)]
pub struct Verbosity {
    /// Pass many times for less log output
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    /// Pass many times for more log output
    ///
    /// By default, it'll report info. Passing `-v` one time adds debug
    /// logs, `-vv` adds trace logs.
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

impl Verbosity {
    /// Base level comes from `LADING_LOG_LEVEL` (default `INFO`); each
    /// `-v`/`-q` then nudges it a step, same arithmetic as before.
    pub fn log_level(&self) -> log::Level {
        let base = base_level_from_env();
        let verbosity = base as i8 - (self.quiet as i8) + (self.verbose as i8);

        match verbosity {
            i8::MIN..=0 => log::Level::Error,
            1 => log::Level::Warn,
            2 => log::Level::Info,
            3 => log::Level::Debug,
            4..=i8::MAX => log::Level::Trace,
        }
    }
}

fn base_level_from_env() -> i8 {
    match std::env::var("LADING_LOG_LEVEL") {
        Ok(value) => match value.to_ascii_uppercase().as_str() {
            "CRITICAL" | "ERROR" => 0,
            "WARNING" | "WARN" => 1,
            "INFO" => 2,
            "DEBUG" => 3,
            _ => 2,
        },
        Err(_) => 2,
    }
}

#[derive(Clone, Debug, clap::Args)]
pub struct BumpArgs {
    /// Target version (MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD])
    pub version: String,

    /// Report the changes a bump would make without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace_root: Option<PathBuf>,
}

impl BumpArgs {
    pub fn run(&self) -> Result<(), CliError> {
        let root = resolve_workspace_root(self.workspace_root.as_deref())?;
        let config = Config::load(&root)?;
        let metadata = load_metadata(&root)?;
        let graph = WorkspaceGraph::build(&root, &metadata)?;

        let report = version::bump(&version::BumpRequest {
            graph: &graph,
            target_version: &self.version,
            exclude: &config.bump.exclude,
            documentation_globs: &config.bump.documentation.globs,
            dry_run: self.dry_run,
        })?;

        if report.no_changes_required() {
            let _ = ops::shell::status("Bump", "no changes required");
            return Ok(());
        }

        for path in report.manifests_changed.iter().chain(report.docs_changed.iter()) {
            let _ = ops::shell::status("Bumping", path.display());
        }

        Ok(())
    }
}

#[derive(Clone, Debug, clap::Args)]
pub struct PublishArgs {
    /// Actually publish. Without this flag, runs in dry-run mode.
    #[arg(long)]
    pub live: bool,

    /// Refuse to continue if the working tree is dirty.
    #[arg(long)]
    pub forbid_dirty: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace_root: Option<PathBuf>,
}

impl PublishArgs {
    pub fn run(&self) -> Result<(), CliError> {
        let root = resolve_workspace_root(self.workspace_root.as_deref())?;
        let config = Config::load(&root)?;
        let metadata = load_metadata(&root)?;
        let graph = WorkspaceGraph::build(&root, &metadata)?;

        let publish_plan = plan::plan(
            &graph,
            &config.publish.exclude,
            config.publish.order.as_deref(),
        )?;

        if !publish_plan.unknown_exclusions.is_empty() {
            let _ = ops::shell::warn(format!(
                "publish.exclude names unknown crates: {}",
                publish_plan.unknown_exclusions.join(", ")
            ));
        }

        if publish_plan.publishable.is_empty() {
            let _ = ops::shell::status("Publish", "no crates to publish");
            return Ok(());
        }

        preflight::run(&root, &config.preflight, self.forbid_dirty)?;

        let staging_ctx = staging::prepare(
            &graph,
            &publish_plan,
            config.publish.strip_patches,
            staging::SymlinkPolicy::Preserve,
            true,
        )?;

        let mode = if self.live {
            publish::Mode::Live
        } else {
            publish::Mode::DryRun
        };

        let results = publish::run(&publish_plan, &staging_ctx, config.publish.strip_patches, mode)?;

        for result in &results {
            let label = match result.outcome {
                publish::Outcome::Published => "Published",
                publish::Outcome::DryRun => "Would publish",
                publish::Outcome::AlreadyPublished => "Already published",
            };
            let _ = ops::shell::status(label, &result.name);
        }

        Ok(())
    }
}

/// Resolve the workspace root and export it as `LADING_WORKSPACE_ROOT` so
/// every subprocess this run spawns (`cargo`, `git`, `aux_build` commands)
/// inherits it, per the external-interfaces contract.
fn resolve_workspace_root(explicit: Option<&Path>) -> Result<PathBuf, LadingError> {
    let base = match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().map_err(LadingError::Io)?,
    };
    let root = dunce::canonicalize(&base).map_err(LadingError::Io)?;
    std::env::set_var("LADING_WORKSPACE_ROOT", &root);
    Ok(root)
}

fn load_metadata(root: &Path) -> Result<cargo_metadata::Metadata, LadingError> {
    cargo_metadata::MetadataCommand::new()
        .manifest_path(root.join("Cargo.toml"))
        .exec()
        .map_err(LadingError::CargoMetadata)
}

#[test]
fn verify_app() {
    use clap::CommandFactory;
    Command::command().debug_assert()
}
