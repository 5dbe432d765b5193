//! Workspace Graph Builder: turns a `cargo metadata` result plus per-crate
//! manifest documents into the immutable [`WorkspaceGraph`] every other
//! component reads from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cargo_metadata::{DependencyKind, Metadata};

use crate::error::LadingError;
use crate::manifest::ManifestDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Normal,
    Dev,
    Build,
}

impl Section {
    fn from_dependency_kind(kind: DependencyKind) -> Self {
        match kind {
            DependencyKind::Development => Section::Dev,
            DependencyKind::Build => Section::Build,
            DependencyKind::Normal | DependencyKind::Unknown => Section::Normal,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Section::Normal => "dependencies",
            Section::Dev => "dev-dependencies",
            Section::Build => "build-dependencies",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InternalDep {
    pub target_name: String,
    pub manifest_key: String,
    pub section: Section,
    pub requirement: Option<String>,
    pub kind_is_dev_only: bool,
}

#[derive(Debug, Clone)]
pub struct Crate {
    pub name: String,
    pub version: String,
    pub manifest_path: PathBuf,
    pub publishable: bool,
    pub readme_inherits_workspace: bool,
    pub internal_dependencies: Vec<InternalDep>,
}

#[derive(Debug)]
pub struct WorkspaceGraph {
    pub root: PathBuf,
    pub crates: Vec<Crate>,
}

impl WorkspaceGraph {
    pub fn crate_by_name(&self, name: &str) -> Option<&Crate> {
        self.crates.iter().find(|c| c.name == name)
    }

    /// Build a graph from an already-parsed `cargo metadata` result. Each
    /// member's manifest is re-loaded through the Manifest Document Store
    /// so `publishable`/`readme_inherits_workspace` reflect the raw TOML
    /// (`cargo_metadata` normalizes some of this away).
    pub fn build(root: &Path, metadata: &Metadata) -> Result<Self, LadingError> {
        let root = dunce::canonicalize(root).map_err(LadingError::Io)?;

        let members: Vec<&cargo_metadata::Package> = metadata
            .packages
            .iter()
            .filter(|pkg| metadata.workspace_members.contains(&pkg.id))
            .filter(|pkg| {
                dunce::canonicalize(pkg.manifest_path.as_std_path())
                    .map(|p| p.starts_with(&root))
                    .unwrap_or(false)
            })
            .collect();

        let mut seen_names: BTreeMap<&str, &cargo_metadata::PackageId> = BTreeMap::new();
        for pkg in &members {
            if let Some(prior) = seen_names.insert(pkg.name.as_str(), &pkg.id) {
                if prior != &pkg.id {
                    return Err(LadingError::WorkspaceInvariant(format!(
                        "duplicate crate name `{}` in workspace",
                        pkg.name
                    )));
                }
            }
        }

        let member_names: std::collections::BTreeSet<&str> =
            members.iter().map(|p| p.name.as_str()).collect();

        let mut crates = Vec::with_capacity(members.len());
        for pkg in &members {
            let manifest_path = pkg.manifest_path.as_std_path().to_path_buf();
            let doc = ManifestDocument::load(&manifest_path)?;

            let publishable = doc
                .get("package.publish")
                .map(|item| match item {
                    toml_edit::Item::Value(toml_edit::Value::Boolean(b)) => *b.value(),
                    toml_edit::Item::Value(toml_edit::Value::Array(arr)) => !arr.is_empty(),
                    _ => true,
                })
                .unwrap_or(true);

            let readme_inherits_workspace = doc
                .get("package.readme.workspace")
                .and_then(|item| item.as_bool())
                .unwrap_or(false);

            let mut internal_dependencies = Vec::new();
            for dep in &pkg.dependencies {
                let Some(dep_path) = dep.path.as_ref() else {
                    continue;
                };
                let Ok(dep_canon) = dunce::canonicalize(dep_path.as_std_path()) else {
                    continue;
                };
                let Some(target_pkg) = members.iter().find(|candidate| {
                    dunce::canonicalize(
                        candidate
                            .manifest_path
                            .as_std_path()
                            .parent()
                            .expect("manifest path has a parent directory"),
                    )
                    .map(|p| p == dep_canon)
                    .unwrap_or(false)
                }) else {
                    continue;
                };
                if !member_names.contains(target_pkg.name.as_str()) {
                    return Err(LadingError::WorkspaceInvariant(format!(
                        "`{}` depends on `{}` outside the workspace",
                        pkg.name, target_pkg.name
                    )));
                }

                let manifest_key = dep.rename.clone().unwrap_or_else(|| dep.name.clone());
                let section = Section::from_dependency_kind(dep.kind);
                let requirement = if dep.req.comparators.is_empty() {
                    None
                } else {
                    Some(dep.req.to_string())
                };

                internal_dependencies.push(InternalDep {
                    target_name: target_pkg.name.clone(),
                    manifest_key,
                    section,
                    requirement,
                    kind_is_dev_only: false,
                });
            }

            // kind_is_dev_only: true when a (target, any non-dev edge) pair
            // does not also exist for the same target.
            let non_dev_targets: std::collections::BTreeSet<&str> = internal_dependencies
                .iter()
                .filter(|d| d.section != Section::Dev)
                .map(|d| d.target_name.as_str())
                .collect();
            for dep in &mut internal_dependencies {
                if dep.section == Section::Dev && !non_dev_targets.contains(dep.target_name.as_str())
                {
                    dep.kind_is_dev_only = true;
                }
            }

            crates.push(Crate {
                name: pkg.name.clone(),
                version: pkg.version.to_string(),
                manifest_path,
                publishable,
                readme_inherits_workspace,
                internal_dependencies,
            });
        }

        crates.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(WorkspaceGraph { root, crates })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn section_key_names() {
        assert_eq!(Section::Normal.key(), "dependencies");
        assert_eq!(Section::Dev.key(), "dev-dependencies");
        assert_eq!(Section::Build.key(), "build-dependencies");
    }

    #[test]
    fn dev_only_classification_is_per_target() {
        // A crate depending on `alpha` normally and on `beta` only as a dev
        // dependency: `alpha` edge is not dev-only, `beta` edge is.
        let mut deps = vec![
            InternalDep {
                target_name: "alpha".into(),
                manifest_key: "alpha".into(),
                section: Section::Normal,
                requirement: Some("^0.1.0".into()),
                kind_is_dev_only: false,
            },
            InternalDep {
                target_name: "beta".into(),
                manifest_key: "beta".into(),
                section: Section::Dev,
                requirement: Some("^0.1.0".into()),
                kind_is_dev_only: false,
            },
        ];
        let non_dev_targets: std::collections::BTreeSet<&str> = deps
            .iter()
            .filter(|d| d.section != Section::Dev)
            .map(|d| d.target_name.as_str())
            .collect();
        for dep in &mut deps {
            if dep.section == Section::Dev && !non_dev_targets.contains(dep.target_name.as_str()) {
                dep.kind_is_dev_only = true;
            }
        }
        assert!(!deps[0].kind_is_dev_only);
        assert!(deps[1].kind_is_dev_only);
    }
}
