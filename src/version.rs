//! Version Engine: propagate a target version across workspace manifests,
//! per-crate manifests, internal dependency requirements, and TOML fences
//! embedded in documentation.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSetBuilder};

use crate::error::LadingError;
use crate::graph::WorkspaceGraph;
use crate::manifest::ManifestDocument;

/// Validates `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]` and returns the
/// validated string unchanged (semver's own `Display` impl is
/// normalization-free for valid input, so the caller's literal is what gets
/// written everywhere).
pub fn validate_version(v: &str) -> Result<String, LadingError> {
    semver::Version::parse(v)
        .map(|_| v.to_string())
        .map_err(|_| LadingError::InvalidVersion(v.to_string()))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    pub manifests_changed: Vec<PathBuf>,
    pub docs_changed: Vec<PathBuf>,
}

impl ChangeReport {
    pub fn no_changes_required(&self) -> bool {
        self.manifests_changed.is_empty() && self.docs_changed.is_empty()
    }
}

pub struct BumpRequest<'a> {
    pub graph: &'a WorkspaceGraph,
    pub target_version: &'a str,
    pub exclude: &'a [String],
    pub documentation_globs: &'a [String],
    pub dry_run: bool,
}

/// Apply a version bump described by `request`, returning the set of files
/// that were (or, in dry-run mode, would have been) changed.
pub fn bump(request: &BumpRequest) -> Result<ChangeReport, LadingError> {
    let target = validate_version(request.target_version)?;
    let bumped: std::collections::BTreeSet<&str> = request
        .graph
        .crates
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| !request.exclude.iter().any(|e| e == name))
        .collect();

    let mut report = ChangeReport::default();

    let workspace_manifest_path = request.graph.root.join("Cargo.toml");
    if workspace_manifest_path.exists() {
        let mut doc = ManifestDocument::load(&workspace_manifest_path)?;
        let mut changed = false;
        changed |= set_if_present(&mut doc, "workspace.package.version", &target);
        changed |= set_if_present(&mut doc, "package.version", &target);
        if changed {
            report.manifests_changed.push(workspace_manifest_path.clone());
            if !request.dry_run {
                doc.save()?;
            }
        }
    }

    for krate in &request.graph.crates {
        let excluded = request.exclude.iter().any(|e| e == &krate.name);
        let mut doc = ManifestDocument::load(&krate.manifest_path)?;
        let mut changed = false;

        if !excluded && krate.manifest_path != workspace_manifest_path {
            changed |= set_if_present(&mut doc, "package.version", &target);
        }

        for dep in &krate.internal_dependencies {
            if !bumped.contains(dep.target_name.as_str()) {
                continue;
            }
            let section_table = doc
                .as_table_mut()
                .entry(dep.section.key())
                .or_insert_with(|| toml_edit::Item::Table(toml_edit::Table::new()))
                .as_table_mut();
            if let Some(section_table) = section_table {
                changed |= ManifestDocument::update_requirement(
                    section_table,
                    &dep.manifest_key,
                    &target,
                );
            }
        }

        if changed {
            report.manifests_changed.push(krate.manifest_path.clone());
            if !request.dry_run {
                doc.save()?;
            }
        }
    }

    report.manifests_changed.sort();
    report.manifests_changed.dedup();

    for doc_path in resolve_globs(&request.graph.root, request.documentation_globs)? {
        let member_names: std::collections::BTreeSet<&str> =
            request.graph.crates.iter().map(|c| c.name.as_str()).collect();
        if let Some(rewritten) =
            rewrite_markdown_fences(&doc_path, &target, &bumped, &member_names)?
        {
            report.docs_changed.push(doc_path.clone());
            if !request.dry_run {
                std::fs::write(&doc_path, rewritten).map_err(LadingError::Io)?;
            }
        }
    }

    Ok(report)
}

fn set_if_present(doc: &mut ManifestDocument, dotted_path: &str, target: &str) -> bool {
    match doc.get(dotted_path).and_then(|i| i.as_str()) {
        Some(existing) if existing == target => false,
        Some(_) => {
            doc.set(dotted_path, toml_edit::value(target));
            true
        }
        None => false,
    }
}

fn resolve_globs(root: &Path, globs: &[String]) -> Result<Vec<PathBuf>, LadingError> {
    if globs.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in globs {
        let glob = Glob::new(pattern)
            .map_err(|e| LadingError::Config(format!("invalid glob `{pattern}`: {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| LadingError::Config(format!("invalid glob set: {e}")))?;

    let mut matches = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if set.is_match(relative) {
            matches.push(entry.path().to_path_buf());
        }
    }
    matches.sort();
    Ok(matches)
}

/// Locate fenced code blocks whose info string (trimmed, lower-cased)
/// begins with `toml`, parse each fence body, apply the same version
/// rewrites the manifests get, and re-serialize in place. Returns `None`
/// when no fence needed a change.
fn rewrite_markdown_fences(
    path: &Path,
    target: &str,
    bumped: &std::collections::BTreeSet<&str>,
    member_names: &std::collections::BTreeSet<&str>,
) -> Result<Option<String>, LadingError> {
    let text = std::fs::read_to_string(path).map_err(LadingError::Io)?;
    let lines: Vec<&str> = text.lines().collect();

    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        let fence_char = if trimmed.starts_with("```") {
            Some('`')
        } else if trimmed.starts_with("~~~") {
            Some('~')
        } else {
            None
        };

        let Some(fence_char) = fence_char else {
            out.push_str(line);
            out.push('\n');
            i += 1;
            continue;
        };

        let fence_len = trimmed.chars().take_while(|&c| c == fence_char).count();
        let info = trimmed[fence_len..].trim().to_ascii_lowercase();

        if !info.starts_with("toml") {
            out.push_str(line);
            out.push('\n');
            i += 1;
            continue;
        }

        out.push_str(line);
        out.push('\n');
        i += 1;

        let body_start = i;
        while i < lines.len() && !is_closing_fence(lines[i], fence_char, fence_len) {
            i += 1;
        }
        let body: Vec<&str> = lines[body_start..i.min(lines.len())].to_vec();
        let body_text = body.join("\n");

        match rewrite_fence_body(&body_text, target, bumped, member_names) {
            Some(rewritten) => {
                changed = true;
                out.push_str(&rewritten);
                if !rewritten.is_empty() {
                    out.push('\n');
                }
            }
            None => {
                out.push_str(&body_text);
                if !body.is_empty() {
                    out.push('\n');
                }
            }
        }

        if i < lines.len() {
            // Re-emit the closing line verbatim: it may use more fence
            // characters than the opening line (CommonMark only requires
            // "at least as many"), so it must not be reconstructed from
            // `fence_len`.
            out.push_str(lines[i]);
            out.push('\n');
            i += 1;
        }
    }

    if !text.ends_with('\n') && out.ends_with('\n') {
        out.pop();
    }

    if changed {
        Ok(Some(out))
    } else {
        Ok(None)
    }
}

/// A closing fence is a line whose trimmed content is nothing but
/// `fence_char`, repeated at least `fence_len` times (CommonMark allows a
/// closing fence to be longer than its opening fence, never shorter).
fn is_closing_fence(line: &str, fence_char: char, fence_len: usize) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.chars().all(|c| c == fence_char)
        && trimmed.chars().count() >= fence_len
}

fn rewrite_fence_body(
    body: &str,
    target: &str,
    bumped: &std::collections::BTreeSet<&str>,
    member_names: &std::collections::BTreeSet<&str>,
) -> Option<String> {
    let mut doc = ManifestDocument::from_str("<fence>", body).ok()?;
    let mut changed = false;

    changed |= set_if_present(&mut doc, "workspace.package.version", target);
    changed |= set_if_present(&mut doc, "package.version", target);

    for section_key in ["dependencies", "dev-dependencies", "build-dependencies"] {
        let Some(section) = doc.as_table_mut().get_mut(section_key) else {
            continue;
        };
        let Some(section_table) = section.as_table_mut() else {
            continue;
        };
        let keys: Vec<String> = section_table.iter().map(|(k, _)| k.to_string()).collect();
        for key in keys {
            if !member_names.contains(key.as_str()) || !bumped.contains(key.as_str()) {
                continue;
            }
            changed |= ManifestDocument::update_requirement(section_table, &key, target);
        }
    }

    if changed {
        Some(doc.to_string().trim_end_matches('\n').to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::{Crate, InternalDep, Section, WorkspaceGraph};

    #[test]
    fn validates_semver_grammar() {
        assert!(validate_version("1.2.3").is_ok());
        assert!(validate_version("1.2.3-rc.1").is_ok());
        assert!(validate_version("1.2.3+build.5").is_ok());
        assert!(validate_version("1.2.3-rc.1+build.5").is_ok());
        assert!(validate_version("1.2").is_err());
        assert!(validate_version("v1.2.3").is_err());
        assert!(validate_version("1.2.3.4").is_err());
        assert!(validate_version("").is_err());
    }

    fn fixture_graph(root: &Path) -> WorkspaceGraph {
        WorkspaceGraph {
            root: root.to_path_buf(),
            crates: vec![
                Crate {
                    name: "alpha".into(),
                    version: "0.1.0".into(),
                    manifest_path: root.join("crates/alpha/Cargo.toml"),
                    publishable: true,
                    readme_inherits_workspace: false,
                    internal_dependencies: vec![],
                },
                Crate {
                    name: "beta".into(),
                    version: "0.1.0".into(),
                    manifest_path: root.join("crates/beta/Cargo.toml"),
                    publishable: true,
                    readme_inherits_workspace: false,
                    internal_dependencies: vec![InternalDep {
                        target_name: "alpha".into(),
                        manifest_key: "alpha".into(),
                        section: Section::Normal,
                        requirement: Some("^0.1.0".into()),
                        kind_is_dev_only: false,
                    }],
                },
            ],
        }
    }

    #[test]
    fn bump_excludes_target_version_but_updates_dependents() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("crates/alpha")).unwrap();
        std::fs::create_dir_all(root.join("crates/beta")).unwrap();
        std::fs::write(
            root.join("crates/alpha/Cargo.toml"),
            "[package]\nname = \"alpha\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        std::fs::write(
            root.join("crates/beta/Cargo.toml"),
            "[package]\nname = \"beta\"\nversion = \"0.1.0\"\n\n[dependencies]\nalpha = \"^0.1.0\"\n",
        )
        .unwrap();

        let graph = fixture_graph(root);
        let exclude = vec!["alpha".to_string()];
        let report = bump(&BumpRequest {
            graph: &graph,
            target_version: "1.2.3",
            exclude: &exclude,
            documentation_globs: &[],
            dry_run: false,
        })
        .unwrap();

        assert!(report
            .manifests_changed
            .contains(&root.join("crates/beta/Cargo.toml")));
        assert!(!report
            .manifests_changed
            .contains(&root.join("crates/alpha/Cargo.toml")));

        let alpha_text = std::fs::read_to_string(root.join("crates/alpha/Cargo.toml")).unwrap();
        assert!(alpha_text.contains("version = \"0.1.0\""));
        let beta_text = std::fs::read_to_string(root.join("crates/beta/Cargo.toml")).unwrap();
        assert!(beta_text.contains("version = \"1.2.3\""));
        assert!(beta_text.contains("alpha = \"^0.1.0\""));

        temp.close().unwrap();
    }

    #[test]
    fn idempotent_second_bump_is_no_op() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("crates/alpha")).unwrap();
        std::fs::create_dir_all(root.join("crates/beta")).unwrap();
        std::fs::write(
            root.join("crates/alpha/Cargo.toml"),
            "[package]\nname = \"alpha\"\nversion = \"1.2.3\"\n",
        )
        .unwrap();
        std::fs::write(
            root.join("crates/beta/Cargo.toml"),
            "[package]\nname = \"beta\"\nversion = \"1.2.3\"\n\n[dependencies]\nalpha = \"^1.2.3\"\n",
        )
        .unwrap();

        let graph = fixture_graph(root);
        let report = bump(&BumpRequest {
            graph: &graph,
            target_version: "1.2.3",
            exclude: &[],
            documentation_globs: &[],
            dry_run: false,
        })
        .unwrap();

        assert!(report.no_changes_required());
        temp.close().unwrap();
    }

    #[test]
    fn rewrites_toml_fence_in_markdown() {
        let body = "```toml\n[package]\nversion = \"0.1.0\"\n```\n";
        let member_names: std::collections::BTreeSet<&str> = ["alpha"].into_iter().collect();
        let bumped: std::collections::BTreeSet<&str> = ["alpha"].into_iter().collect();

        let temp = assert_fs::TempDir::new().unwrap();
        let doc_path = temp.path().join("README.md");
        std::fs::write(&doc_path, body).unwrap();

        let rewritten = rewrite_markdown_fences(&doc_path, "1.2.3", &bumped, &member_names)
            .unwrap()
            .expect("fence body changed");
        assert!(rewritten.contains("version = \"1.2.3\""));
        temp.close().unwrap();
    }

    #[test]
    fn fence_closed_with_more_backticks_than_it_opened_with_is_recognized() {
        // CommonMark allows a closing fence to use more backticks than the
        // opening one; a 4-backtick close on a 3-backtick open is valid and
        // common when the fenced content itself contains a ``` example.
        let body = "````toml\n[package]\nversion = \"0.1.0\"\n````\n";
        let member_names: std::collections::BTreeSet<&str> = ["alpha"].into_iter().collect();
        let bumped: std::collections::BTreeSet<&str> = ["alpha"].into_iter().collect();

        let temp = assert_fs::TempDir::new().unwrap();
        let doc_path = temp.path().join("README.md");
        std::fs::write(&doc_path, body).unwrap();

        let rewritten = rewrite_markdown_fences(&doc_path, "1.2.3", &bumped, &member_names)
            .unwrap()
            .expect("fence body changed");
        assert!(rewritten.contains("version = \"1.2.3\""));
        assert!(rewritten.contains("````\n"));
        temp.close().unwrap();
    }

    mod is_closing_fence {
        use super::*;

        #[test]
        fn exact_length_match_closes() {
            assert!(is_closing_fence("```", '`', 3));
        }

        #[test]
        fn longer_run_closes() {
            assert!(is_closing_fence("````", '`', 3));
        }

        #[test]
        fn shorter_run_does_not_close() {
            assert!(!is_closing_fence("``", '`', 3));
        }

        #[test]
        fn indented_closing_fence_still_closes() {
            assert!(is_closing_fence("   ```", '`', 3));
        }

        #[test]
        fn mixed_fence_characters_do_not_close() {
            assert!(!is_closing_fence("``~", '`', 3));
        }

        #[test]
        fn empty_line_does_not_close() {
            assert!(!is_closing_fence("", '`', 3));
        }
    }
}
