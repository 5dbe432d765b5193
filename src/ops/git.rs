//! The only git operation the core needs: checking whether the working tree
//! is clean, via `git status --porcelain` routed through the allowlisted
//! command runner rather than a `git2` library call.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::LadingError;
use crate::ops::cmd;

/// Returns the porcelain status lines, empty when the tree is clean.
pub fn dirty_lines(workspace_root: &Path) -> Result<Vec<String>, LadingError> {
    let output = cmd::run(
        "git",
        &["status".into(), "--porcelain".into()],
        workspace_root,
        &BTreeMap::new(),
    )?;
    Ok(output
        .stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clean_tree_reports_no_dirty_lines() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = cmd::run(
            "git",
            &["init".into()],
            temp.path(),
            &BTreeMap::new(),
        )
        .unwrap();
        assert!(output.success());
        let lines = dirty_lines(temp.path()).unwrap();
        assert!(lines.is_empty());
        temp.close().unwrap();
    }
}
