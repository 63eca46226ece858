//! Filesystem census used by counter migration and validation.
//!
//! Counts what is actually on disk: work effort directories, ticket
//! files per work effort, and checkpoint files. Grouping by repository
//! honors a `repository:` frontmatter field, falling back to the
//! configured repo name.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use foreman_model::{RepoRef, CHECKPOINT_ID_RE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::scan::frontmatter;
use crate::scan::parser::work_efforts_dir;

static WE_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(WE-\d{6}-([a-z0-9]{4}))_.+").unwrap());

static TICKET_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(TKT-([a-z0-9]{4})-\d{3})_.*\.md$").unwrap());

/// Observed on-disk counts across the configured repositories.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemCounts {
    pub work_efforts_total: u64,
    pub work_efforts_by_repo: BTreeMap<String, u64>,
    pub tickets_total: u64,
    pub tickets_by_work_effort: BTreeMap<String, u64>,
    pub tickets_by_repo: BTreeMap<String, u64>,
    pub checkpoints_total: u64,
    /// Naming irregularities surfaced by the consistency check:
    /// ticket files whose suffix does not match their parent, and
    /// checkpoint files with malformed names.
    pub id_format_issues: Vec<String>,
}

/// Walk every configured repository's work-efforts tree.
pub fn scan_counters(repos: &[RepoRef]) -> FilesystemCounts {
    let mut counts = FilesystemCounts::default();
    for repo in repos {
        scan_repo(repo, &mut counts);
    }
    counts
}

fn scan_repo(repo: &RepoRef, counts: &mut FilesystemCounts) {
    let Some(root) = work_efforts_dir(&repo.path) else {
        debug!(repo = %repo.name, "no work-efforts directory, skipping");
        return;
    };

    let Ok(entries) = fs::read_dir(&root) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        if path.is_dir() {
            if let Some(caps) = WE_DIR_RE.captures(&name) {
                let we_id = caps[1].to_owned();
                let suffix = caps[2].to_owned();
                let group = repo_group(&path, &we_id, &repo.name);

                counts.work_efforts_total += 1;
                *counts
                    .work_efforts_by_repo
                    .entry(group.clone())
                    .or_default() += 1;

                scan_tickets(
                    &path, &we_id, &suffix, &group, counts,
                );
            } else if name == "checkpoints" {
                scan_checkpoints(&path, counts);
            }
        }
    }
}

fn scan_tickets(
    we_dir: &Path,
    we_id: &str,
    suffix: &str,
    repo_group: &str,
    counts: &mut FilesystemCounts,
) {
    let tickets_dir = we_dir.join("tickets");
    let Ok(entries) = fs::read_dir(&tickets_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".md") {
            continue;
        }
        let Some(caps) = TICKET_FILE_RE.captures(&name) else {
            if name.starts_with("TKT-") {
                counts.id_format_issues.push(format!(
                    "malformed ticket filename: {}",
                    entry.path().display()
                ));
            }
            continue;
        };
        if &caps[2] != suffix {
            counts.id_format_issues.push(format!(
                "ticket {} does not match parent suffix {suffix}",
                &caps[1]
            ));
            continue;
        }

        counts.tickets_total += 1;
        *counts
            .tickets_by_work_effort
            .entry(we_id.to_owned())
            .or_default() += 1;
        *counts
            .tickets_by_repo
            .entry(repo_group.to_owned())
            .or_default() += 1;
    }
}

fn scan_checkpoints(dir: &Path, counts: &mut FilesystemCounts) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(".md") else {
            continue;
        };
        if CHECKPOINT_ID_RE.is_match(stem)
            || stem
                .split_once('_')
                .is_some_and(|(id, _)| CHECKPOINT_ID_RE.is_match(id))
        {
            counts.checkpoints_total += 1;
        } else if stem.starts_with("CKPT-") {
            counts.id_format_issues.push(format!(
                "malformed checkpoint filename: {}",
                entry.path().display()
            ));
        }
    }
}

/// Grouping key for a work effort: its `repository:` frontmatter field
/// when present, else the configured repo name.
fn repo_group(we_dir: &Path, we_id: &str, default: &str) -> String {
    let index = we_dir.join(format!("{we_id}_index.md"));
    if let Ok(raw) = fs::read_to_string(index) {
        let (fm, _) = frontmatter::split(&raw);
        if let Some(repository) = fm.get("repository") {
            if !repository.trim().is_empty() {
                return repository;
            }
        }
    }
    default.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn counts_work_efforts_tickets_and_checkpoints() {
        let repo = tempdir().unwrap();
        let root = repo.path().join("_work_efforts");
        write(
            &root.join("WE-260501-ab12_one/WE-260501-ab12_index.md"),
            "---\nstatus: active\n---\n",
        );
        write(
            &root.join(
                "WE-260501-ab12_one/tickets/TKT-ab12-001_fix.md",
            ),
            "---\nstatus: pending\n---\n",
        );
        write(
            &root.join(
                "WE-260501-ab12_one/tickets/TKT-ab12-002_more.md",
            ),
            "---\nstatus: pending\n---\n",
        );
        write(
            &root.join("WE-260502-cd34_two/WE-260502-cd34_index.md"),
            "---\nstatus: active\n---\n",
        );
        write(&root.join("checkpoints/CKPT-260501-0930.md"), "notes");
        write(
            &root.join("checkpoints/CKPT-260501-1400_review.md"),
            "notes",
        );

        let counts = scan_counters(&[RepoRef {
            name: "_pyrite".into(),
            path: repo.path().to_path_buf(),
        }]);

        assert_eq!(counts.work_efforts_total, 2);
        assert_eq!(counts.work_efforts_by_repo["_pyrite"], 2);
        assert_eq!(counts.tickets_total, 2);
        assert_eq!(counts.tickets_by_work_effort["WE-260501-ab12"], 2);
        assert_eq!(counts.checkpoints_total, 2);
        assert!(counts.id_format_issues.is_empty());
    }

    #[test]
    fn frontmatter_repository_field_overrides_grouping() {
        let repo = tempdir().unwrap();
        let root = repo.path().join("_work_efforts");
        write(
            &root.join("WE-260501-ab12_one/WE-260501-ab12_index.md"),
            "---\nstatus: active\nrepository: upstream\n---\n",
        );

        let counts = scan_counters(&[RepoRef {
            name: "_pyrite".into(),
            path: repo.path().to_path_buf(),
        }]);
        assert_eq!(counts.work_efforts_by_repo["upstream"], 1);
        assert!(!counts.work_efforts_by_repo.contains_key("_pyrite"));
    }

    #[test]
    fn suffix_mismatches_are_format_issues() {
        let repo = tempdir().unwrap();
        let root = repo.path().join("_work_efforts");
        write(
            &root.join("WE-260501-ab12_one/WE-260501-ab12_index.md"),
            "---\nstatus: active\n---\n",
        );
        write(
            &root.join(
                "WE-260501-ab12_one/tickets/TKT-zz99-001_stray.md",
            ),
            "---\n---\n",
        );

        let counts = scan_counters(&[RepoRef {
            name: "_pyrite".into(),
            path: repo.path().to_path_buf(),
        }]);
        assert_eq!(counts.tickets_total, 0);
        assert_eq!(counts.id_format_issues.len(), 1);
    }

    #[test]
    fn missing_repo_is_skipped_quietly() {
        let counts = scan_counters(&[RepoRef {
            name: "gone".into(),
            path: PathBuf::from("/nonexistent/nowhere"),
        }]);
        assert_eq!(counts.work_efforts_total, 0);
    }
}
