//! Dual-format repository parser.
//!
//! Two historical conventions coexist on disk: the current MCP layout
//! (one directory per work effort, an `_index.md`, and a `tickets/`
//! subdirectory) and legacy Johnny Decimal trees (numbered markdown
//! files under numbered category directories). A strict parser would
//! lose data, so both are recognized and malformed artifacts degrade to
//! placeholder records instead of aborting the scan.

use std::fs;
use std::path::{Path, PathBuf};

use foreman_model::{
    ArtifactFormat, RepoState, Ticket, TicketId, TicketStatus, WorkEffort,
    WorkEffortId, WorkEffortStatus,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::frontmatter;

/// MCP work effort directory, e.g. `WE-260501-ab12_demo`.
static WE_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(WE-\d{6}-([a-z0-9]{4}))_.+").unwrap());

/// Johnny Decimal category directory, e.g. `10-19_projects`.
static JD_CATEGORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}-\d{2}_.+").unwrap());

/// Johnny Decimal subcategory directory, e.g. `11_active`.
static JD_SUBCATEGORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}_.+").unwrap());

/// Johnny Decimal artifact file, e.g. `11.01_migration.md`.
static JD_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}\.\d{1,2})_.*\.md$").unwrap());

/// Ticket filename prefix, e.g. `TKT-ab12-001_fix-login.md`.
static TICKET_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(TKT-([a-z0-9]{4})-\d{3})_.*\.md$").unwrap());

/// Work-efforts directory names, in preference order.
const WORK_EFFORTS_DIRS: [&str; 2] = ["_work_efforts", "_work_efforts_"];

/// Outcome of scanning one repository root.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub work_efforts: Vec<WorkEffort>,
    /// Repo-level error summary; individual artifact errors live on the
    /// records themselves.
    pub error: Option<String>,
}

impl ParseResult {
    pub fn into_state(self) -> RepoState {
        RepoState::new(self.work_efforts, self.error)
    }
}

/// Locate the work-efforts directory under a repository root.
pub fn work_efforts_dir(repo_root: &Path) -> Option<PathBuf> {
    WORK_EFFORTS_DIRS
        .iter()
        .map(|name| repo_root.join(name))
        .find(|p| p.is_dir())
}

/// Scan a repository root into structured records.
///
/// Pure with respect to shared state: reads the filesystem, mutates
/// nothing, and is safe to call from any worker.
pub fn parse_repo(repo_root: &Path) -> ParseResult {
    let Some(root) = work_efforts_dir(repo_root) else {
        return ParseResult {
            work_efforts: Vec::new(),
            error: Some("No _work_efforts folder found".to_owned()),
        };
    };

    let entries = match sorted_entries(&root) {
        Ok(entries) => entries,
        Err(err) => {
            return ParseResult {
                work_efforts: Vec::new(),
                error: Some(format!(
                    "failed to read {}: {err}",
                    root.display()
                )),
            };
        }
    };

    let mut work_efforts = Vec::new();
    let mut repo_errors = Vec::new();

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        if path.is_dir() {
            if let Some(caps) = WE_DIR_RE.captures(&name) {
                let we_id = caps[1].to_owned();
                let suffix = caps[2].to_owned();
                match parse_mcp_work_effort(&path, &we_id, &suffix) {
                    Ok(we) => work_efforts.push(we),
                    Err(err) => repo_errors.push(err),
                }
            } else if JD_CATEGORY_RE.is_match(&name) {
                parse_jd_category(
                    &path,
                    &name,
                    &mut work_efforts,
                    &mut repo_errors,
                );
            } else {
                debug!(dir = %name, "ignoring unrecognized directory");
            }
        }
    }

    // Duplicate ids are a parse error, not silent data loss.
    let mut seen = std::collections::HashSet::new();
    for we in &mut work_efforts {
        if !seen.insert(we.id.clone()) {
            let note = format!("duplicate work effort id: {}", we.id);
            warn!(%note, path = %we.path.display(), "parse conflict");
            we.error.get_or_insert_with(|| note.clone());
            repo_errors.push(note);
        }
    }

    ParseResult {
        work_efforts,
        error: if repo_errors.is_empty() {
            None
        } else {
            Some(repo_errors.join("; "))
        },
    }
}

/// Parse one MCP work effort directory: the `_index.md` plus any
/// tickets. Never fails on malformed content, only on unreadable
/// directories.
fn parse_mcp_work_effort(
    dir: &Path,
    we_id: &str,
    suffix: &str,
) -> Result<WorkEffort, String> {
    let id = WorkEffortId::unchecked(we_id);
    let fallback_title = title_from_name(dir, we_id);

    let Some(index_path) = find_index_file(dir, we_id) else {
        // Recognized directory without an index still counts.
        return Ok(WorkEffort::placeholder(
            id,
            ArtifactFormat::Mcp,
            fallback_title,
            dir.to_path_buf(),
            "no index file found",
        ));
    };

    let mut we = match fs::read_to_string(&index_path) {
        Ok(raw) => work_effort_from_document(
            id,
            &raw,
            &fallback_title,
            index_path.clone(),
        ),
        Err(err) => WorkEffort::placeholder(
            id,
            ArtifactFormat::Mcp,
            fallback_title,
            index_path.clone(),
            format!("unreadable index: {err}"),
        ),
    };

    we.tickets = parse_tickets(dir, &we.id, suffix);
    Ok(we)
}

fn work_effort_from_document(
    id: WorkEffortId,
    raw: &str,
    fallback_title: &str,
    path: PathBuf,
) -> WorkEffort {
    let (fm, body) = frontmatter::split(raw);

    let title = fm
        .get("title")
        .or_else(|| frontmatter::body_title(body).map(str::to_owned))
        .unwrap_or_else(|| fallback_title.to_owned());

    WorkEffort {
        format: id.format(),
        id,
        title,
        status: fm
            .get("status")
            .map(|s| WorkEffortStatus::parse(&s))
            .unwrap_or_default(),
        created: fm.get("created"),
        last_updated: fm.get("last_updated"),
        repository: fm.get("repository"),
        branch: fm.get("branch"),
        category: None,
        tickets: Vec::new(),
        path,
        error: fm.parse_error,
    }
}

/// Index file: `<weId>_index.md` preferred, else the single `*_index.md`.
fn find_index_file(dir: &Path, we_id: &str) -> Option<PathBuf> {
    let canonical = dir.join(format!("{we_id}_index.md"));
    if canonical.is_file() {
        return Some(canonical);
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_index.md"))
        })
        .collect();

    match candidates.len() {
        1 => candidates.pop(),
        _ => None,
    }
}

/// Parse the `tickets/` subdirectory of one work effort. Ordering is
/// lexicographic by filename.
fn parse_tickets(
    we_dir: &Path,
    parent: &WorkEffortId,
    suffix: &str,
) -> Vec<Ticket> {
    let tickets_dir = we_dir.join("tickets");
    if !tickets_dir.is_dir() {
        return Vec::new();
    }

    let Ok(entries) = sorted_entries(&tickets_dir) else {
        warn!(dir = %tickets_dir.display(), "unreadable tickets directory");
        return Vec::new();
    };

    let mut tickets = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(caps) = TICKET_FILE_RE.captures(&name) else {
            continue;
        };
        // A ticket belongs to exactly one parent; mismatched suffixes
        // are someone else's files.
        if &caps[2] != suffix {
            debug!(file = %name, "ticket suffix does not match parent");
            continue;
        }

        let tkt_id = TicketId::unchecked(&caps[1]);
        let path = entry.path();
        let ticket = match fs::read_to_string(&path) {
            Ok(raw) => ticket_from_document(tkt_id, parent, &raw, path),
            Err(err) => Ticket {
                id: tkt_id,
                title: title_from_name(&path, &caps[1]),
                status: TicketStatus::default(),
                parent: parent.clone(),
                created: None,
                assigned_to: None,
                path,
                error: Some(format!("unreadable ticket: {err}")),
            },
        };
        tickets.push(ticket);
    }
    tickets
}

fn ticket_from_document(
    id: TicketId,
    parent: &WorkEffortId,
    raw: &str,
    path: PathBuf,
) -> Ticket {
    let (fm, body) = frontmatter::split(raw);
    let fallback = title_from_name(&path, id.as_str());
    Ticket {
        title: fm
            .get("title")
            .or_else(|| frontmatter::body_title(body).map(str::to_owned))
            .unwrap_or(fallback),
        status: fm
            .get("status")
            .map(|s| TicketStatus::parse(&s))
            .unwrap_or_default(),
        parent: parent.clone(),
        created: fm.get("created"),
        assigned_to: fm.get("assigned_to"),
        id,
        path,
        error: fm.parse_error,
    }
}

/// Walk one Johnny Decimal category: one level of subcategories, then
/// numbered markdown files.
fn parse_jd_category(
    category_dir: &Path,
    category_name: &str,
    out: &mut Vec<WorkEffort>,
    repo_errors: &mut Vec<String>,
) {
    let subcategories = match sorted_entries(category_dir) {
        Ok(entries) => entries,
        Err(err) => {
            repo_errors.push(format!(
                "failed to read {}: {err}",
                category_dir.display()
            ));
            return;
        }
    };

    for sub in subcategories {
        let sub_name = sub.file_name().to_string_lossy().into_owned();
        let sub_path = sub.path();
        if !sub_path.is_dir() || !JD_SUBCATEGORY_RE.is_match(&sub_name) {
            continue;
        }

        let Ok(files) = sorted_entries(&sub_path) else {
            repo_errors.push(format!(
                "failed to read {}",
                sub_path.display()
            ));
            continue;
        };

        for file in files {
            let file_name =
                file.file_name().to_string_lossy().into_owned();
            let Some(caps) = JD_FILE_RE.captures(&file_name) else {
                continue;
            };
            let id = WorkEffortId::unchecked(&caps[1]);
            let path = file.path();
            let fallback = title_from_name(&path, &caps[1]);

            let mut we = match fs::read_to_string(&path) {
                Ok(raw) => {
                    work_effort_from_document(id, &raw, &fallback, path)
                }
                Err(err) => {
                    repo_errors.push(format!(
                        "unreadable {}: {err}",
                        path.display()
                    ));
                    continue;
                }
            };
            we.format = ArtifactFormat::Jd;
            we.category = Some(category_name.to_owned());
            out.push(we);
        }
    }
}

/// Directory entries in lexicographic filename order. Deterministic
/// iteration keeps snapshot diffs stable across refreshes.
fn sorted_entries(dir: &Path) -> std::io::Result<Vec<fs::DirEntry>> {
    let mut entries: Vec<_> =
        fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Derive a human title from an artifact name: the segment after the id
/// prefix, underscores and dashes read as spaces.
fn title_from_name(path: &Path, id_prefix: &str) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let rest = stem
        .strip_prefix(id_prefix)
        .and_then(|s| s.strip_prefix('_'))
        .unwrap_or(stem);
    let title = rest.replace(['_', '-'], " ").trim().to_owned();
    if title.is_empty() {
        id_prefix.to_owned()
    } else {
        title
    }
}
