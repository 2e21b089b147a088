//! Enumerating the files a branch changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ghoststack_core::{ChangedFile, GhostError};
use git2::{DiffFindOptions, Repository, Tree};

/// Parse `git diff --numstat` output.
///
/// Binary files report `-` for both counts, which are read as 0. Lines
/// without at least three tab-separated fields are ignored.
///
/// # Examples
///
/// ```
/// use ghoststack_review::changes::parse_numstat;
///
/// let files = parse_numstat("12\t3\tsrc/auth.py\n-\t-\tlogo.png\n");
/// assert_eq!(files.len(), 2);
/// assert_eq!(files[0].additions, 12);
/// assert_eq!(files[1].lines_changed(), 0);
/// ```
pub fn parse_numstat(text: &str) -> Vec<ChangedFile> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let additions = parts.next()?;
            let deletions = parts.next()?;
            let path = parts.next()?.trim_end();
            if path.is_empty() {
                return None;
            }
            Some(ChangedFile::new(
                path,
                additions.trim().parse().unwrap_or(0),
                deletions.trim().parse().unwrap_or(0),
            ))
        })
        .collect()
}

/// Read and parse a saved `git diff --numstat` file.
///
/// # Errors
///
/// Returns [`GhostError::FileNotFound`] if `path` does not exist and
/// [`GhostError::Io`] if it cannot be read.
pub fn read_numstat(path: &Path) -> Result<Vec<ChangedFile>, GhostError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_numstat(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(GhostError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Working-tree root of the repository containing `path`.
///
/// # Errors
///
/// Returns [`GhostError::Git`] if `path` is not inside a non-bare repository.
pub fn repo_root(path: &Path) -> Result<PathBuf, GhostError> {
    let repo = Repository::discover(path)
        .map_err(|e| GhostError::Git(format!("not a git repository: {e}")))?;
    repo.workdir()
        .map(Path::to_path_buf)
        .ok_or_else(|| GhostError::Git("bare repositories are not supported".into()))
}

/// Name of the branch checked out at `HEAD`.
///
/// # Errors
///
/// Returns [`GhostError::Git`] outside a repository, before the first commit,
/// or when `HEAD` is detached.
pub fn current_branch(repo_path: &Path) -> Result<String, GhostError> {
    let repo = Repository::discover(repo_path)
        .map_err(|e| GhostError::Git(format!("not a git repository: {e}")))?;
    let head = repo
        .head()
        .map_err(|e| GhostError::Git(format!("failed to resolve HEAD: {e}")))?;
    if !head.is_branch() {
        return Err(GhostError::Git(
            "HEAD is detached; check out a branch to review it".into(),
        ));
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| GhostError::Git("branch name is not valid UTF-8".into()))
}

/// Files changed between `base` and `HEAD`, with per-file line counts.
///
/// `base` is any revision git understands (`main`, `origin/main`, a SHA). A
/// branch that only exists on `origin` is found too, as in fresh CI clones.
/// Renames are detected and reported under their new path.
///
/// # Errors
///
/// Returns [`GhostError::Git`] if the repository or either revision cannot be
/// resolved, or the diff fails.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use ghoststack_review::changes::diff_against;
///
/// let changed = diff_against(Path::new("."), "main").unwrap();
/// for file in &changed {
///     println!("{} +{} -{}", file.path, file.additions, file.deletions);
/// }
/// ```
pub fn diff_against(repo_path: &Path, base: &str) -> Result<Vec<ChangedFile>, GhostError> {
    let repo = Repository::discover(repo_path)
        .map_err(|e| GhostError::Git(format!("not a git repository: {e}")))?;

    let base_tree = resolve_base(&repo, base)?;
    let head_tree = repo
        .head()
        .and_then(|head| head.peel_to_tree())
        .map_err(|e| GhostError::Git(format!("failed to resolve HEAD: {e}")))?;

    let mut diff = repo
        .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)
        .map_err(|e| GhostError::Git(format!("failed to compute diff: {e}")))?;

    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true);
    diff.find_similar(Some(&mut find_opts))
        .map_err(|e| GhostError::Git(format!("failed to find renames: {e}")))?;

    let paths: Vec<String> = diff
        .deltas()
        .filter_map(|delta| {
            delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(path_string)
        })
        .collect();

    let mut counts: HashMap<String, (u64, u64)> = HashMap::new();
    diff.foreach(
        &mut |_delta, _progress| true,
        None,
        None,
        Some(&mut |delta, _hunk, line| {
            let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
                return true;
            };
            let entry = counts.entry(path_string(path)).or_insert((0, 0));
            match line.origin() {
                '+' => entry.0 += 1,
                '-' => entry.1 += 1,
                _ => {}
            }
            true
        }),
    )
    .map_err(|e| GhostError::Git(format!("failed to iterate diff lines: {e}")))?;

    Ok(paths
        .into_iter()
        .map(|path| {
            let (additions, deletions) = counts.get(&path).copied().unwrap_or((0, 0));
            ChangedFile::new(path, additions, deletions)
        })
        .collect())
}

fn resolve_base<'r>(repo: &'r Repository, base: &str) -> Result<Tree<'r>, GhostError> {
    let local_err = match repo.revparse_single(base).and_then(|obj| obj.peel_to_tree()) {
        Ok(tree) => return Ok(tree),
        Err(e) => e,
    };

    let remote = format!("origin/{base}");
    match repo.revparse_single(&remote).and_then(|obj| obj.peel_to_tree()) {
        Ok(tree) => {
            tracing::debug!(base, remote = %remote, "local base not found, using remote branch");
            Ok(tree)
        }
        Err(_) => Err(GhostError::Git(format!(
            "base revision '{base}' not found: {local_err}"
        ))),
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
