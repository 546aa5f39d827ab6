//! Reading and rewriting git's `rebase-merge/git-rebase-todo` file.
//!
//! The commits panel lists pending todo entries newest first, while the file
//! lists them oldest first. Panel index `i` therefore maps to the
//! `len - 1 - i`th entry line of the file. Comment and blank lines are kept
//! untouched.

use std::{fs, path::Path};

use crate::error::GitError;
use crate::models::{Commit, CommitStatus, Direction, TodoAction};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TodoEntry {
    pub action: TodoAction,
    pub sha: String,
    pub summary: String,
}

fn parse_line(line: &str) -> Option<TodoEntry> {
    let t = line.trim();
    if t.is_empty() || t.starts_with('#') {
        return None;
    }

    let mut it = t.splitn(3, ' ');
    let action = TodoAction::parse(it.next()?)?;
    let sha = it.next().filter(|s| !s.is_empty())?.to_string();
    let summary = it.next().unwrap_or("").trim().to_string();
    Some(TodoEntry {
        action,
        sha,
        summary,
    })
}

/// Entries in file order (oldest first).
pub fn parse_todo(text: &str) -> Vec<TodoEntry> {
    text.split('\n').filter_map(parse_line).collect()
}

/// Pending entries as commits, newest first, ready to sit on top of the
/// commits panel.
pub fn rebasing_commits(text: &str) -> Vec<Commit> {
    parse_todo(text)
        .into_iter()
        .rev()
        .map(|e| Commit {
            sha: e.sha,
            parents: Vec::new(),
            summary: e.summary,
            status: CommitStatus::Rebasing(e.action),
        })
        .collect()
}

fn entry_line_indices(lines: &[&str]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| parse_line(l).is_some())
        .map(|(i, _)| i)
        .collect()
}

fn line_for_panel_index(entries: &[usize], index: usize) -> Result<usize, GitError> {
    if index >= entries.len() {
        return Err(GitError::InvalidOperation(format!(
            "rebase todo has {} entries, no entry at position {}",
            entries.len(),
            index
        )));
    }
    Ok(entries[entries.len() - 1 - index])
}

/// Replace the action of the entry shown at `index` in the commits panel.
pub fn edit_action(text: &str, index: usize, action: TodoAction) -> Result<String, GitError> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let entries = {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        entry_line_indices(&refs)
    };
    let line_idx = line_for_panel_index(&entries, index)?;

    let line = lines[line_idx].trim_start();
    let rest = line.split_once(' ').map(|(_, rest)| rest).unwrap_or("");
    lines[line_idx] = format!("{} {}", action.as_str(), rest);
    Ok(lines.join("\n"))
}

/// Move the entry shown at `index` one row in the commits panel.
///
/// Down in the panel is earlier in the file. Moving past either end of the
/// pending entries is an error; callers guard against it first.
pub fn move_entry(text: &str, index: usize, direction: Direction) -> Result<String, GitError> {
    let lower = match direction {
        Direction::Down => index,
        Direction::Up => index.checked_sub(1).ok_or_else(|| {
            GitError::InvalidOperation("cannot move the top todo entry up".to_string())
        })?,
    };

    let mut lines: Vec<&str> = text.split('\n').collect();
    let entries = entry_line_indices(&lines);
    if lower + 1 >= entries.len() {
        return Err(GitError::InvalidOperation(
            "cannot move the oldest todo entry down".to_string(),
        ));
    }

    let a = line_for_panel_index(&entries, lower)?;
    let b = line_for_panel_index(&entries, lower + 1)?;
    lines.swap(a, b);
    Ok(lines.join("\n"))
}

fn todo_line(action: TodoAction, commit: &Commit) -> String {
    format!("{} {} {}", action.as_str(), commit.sha, commit.summary)
}

/// Build a todo that applies `action` to `commits[action_index]` and picks
/// everything newer. Returns the todo text and the sha to rebase onto.
///
/// Squash and fixup fold into the commit below, so the base moves one
/// further down.
pub fn build_single_action_todo(
    commits: &[Commit],
    action_index: usize,
    action: TodoAction,
) -> Result<(String, String), GitError> {
    let mut base_index = action_index + 1;
    if matches!(action, TodoAction::Squash | TodoAction::Fixup) {
        base_index += 1;
    }
    let Some(base) = commits.get(base_index) else {
        return Err(GitError::InvalidOperation(match action {
            TodoAction::Squash | TodoAction::Fixup => {
                "cannot squash or fixup onto the first commit".to_string()
            }
            _ => "cannot rebase onto the first commit".to_string(),
        }));
    };

    let mut lines = Vec::with_capacity(base_index);
    for i in (0..base_index).rev() {
        let a = if i == action_index {
            action
        } else {
            TodoAction::Pick
        };
        lines.push(todo_line(a, &commits[i]));
    }
    Ok((lines.join("\n") + "\n", base.sha.clone()))
}

/// Build a todo that swaps `commits[index]` with the commit below it.
pub fn build_swap_todo(commits: &[Commit], index: usize) -> Result<(String, String), GitError> {
    let Some(base) = commits.get(index + 2) else {
        return Err(GitError::InvalidOperation(
            "not enough commits below to move this one down".to_string(),
        ));
    };

    let mut lines = Vec::with_capacity(index + 2);
    lines.push(todo_line(TodoAction::Pick, &commits[index]));
    lines.push(todo_line(TodoAction::Pick, &commits[index + 1]));
    for i in (0..index).rev() {
        lines.push(todo_line(TodoAction::Pick, &commits[i]));
    }
    Ok((lines.join("\n") + "\n", base.sha.clone()))
}

pub fn load_todo(path: &Path) -> Result<String, GitError> {
    fs::read_to_string(path).map_err(|e| GitError::ExternalToolFailure(e.to_string()))
}

/// Read, transform and write back the todo file in one step.
pub fn rewrite_todo_file<F>(path: &Path, edit: F) -> Result<(), GitError>
where
    F: FnOnce(&str) -> Result<String, GitError>,
{
    let text = load_todo(path)?;
    let new_text = edit(&text)?;

    // git reads the todo between steps; never leave it half written.
    let tmp = path.with_extension("tmp");
    if let Err(e) = fs::write(&tmp, new_text).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(GitError::ExternalToolFailure(e.to_string()));
    }
    Ok(())
}
