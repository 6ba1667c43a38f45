use crate::time_label::{format_duration, time_ago};
use crossterm::style::Stylize;
use pulse_core::aggregate::{day_key, utc_day};
use pulse_core::model::{RepoStatus, ScanResult};
use std::io::{self, Write};
use time::OffsetDateTime;

const HEADERS: [&str; 5] = ["Repo", "Status", "Last Active", "Branch", "Ahead/Behind"];
const COLUMN_GAP: &str = "  ";

struct Row {
    repo: String,
    status: String,
    clean: bool,
    last_active: String,
    branch: String,
    ghost: bool,
    ahead_behind: String,
}

impl Row {
    fn new(status: &RepoStatus, now: OffsetDateTime) -> Self {
        let branch = if status.is_ghost {
            format!("{} (ghost)", status.branch)
        } else {
            status.branch.clone()
        };
        Self {
            repo: status.name.clone(),
            status: if status.is_clean {
                "✔ clean".to_string()
            } else {
                format!("✘ {} changed", status.changed_files)
            },
            clean: status.is_clean,
            last_active: time_ago(status.last_commit_time, now),
            branch,
            ghost: status.is_ghost,
            ahead_behind: ahead_behind_label(status),
        }
    }

    fn cells(&self) -> [&str; 5] {
        [
            &self.repo,
            &self.status,
            &self.last_active,
            &self.branch,
            &self.ahead_behind,
        ]
    }
}

pub fn ahead_behind_label(status: &RepoStatus) -> String {
    let mut parts = Vec::new();
    if status.unpushed_commits > 0 {
        parts.push(format!("↑{}", status.unpushed_commits));
    }
    if status.unpulled_commits > 0 {
        parts.push(format!("↓{}", status.unpulled_commits));
    }
    parts.join(" ")
}

pub fn render_table(out: &mut dyn Write, result: &ScanResult, now: OffsetDateTime) -> io::Result<()> {
    let rows: Vec<Row> = result.repos.iter().map(|repo| Row::new(repo, now)).collect();
    let mut widths = HEADERS.map(|header| header.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.cells()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    writeln!(
        out,
        "\n{}  Found {} repos (scanned in {})\n",
        "pulse".cyan(),
        result.counters.total_repos,
        format_duration(result.scan_duration)
    )?;

    let header: Vec<String> = HEADERS
        .iter()
        .zip(widths)
        .map(|(header, width)| pad(header, width))
        .collect();
    writeln!(out, "{}", header.join(COLUMN_GAP).trim_end().bold())?;

    for row in &rows {
        let [repo, status, last_active, branch, ahead_behind] = row.cells();
        let status = pad(status, widths[1]);
        let status = if row.clean { status.green() } else { status.red() };
        let branch = pad(branch, widths[3]);
        let branch = if row.ghost { branch.dim() } else { branch.reset() };
        let line = format!(
            "{}{COLUMN_GAP}{}{COLUMN_GAP}{}{COLUMN_GAP}{}{COLUMN_GAP}{}",
            pad(repo, widths[0]),
            status,
            pad(last_active, widths[2]),
            branch,
            ahead_behind,
        );
        writeln!(out, "{}", line.trim_end())?;
    }

    render_footer(out, result, now)
}

fn render_footer(out: &mut dyn Write, result: &ScanResult, now: OffsetDateTime) -> io::Result<()> {
    if !result.errors.is_empty() {
        writeln!(out, "\n{}  {} repos had errors", "!".red(), result.errors.len())?;
        for error in &result.errors {
            writeln!(
                out,
                "  {}: {}",
                error.path.display().to_string().dim(),
                error.message
            )?;
        }
    }

    if !result.non_git_paths.is_empty() {
        writeln!(
            out,
            "\n{}  {} non-git directories: {}",
            "~".dim(),
            result.non_git_paths.len(),
            result.non_git_paths.join(", ").dim()
        )?;
    }

    if let Some(count) = result.commits_today(&day_key(utc_day(now))) {
        writeln!(out, "\n{}  {} commits today across all repos", "#".cyan(), count)?;
    }

    if result.cancelled {
        writeln!(
            out,
            "\n{}  scan cancelled; {} repos not analyzed",
            "!".yellow(),
            result.skipped
        )?;
    }

    writeln!(out)
}

/// Recent history per repository, most recently active first.
pub fn render_detail(out: &mut dyn Write, result: &ScanResult, now: OffsetDateTime) -> io::Result<()> {
    for repo in result.repos.iter().rev() {
        if repo.recent_commits.is_empty() {
            continue;
        }
        writeln!(out, "\n{} {}", "─────".cyan(), repo.name)?;
        for commit in &repo.recent_commits {
            writeln!(
                out,
                "  {} {} {}",
                commit.hash.as_str().dim(),
                commit.message,
                time_ago(Some(commit.timestamp), now).dim()
            )?;
        }
        if let Some(lines) = &repo.lines_changed {
            let days = lines.period.as_secs() / (24 * 60 * 60);
            writeln!(
                out,
                "  {} +{} {} -{} (last {} days)",
                "lines:".dim(),
                lines.added,
                "/".dim(),
                lines.removed,
                days
            )?;
        }
    }
    Ok(())
}

pub fn render_json(out: &mut dyn Write, result: &ScanResult) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, result)?;
    writeln!(out)?;
    Ok(())
}

fn pad(value: &str, width: usize) -> String {
    format!("{value:<width$}")
}
