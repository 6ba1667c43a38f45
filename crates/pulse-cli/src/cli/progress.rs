use super::*;

/// Single self-overwriting status line on stderr.
#[derive(Default)]
pub(super) struct ProgressLine {
    last_len: usize,
}

impl ProgressLine {
    pub(super) fn update(&mut self, progress: &PoolProgress<'_>) {
        let line = progress_text(progress);
        let len = line.chars().count();
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\r{line}{}", " ".repeat(self.last_len.saturating_sub(len)));
        let _ = stderr.flush();
        self.last_len = len;
    }

    pub(super) fn finish(&mut self) {
        if self.last_len == 0 {
            return;
        }
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\r{}\r", " ".repeat(self.last_len));
        let _ = stderr.flush();
        self.last_len = 0;
    }
}

pub(super) fn progress_text(progress: &PoolProgress<'_>) -> String {
    let repo = progress
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| progress.path.display().to_string());
    format!(
        "scanning {}/{} {} {}",
        progress.completed,
        progress.total,
        render_progress_bar(progress.completed, progress.total, 20),
        repo
    )
}

pub(super) fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    if total == 0 || width == 0 {
        return "[]".to_string();
    }
    let filled = (step.min(total) * width + total / 2) / total;
    let empty = width - filled;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(empty))
}
