use std::sync::Arc;

use crate::plugin::host_fns::ProgressSink;

#[derive(Debug, Clone, Copy)]
pub struct ProgressSettings {
    pub max_failures_shown: usize,
    pub max_message_len: usize,
    pub bar_width: usize,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            max_failures_shown: 5,
            max_message_len: 4000,
            bar_width: 20,
        }
    }
}

/// Running counters shown in interim batch updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Best-effort narration of a lifecycle operation.
///
/// A failed interim update mutes the rest of the interim updates; the final
/// text is always attempted. Sink errors never reach the caller.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    settings: ProgressSettings,
    muted: bool,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, settings: ProgressSettings) -> Self {
        Self {
            sink,
            settings,
            muted: false,
        }
    }

    pub fn settings(&self) -> &ProgressSettings {
        &self.settings
    }

    pub async fn post(&mut self, text: &str) -> bool {
        if self.muted {
            return false;
        }

        match self.sink.update(text).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("progress update failed, muting further updates: {err:#}");
                self.muted = true;
                false
            }
        }
    }

    /// Per-item update, throttled to the first item, the last item and
    /// every other item in between.
    pub async fn step(&mut self, verb: &str, name: &str, index: usize, total: usize, tally: Tally) {
        if !should_report(index, total) {
            return;
        }

        let done = index + 1;
        let pct = percent(done, total);
        let mut text = format!(
            "📦 {verb} {name}\n{}\n🔄 {done}/{total} ({pct}%)  ✅ {}",
            progress_bar(pct, self.settings.bar_width),
            tally.succeeded
        );
        if tally.skipped > 0 {
            text.push_str(&format!("  ⏭ {}", tally.skipped));
        }
        text.push_str(&format!("  ❌ {}", tally.failed));

        self.post(&text).await;
    }

    /// Send the final text, split into sink-sized chunks.
    pub async fn finish(&mut self, text: &str) {
        let chunks = split_long_text(text, self.settings.max_message_len);
        let continuations = chunks.len().saturating_sub(1);

        for (index, chunk) in chunks.iter().enumerate() {
            let body = if index == 0 {
                chunk.clone()
            } else {
                format!("(continued {index}/{continuations})\n\n{chunk}")
            };
            if let Err(err) = self.sink.update(&body).await {
                tracing::warn!("final progress update failed: {err:#}");
            }
        }
    }
}

pub fn should_report(index: usize, total: usize) -> bool {
    index == 0 || index + 1 == total || index % 2 == 0
}

pub fn percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round() as u32
}

pub fn progress_bar(pct: u32, width: usize) -> String {
    let pct = pct.min(100);
    let filled = ((pct as f64 / 100.0) * width as f64).round() as usize;
    format!(
        "[{}{}] {pct}%",
        "█".repeat(filled),
        "░".repeat(width.saturating_sub(filled))
    )
}

/// Split on line boundaries into chunks of at most `max` characters. A
/// single line longer than `max` is cut hard.
pub fn split_long_text(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(max).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        if !current.is_empty() && current_len + line_len + 1 > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
