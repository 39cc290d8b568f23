//! Capabilities the host provides to the plugin manager.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::tty::IsTty;

/// Re-activates the plugin set after files changed on disk.
#[async_trait]
pub trait ReloadHook: Send + Sync {
    async fn reload(&self) -> Result<()>;
}

/// Displays (or replaces) the current status text.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn update(&self, text: &str) -> Result<()>;
}

/// A plugin file handed over by the user instead of a catalog name.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn attachment(&self) -> Result<Option<Attachment>>;
}

/// Runs the configured shell command, if any.
#[derive(Debug, Clone, Default)]
pub struct ShellReload {
    command: Option<String>,
}

impl ShellReload {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command: command.filter(|command| !command.trim().is_empty()),
        }
    }
}

#[async_trait]
impl ReloadHook for ShellReload {
    async fn reload(&self) -> Result<()> {
        let Some(command) = self.command.as_deref() else {
            tracing::info!("plugins changed; no reload command configured");
            return Ok(());
        };

        tracing::info!("running reload command: {command}");
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await
            .with_context(|| format!("spawn reload command `{command}`"))?;

        if !status.success() {
            bail!("reload command `{command}` exited with {status}");
        }
        Ok(())
    }
}

/// Terminal sink. Single-line updates overwrite each other in place when
/// stdout is a terminal.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    inline: AtomicBool,
}

#[async_trait]
impl ProgressSink for ConsoleSink {
    async fn update(&self, text: &str) -> Result<()> {
        let mut out = io::stdout();
        let single_line = !text.contains('\n');
        let was_inline = self.inline.load(Ordering::Relaxed);

        if single_line && out.is_tty() {
            queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(text))?;
            self.inline.store(true, Ordering::Relaxed);
        } else {
            if was_inline {
                queue!(out, Print("\n"))?;
            }
            queue!(out, Print(text), Print("\n"))?;
            self.inline.store(false, Ordering::Relaxed);
        }

        out.flush()?;
        Ok(())
    }
}

/// Attachment read from a local path given on the command line.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    path: Option<PathBuf>,
}

impl FileAttachment {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AttachmentSource for FileAttachment {
    async fn attachment(&self) -> Result<Option<Attachment>> {
        let Some(path) = self.path.as_ref() else {
            return Ok(None);
        };

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;

        Ok(Some(Attachment { file_name, bytes }))
    }
}
