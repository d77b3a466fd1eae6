//! Typed, reversible edits of line-oriented configuration files.
//!
//! Two edit shapes cover everything a site install touches:
//!
//! - `key = value` upserts in INI-like files such as `php.ini`, where a
//!   commented-out default (`;memory_limit = 128M`) is replaced in place;
//! - marker-delimited blocks (`# BEGIN siteprov` ... `# END siteprov`) whose
//!   body is owned entirely by siteprov.
//!
//! Applying an edit that is already in place leaves the file untouched.
//! Every applied edit returns a [`ConfigChange`] holding the previous
//! content, so it can be reverted byte for byte.

use crate::errors::ProvisionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Line comment syntax of a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStyle {
    /// `# comment` (nginx, shell).
    #[default]
    Hash,
    /// `; comment` (php.ini).
    Semicolon,
}

impl CommentStyle {
    /// The comment prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Hash => "#",
            Self::Semicolon => ";",
        }
    }
}

/// One edit of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigEdit {
    /// Sets `key = value`, replacing an existing or commented-out line.
    SetKey {
        /// Setting name.
        key: String,
        /// Setting value.
        value: String,
    },
    /// Replaces (or appends) the block between the `BEGIN`/`END` markers.
    UpsertBlock {
        /// Marker name.
        marker: String,
        /// Block body, without the marker lines.
        body: String,
    },
    /// Deletes the block between the `BEGIN`/`END` markers, markers included.
    RemoveBlock {
        /// Marker name.
        marker: String,
    },
}

impl ConfigEdit {
    /// Creates a key/value upsert.
    #[must_use]
    pub fn set_key(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::SetKey {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a block upsert.
    #[must_use]
    pub fn upsert_block(marker: impl Into<String>, body: impl Into<String>) -> Self {
        Self::UpsertBlock {
            marker: marker.into(),
            body: body.into(),
        }
    }
}

/// A configuration file that edits are applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    path: PathBuf,
    style: CommentStyle,
}

impl ConfigDocument {
    /// Creates a document with `#` comments.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            style: CommentStyle::Hash,
        }
    }

    /// Sets the comment style.
    #[must_use]
    pub const fn with_comment_style(mut self, style: CommentStyle) -> Self {
        self.style = style;
        self
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current content; `None` if the file does not exist.
    pub fn read(&self) -> Result<Option<String>, ProvisionError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Computes the content after `edits`, without writing anything.
    pub fn render(&self, content: &str, edits: &[ConfigEdit]) -> Result<String, ProvisionError> {
        edits.iter().try_fold(content.to_string(), |acc, edit| match edit {
            ConfigEdit::SetKey { key, value } => set_key(&acc, key, value),
            ConfigEdit::UpsertBlock { marker, body } => {
                upsert_block(&acc, self.style, marker, Some(body))
            }
            ConfigEdit::RemoveBlock { marker } => upsert_block(&acc, self.style, marker, None),
        })
    }

    /// Applies `edits` to the file.
    ///
    /// The file is written only if its content changes; a missing file is
    /// treated as empty and created.
    pub fn apply(&self, edits: &[ConfigEdit]) -> Result<ConfigChange, ProvisionError> {
        let previous = self.read()?;
        let current = previous.as_deref().unwrap_or("");
        let updated = self.render(current, edits)?;
        self.write_if_changed(previous, &updated)
    }

    /// Replaces the whole file with `content`, keeping the old content for
    /// [`ConfigChange::revert`].
    pub fn replace(&self, content: &str) -> Result<ConfigChange, ProvisionError> {
        let previous = self.read()?;
        self.write_if_changed(previous, content)
    }

    fn write_if_changed(
        &self,
        previous: Option<String>,
        updated: &str,
    ) -> Result<ConfigChange, ProvisionError> {
        if previous.as_deref() == Some(updated) {
            debug!(path = %self.path.display(), "Config already up to date");
            return Ok(ConfigChange {
                path: self.path.clone(),
                previous,
                changed: false,
            });
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, updated)?;
        debug!(path = %self.path.display(), "Config updated");
        Ok(ConfigChange {
            path: self.path.clone(),
            previous,
            changed: true,
        })
    }
}

/// The record of one applied set of edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    path: PathBuf,
    previous: Option<String>,
    changed: bool,
}

impl ConfigChange {
    /// The edited file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file was written.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.changed
    }

    /// Content before the edit; `None` if the file did not exist.
    #[must_use]
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Restores the previous content, deleting a file the edit created.
    pub fn revert(&self) -> Result<(), ProvisionError> {
        if !self.changed {
            return Ok(());
        }
        match &self.previous {
            Some(content) => fs::write(&self.path, content)?,
            None => match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        debug!(path = %self.path.display(), "Config change reverted");
        Ok(())
    }
}

fn split_lines(content: &str) -> (Vec<&str>, bool) {
    let trailing_newline = content.is_empty() || content.ends_with('\n');
    (content.lines().collect(), trailing_newline)
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    out
}

fn set_key(content: &str, key: &str, value: &str) -> Result<String, ProvisionError> {
    let escaped = regex::escape(key);
    let active = Regex::new(&format!(r"^\s*{escaped}\s*="))
        .map_err(|e| ProvisionError::step("config-edit", e.to_string()))?;
    let commented = Regex::new(&format!(r"^\s*[;#]+\s*{escaped}\s*="))
        .map_err(|e| ProvisionError::step("config-edit", e.to_string()))?;

    let (lines, trailing_newline) = split_lines(content);
    let wanted = format!("{key} = {value}");
    let mut out: Vec<String> = lines.iter().map(|l| (*l).to_string()).collect();

    let target = out
        .iter()
        .position(|l| active.is_match(l))
        .or_else(|| out.iter().position(|l| commented.is_match(l)));

    match target {
        Some(idx) => {
            let current = out[idx].split_once('=').map(|(_, v)| v.trim());
            if active.is_match(&out[idx]) && current == Some(value) {
                return Ok(content.to_string());
            }
            out[idx] = wanted;
        }
        None => out.push(wanted),
    }
    Ok(join_lines(&out, trailing_newline))
}

fn upsert_block(
    content: &str,
    style: CommentStyle,
    marker: &str,
    body: Option<&str>,
) -> Result<String, ProvisionError> {
    let begin = format!("{} BEGIN {marker}", style.prefix());
    let end = format!("{} END {marker}", style.prefix());

    let (lines, trailing_newline) = split_lines(content);
    let start = lines.iter().position(|l| l.trim() == begin);
    let stop = start.and_then(|s| {
        lines[s..]
            .iter()
            .position(|l| l.trim() == end)
            .map(|offset| s + offset)
    });

    let mut block: Vec<String> = Vec::new();
    if let Some(body) = body {
        block.push(begin.clone());
        block.extend(body.lines().map(str::to_string));
        block.push(end.clone());
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + block.len());
    match (start, stop) {
        (Some(s), Some(e)) => {
            out.extend(lines[..s].iter().map(|l| (*l).to_string()));
            out.extend(block);
            out.extend(lines[e + 1..].iter().map(|l| (*l).to_string()));
        }
        (Some(_), None) => {
            return Err(ProvisionError::step(
                "config-edit",
                format!("block '{marker}' has no '{end}' line"),
            ));
        }
        (None, _) => {
            out.extend(lines.iter().map(|l| (*l).to_string()));
            if !block.is_empty() {
                if out.last().is_some_and(|l| !l.trim().is_empty()) {
                    out.push(String::new());
                }
                out.extend(block);
            }
        }
    }

    let appended = start.is_none() && body.is_some();
    let rendered = join_lines(&out, trailing_newline || appended);
    if rendered == content {
        return Ok(content.to_string());
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PHP_INI: &str = "[PHP]\n;memory_limit = 128M\nupload_max_filesize = 2M\n";

    #[test]
    fn test_set_key_replaces_active_line() {
        let doc = ConfigDocument::new("php.ini").with_comment_style(CommentStyle::Semicolon);
        let out = doc
            .render(PHP_INI, &[ConfigEdit::set_key("upload_max_filesize", "64M")])
            .unwrap();
        assert_eq!(out, "[PHP]\n;memory_limit = 128M\nupload_max_filesize = 64M\n");
    }

    #[test]
    fn test_set_key_uncomments_default() {
        let doc = ConfigDocument::new("php.ini");
        let out = doc
            .render(PHP_INI, &[ConfigEdit::set_key("memory_limit", "256M")])
            .unwrap();
        assert_eq!(out, "[PHP]\nmemory_limit = 256M\nupload_max_filesize = 2M\n");
    }

    #[test]
    fn test_set_key_appends_missing() {
        let doc = ConfigDocument::new("php.ini");
        let out = doc
            .render(PHP_INI, &[ConfigEdit::set_key("max_execution_time", "300")])
            .unwrap();
        assert!(out.ends_with("upload_max_filesize = 2M\nmax_execution_time = 300\n"));
    }

    #[test]
    fn test_set_key_does_not_match_prefix() {
        let doc = ConfigDocument::new("php.ini");
        let out = doc
            .render("memory_limit_extra = 1\n", &[ConfigEdit::set_key("memory_limit", "256M")])
            .unwrap();
        assert_eq!(out, "memory_limit_extra = 1\nmemory_limit = 256M\n");
    }

    #[test]
    fn test_set_key_is_idempotent() {
        let doc = ConfigDocument::new("php.ini");
        let edits = [ConfigEdit::set_key("memory_limit", "256M")];
        let once = doc.render(PHP_INI, &edits).unwrap();
        let twice = doc.render(&once, &edits).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_upsert_block_appends_then_replaces() {
        let doc = ConfigDocument::new("hosts");
        let edit = ConfigEdit::upsert_block("blog", "127.0.0.1 blog.local");
        let once = doc.render("127.0.0.1 localhost\n", &[edit]).unwrap();
        assert_eq!(
            once,
            "127.0.0.1 localhost\n\n# BEGIN blog\n127.0.0.1 blog.local\n# END blog\n"
        );

        let twice = doc
            .render(&once, &[ConfigEdit::upsert_block("blog", "127.0.0.1 blog.local")])
            .unwrap();
        assert_eq!(once, twice);

        let changed = doc
            .render(&once, &[ConfigEdit::upsert_block("blog", "::1 blog.local")])
            .unwrap();
        assert!(changed.contains("# BEGIN blog\n::1 blog.local\n# END blog\n"));
        assert!(!changed.contains("127.0.0.1 blog.local"));
    }

    #[test]
    fn test_remove_block() {
        let doc = ConfigDocument::new("hosts");
        let content = "a\n# BEGIN blog\nb\n# END blog\nc\n";
        let out = doc
            .render(content, &[ConfigEdit::RemoveBlock { marker: "blog".into() }])
            .unwrap();
        assert_eq!(out, "a\nc\n");
    }

    #[test]
    fn test_unterminated_block_is_error() {
        let doc = ConfigDocument::new("hosts");
        let err = doc
            .render("# BEGIN blog\nb\n", &[ConfigEdit::upsert_block("blog", "x")])
            .unwrap_err();
        assert!(err.to_string().contains("# END blog"));
    }

    #[test]
    fn test_apply_and_revert_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("php.ini");
        fs::write(&path, PHP_INI).unwrap();
        let doc = ConfigDocument::new(&path).with_comment_style(CommentStyle::Semicolon);

        let change = doc.apply(&[ConfigEdit::set_key("memory_limit", "256M")]).unwrap();
        assert!(change.changed());
        assert!(fs::read_to_string(&path).unwrap().contains("memory_limit = 256M"));

        let again = doc.apply(&[ConfigEdit::set_key("memory_limit", "256M")]).unwrap();
        assert!(!again.changed());

        change.revert().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), PHP_INI);
    }

    #[test]
    fn test_revert_deletes_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.d/site.conf");
        let doc = ConfigDocument::new(&path);

        let change = doc.apply(&[ConfigEdit::upsert_block("blog", "x")]).unwrap();
        assert!(path.exists());
        assert!(change.previous().is_none());

        change.revert().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_replace_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.conf");
        fs::write(&path, "server {}\n").unwrap();
        let doc = ConfigDocument::new(&path);

        let change = doc.replace("# Managed\nserver {}\n").unwrap();
        assert!(change.changed());
        assert!(!doc.replace("# Managed\nserver {}\n").unwrap().changed());

        change.revert().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "server {}\n");
    }
}
