//! On-disk store in the classic `key=value` properties format.
//!
//! One record per line. Lines starting with `#` or `!` are comments.
//! Backslash escapes keep separators, line breaks and leading spaces inside
//! keys and values intact. The whole file is rewritten on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::{StoreError, UrlStore};

/// File-backed store, cached in memory.
pub struct PropertiesStore {
    path: PathBuf,
    urls: RwLock<BTreeMap<String, String>>,
}

impl PropertiesStore {
    /// Opens the store at `path`, loading it if the file exists.
    ///
    /// A missing file is an empty store; it is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let urls = match std::fs::read_to_string(&path) {
            Ok(content) => parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = urls.len(), "url store loaded");

        Ok(Self {
            path,
            urls: RwLock::new(urls),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `urls` to a sibling temp file, then renames it over the store.
    fn save(&self, urls: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, render(urls))?;

        // Restrict permissions on Unix: upload URLs often act as capabilities.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = %self.path.display(), entries = urls.len(), "url store saved");
        Ok(())
    }
}

impl UrlStore for PropertiesStore {
    fn put(&self, fingerprint: &str, url: &str) -> Result<(), StoreError> {
        let mut urls = self.urls.write().map_err(|_| StoreError::Poisoned)?;
        let mut updated = urls.clone();
        updated.insert(fingerprint.to_string(), url.to_string());
        self.save(&updated)?;
        *urls = updated;
        Ok(())
    }

    fn get(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        let urls = self.urls.read().map_err(|_| StoreError::Poisoned)?;
        Ok(urls.get(fingerprint).cloned())
    }

    fn remove(&self, fingerprint: &str) -> Result<(), StoreError> {
        let mut urls = self.urls.write().map_err(|_| StoreError::Poisoned)?;
        if !urls.contains_key(fingerprint) {
            return Ok(());
        }
        let mut updated = urls.clone();
        updated.remove(fingerprint);
        self.save(&updated)?;
        *urls = updated;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

fn render(urls: &BTreeMap<String, String>) -> String {
    let mut out = String::from("# tus upload locations\n");
    for (key, value) in urls {
        escape_into(&mut out, key, true);
        out.push('=');
        escape_into(&mut out, value, false);
        out.push('\n');
    }
    out
}

fn escape_into(out: &mut String, text: &str, is_key: bool) {
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '=' => out.push_str("\\="),
            ':' => out.push_str("\\:"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '#' | '!' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

fn parse(content: &str) -> BTreeMap<String, String> {
    let mut urls = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = split_entry(line);
        urls.insert(unescape(trim_unescaped_end(key)), unescape(value.trim_start()));
    }
    urls
}

/// Splits at the first unescaped `=` or `:`. A line without one is a key
/// with an empty value.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], &line[i + 1..]),
            _ => {}
        }
    }
    (line, "")
}

/// Trims trailing spaces that are not escaped with a backslash.
fn trim_unescaped_end(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == b' ' && !(end >= 2 && bytes[end - 2] == b'\\') {
        end -= 1;
    }
    &text[..end]
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
