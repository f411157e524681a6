//! INI/CFG file source.
//!
//! No INI crate is part of our stack, so the de facto dialect is parsed
//! by hand: `[section]` headers, `key = value` or `key: value` pairs,
//! `;`/`#` comments, and a `DEFAULT` section whose keys every other
//! section inherits. Values are coerced to booleans, integers or floats
//! where they parse as such.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use strata_core::{
    mtime_fingerprint, parse_bool_str, ConfigSource, Fingerprint, MetadataHandle, SourceMetadata,
};
use tracing::{debug, warn};

use crate::text::{file_available, file_size, read_utf8};

pub struct IniSource {
    path: PathBuf,
    section: Option<String>,
    handle: MetadataHandle,
}

impl IniSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let handle = MetadataHandle::new("ini", path.display().to_string());
        Self {
            path,
            section: None,
            handle,
        }
    }

    /// Restrict loading to a single section, producing a flat mapping.
    pub fn section(mut self, name: impl Into<String>) -> Self {
        self.section = Some(name.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Coerce an INI value string: booleans, then integers, then floats,
/// otherwise the raw string.
fn coerce_ini_value(raw: &str) -> Value {
    if let Some(b) = parse_bool_str(raw) {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

struct ParsedIni {
    defaults: Map<String, Value>,
    sections: Vec<(String, Map<String, Value>)>,
}

fn parse_ini(text: &str) -> Result<ParsedIni, String> {
    let mut defaults = Map::new();
    let mut sections: Vec<(String, Map<String, Value>)> = Vec::new();
    let mut current: Option<usize> = None;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated section header at line {}", line_no + 1))?
                .trim();
            if name.is_empty() {
                return Err(format!("empty section name at line {}", line_no + 1));
            }
            if name.eq_ignore_ascii_case("DEFAULT") {
                current = None;
            } else {
                let position = sections.iter().position(|(n, _)| n == name);
                current = Some(position.unwrap_or_else(|| {
                    sections.push((name.to_string(), Map::new()));
                    sections.len() - 1
                }));
            }
            continue;
        }

        let split_at = line
            .char_indices()
            .find(|(_, c)| *c == '=' || *c == ':')
            .map(|(i, _)| i)
            .ok_or_else(|| format!("expected 'key = value' at line {}", line_no + 1))?;
        let key = line[..split_at].trim();
        let value = line[split_at + 1..].trim();
        if key.is_empty() {
            return Err(format!("empty key at line {}", line_no + 1));
        }

        let target = match current {
            Some(index) => &mut sections[index].1,
            None => &mut defaults,
        };
        target.insert(key.to_lowercase(), coerce_ini_value(value));
    }

    Ok(ParsedIni { defaults, sections })
}

impl ParsedIni {
    /// Section content with DEFAULT keys inherited.
    fn section(&self, name: &str) -> Option<Map<String, Value>> {
        let (_, own) = self.sections.iter().find(|(n, _)| n == name)?;
        let mut merged = self.defaults.clone();
        for (k, v) in own {
            merged.insert(k.clone(), v.clone());
        }
        Some(merged)
    }

    /// All sections as a nested mapping, `DEFAULT` included when
    /// present.
    fn nested(&self) -> Map<String, Value> {
        let mut result = Map::new();
        for (name, _) in &self.sections {
            if let Some(section) = self.section(name) {
                result.insert(name.clone(), Value::Object(section));
            }
        }
        if !self.defaults.is_empty() {
            result.insert("DEFAULT".to_string(), Value::Object(self.defaults.clone()));
        }
        result
    }
}

#[async_trait]
impl ConfigSource for IniSource {
    fn kind(&self) -> &'static str {
        "ini"
    }

    fn origin(&self) -> String {
        match &self.section {
            Some(section) => format!("{}#{section}", self.path.display()),
            None => self.path.display().to_string(),
        }
    }

    fn is_available(&self) -> bool {
        file_available(&self.path)
    }

    async fn load(&self) -> Map<String, Value> {
        let Some(text) = read_utf8(&self.path, &["ini", "cfg"], &self.handle) else {
            return Map::new();
        };
        if text.trim().is_empty() {
            self.handle
                .record_success(Some(&self.fingerprint().await), Some(0));
            return Map::new();
        }

        let parsed = match parse_ini(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to parse INI source");
                self.handle.record_failure(format!("INI parse error: {err}"));
                return Map::new();
            }
        };

        let map = match &self.section {
            Some(name) => parsed.section(name).unwrap_or_default(),
            None => parsed.nested(),
        };
        debug!(path = %self.path.display(), keys = map.len(), "loaded INI source");
        self.handle
            .record_success(Some(&self.fingerprint().await), file_size(&self.path));
        map
    }

    async fn fingerprint(&self) -> Fingerprint {
        mtime_fingerprint(&self.path)
    }

    fn metadata(&self) -> SourceMetadata {
        self.handle.snapshot()
    }
}
