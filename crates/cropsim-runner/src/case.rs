//! A case: one named simulation scenario on disk.

use crate::error::Result;
use cropsim_core::ParameterKey;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Required case-name prefix, compared case-insensitively.
pub const CASE_PREFIX: &str = "case-";
/// Project descriptor file name inside a case directory.
pub const DESCRIPTOR_FILE: &str = "project.ACp";
/// Parameter file name; looked up at the case root, then under `params/`.
pub const PARAMS_FILE: &str = "params.txt";

pub const OUTPUT_DIR: &str = "output";
pub const RESULT_FILE: &str = "result.txt";
pub const LOG_FILE: &str = "run.log";

/// Whether `name` follows the case naming convention.
pub fn is_case_name(name: &str) -> bool {
    name.get(..CASE_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CASE_PREFIX))
}

/// Parse `key=value` lines. Blank lines, `#` comments and lines without `=`
/// are skipped; the last occurrence of a key wins.
pub fn parse_parameters(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Read a text file, replacing bytes that are not valid UTF-8.
fn read_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Replace `path` in one rename so readers never observe a partial file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Rewrite `text` so that `key` holds `value`, or is gone when `value` is
/// `None`. Comments and unrelated lines are kept in place.
fn rewrite_parameter(text: &str, key: &str, value: Option<&str>) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut written = false;
    for line in text.lines() {
        let trimmed = line.trim();
        let matches_key = !trimmed.starts_with('#')
            && trimmed
                .split_once('=')
                .is_some_and(|(k, _)| k.trim() == key);
        if !matches_key {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        if let (Some(v), false) = (value, written) {
            out.push_str(&format!("{key}={v}\n"));
            written = true;
        }
    }
    if let (Some(v), false) = (value, written) {
        out.push_str(&format!("{key}={v}\n"));
    }
    out
}

/// A case directory and its parsed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub name: String,
    pub root: PathBuf,
    pub parameters: BTreeMap<String, String>,
}

impl Case {
    /// Open the case at `root`, loading its parameter file if it has one.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parameters = Self::load_parameters(&root)?;
        Ok(Case {
            name,
            root,
            parameters,
        })
    }

    /// Parameters from the case's parameter file; empty when there is none.
    pub fn load_parameters(root: &Path) -> Result<BTreeMap<String, String>> {
        match Self::existing_param_file(root) {
            Some(path) => Ok(parse_parameters(&read_lossy(&path)?)),
            None => Ok(BTreeMap::new()),
        }
    }

    fn existing_param_file(root: &Path) -> Option<PathBuf> {
        [root.join(PARAMS_FILE), root.join("params").join(PARAMS_FILE)]
            .into_iter()
            .find(|p| p.is_file())
    }

    /// Parameter file to read and write.
    pub fn param_file(&self) -> PathBuf {
        Self::existing_param_file(&self.root).unwrap_or_else(|| self.root.join(PARAMS_FILE))
    }

    pub fn descriptor(&self) -> PathBuf {
        self.root.join(DESCRIPTOR_FILE)
    }

    /// Active-list line naming this case, relative to the cases directory.
    pub fn list_entry(&self) -> String {
        format!("{}/{}", self.name, DESCRIPTOR_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn result_path(&self) -> PathBuf {
        self.output_dir().join(RESULT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir().join(LOG_FILE)
    }

    /// Raw stored value, `None` when the file does not mention the key.
    pub fn raw_parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Typed lookup, falling back to the key's default.
    pub fn parameter(&self, key: ParameterKey) -> &str {
        key.get(&self.parameters)
    }

    /// Validate, store and persist a known parameter.
    pub fn set_parameter(&mut self, key: ParameterKey, value: &str) -> Result<()> {
        key.set(&mut self.parameters, value)?;
        let stored = self.parameters.get(key.name()).cloned();
        self.persist_parameter(key.name(), stored.as_deref())
    }

    /// Put `key` back to a previously captured raw value, removing it when
    /// it was absent.
    pub fn restore_parameter(&mut self, key: &str, original: Option<&str>) -> Result<()> {
        match original {
            Some(value) => {
                self.parameters.insert(key.to_string(), value.to_string());
            }
            None => {
                self.parameters.remove(key);
            }
        }
        self.persist_parameter(key, original)
    }

    fn persist_parameter(&self, key: &str, value: Option<&str>) -> Result<()> {
        let path = self.param_file();
        let current = match read_lossy(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        write_atomic(&path, &rewrite_parameter(&current, key, value))?;
        Ok(())
    }
}
