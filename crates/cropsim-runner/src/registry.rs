//! Case discovery, creation and registration.

use crate::active_list::ActiveList;
use crate::case::{is_case_name, write_atomic, Case, OUTPUT_DIR, PARAMS_FILE};
use crate::config::DriverConfig;
use crate::error::{Result, RunnerError};
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Input category directories created for every new case.
pub const CASE_SUBDIRS: [&str; 10] = [
    "CLIM", "CROP", "SOIL", "IRRIG", "MANAGE", "GWT", "OFF", "OBS", OUTPUT_DIR, "params",
];

/// `(description, file, directory)` triples listed in a project descriptor.
const DESCRIPTOR_INPUTS: [(&str, &str, &str); 14] = [
    ("Climate data", "climate.TXT", "CLIM/"),
    ("Temperature data", "temperature.TXT", "CLIM/"),
    ("Reference evapotranspiration", "eto.TXT", "CLIM/"),
    ("Rainfall data", "rain.TXT", "CLIM/"),
    ("CO2 concentration", "co2.TXT", "CLIM/"),
    ("Calendar data", "calendar.TXT", "CLIM/"),
    ("Crop parameters", "crop.TXT", "CROP/"),
    ("Irrigation schedule", "irrigation.TXT", "IRRIG/"),
    ("Management practices", "management.TXT", "MANAGE/"),
    ("Soil profile", "soil.TXT", "SOIL/"),
    ("Groundwater data", "groundwater.TXT", "GWT/"),
    ("Initial soil water content", "swcini.TXT", "SOIL/"),
    ("Off-season data", "offseason.TXT", "OFF/"),
    ("Field observations", "observations.TXT", "OBS/"),
];

/// Render a project descriptor for `case_name`.
pub fn render_project_descriptor(case_name: &str, years: u32, start_year: i32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{case_name} - AquaCrop C++ Project");
    out.push_str("7.2\n");
    let _ = writeln!(out, "{start_year}");
    for _ in 0..3 {
        let _ = writeln!(out, "1\n{years}");
    }
    for (description, file, dir) in DESCRIPTOR_INPUTS {
        let _ = writeln!(out, "{description} for {case_name}\n{file}\n{dir}");
    }
    out
}

/// Attributes become `key=value` lines, so neither side may span lines and
/// the key may not contain the separator.
fn check_attribute(key: &str, value: &str) -> Result<()> {
    let key_trimmed = key.trim();
    let reason = if key_trimmed.is_empty() {
        Some("key is empty")
    } else if key_trimmed.starts_with('#') {
        Some("key would be read as a comment")
    } else if key.contains(['=', '\n', '\r']) {
        Some("key contains '=' or a line break")
    } else if value.contains(['\n', '\r']) {
        Some("value contains a line break")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RunnerError::InvalidAttribute {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Case registry rooted at the cases directory.
#[derive(Debug, Clone)]
pub struct CaseRegistry {
    cases_dir: PathBuf,
    active_list: ActiveList,
}

impl CaseRegistry {
    pub fn new(cases_dir: impl Into<PathBuf>, active_list: ActiveList) -> Self {
        Self {
            cases_dir: cases_dir.into(),
            active_list,
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(&config.cases_dir, ActiveList::new(&config.active_list))
    }

    pub fn cases_dir(&self) -> &Path {
        &self.cases_dir
    }

    pub fn active_list(&self) -> &ActiveList {
        &self.active_list
    }

    /// Case directories under the cases directory, sorted by name.
    ///
    /// A missing cases directory yields an empty list.
    pub fn discover(&self) -> Result<Vec<Case>> {
        let entries = match fs::read_dir(&self.cases_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.cases_dir.display(), "cases directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut roots: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let is_case = entry.file_name().to_str().is_some_and(is_case_name);
            if is_case && entry.path().is_dir() {
                roots.push(entry.path());
            }
        }
        roots.sort();

        let mut cases = Vec::with_capacity(roots.len());
        for root in roots {
            match Case::open(&root) {
                Ok(case) => cases.push(case),
                Err(e) => warn!(root = %root.display(), error = %e, "skipping unreadable case"),
            }
        }
        Ok(cases)
    }

    /// Open one case by directory name.
    pub fn open(&self, name: &str) -> Result<Case> {
        let root = self.case_root(name)?;
        if !root.is_dir() {
            return Err(RunnerError::CaseNotFound(root));
        }
        Case::open(root)
    }

    fn case_root(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single || !is_case_name(name) {
            return Err(RunnerError::InvalidCaseName(name.to_string()));
        }
        Ok(self.cases_dir.join(name))
    }

    /// Create the directory layout and initial parameter file for a new case.
    ///
    /// An existing empty directory is reused; a non-empty one is rejected
    /// with `AlreadyExists`.
    pub fn create_case(&self, name: &str, attributes: &[(&str, &str)]) -> Result<Case> {
        let root = self.case_root(name)?;
        for (key, value) in attributes {
            check_attribute(key, value)?;
        }
        if root.is_dir() && fs::read_dir(&root)?.next().is_some() {
            return Err(RunnerError::AlreadyExists(root));
        }

        for sub in CASE_SUBDIRS {
            fs::create_dir_all(root.join(sub))?;
        }

        let mut text = format!("# Parameters for {name}\n");
        for (key, value) in attributes {
            let _ = writeln!(text, "{}={}", key.trim(), value.trim());
        }
        let _ = writeln!(text, "created={}", Utc::now().to_rfc3339());
        write_atomic(&root.join(PARAMS_FILE), &text)?;

        info!(case = %name, root = %root.display(), "created case");
        Case::open(root)
    }

    /// Write `project.ACp` for `case`, replacing any previous descriptor.
    pub fn write_project_descriptor(
        &self,
        case: &Case,
        years: u32,
        start_year: i32,
    ) -> Result<PathBuf> {
        let path = case.descriptor();
        write_atomic(&path, &render_project_descriptor(&case.name, years, start_year))?;
        debug!(case = %case.name, path = %path.display(), "wrote project descriptor");
        Ok(path)
    }

    /// Append the case's descriptor to the active list.
    pub fn register(&self, case: &Case) -> Result<()> {
        let descriptor = case.descriptor();
        if !descriptor.is_file() {
            return Err(RunnerError::DescriptorNotFound(descriptor));
        }
        self.active_list.append(&case.list_entry())?;
        info!(case = %case.name, list = %self.active_list.path().display(), "registered case");
        Ok(())
    }

    /// Remove the case's descriptor from the active list.
    pub fn unregister(&self, case: &Case) -> Result<bool> {
        let removed = self.active_list.remove(&case.list_entry())?;
        if removed {
            info!(case = %case.name, list = %self.active_list.path().display(), "unregistered case");
        }
        Ok(removed)
    }
}
