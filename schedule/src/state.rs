//! Client state that survives restarts: tenant, resolved student, display
//! preferences and the last date range. Everything fetched from the gateway
//! is transient and never stored here.
use crate::cascade::ResolvedStudent;
use crate::timetable::{DateRange, ViewMode};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use shared::tenant::DEFAULT_TENANT_ID;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_ACCENT_COLOR: &str = "#1677ff";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid state file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid accent color '{0}', expected #rgb or #rrggbb")]
    InvalidAccentColor(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}', expected light or dark")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    theme: Theme,
    accent_color: String,
    tenant_id: String,
    student: Option<ResolvedStudent>,
    view_mode: ViewMode,
    date_range: Option<DateRange>,
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new(DEFAULT_TENANT_ID)
    }
}

impl AppState {
    pub fn new(tenant_id: &str) -> Self {
        AppState {
            theme: Theme::default(),
            accent_color: DEFAULT_ACCENT_COLOR.to_string(),
            tenant_id: tenant_id.to_string(),
            student: None,
            view_mode: ViewMode::default(),
            date_range: None,
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn accent_color(&self) -> &str {
        &self.accent_color
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn student(&self) -> Option<&ResolvedStudent> {
        self.student.as_ref()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    /// The stored range, or the default range for `now`.
    pub fn effective_range(&self, now: NaiveDateTime) -> DateRange {
        self.date_range
            .unwrap_or_else(|| DateRange::smart_default(now))
    }

    /// Switching to another tenant forgets the student, whose id is only
    /// meaningful for the tenant it was resolved against.
    pub fn set_tenant(&mut self, tenant_id: &str) -> bool {
        if self.tenant_id == tenant_id {
            return false;
        }
        self.tenant_id = tenant_id.to_string();
        self.student = None;
        true
    }

    pub fn set_student(&mut self, student: ResolvedStudent) {
        self.student = Some(student);
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn set_view_mode(&mut self, view_mode: ViewMode) {
        self.view_mode = view_mode;
    }

    pub fn set_date_range(&mut self, range: DateRange) {
        self.date_range = Some(range);
    }

    pub fn set_accent_color(&mut self, color: &str) -> Result<(), StateError> {
        if !is_hex_color(color) {
            return Err(StateError::InvalidAccentColor(color.to_string()));
        }
        self.accent_color = color.to_ascii_lowercase();
        Ok(())
    }

    // A hand-edited file can carry values the setters would refuse
    fn sanitize(mut self) -> Self {
        if !is_hex_color(&self.accent_color) {
            tracing::warn!(accent_color = %self.accent_color, "Ignoring invalid stored accent color");
            self.accent_color = DEFAULT_ACCENT_COLOR.to_string();
        }
        if self.tenant_id.is_empty() {
            self.tenant_id = DEFAULT_TENANT_ID.to_string();
            self.student = None;
        }
        self
    }
}

fn is_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => {
            matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

pub trait StateStore: Send + Sync {
    /// Returns None when nothing has been stored yet.
    fn load(&self) -> Result<Option<AppState>, StoreError>;
    fn store(&self, state: &AppState) -> Result<(), StoreError>;
}

// Keeps nothing. Used when persistence is disabled and in tests.
pub struct NoopStateStore;

impl StateStore for NoopStateStore {
    fn load(&self) -> Result<Option<AppState>, StoreError> {
        Ok(None)
    }

    fn store(&self, _state: &AppState) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct FilesystemStateStore {
    path: PathBuf,
}

impl FilesystemStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FilesystemStateStore {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StateStore for FilesystemStateStore {
    fn load(&self) -> Result<Option<AppState>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: AppState = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(state.sanitize()))
    }

    fn store(&self, state: &AppState) -> Result<(), StoreError> {
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;

        tracing::debug!(path = ?self.path, "Stored client state");
        Ok(())
    }
}
