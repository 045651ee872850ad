//! Chat widget state as a plain value and one reducer over named actions.
//!
//! Front ends translate gestures (clicks, drags, file pickers) into
//! [`WidgetAction`]s, feed them to [`update`], and carry out the returned
//! [`Effect`]s: sending a chat request or saving the persisted blob.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::attachments::{AttachedFile, AttachmentSet};
use crate::core::message::ConversationHistory;

/// Storage key for the persisted blob.
pub const STATE_KEY: &str = "ai-chatbot-state";

pub const MIN_WIDTH: u32 = 320;
pub const MIN_HEIGHT: u32 = 400;
pub const DEFAULT_WIDTH: u32 = 400;
pub const DEFAULT_HEIGHT: u32 = 600;

const NOTICE_TTL_SECS: i64 = 5;

/// Shown when a request could not be sent at all.
pub const SEND_FAILED_NOTICE: &str = "Failed to send message. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Window placement. Unset fields mean the default corner placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Geometry {
    fn size(&self) -> (u32, u32) {
        (
            self.width.unwrap_or(DEFAULT_WIDTH),
            self.height.unwrap_or(DEFAULT_HEIGHT),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A transient error message shown inline, never part of the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetState {
    pub open: bool,
    pub theme: Theme,
    pub geometry: Geometry,
    pub loading: bool,
    pub attachments: AttachmentSet,
    pub notices: Vec<Notice>,
    /// Time of the last tick; new notices expire relative to it.
    pub clock: DateTime<Utc>,
}

impl WidgetState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            open: false,
            theme: Theme::default(),
            geometry: Geometry::default(),
            loading: false,
            attachments: AttachmentSet::default(),
            notices: Vec::new(),
            clock: now,
        }
    }

    /// Apply a saved blob. A position without `left` is ignored as a whole.
    pub fn restored(mut self, saved: &PersistedState) -> Self {
        self.theme = saved.theme;
        if saved.position.left.is_some() {
            self.geometry = saved.position;
        }
        self
    }

    pub fn persisted(&self) -> PersistedState {
        PersistedState {
            theme: self.theme,
            position: self.geometry,
        }
    }

    fn push_notice(&mut self, message: impl Into<String>) {
        self.notices.push(Notice {
            message: message.into(),
            expires_at: self.clock + Duration::seconds(NOTICE_TTL_SECS),
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetAction {
    Toggle,
    Open,
    Close,
    ToggleTheme,
    MoveTo {
        left: i32,
        top: i32,
        viewport: Viewport,
    },
    ResizeTo {
        width: u32,
        height: u32,
    },
    AttachFiles(Vec<AttachedFile>),
    RemoveAttachment(usize),
    SubmitStarted {
        text: String,
    },
    ReplyFinished,
    ReplyFailed {
        message: String,
    },
    Tick {
        now: DateTime<Utc>,
    },
}

/// A user message ready to be appended to the history and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub text: String,
    pub attachments: Vec<AttachedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(Outgoing),
    Persist(PersistedState),
}

pub fn update(state: &WidgetState, action: WidgetAction) -> (WidgetState, Vec<Effect>) {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match action {
        WidgetAction::Toggle => next.open = !next.open,
        WidgetAction::Open => next.open = true,
        WidgetAction::Close => next.open = false,
        WidgetAction::ToggleTheme => {
            next.theme = next.theme.toggled();
            effects.push(Effect::Persist(next.persisted()));
        }
        WidgetAction::MoveTo {
            left,
            top,
            viewport,
        } => {
            let (width, height) = next.geometry.size();
            let max_left = viewport.width as i32 - width as i32;
            let max_top = viewport.height as i32 - height as i32;
            next.geometry.left = Some(left.min(max_left).max(0));
            next.geometry.top = Some(top.min(max_top).max(0));
            effects.push(Effect::Persist(next.persisted()));
        }
        WidgetAction::ResizeTo { width, height } => {
            next.geometry.width = Some(width.max(MIN_WIDTH));
            next.geometry.height = Some(height.max(MIN_HEIGHT));
            effects.push(Effect::Persist(next.persisted()));
        }
        WidgetAction::AttachFiles(files) => {
            let mut rejected = None;
            for file in files {
                if let Err(err) = next.attachments.try_add(file) {
                    rejected = Some(err.to_string());
                }
            }
            if let Some(message) = rejected {
                next.push_notice(message);
            }
        }
        WidgetAction::RemoveAttachment(index) => {
            next.attachments.remove(index);
        }
        WidgetAction::SubmitStarted { text } => {
            let text = text.trim();
            if next.loading || (text.is_empty() && next.attachments.is_empty()) {
                debug!(loading = next.loading, "submit ignored");
                return (next, effects);
            }
            let text = next.attachments.annotate(text);
            next.loading = true;
            effects.push(Effect::Send(Outgoing {
                text,
                attachments: next.attachments.take(),
            }));
        }
        WidgetAction::ReplyFinished => next.loading = false,
        WidgetAction::ReplyFailed { message } => {
            next.loading = false;
            next.push_notice(message);
        }
        WidgetAction::Tick { now } => {
            next.clock = now;
            next.notices.retain(|notice| notice.expires_at > now);
        }
    }

    (next, effects)
}

/// The blob saved under [`STATE_KEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub position: Geometry,
}

impl PersistedState {
    pub fn load(store: &dyn StateStore) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        match store.load(STATE_KEY)? {
            Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<(), Box<dyn std::error::Error>> {
        store.save(STATE_KEY, &serde_json::to_string(self)?)
    }
}

/// Key/value storage for small JSON blobs.
pub trait StateStore {
    fn load(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error>>;
    fn save(&self, key: &str, blob: &str) -> Result<(), Box<dyn std::error::Error>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let entries = self.entries.lock().map_err(|e| e.to_string())?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut entries = self.entries.lock().map_err(|e| e.to_string())?;
        entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The per-user data directory, when one can be determined.
    pub fn in_data_dir() -> Option<Self> {
        ProjectDirs::from("org", "chatbot-relay", "chatbot-relay")
            .map(|dirs| Self::new(dirs.data_dir()))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), Box<dyn std::error::Error>> {
        fs::create_dir_all(&self.dir)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(blob.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
        Ok(())
    }
}

/// `chat-YYYY-MM-DD.txt`
pub fn transcript_file_name(date: NaiveDate) -> String {
    format!("chat-{}.txt", date.format("%Y-%m-%d"))
}

/// Write the plain-text transcript into `dir` and return the file's path.
pub fn save_transcript(
    history: &ConversationHistory,
    dir: &Path,
    date: NaiveDate,
) -> std::io::Result<PathBuf> {
    let path = dir.join(transcript_file_name(date));
    fs::write(&path, history.transcript())?;
    Ok(path)
}
