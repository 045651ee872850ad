//! Uploaded files and how they are folded into the conversation.
//!
//! Files live only for the duration of one request: the caller hands them
//! over at send time and they are dropped once the upstream request is built.

use std::path::Path;

use base64::Engine as _;
use bytes::Bytes;
use tracing::debug;

use crate::core::error::RelayError;
use crate::core::message::{ConversationHistory, ImageDetail, MessageContent};

pub const MAX_ATTACHMENTS: usize = 5;
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub bytes: Bytes,
}

/// Name, type and size of an attachment, without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: usize,
}

impl AttachedFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<Self, RelayError> {
        let name = name.into();
        let bytes = bytes.into();
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(RelayError::AttachmentTooLarge {
                name,
                size_bytes: bytes.len(),
            });
        }
        Ok(Self {
            name,
            mime_type: mime_type.into(),
            size_bytes: bytes.len(),
            bytes,
        })
    }

    /// Read a file from disk, guessing its type from the extension.
    pub async fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > MAX_ATTACHMENT_BYTES as u64 {
            return Err(format!(
                "{} is larger than {} MiB",
                path.display(),
                MAX_ATTACHMENT_BYTES / (1024 * 1024)
            )
            .into());
        }
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(name, mime_type, bytes)?)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn size_label(&self) -> String {
        size_label(self.size_bytes)
    }

    pub fn summary(&self) -> AttachmentSummary {
        AttachmentSummary {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// Size in kilobytes with two decimals, e.g. `1.50KB`.
pub fn size_label(size_bytes: usize) -> String {
    format!("{:.2}KB", size_bytes as f64 / 1024.0)
}

/// Client-side attachment tray, capped at [`MAX_ATTACHMENTS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentSet {
    files: Vec<AttachedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLimitReached;

impl std::fmt::Display for AttachmentLimitReached {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum {MAX_ATTACHMENTS} files allowed")
    }
}

impl std::error::Error for AttachmentLimitReached {}

impl AttachmentSet {
    pub fn try_add(&mut self, file: AttachedFile) -> Result<(), AttachmentLimitReached> {
        if self.files.len() >= MAX_ATTACHMENTS {
            return Err(AttachmentLimitReached);
        }
        self.files.push(file);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<AttachedFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn files(&self) -> &[AttachedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Hand the files over to the request builder, leaving the tray empty.
    pub fn take(&mut self) -> Vec<AttachedFile> {
        std::mem::take(&mut self.files)
    }

    /// Line appended to the user's visible message when files are sent.
    pub fn note(&self) -> Option<String> {
        if self.files.is_empty() {
            return None;
        }
        let names = self
            .files
            .iter()
            .map(|file| file.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("📎 Attached files: {names}"))
    }

    /// The user's text as it is recorded in the conversation, with the
    /// attachment note below it.
    pub fn annotate(&self, text: &str) -> String {
        match self.note() {
            Some(note) => format!("{text}\n\n{note}"),
            None => text.to_string(),
        }
    }
}

/// Fold attachments into the last message when it is a user turn.
///
/// Images become base64 image parts; anything else is announced with a text
/// note naming the file and its size. Attachments are dropped when the last
/// message is not from the user.
pub fn attach_to_history(history: &mut ConversationHistory, files: Vec<AttachedFile>) {
    if files.is_empty() {
        return;
    }

    let Some(last) = history.last_mut().filter(|msg| msg.role.is_user()) else {
        debug!(
            count = files.len(),
            "last message is not a user turn; dropping attachments"
        );
        return;
    };

    let placeholder = MessageContent::Text(String::new());
    let mut content = std::mem::replace(&mut last.content, placeholder).into_multimodal();
    for file in files {
        if file.is_image() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
            content.push_image(file.mime_type, encoded, ImageDetail::High);
        } else {
            content.append_text(&format!(
                "\n\n[Attached file: {} ({})]",
                file.name,
                size_label(file.size_bytes)
            ));
        }
    }
    last.content = MessageContent::Multimodal(content);
}
