use serde::{Deserialize, Serialize};

use crate::api::{ApiContent, ApiContentPart, ApiImageUrl, ApiMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        mime_type: String,
        base64_data: String,
        #[serde(default)]
        detail: ImageDetail,
    },
}

/// Ordered content parts. Element 0 is always a text part, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ContentPart>", into = "Vec<ContentPart>")]
pub struct MultimodalContent {
    parts: Vec<ContentPart>,
}

impl MultimodalContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn text(&self) -> &str {
        match self.parts.first() {
            Some(ContentPart::Text { text }) => text,
            _ => "",
        }
    }

    pub fn append_text(&mut self, extra: &str) {
        if let Some(ContentPart::Text { text }) = self.parts.first_mut() {
            text.push_str(extra);
        }
    }

    pub fn push_image(&mut self, mime_type: String, base64_data: String, detail: ImageDetail) {
        self.parts.push(ContentPart::Image {
            mime_type,
            base64_data,
            detail,
        });
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, ContentPart::Image { .. }))
            .count()
    }
}

impl From<Vec<ContentPart>> for MultimodalContent {
    fn from(mut parts: Vec<ContentPart>) -> Self {
        if !matches!(parts.first(), Some(ContentPart::Text { .. })) {
            parts.insert(0, ContentPart::Text {
                text: String::new(),
            });
        }
        Self { parts }
    }
}

impl From<MultimodalContent> for Vec<ContentPart> {
    fn from(value: MultimodalContent) -> Self {
        value.parts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Multimodal(MultimodalContent),
}

impl MessageContent {
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Multimodal(content) => content.text(),
        }
    }

    pub fn into_multimodal(self) -> MultimodalContent {
        match self {
            MessageContent::Text(text) => MultimodalContent::new(text),
            MessageContent::Multimodal(content) => content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Provider representation; images become base64 data URLs.
    pub fn to_api(&self) -> ApiMessage {
        let content = match &self.content {
            MessageContent::Text(text) => ApiContent::Text(text.clone()),
            MessageContent::Multimodal(content) => ApiContent::Parts(
                content
                    .parts()
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => ApiContentPart::Text { text: text.clone() },
                        ContentPart::Image {
                            mime_type,
                            base64_data,
                            detail,
                        } => ApiContentPart::ImageUrl {
                            image_url: ApiImageUrl {
                                url: format!("data:{mime_type};base64,{base64_data}"),
                                detail: *detail,
                            },
                        },
                    })
                    .collect(),
            ),
        };

        ApiMessage {
            role: self.role.as_str().to_string(),
            content,
        }
    }
}

/// Chronological chat history. Callers can only append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages.last_mut()
    }

    pub fn to_api(&self) -> Vec<ApiMessage> {
        self.messages.iter().map(ChatMessage::to_api).collect()
    }

    /// Plain-text export: `ROLE: content` blocks separated by rules.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|msg| format!("{}: {}", msg.role.as_str().to_uppercase(), msg.content.text()))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

impl From<Vec<ChatMessage>> for ConversationHistory {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}
