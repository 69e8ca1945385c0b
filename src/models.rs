use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Raw `/api/chat` body. Fields stay loosely typed so that shape errors
/// surface as validation failures instead of extractor rejections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Value>,
    #[serde(default)]
    pub bot_personality: Option<Value>,
    #[serde(default)]
    pub bot_name: Option<Value>,
    #[serde(default)]
    pub preferred_service: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid messages format")]
    InvalidMessages,
    #[error("Bot personality and name are required")]
    MissingPersona,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub display_name: String,
    pub instructions: String,
}

impl Persona {
    pub fn new(display_name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            instructions: instructions.into(),
        }
    }

    /// First sentence of the instructions, used by the synthetic replies.
    pub fn leading_trait(&self) -> &str {
        self.instructions
            .split('.')
            .next()
            .unwrap_or_default()
            .trim()
    }

    pub fn system_prompt(&self) -> String {
        let name = &self.display_name;
        format!(
            "You are {name}, an AI assistant with the following personality and instructions: {}\n\n\
             Key guidelines:\n\
             - Stay in character based on the personality description\n\
             - Be helpful, engaging, and conversational\n\
             - Keep responses concise but informative (under 150 words)\n\
             - Adapt your tone to match the personality given\n\
             - If asked about your identity, refer to yourself as {name}",
            self.instructions
        )
    }
}

/// Caller history with exactly one persona system message in front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn with_persona(history: Vec<ConversationMessage>, persona: &Persona) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ConversationMessage::new(
            Role::System,
            persona.system_prompt(),
        ));
        messages.extend(history);
        Self { messages }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.messages[1..]
    }

    pub fn last_message(&self) -> &str {
        self.history()
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }
}

/// A validated request, ready for routing.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub request_id: String,
    pub persona: Persona,
    pub conversation: Conversation,
    pub preferred_service: Option<String>,
}

impl ChatRequest {
    pub fn into_turn(self) -> Result<ChatTurn, ValidationError> {
        let Some(Value::Array(items)) = self.messages else {
            return Err(ValidationError::InvalidMessages);
        };
        if items.is_empty() {
            return Err(ValidationError::InvalidMessages);
        }
        let history = items
            .into_iter()
            .map(serde_json::from_value::<ConversationMessage>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ValidationError::InvalidMessages)?;

        let (Some(instructions), Some(display_name)) = (
            non_blank(self.bot_personality),
            non_blank(self.bot_name),
        ) else {
            return Err(ValidationError::MissingPersona);
        };

        let persona = Persona {
            display_name,
            instructions,
        };
        Ok(ChatTurn {
            request_id: format!("req_{}", Uuid::new_v4()),
            conversation: Conversation::with_persona(history, &persona),
            persona,
            preferred_service: non_blank(self.preferred_service),
        })
    }
}

fn non_blank(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub configured: bool,
    pub available_services: Vec<String>,
    pub service_status: BTreeMap<String, bool>,
    pub primary_service: String,
}
