use async_trait::async_trait;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::debug;

use crate::{
    backend::{
        templates::{self, TemplateTable},
        BackendError, BackendResult, ChatBackend,
    },
    config::Credential,
    models::{Conversation, Persona},
};

const GREETING_WORDS: &[&str] = &["hello", "hi", "hey", "greetings", "howdy"];
const GREETING_PHRASES: &[&str] = &["good morning", "good afternoon", "good evening"];
const FAREWELL_WORDS: &[&str] = &["bye", "goodbye", "farewell", "goodnight"];
const FAREWELL_PHRASES: &[&str] = &["see you", "talk later"];
const QUESTION_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];
const HELP_WORDS: &[&str] = &["help", "assist", "problem", "issue", "trouble", "stuck"];
const GRATITUDE_WORDS: &[&str] = &["thank", "thanks", "appreciate", "grateful"];
const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "awful",
    "horrible",
    "sad",
    "disappointed",
    "upset",
    "angry",
];
const POSITIVE_WORDS: &[&str] = &[
    "good",
    "great",
    "awesome",
    "wonderful",
    "excellent",
    "amazing",
    "happy",
    "love",
];

/// Keyword bucket of a caller message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Greeting,
    Farewell,
    Question,
    Help,
    Gratitude,
    Negative,
    Positive,
    Statement,
}

/// Shared by every synthetic backend. Buckets are tried in declaration
/// order of [`Intent`]; matching is on whole words.
pub fn classify(message: &str) -> Intent {
    let lower = message.to_lowercase();
    let words = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    let has_word = |bucket: &[&str]| words.iter().any(|word| bucket.contains(word));
    let has_phrase = |bucket: &[&str]| bucket.iter().any(|phrase| lower.contains(phrase));

    if has_word(GREETING_WORDS) || has_phrase(GREETING_PHRASES) {
        Intent::Greeting
    } else if has_word(FAREWELL_WORDS) || has_phrase(FAREWELL_PHRASES) {
        Intent::Farewell
    } else if lower.trim_end().ends_with('?')
        || words
            .first()
            .is_some_and(|first| QUESTION_WORDS.contains(first))
    {
        Intent::Question
    } else if has_word(HELP_WORDS) {
        Intent::Help
    } else if has_word(GRATITUDE_WORDS) {
        Intent::Gratitude
    } else if has_word(NEGATIVE_WORDS) {
        Intent::Negative
    } else if has_word(POSITIVE_WORDS) {
        Intent::Positive
    } else {
        Intent::Statement
    }
}

#[derive(Debug, Clone, Copy)]
enum Availability {
    Always,
    Credential(Credential),
}

/// A backend that composes replies locally from a template table.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    name: String,
    templates: &'static TemplateTable,
    availability: Availability,
    greets_opening_turn: bool,
    seed: Option<u64>,
}

impl SyntheticBackend {
    pub fn vapi() -> Self {
        Self::gated(
            "Vapi",
            &templates::VAPI,
            Credential::new("VAPI_API_KEY", "your-vapi-api-key-here"),
        )
    }

    pub fn retell() -> Self {
        Self::gated(
            "Retell",
            &templates::RETELL,
            Credential::new("RETELL_API_KEY", "your-retell-api-key-here"),
        )
    }

    pub fn bland() -> Self {
        Self::gated(
            "Bland",
            &templates::BLAND,
            Credential::new("BLAND_API_KEY", "your-bland-api-key-here"),
        )
    }

    /// Always available. The opening turn of a conversation is answered
    /// with a greeting whatever it says.
    pub fn free_fallback() -> Self {
        Self {
            name: "Free Fallback".to_owned(),
            templates: &templates::FREE_FALLBACK,
            availability: Availability::Always,
            greets_opening_turn: true,
            seed: None,
        }
    }

    fn gated(name: &str, templates: &'static TemplateTable, credential: Credential) -> Self {
        Self {
            name: name.to_owned(),
            templates,
            availability: Availability::Credential(credential),
            greets_opening_turn: false,
            seed: None,
        }
    }

    /// Fixes the template pick when a bucket offers several candidates.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn compose(&self, message: &str, persona: &Persona) -> Result<String, BackendError> {
        self.compose_for(classify(message), message, persona)
    }

    fn intent_for(&self, conversation: &Conversation) -> Intent {
        if self.greets_opening_turn && conversation.history().len() <= 1 {
            Intent::Greeting
        } else {
            classify(conversation.last_message())
        }
    }

    fn compose_for(
        &self,
        intent: Intent,
        message: &str,
        persona: &Persona,
    ) -> Result<String, BackendError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let template = self
            .templates
            .candidates(intent)
            .choose(&mut rng)
            .ok_or_else(|| {
                BackendError::InvalidResponse(format!("{} has no template for {intent:?}", self.name))
            })?;

        debug!(backend = %self.name, intent = ?intent, "synthetic reply composed");
        Ok(templates::render(
            template,
            &[
                ("name", persona.display_name.as_str()),
                ("trait", persona.leading_trait()),
                ("message", message),
            ],
        ))
    }
}

#[async_trait]
impl ChatBackend for SyntheticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        match &self.availability {
            Availability::Always => true,
            Availability::Credential(credential) => credential.is_present(),
        }
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        persona: &Persona,
    ) -> Result<BackendResult, BackendError> {
        let intent = self.intent_for(conversation);
        let reply = self.compose_for(intent, conversation.last_message(), persona)?;
        Ok(BackendResult::CompletePayload(reply))
    }
}
