//! Reply templates for the synthetic backends.
//!
//! Placeholders: `{name}` is the persona display name, `{trait}` the first
//! sentence of its instructions, `{message}` the caller's last message.

use super::synthetic::Intent;

#[derive(Debug)]
pub struct TemplateTable {
    entries: &'static [(Intent, &'static [&'static str])],
    fallback: &'static [&'static str],
}

impl TemplateTable {
    pub const fn new(
        entries: &'static [(Intent, &'static [&'static str])],
        fallback: &'static [&'static str],
    ) -> Self {
        Self { entries, fallback }
    }

    /// Templates for an intent; intents without an entry use the fallback.
    pub fn candidates(&self, intent: Intent) -> &'static [&'static str] {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == intent)
            .map(|(_, templates)| *templates)
            .unwrap_or(self.fallback)
    }
}

pub static VAPI: TemplateTable = TemplateTable::new(
    &[
        (
            Intent::Greeting,
            &["Hello! I'm {name}. {trait}. It's great to meet you! What would you like to know?"],
        ),
        (
            Intent::Question,
            &["That's a great question! As {name}, I'd say: {trait}. Based on your question about \"{message}\", I'm here to help provide insights and assistance."],
        ),
        (
            Intent::Farewell,
            &["It was wonderful chatting with you! I'm {name}, and I hope I was helpful. Feel free to come back anytime you need assistance!"],
        ),
    ],
    &["Thank you for sharing that with me! I'm {name}. {trait}. Regarding your message \"{message}\", I'm here to help and would love to discuss this further with you."],
);

pub static RETELL: TemplateTable = TemplateTable::new(
    &[
        (
            Intent::Help,
            &["I'm {name}, and I'm here to help! {trait}. You mentioned \"{message}\" - I'd be happy to assist you with whatever you need."],
        ),
        (
            Intent::Gratitude,
            &["You're very welcome! I'm {name}. {trait}. It's my pleasure to help, and I appreciate your kind words about \"{message}\"."],
        ),
        (
            Intent::Negative,
            &["I understand you're facing a challenge. As {name}, I want to help! {trait}. Let's work together to address \"{message}\"."],
        ),
    ],
    &["That's interesting! I'm {name}. {trait}. You mentioned \"{message}\" - I'd love to explore this topic further with you. What specific aspects would you like to discuss?"],
);

pub static BLAND: TemplateTable = TemplateTable::new(
    &[
        (
            Intent::Question,
            &["Great question! I'm {name}. {trait}. About your question \"{message}\" - I'm here to provide helpful insights and information."],
        ),
        (
            Intent::Positive,
            &["That's wonderful to hear! I'm {name}. {trait}. I'm glad you shared \"{message}\" with me. Positive energy is contagious!"],
        ),
        (
            Intent::Negative,
            &["I understand, and I'm here to help. I'm {name}. {trait}. Regarding \"{message}\", let's see how we can make things better together."],
        ),
    ],
    &["Thank you for sharing that! I'm {name}. {trait}. You mentioned \"{message}\" - I find that quite interesting and would love to continue our conversation about it."],
);

pub static FREE_FALLBACK: TemplateTable = TemplateTable::new(
    &[
        (
            Intent::Greeting,
            &["Hello there! I'm {name}. {trait}. I'm running in free mode today, but I'm still here to chat and help however I can. What's on your mind?"],
        ),
        (
            Intent::Question,
            &["That's a thoughtful question! As {name}, I'd say: {trait}. While I'm in free mode, I can still offer insights about \"{message}\". What specific aspects interest you most?"],
        ),
        (
            Intent::Negative,
            &["I appreciate you sharing your feelings with me. I'm {name}, and {trait}. Even in free mode, I want you to know that your emotions matter. Tell me more about \"{message}\"."],
        ),
        (
            Intent::Help,
            &["I'm here to help! I'm {name}. {trait}. Though I'm running in free mode, I'll do my best to assist with \"{message}\". Let's break this down together."],
        ),
        (
            Intent::Gratitude,
            &["Thank you so much! I'm {name}, and I really appreciate your kind words. {trait}. It means a lot, especially while running in free mode. How else can I help you today?"],
        ),
        (
            Intent::Positive,
            &["Thank you so much! I'm {name}, and I really appreciate your kind words. {trait}. It means a lot, especially while running in free mode. How else can I help you today?"],
        ),
    ],
    &[
        "That's really interesting! I'm {name}. {trait}. You mentioned \"{message}\" - I'd love to explore that topic further with you.",
        "I hear you! As {name}, I find your perspective fascinating. {trait}. Tell me more about \"{message}\".",
        "Thanks for sharing that with me! I'm {name}. {trait}. Your message about \"{message}\" has got me thinking. What's your take on it?",
    ],
);

/// Single-pass placeholder substitution, so values containing `{...}` are
/// never expanded a second time.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len() + 64);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];
        let replacement = tail.find('}').and_then(|end| {
            let key = &tail[1..end];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, end))
        });
        match replacement {
            Some((value, end)) => {
                output.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                output.push('{');
                rest = &tail[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_placeholders_once() {
        let rendered = render(
            "Hi {name}, you said \"{message}\" {unknown}",
            &[("name", "{message}"), ("message", "hello")],
        );
        assert_eq!(rendered, "Hi {message}, you said \"hello\" {unknown}");
    }

    #[test]
    fn tables_fall_back_for_missing_intents() {
        assert_eq!(RETELL.candidates(Intent::Greeting), RETELL.fallback);
        assert_eq!(FREE_FALLBACK.candidates(Intent::Statement).len(), 3);
        assert_eq!(VAPI.candidates(Intent::Farewell).len(), 1);
    }
}
