//! Content-free request correlation for logs.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::models::{ChatTurn, ConversationMessage};

const SHORT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationFingerprint(String);

impl ConversationFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }
}

impl fmt::Display for ConversationFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

pub fn fingerprint_for(turn: &ChatTurn) -> ConversationFingerprint {
    let canonical = canonical_payload(turn);
    let digest = Sha256::digest(canonical.as_bytes());
    ConversationFingerprint(to_hex(digest.as_ref()))
}

fn canonical_payload(turn: &ChatTurn) -> String {
    let mut payload = String::new();
    payload.push_str(&turn.persona.display_name);
    payload.push('|');
    payload.push_str(&turn.persona.instructions);

    for message in turn.conversation.history() {
        append_message(&mut payload, message);
    }

    payload
}

fn append_message(buffer: &mut String, message: &ConversationMessage) {
    buffer.push('|');
    buffer.push_str(message.role.as_str());
    buffer.push(':');
    buffer.push_str(&message.content);
}

fn to_hex(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        encoded.push(nibble_to_hex(byte >> 4));
        encoded.push(nibble_to_hex(byte & 0x0f));
    }
    encoded
}

fn nibble_to_hex(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        10..=15 => (b'a' + (value - 10)) as char,
        _ => '0',
    }
}
