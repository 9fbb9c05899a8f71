use crate::event::Event;
use base64::{Engine, prelude::BASE64_STANDARD};
use bytes::Bytes;

/// How synthetic event bodies are built.
#[derive(Debug, Clone, Default)]
pub struct MessageTemplate {
    pub body: String,
    /// `key=value` entries attached to every event
    pub properties: Vec<String>,
    pub encode_base64: bool,
    /// Append a per-event sequence marker so bodies are distinguishable
    pub add_suffix: bool,
}

impl MessageTemplate {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }
}

/// Produces synthetic events from a template.
///
/// The suffix counter lives on the synthesizer, so suffixes are unique for
/// every event built by one instance.
pub struct EventSynthesizer {
    template: MessageTemplate,
    seq: u64,
}

impl EventSynthesizer {
    pub fn new(template: MessageTemplate) -> Self {
        Self { template, seq: 0 }
    }

    /// Build up to `limit` events, stopping early once `total_remaining` is reached.
    pub fn synthesize(&mut self, limit: u64, total_remaining: u64) -> Vec<Event> {
        let n = limit.min(total_remaining);
        (0..n).map(|_| self.next_event()).collect()
    }

    fn next_event(&mut self) -> Event {
        let body = if self.template.add_suffix {
            format!("{}-{}", self.template.body, self.seq)
        } else {
            self.template.body.clone()
        };
        self.seq += 1;

        let body = if self.template.encode_base64 {
            Bytes::from(BASE64_STANDARD.encode(body))
        } else {
            Bytes::from(body)
        };

        let mut event = Event::new(body);
        event.apply_properties(&self.template.properties);
        event
    }
}
