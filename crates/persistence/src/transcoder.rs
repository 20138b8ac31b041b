//! Event state serialization (C1 contract plus the JSON implementation).

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure to encode or decode event state.
#[derive(Debug, Error)]
pub enum TranscoderError {
    /// A topic has no registered decoder and no fallback applies.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode failed for topic '{topic}': {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Encodes events of one family to bytes and back.
///
/// Decode dispatches on the stored topic string. The topic → type mapping
/// must be stable across every process reading the same store.
pub trait Transcoder<E>: Send + Sync {
    fn encode(&self, event: &E) -> Result<Vec<u8>, TranscoderError>;

    fn decode(&self, topic: &str, state: &[u8]) -> Result<E, TranscoderError>;
}

type Decoder<E> = Box<dyn Fn(&[u8]) -> Result<E, TranscoderError> + Send + Sync>;

/// Explicit topic → decoder map.
///
/// Resolution is a plain map lookup; nothing is discovered at runtime.
/// Registering decoders is only needed when stored state does not carry
/// enough information for serde to pick the variant itself.
pub struct TopicRegistry<E> {
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E> TopicRegistry<E> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        topic: &'static str,
        decoder: impl Fn(&[u8]) -> Result<E, TranscoderError> + Send + Sync + 'static,
    ) {
        self.decoders.insert(topic, Box::new(decoder));
    }

    pub fn resolve(&self, topic: &str) -> Option<&Decoder<E>> {
        self.decoders.get(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl<E> Default for TopicRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> core::fmt::Debug for TopicRegistry<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("topics", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// JSON transcoder over serde.
///
/// Per-type transcodings (UUIDs as hyphenated strings, timestamps as RFC
/// 3339, decimals as strings) are expressed through the serde derives on the
/// event types themselves. With an empty registry, decode deserializes the
/// full event directly; with registered topics, decode resolves the topic
/// first and fails with [`TranscoderError::UnknownTopic`] on a miss.
#[derive(Debug)]
pub struct JsonTranscoder<E> {
    registry: TopicRegistry<E>,
}

impl<E> JsonTranscoder<E> {
    pub fn new() -> Self {
        Self {
            registry: TopicRegistry::new(),
        }
    }

    pub fn with_registry(registry: TopicRegistry<E>) -> Self {
        Self { registry }
    }
}

impl<E> Default for JsonTranscoder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Transcoder<E> for JsonTranscoder<E>
where
    E: Serialize + DeserializeOwned + Send + Sync,
{
    fn encode(&self, event: &E) -> Result<Vec<u8>, TranscoderError> {
        serde_json::to_vec(event).map_err(TranscoderError::Encode)
    }

    fn decode(&self, topic: &str, state: &[u8]) -> Result<E, TranscoderError> {
        if self.registry.is_empty() {
            return serde_json::from_slice(state).map_err(|e| TranscoderError::Decode {
                topic: topic.to_string(),
                source: e,
            });
        }
        match self.registry.resolve(topic) {
            Some(decoder) => decoder(state),
            None => Err(TranscoderError::UnknownTopic(topic.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Greeting {
        Hello { name: String },
        Goodbye { name: String },
    }

    #[test]
    fn encodes_and_decodes_without_registry() {
        let transcoder = JsonTranscoder::<Greeting>::new();
        let event = Greeting::Hello {
            name: "alice".into(),
        };
        let bytes = transcoder.encode(&event).unwrap();
        let decoded = transcoder.decode("greeting.hello", &bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn registry_resolves_by_topic() {
        let mut registry = TopicRegistry::new();
        registry.register("greeting.hello", |state: &[u8]| {
            serde_json::from_slice(state).map_err(|e| TranscoderError::Decode {
                topic: "greeting.hello".to_string(),
                source: e,
            })
        });
        let transcoder = JsonTranscoder::with_registry(registry);

        let event = Greeting::Hello { name: "bob".into() };
        let bytes = transcoder.encode(&event).unwrap();
        assert_eq!(
            transcoder.decode("greeting.hello", &bytes).unwrap(),
            event
        );
    }

    #[test]
    fn unknown_topic_is_an_error_once_registered() {
        let mut registry = TopicRegistry::<Greeting>::new();
        registry.register("greeting.hello", |state: &[u8]| {
            serde_json::from_slice(state).map_err(|e| TranscoderError::Decode {
                topic: "greeting.hello".to_string(),
                source: e,
            })
        });
        let transcoder = JsonTranscoder::with_registry(registry);

        let err = transcoder.decode("greeting.unknown", b"{}").unwrap_err();
        assert!(matches!(err, TranscoderError::UnknownTopic(t) if t == "greeting.unknown"));
    }

    #[test]
    fn malformed_state_fails_to_decode() {
        let transcoder = JsonTranscoder::<Greeting>::new();
        assert!(transcoder.decode("greeting.hello", b"not json").is_err());
    }
}
