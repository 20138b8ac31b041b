//! Mapping between domain events and stored items.

use std::sync::Arc;

use chronicle_core::DomainEvent;

use crate::cipher::Cipher;
use crate::compressor::Compressor;
use crate::error::PersistenceError;
use crate::item::{Notification, StoredItem};
use crate::transcoder::Transcoder;

/// Converts events to opaque stored items and back.
///
/// Write pipeline: serialize → compress (if configured) → encrypt (if
/// configured). Reads reverse the pipeline exactly, so a store written with
/// one configuration must be read with the same one.
pub struct Mapper<E> {
    transcoder: Arc<dyn Transcoder<E>>,
    compressor: Option<Arc<dyn Compressor>>,
    cipher: Option<Arc<dyn Cipher>>,
}

impl<E: DomainEvent> Mapper<E> {
    pub fn new(transcoder: Arc<dyn Transcoder<E>>) -> Self {
        Self {
            transcoder,
            compressor: None,
            cipher: None,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Serialize an event into its stored form.
    pub fn to_stored(&self, event: &E) -> Result<StoredItem, PersistenceError> {
        let mut state = self.transcoder.encode(event)?;
        if let Some(compressor) = &self.compressor {
            state = compressor.compress(&state)?;
        }
        if let Some(cipher) = &self.cipher {
            state = cipher.encrypt(&state)?;
        }
        Ok(StoredItem {
            originator_id: event.originator_id(),
            originator_version: event.originator_version(),
            topic: event.topic().to_string(),
            state,
        })
    }

    /// Reconstruct an event from its stored form.
    pub fn from_stored(&self, item: &StoredItem) -> Result<E, PersistenceError> {
        let mut state = item.state.clone();
        if let Some(cipher) = &self.cipher {
            state = cipher.decrypt(&state)?;
        }
        if let Some(compressor) = &self.compressor {
            state = compressor.decompress(&state)?;
        }
        Ok(self.transcoder.decode(&item.topic, &state)?)
    }

    /// Reconstruct an event from a notification.
    pub fn from_notification(&self, notification: &Notification) -> Result<E, PersistenceError> {
        self.from_stored(&notification.as_item())
    }
}

impl<E> Clone for Mapper<E> {
    fn clone(&self) -> Self {
        Self {
            transcoder: Arc::clone(&self.transcoder),
            compressor: self.compressor.clone(),
            cipher: self.cipher.clone(),
        }
    }
}

impl<E> core::fmt::Debug for Mapper<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mapper")
            .field("compressed", &self.compressor.is_some())
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::AesGcmCipher;
    use crate::compressor::ZlibCompressor;
    use crate::transcoder::JsonTranscoder;
    use chrono::{DateTime, Utc};
    use chronicle_core::{AggregateId, Version};
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Noted {
        originator_id: AggregateId,
        originator_version: Version,
        at: DateTime<Utc>,
        text: String,
    }

    impl DomainEvent for Noted {
        fn originator_id(&self) -> AggregateId {
            self.originator_id
        }

        fn originator_version(&self) -> Version {
            self.originator_version
        }

        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }

        fn topic(&self) -> &str {
            "test.noted"
        }
    }

    fn noted(text: &str) -> Noted {
        Noted {
            originator_id: AggregateId::new(),
            originator_version: 1,
            at: Utc::now(),
            text: text.to_string(),
        }
    }

    fn plain_mapper() -> Mapper<Noted> {
        Mapper::new(Arc::new(JsonTranscoder::new()))
    }

    #[test]
    fn round_trips_plain() {
        let mapper = plain_mapper();
        let event = noted("hello");
        let item = mapper.to_stored(&event).unwrap();
        assert_eq!(item.topic, "test.noted");
        assert_eq!(item.originator_version, 1);
        assert_eq!(mapper.from_stored(&item).unwrap(), event);
    }

    #[test]
    fn round_trips_with_compression_and_encryption() {
        let mapper = plain_mapper()
            .with_compressor(Arc::new(ZlibCompressor::new()))
            .with_cipher(Arc::new(AesGcmCipher::new(&[3u8; 32]).unwrap()));
        let event = noted(&"important ".repeat(50));
        let item = mapper.to_stored(&event).unwrap();
        // Ciphertext must not contain the serialized payload.
        assert!(!item
            .state
            .windows(9)
            .any(|w| w == b"important"));
        assert_eq!(mapper.from_stored(&item).unwrap(), event);
    }

    #[test]
    fn reading_encrypted_state_without_cipher_fails() {
        let writing = plain_mapper().with_cipher(Arc::new(AesGcmCipher::new(&[3u8; 32]).unwrap()));
        let item = writing.to_stored(&noted("secret")).unwrap();
        assert!(plain_mapper().from_stored(&item).is_err());
    }

    #[test]
    fn notification_decodes_like_item() {
        let mapper = plain_mapper();
        let event = noted("notify");
        let item = mapper.to_stored(&event).unwrap();
        let notification = crate::item::Notification::from_item(1, item);
        assert_eq!(mapper.from_notification(&notification).unwrap(), event);
    }

    proptest! {
        #[test]
        fn round_trips_any_text_in_any_configuration(
            text in ".{0,200}",
            compressed in any::<bool>(),
            encrypted in any::<bool>(),
        ) {
            let mut mapper = plain_mapper();
            if compressed {
                mapper = mapper.with_compressor(Arc::new(ZlibCompressor::new()));
            }
            if encrypted {
                mapper = mapper.with_cipher(Arc::new(AesGcmCipher::new(&[9u8; 32]).unwrap()));
            }
            let event = noted(&text);
            let item = mapper.to_stored(&event).unwrap();
            prop_assert_eq!(mapper.from_stored(&item).unwrap(), event);
        }
    }
}
