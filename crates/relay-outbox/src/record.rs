//! The record held by every outbox.

use uuid::Uuid;

/// An accepted message and the identifier assigned to it on acceptance.
///
/// The default value (nil identifier, empty payload) doubles as the
/// "nothing there" sentinel returned by [`crate::Outbox::pop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: Uuid,
    pub payload: Vec<u8>,
}

impl MessageRecord {
    /// Create a record with an existing identifier.
    pub fn new(id: Uuid, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// True for the zero-value sentinel.
    pub fn is_zero(&self) -> bool {
        self.id.is_nil() && self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_zero() {
        let record = MessageRecord::default();
        assert!(record.is_zero());
        assert!(record.id.is_nil());
        assert!(record.payload.is_empty());
    }

    #[test]
    fn record_with_payload_is_not_zero() {
        let record = MessageRecord::new(Uuid::new_v4(), "hello");
        assert!(!record.is_zero());
        assert_eq!(record.payload, b"hello".to_vec());
    }

    #[test]
    fn nil_id_with_payload_is_not_zero() {
        let record = MessageRecord::new(Uuid::nil(), vec![1u8]);
        assert!(!record.is_zero());
    }
}
