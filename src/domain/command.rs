//! Transfer Command
//!
//! The inbound command envelope and its validated form.
//! Envelopes arrive over the bus exactly as the upstream producer wrote
//! them; validation happens here, not in serde, so a malformed amount is a
//! rejectable command rather than a poison message.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::Amount;

/// Wire form of a transfer command.
///
/// `{messageId, correlationId, sourceAccountId, destinationAccountId,
/// amountMinorUnits}`. The amount is carried raw; see [`CommandEnvelope::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    /// Unique message identifier; the dedup key
    pub message_id: Uuid,

    /// Correlation id propagated into every emitted event
    pub correlation_id: Uuid,

    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,

    /// Raw amount; may be non-positive on a malformed command
    pub amount_minor_units: i64,
}

/// Validation failures for a command envelope.
/// All of these are permanent: the command is rejected, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Amount must be positive (got {0})")]
    NonPositiveAmount(i64),

    #[error("Source and destination accounts are identical")]
    SameAccount,
}

impl CommandEnvelope {
    pub fn new(
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount_minor_units: i64,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            source_account_id,
            destination_account_id,
            amount_minor_units,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Validate the envelope into a typed command.
    ///
    /// # Errors
    /// - `CommandError::NonPositiveAmount` for amount <= 0
    /// - `CommandError::SameAccount` for identical source/destination
    pub fn validate(&self) -> Result<TransferCommand, CommandError> {
        if self.source_account_id == self.destination_account_id {
            return Err(CommandError::SameAccount);
        }

        let amount = Amount::new(self.amount_minor_units)
            .map_err(|_| CommandError::NonPositiveAmount(self.amount_minor_units))?;

        Ok(TransferCommand {
            message_id: self.message_id,
            correlation_id: self.correlation_id,
            source_account_id: self.source_account_id,
            destination_account_id: self.destination_account_id,
            amount,
        })
    }

    /// SHA-256 fingerprint of the envelope contents.
    ///
    /// Detects a reused message id carrying a different payload, which
    /// must be rejected rather than answered with the stored outcome.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.message_id.as_bytes());
        hasher.update(self.correlation_id.as_bytes());
        hasher.update(self.source_account_id.as_bytes());
        hasher.update(self.destination_account_id.as_bytes());
        hasher.update(self.amount_minor_units.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A validated transfer command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let envelope = CommandEnvelope::new(Uuid::new_v4(), Uuid::new_v4(), 500);
        let command = envelope.validate().unwrap();

        assert_eq!(command.message_id, envelope.message_id);
        assert_eq!(command.amount.minor_units(), 500);
    }

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        let envelope = CommandEnvelope::new(Uuid::new_v4(), Uuid::new_v4(), 0);
        assert_eq!(
            envelope.validate(),
            Err(CommandError::NonPositiveAmount(0))
        );

        let envelope = CommandEnvelope::new(Uuid::new_v4(), Uuid::new_v4(), -42);
        assert_eq!(
            envelope.validate(),
            Err(CommandError::NonPositiveAmount(-42))
        );
    }

    #[test]
    fn test_validate_rejects_same_account() {
        let account = Uuid::new_v4();
        let envelope = CommandEnvelope::new(account, account, 100);
        assert_eq!(envelope.validate(), Err(CommandError::SameAccount));
    }

    #[test]
    fn test_fingerprint_changes_with_payload() {
        let envelope = CommandEnvelope::new(Uuid::new_v4(), Uuid::new_v4(), 100);
        let fp = envelope.fingerprint();
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, envelope.fingerprint());

        // Same message id, different amount: different fingerprint
        let mut tampered = envelope.clone();
        tampered.amount_minor_units = 200;
        assert_ne!(fp, tampered.fingerprint());
    }

    #[test]
    fn test_envelope_wire_format() {
        let envelope = CommandEnvelope::new(Uuid::new_v4(), Uuid::new_v4(), 500);
        let json = serde_json::to_value(&envelope).unwrap();

        assert!(json.get("messageId").is_some());
        assert!(json.get("correlationId").is_some());
        assert!(json.get("sourceAccountId").is_some());
        assert!(json.get("destinationAccountId").is_some());
        assert_eq!(json["amountMinorUnits"], 500);
    }
}
