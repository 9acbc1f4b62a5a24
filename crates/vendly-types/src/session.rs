//! Transport credential state and the encrypted envelope it is stored in.
//!
//! `CredentialState` carries binary key material that must survive
//! JSON-based storage, so binary fields round-trip through a tagged
//! base64 representation (`{"$bytes": "<base64>"}`) instead of JSON arrays.
//! `SealedEnvelope` is the versioned authenticated-encryption envelope the
//! session store persists; it is opaque to every component except the store.

use serde::{Deserialize, Serialize};

/// Serialized transport credentials for one account.
///
/// Opaque to the connection manager; produced and consumed by the transport
/// implementation, persisted (encrypted) by the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    /// Whether this account has completed pairing at least once.
    pub registered: bool,
    /// Long-lived cryptographic key material (identity/noise keys).
    #[serde(with = "tagged_bytes")]
    pub key_material: Vec<u8>,
    /// Per-session signed key blob.
    #[serde(with = "tagged_bytes")]
    pub session_keys: Vec<u8>,
    /// Server-issued token, if any.
    pub server_token: Option<String>,
    /// Paired device identifier, if any.
    pub device_id: Option<String>,
}

impl CredentialState {
    /// A fresh, unpaired credential state.
    pub fn fresh() -> Self {
        Self::default()
    }

    /// True when nothing has been paired yet.
    pub fn is_fresh(&self) -> bool {
        !self.registered && self.key_material.is_empty()
    }
}

/// Versioned authenticated-encryption envelope: random nonce + ciphertext.
///
/// The AES-GCM authentication tag is appended to the ciphertext by the
/// cipher; it is verified on open and never handled separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    /// Envelope format version. Currently always 1.
    pub version: u8,
    #[serde(with = "tagged_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "tagged_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Tagged base64 serde representation for binary fields.
///
/// Serializes `Vec<u8>` as `{"$bytes": "<base64>"}` so binary credential
/// material survives JSON storage without corruption, and so a human
/// inspecting stored rows can tell binary fields apart from plain strings.
pub mod tagged_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        #[serde(rename = "$bytes")]
        data: String,
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        Tagged {
            data: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let tagged = Tagged::deserialize(deserializer)?;
        STANDARD
            .decode(tagged.data.as_bytes())
            .map_err(|e| D::Error::custom(format!("invalid base64 payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state() {
        let state = CredentialState::fresh();
        assert!(state.is_fresh());
        assert!(!state.registered);
        assert!(state.key_material.is_empty());
    }

    #[test]
    fn test_credential_state_json_roundtrip_with_binary() {
        let state = CredentialState {
            registered: true,
            key_material: vec![0x00, 0x01, 0xFF, 0xFE, 0x7F, 0x80],
            session_keys: (0..=255).collect(),
            server_token: Some("tok-123".to_string()),
            device_id: Some("device:4".to_string()),
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: CredentialState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_binary_fields_use_tagged_base64() {
        let state = CredentialState {
            registered: false,
            key_material: vec![0xDE, 0xAD],
            session_keys: Vec::new(),
            server_token: None,
            device_id: None,
        };

        let value: serde_json::Value = serde_json::to_value(&state).unwrap();
        assert!(value["key_material"].get("$bytes").is_some());
        assert_eq!(value["key_material"]["$bytes"], "3q0=");
    }

    #[test]
    fn test_sealed_envelope_roundtrip() {
        let envelope = SealedEnvelope {
            version: 1,
            nonce: vec![0u8; 12],
            ciphertext: vec![1, 2, 3, 4],
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let back: SealedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let json = r#"{"registered":false,"key_material":{"$bytes":"!!!"},"session_keys":{"$bytes":""},"server_token":null,"device_id":null}"#;
        let result: Result<CredentialState, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
