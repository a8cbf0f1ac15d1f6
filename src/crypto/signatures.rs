use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

use crate::audit::chain::digest_bytes;
use crate::error::GovernanceError;

/// secp256k1 ECDSA over approval payload digests.
///
/// Signatures travel as compact (64-byte) hex, public keys as compressed
/// (33-byte) hex.
pub struct SignatureManager {
    secp: Secp256k1<secp256k1::All>,
}

impl SignatureManager {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    pub fn generate_keypair(&self) -> (SecretKey, PublicKey) {
        self.secp.generate_keypair(&mut OsRng)
    }

    pub fn public_key_from_secret(&self, secret_key: &SecretKey) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, secret_key)
    }

    /// Sign a `sha256:<hex>` payload hash, returning compact hex
    pub fn sign_payload_hash(
        &self,
        payload_hash: &str,
        secret_key: &SecretKey,
    ) -> Result<String, GovernanceError> {
        let message = Self::message_for(payload_hash)?;
        let signature = self.secp.sign_ecdsa(&message, secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }

    pub fn verify_payload_signature(
        &self,
        payload_hash: &str,
        signature: &str,
        public_key: &str,
    ) -> Result<bool, GovernanceError> {
        let message = Self::message_for(payload_hash)?;

        let signature_bytes = hex::decode(signature)
            .map_err(|e| GovernanceError::CryptoError(format!("Invalid signature hex: {}", e)))?;
        let signature = Signature::from_compact(&signature_bytes).map_err(|e| {
            GovernanceError::CryptoError(format!("Invalid signature format: {}", e))
        })?;

        let public_key = Self::parse_public_key(public_key)?;

        match self.secp.verify_ecdsa(&message, &signature, &public_key) {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    pub fn parse_public_key(public_key: &str) -> Result<PublicKey, GovernanceError> {
        let public_key_bytes = hex::decode(public_key)
            .map_err(|e| GovernanceError::CryptoError(format!("Invalid public key hex: {}", e)))?;
        PublicKey::from_slice(&public_key_bytes)
            .map_err(|e| GovernanceError::CryptoError(format!("Invalid public key format: {}", e)))
    }

    pub fn encode_public_key(public_key: &PublicKey) -> String {
        hex::encode(public_key.serialize())
    }

    pub fn encode_secret_key(secret_key: &SecretKey) -> String {
        hex::encode(secret_key.secret_bytes())
    }

    pub fn parse_secret_key(secret_key: &str) -> Result<SecretKey, GovernanceError> {
        let bytes = hex::decode(secret_key.trim())
            .map_err(|e| GovernanceError::CryptoError(format!("Invalid secret key hex: {}", e)))?;
        SecretKey::from_slice(&bytes)
            .map_err(|e| GovernanceError::CryptoError(format!("Invalid secret key: {}", e)))
    }

    fn message_for(payload_hash: &str) -> Result<Message, GovernanceError> {
        let digest = digest_bytes(payload_hash).ok_or_else(|| {
            GovernanceError::CryptoError(format!("Malformed payload hash: {}", payload_hash))
        })?;
        Ok(Message::from_digest(digest))
    }
}

impl Default for SignatureManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::sha256_prefixed;

    #[test]
    fn test_sign_and_verify() {
        let manager = SignatureManager::new();
        let (secret_key, public_key) = manager.generate_keypair();
        let payload_hash = sha256_prefixed(b"{\"minutes_id\":1}");

        let signature = manager.sign_payload_hash(&payload_hash, &secret_key).unwrap();
        let public_hex = SignatureManager::encode_public_key(&public_key);

        assert!(manager
            .verify_payload_signature(&payload_hash, &signature, &public_hex)
            .unwrap());

        let other_hash = sha256_prefixed(b"{\"minutes_id\":2}");
        assert!(!manager
            .verify_payload_signature(&other_hash, &signature, &public_hex)
            .unwrap());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let manager = SignatureManager::new();
        let (secret_key, _) = manager.generate_keypair();
        let (_, other_public) = manager.generate_keypair();
        let payload_hash = sha256_prefixed(b"approval");

        let signature = manager.sign_payload_hash(&payload_hash, &secret_key).unwrap();
        let verified = manager
            .verify_payload_signature(
                &payload_hash,
                &signature,
                &SignatureManager::encode_public_key(&other_public),
            )
            .unwrap();
        assert!(!verified);
    }

    #[test]
    fn test_malformed_inputs() {
        let manager = SignatureManager::new();
        let payload_hash = sha256_prefixed(b"approval");
        assert!(manager
            .verify_payload_signature(&payload_hash, "zz", "02aa")
            .is_err());
        assert!(manager
            .verify_payload_signature("not-a-hash", "00", "02aa")
            .is_err());
    }

    #[test]
    fn test_secret_key_hex_round_trip() {
        let manager = SignatureManager::new();
        let (secret_key, _) = manager.generate_keypair();
        let encoded = SignatureManager::encode_secret_key(&secret_key);
        assert_eq!(SignatureManager::parse_secret_key(&encoded).unwrap(), secret_key);
    }
}
