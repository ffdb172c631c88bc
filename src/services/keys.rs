use age::armor::{ArmoredReader, ArmoredWriter, Format};
use age::secrecy::ExposeSecret;
use age::x25519;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::ProfileId;
use crate::services::store::ProfileStore;

/// Smallest padded frame
const MIN_BUCKET: usize = 256;
/// Above this size frames grow in whole multiples of it
const LARGE_BUCKET: usize = 64 * 1024;
const LENGTH_PREFIX: usize = 4;

/// Key material handed to the caller that requested generation.
///
/// The private key exists only in this value; the store keeps the public half.
#[derive(Clone)]
pub struct KeyPair {
    pub profile_id: ProfileId,
    pub key_id: uuid::Uuid,
    pub public_key: String,
    pub private_key: String,
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("profile_id", &self.profile_id)
            .field("key_id", &self.key_id)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("version", &self.version)
            .finish()
    }
}

/// Ciphertext produced for a stored recipient
#[derive(Debug, Clone)]
pub struct SealedMessage {
    pub recipient_id: ProfileId,
    pub ciphertext: String,
    pub key_version: u32,
}

/// Profile record sealed as JSON
#[derive(Debug, Clone)]
pub struct EncryptedProfile {
    pub profile_id: ProfileId,
    pub ciphertext: String,
    /// Version of the profile's own key, when that key was used
    pub key_version: Option<u32>,
}

/// Per-profile X25519 keys and age encryption
pub struct KeyManager {
    store: Arc<ProfileStore>,
    max_payload_bytes: usize,
}

impl KeyManager {
    pub fn new(store: Arc<ProfileStore>, max_payload_bytes: usize) -> Self {
        Self {
            store,
            max_payload_bytes,
        }
    }

    /// Generate a key pair for `profile_id`.
    ///
    /// Fails with `KeyAlreadyExists` when the profile already has a key and
    /// `rotate` is false. Rotation replaces the public key for new messages;
    /// ciphertexts sealed earlier still need the old private key.
    pub async fn generate_keypair(
        &self,
        profile_id: ProfileId,
        rotate: bool,
    ) -> Result<KeyPair, CoreError> {
        let identity = x25519::Identity::generate();
        let public_key = identity.to_public().to_string();

        let version = self
            .store
            .set_public_key(profile_id, public_key.clone(), rotate)
            .await?;

        let key_pair = KeyPair {
            profile_id,
            key_id: uuid::Uuid::new_v4(),
            public_key,
            private_key: identity.to_string().expose_secret().to_string(),
            version,
            created_at: chrono::Utc::now(),
        };

        tracing::info!(
            "Generated key {} (version {}) for profile {}",
            key_pair.key_id,
            version,
            profile_id
        );

        Ok(key_pair)
    }

    /// Encrypt `payload` for an age X25519 recipient. Output is ASCII-armored.
    pub fn encrypt(&self, payload: &[u8], recipient_public_key: &str) -> Result<String, CoreError> {
        if payload.len() > self.max_payload_bytes {
            return Err(CoreError::Validation(format!(
                "payload of {} bytes exceeds limit of {}",
                payload.len(),
                self.max_payload_bytes
            )));
        }

        let recipient = x25519::Recipient::from_str(recipient_public_key.trim())
            .map_err(|_| CoreError::Validation("invalid recipient public key".to_string()))?;

        let framed = pad(payload);

        let encryptor =
            age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
                .map_err(|e| CoreError::Encryption(e.to_string()))?;

        let mut encrypted = Vec::new();
        {
            let armor_writer = ArmoredWriter::wrap_output(&mut encrypted, Format::AsciiArmor)
                .map_err(|e| CoreError::Encryption(e.to_string()))?;
            let mut writer = encryptor
                .wrap_output(armor_writer)
                .map_err(|e| CoreError::Encryption(e.to_string()))?;
            writer
                .write_all(&framed)
                .map_err(|e| CoreError::Encryption(e.to_string()))?;
            writer
                .finish()
                .and_then(|armor| armor.finish())
                .map_err(|e| CoreError::Encryption(e.to_string()))?;
        }

        String::from_utf8(encrypted).map_err(|e| CoreError::Encryption(e.to_string()))
    }

    /// Decrypt an armored ciphertext.
    ///
    /// Every failure, whether a wrong key, tampering or a malformed frame,
    /// surfaces as the same `DecryptionFailed`.
    pub fn decrypt(&self, ciphertext: &str, private_key: &str) -> Result<Vec<u8>, CoreError> {
        let identity = x25519::Identity::from_str(private_key.trim())
            .map_err(|_| CoreError::DecryptionFailed)?;

        let decryptor = age::Decryptor::new(ArmoredReader::new(ciphertext.as_bytes()))
            .map_err(|_| CoreError::DecryptionFailed)?;

        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(|_| CoreError::DecryptionFailed)?;

        let mut framed = Vec::new();
        reader
            .read_to_end(&mut framed)
            .map_err(|_| CoreError::DecryptionFailed)?;

        unpad(&framed).ok_or(CoreError::DecryptionFailed)
    }

    /// Encrypt for the recipient profile's current public key
    pub async fn seal_for(
        &self,
        recipient_id: ProfileId,
        payload: &[u8],
    ) -> Result<SealedMessage, CoreError> {
        let recipient = self.store.get_profile(recipient_id).await?;
        let public_key = recipient
            .public_key
            .as_deref()
            .ok_or(CoreError::MissingPublicKey(recipient_id))?;

        let ciphertext = self.encrypt(payload, public_key)?;

        tracing::debug!(
            "Sealed message for profile {} with key version {}",
            recipient_id,
            recipient.key_version
        );

        Ok(SealedMessage {
            recipient_id,
            ciphertext,
            key_version: recipient.key_version,
        })
    }

    /// Encrypt the stored profile as JSON.
    ///
    /// Uses `public_key` when given, else the profile's own key
    /// (`MissingPublicKey` when it has none).
    pub async fn encrypt_profile(
        &self,
        profile_id: ProfileId,
        public_key: Option<&str>,
    ) -> Result<EncryptedProfile, CoreError> {
        let profile = self.store.get_profile(profile_id).await?;

        let (recipient, key_version) = match public_key {
            Some(key) => (key.to_string(), None),
            None => match &profile.public_key {
                Some(key) => (key.clone(), Some(profile.key_version)),
                None => return Err(CoreError::MissingPublicKey(profile_id)),
            },
        };

        let payload =
            serde_json::to_vec(&profile).map_err(|e| CoreError::Encryption(e.to_string()))?;
        let ciphertext = self.encrypt(&payload, &recipient)?;

        tracing::info!(
            "Encrypted profile {} ({} bytes of JSON)",
            profile_id,
            payload.len()
        );

        Ok(EncryptedProfile {
            profile_id,
            ciphertext,
            key_version,
        })
    }
}

/// Padded frame size for a payload of `len` bytes
pub fn bucket_size(len: usize) -> usize {
    let framed = len + LENGTH_PREFIX;
    if framed <= MIN_BUCKET {
        MIN_BUCKET
    } else if framed <= LARGE_BUCKET {
        framed.next_power_of_two()
    } else {
        framed.div_ceil(LARGE_BUCKET) * LARGE_BUCKET
    }
}

/// Big-endian length prefix, payload, zero fill up to the bucket
fn pad(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(bucket_size(payload.len()));
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed.resize(bucket_size(payload.len()), 0);
    framed
}

fn unpad(framed: &[u8]) -> Option<Vec<u8>> {
    let prefix: [u8; LENGTH_PREFIX] = framed.get(..LENGTH_PREFIX)?.try_into().ok()?;
    let len = u32::from_be_bytes(prefix) as usize;
    framed
        .get(LENGTH_PREFIX..LENGTH_PREFIX + len)
        .map(|payload| payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewProfile;
    use crate::privacy::{Sanitizer, SanitizerConfig};
    use crate::services::store::PiiPolicy;

    fn manager() -> (KeyManager, Arc<ProfileStore>) {
        let store = Arc::new(ProfileStore::new(
            Arc::new(Sanitizer::new(SanitizerConfig::default())),
            PiiPolicy::Redact,
        ));
        (KeyManager::new(store.clone(), 64 * 1024), store)
    }

    async fn profile(store: &ProfileStore) -> ProfileId {
        store
            .create_profile(NewProfile {
                display_name: "keyholder".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn test_bucket_sizes() {
        assert_eq!(bucket_size(0), 256);
        assert_eq!(bucket_size(252), 256);
        assert_eq!(bucket_size(253), 512);
        assert_eq!(bucket_size(5000), 8192);
        assert_eq!(bucket_size(LARGE_BUCKET), 2 * LARGE_BUCKET);
    }

    #[test]
    fn test_pad_unpad() {
        let framed = pad(b"hello");
        assert_eq!(framed.len(), 256);
        assert_eq!(unpad(&framed).unwrap(), b"hello");
        assert!(unpad(&[0, 0, 1, 0, 1]).is_none());
    }

    #[tokio::test]
    async fn test_generate_twice_without_rotate_fails() {
        let (keys, store) = manager();
        let id = profile(&store).await;

        let first = keys.generate_keypair(id, false).await.unwrap();
        assert!(first.private_key.starts_with("AGE-SECRET-KEY-1"));
        assert!(first.public_key.starts_with("age1"));
        assert_eq!(first.version, 1);

        assert!(matches!(
            keys.generate_keypair(id, false).await,
            Err(CoreError::KeyAlreadyExists(_))
        ));

        let rotated = keys.generate_keypair(id, true).await.unwrap();
        assert_eq!(rotated.version, 2);
        assert_ne!(rotated.public_key, first.public_key);
    }

    #[tokio::test]
    async fn test_round_trip_and_wrong_key() {
        let (keys, store) = manager();
        let alice = profile(&store).await;
        let bob = profile(&store).await;
        let alice_keys = keys.generate_keypair(alice, false).await.unwrap();
        let bob_keys = keys.generate_keypair(bob, false).await.unwrap();

        let ciphertext = keys.encrypt(b"meet at the trailhead", &alice_keys.public_key).unwrap();
        assert!(ciphertext.starts_with("-----BEGIN AGE ENCRYPTED FILE-----"));

        let plaintext = keys.decrypt(&ciphertext, &alice_keys.private_key).unwrap();
        assert_eq!(plaintext, b"meet at the trailhead");

        assert!(matches!(
            keys.decrypt(&ciphertext, &bob_keys.private_key),
            Err(CoreError::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_rotation_keeps_old_ciphertexts_on_old_key() {
        let (keys, store) = manager();
        let id = profile(&store).await;
        let old = keys.generate_keypair(id, false).await.unwrap();
        let sealed = keys.seal_for(id, b"before rotation").await.unwrap();
        assert_eq!(sealed.key_version, 1);

        let new = keys.generate_keypair(id, true).await.unwrap();
        assert_eq!(keys.decrypt(&sealed.ciphertext, &old.private_key).unwrap(), b"before rotation");
        assert!(keys.decrypt(&sealed.ciphertext, &new.private_key).is_err());

        let resealed = keys.seal_for(id, b"after rotation").await.unwrap();
        assert_eq!(resealed.key_version, 2);
    }

    #[tokio::test]
    async fn test_seal_for_without_key() {
        let (keys, store) = manager();
        let id = profile(&store).await;
        assert!(matches!(
            keys.seal_for(id, b"hi").await,
            Err(CoreError::MissingPublicKey(_))
        ));
    }

    #[test]
    fn test_ciphertext_length_hides_payload_length() {
        let (keys, _) = manager();
        let identity = x25519::Identity::generate();
        let recipient = identity.to_public().to_string();

        let short = keys.encrypt(b"a", &recipient).unwrap();
        let longer = keys.encrypt(&[7u8; 200], &recipient).unwrap();
        assert_eq!(short.len(), longer.len());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (keys, _) = manager();
        let identity = x25519::Identity::generate();
        let recipient = identity.to_public().to_string();
        let private_key = identity.to_string().expose_secret().to_string();

        let ciphertext = keys.encrypt(b"contact card", &recipient).unwrap();
        let lines: Vec<&str> = ciphertext.lines().collect();
        // Flip one base64 character in the body
        let body_index = lines.len() - 2;
        let mut body: Vec<char> = lines[body_index].chars().collect();
        body[0] = if body[0] == 'A' { 'B' } else { 'A' };
        let mut tampered: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        tampered[body_index] = body.into_iter().collect();
        let tampered = tampered.join("\n");

        assert!(matches!(
            keys.decrypt(&tampered, &private_key),
            Err(CoreError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_oversized_payload() {
        let (keys, _) = manager();
        let recipient = x25519::Identity::generate().to_public().to_string();
        assert!(matches!(
            keys.encrypt(&vec![0u8; 64 * 1024 + 1], &recipient),
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_encrypt_profile_with_own_or_given_key() {
        let (keys, store) = manager();
        let id = profile(&store).await;
        assert!(matches!(
            keys.encrypt_profile(id, None).await,
            Err(CoreError::MissingPublicKey(_))
        ));

        let own = keys.generate_keypair(id, false).await.unwrap();
        let sealed = keys.encrypt_profile(id, None).await.unwrap();
        assert_eq!(sealed.key_version, Some(1));

        let json = keys.decrypt(&sealed.ciphertext, &own.private_key).unwrap();
        let restored: crate::models::Profile = serde_json::from_slice(&json).unwrap();
        assert_eq!(restored.id, id);
        assert_eq!(restored.display_name, "keyholder");

        let other = x25519::Identity::generate();
        let other_public = other.to_public().to_string();
        let sealed = keys.encrypt_profile(id, Some(&other_public)).await.unwrap();
        assert!(sealed.key_version.is_none());
        assert!(keys.decrypt(&sealed.ciphertext, &own.private_key).is_err());
    }
}
