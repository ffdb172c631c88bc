// Service exports
pub mod keys;
pub mod store;

pub use keys::{bucket_size, EncryptedProfile, KeyManager, KeyPair, SealedMessage};
pub use store::{PiiPolicy, ProfileStore};
