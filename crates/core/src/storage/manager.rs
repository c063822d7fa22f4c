use crate::errors::CoreError;
use crate::models::ledger::Ledger;

use super::encryption::{self, KdfParams};
use super::format;

/// High-level storage operations: ledger ⇄ encrypted bytes or files.
pub struct StorageManager;

impl StorageManager {
    /// Encrypt and serialize a ledger to portable bytes.
    ///
    /// Flow: Ledger → bincode → AES-256-GCM(Argon2id(password)) → DCAL bytes
    pub fn save_to_bytes(ledger: &Ledger, password: &str, kdf_params: &KdfParams) -> Result<Vec<u8>, CoreError> {
        let plaintext = bincode::serialize(ledger)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize ledger: {e}")))?;
        let sealed = encryption::seal(&plaintext, password, kdf_params)?;
        Ok(format::encode(kdf_params, &sealed))
    }

    /// Decrypt and deserialize a ledger from bytes.
    pub fn load_from_bytes(data: &[u8], password: &str) -> Result<Ledger, CoreError> {
        let file = format::decode(data)?;
        let plaintext = encryption::open(&file.sealed, password, &file.kdf_params)?;
        bincode::deserialize(&plaintext)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize ledger: {e}")))
    }

    /// Save to an encrypted file on disk (native only).
    ///
    /// Writes a sibling temp file and renames it over the target, so a crash
    /// mid-write leaves the previous ledger intact.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(
        ledger: &Ledger,
        path: &std::path::Path,
        password: &str,
        kdf_params: &KdfParams,
    ) -> Result<(), CoreError> {
        let bytes = Self::save_to_bytes(ledger, password, kdf_params)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load from an encrypted file on disk (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &std::path::Path, password: &str) -> Result<Ledger, CoreError> {
        let bytes = std::fs::read(path)?;
        Self::load_from_bytes(&bytes, password)
    }
}
