//! In-place transformation of a record's sensitive attributes.

use tracing::{error, warn};

use crate::crypto::{decrypt, encrypt, CipherError};
use crate::keys::DataKey;
use crate::schema::{RecordSchema, SensitiveRecord};

/// Encrypt every present, non-empty sensitive attribute of `record`.
///
/// Returns the number of attributes encrypted. On error `record` may be
/// partially encrypted; callers work on a draft copy.
///
/// # Errors
///
/// Returns the first [`CipherError`] encountered.
pub fn encrypt_fields<R: SensitiveRecord>(
    schema: &RecordSchema<R>,
    record: &mut R,
    key: &DataKey,
) -> Result<usize, CipherError> {
    let mut encrypted = 0;
    for field in schema.fields() {
        if let Some(value) = field.value_mut(record) {
            if value.is_empty() {
                continue;
            }
            *value = encrypt(value, key.as_bytes())?;
            encrypted += 1;
        }
    }
    Ok(encrypted)
}

/// Decrypt every present sensitive attribute of `record`.
///
/// Failures are handled per attribute and never abort the pass: an attribute
/// that does not decrypt keeps its stored value. Returns the number of
/// attributes decrypted.
pub fn decrypt_fields<R: SensitiveRecord>(
    schema: &RecordSchema<R>,
    record: &mut R,
    key: &DataKey,
) -> usize {
    let mut decrypted = 0;
    for field in schema.fields() {
        let Some(value) = field.value_mut(record) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        match decrypt(value, key.as_bytes()) {
            Ok(plaintext) => {
                *value = plaintext;
                decrypted += 1;
            }
            // Legacy plaintext, data under a rotated key, or tampering.
            Err(CipherError::Authentication) => warn!(
                kind = R::KIND,
                field = field.name(),
                len = value.len(),
                "field did not authenticate; returning stored value"
            ),
            Err(e) => error!(
                kind = R::KIND,
                field = field.name(),
                error = %e,
                "field decryption failed; returning stored value"
            ),
        }
    }
    decrypted
}

/// Return a record that still holds ciphertext from an earlier write in the
/// same unit of work to plaintext. Attributes the caller has replaced since
/// do not authenticate and are kept as they are, without logging.
pub fn restore_fields<R: SensitiveRecord>(
    schema: &RecordSchema<R>,
    record: &mut R,
    key: &DataKey,
) -> usize {
    let mut restored = 0;
    for field in schema.fields() {
        if let Some(value) = field.value_mut(record) {
            if value.is_empty() {
                continue;
            }
            if let Ok(plaintext) = decrypt(value, key.as_bytes()) {
                *value = plaintext;
                restored += 1;
            }
        }
    }
    restored
}
