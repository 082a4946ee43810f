use rand::RngCore;
use scrypt::{scrypt, Params};

use super::AuthError;

// N = 2^14, r = 8, p = 1, 64-byte key
const LOG_N: u8 = 14;
const KEY_LEN: usize = 64;

/// Hashes a password as `hex(salt):hex(key)`.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = derive_key(password, &salt)?;
    Ok(format!("{}:{}", hex::encode(salt), hex::encode(key)))
}

pub fn verify_password(hash: &str, password: &str) -> Result<bool, AuthError> {
    let (salt_hex, key_hex) = hash
        .split_once(':')
        .ok_or_else(|| AuthError::Crypto("Invalid password hash format".into()))?;

    let salt = hex::decode(salt_hex).map_err(|e| AuthError::Crypto(e.to_string()))?;
    let expected = hex::decode(key_hex).map_err(|e| AuthError::Crypto(e.to_string()))?;

    let derived = derive_key(password, &salt)?;
    Ok(subtle::ConstantTimeEq::ct_eq(derived.as_slice(), expected.as_slice()).into())
}

fn derive_key(password: &str, salt: &[u8]) -> Result<Vec<u8>, AuthError> {
    let params = Params::new(LOG_N, 8, 1, KEY_LEN).map_err(|e| AuthError::Crypto(e.to_string()))?;
    let mut key = vec![0u8; KEY_LEN];
    scrypt(password.as_bytes(), salt, &params, &mut key).map_err(|e| AuthError::Crypto(e.to_string()))?;
    Ok(key)
}
