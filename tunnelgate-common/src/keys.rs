use md5::{Digest, Md5};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use russh::keys::{Algorithm, PrivateKey};

use crate::error::TunnelgateError;

/// Derives a host key deterministically from `seed`, or generates a fresh
/// random one when `seed` is `None`. Deterministic generation lets an
/// operator pin the same host identity across restarts without persisting a
/// key file.
pub fn generate_key(seed: Option<&str>) -> Result<PrivateKey, TunnelgateError> {
    let mut rng = match seed {
        Some(seed) => {
            let mut hasher = Md5::new();
            hasher.update(seed.as_bytes());
            let digest = hasher.finalize();
            let mut seed_bytes = [0u8; 32];
            seed_bytes[..16].copy_from_slice(&digest);
            seed_bytes[16..].copy_from_slice(&digest);
            ChaCha20Rng::from_seed(seed_bytes)
        }
        None => ChaCha20Rng::from_entropy(),
    };
    Ok(PrivateKey::random(&mut rng, Algorithm::Ed25519)?)
}

/// MD5 colon-hex fingerprint of the key's wire-format public key, the format
/// expected by clients compatible with this system.
pub fn fingerprint(key: &PrivateKey) -> Result<String, TunnelgateError> {
    let wire = key.public_key().to_bytes()?;
    let mut hasher = Md5::new();
    hasher.update(&wire);
    let digest = hasher.finalize();
    Ok(digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":"))
}
