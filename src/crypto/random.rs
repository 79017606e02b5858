//! Cryptographically secure randomness from the operating system.

use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::errors::{Result, VaultError};

/// Fill `buf` from the OS CSPRNG.
pub fn fill(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(rng_error)
}

fn rng_error(e: impl std::fmt::Display) -> VaultError {
    VaultError::RandomnessUnavailable(e.to_string())
}

/// Return `n` random bytes. Fails with `InvalidSize` for `n == 0`.
pub fn bytes(n: usize) -> Result<Vec<u8>> {
    if n == 0 {
        return Err(VaultError::InvalidSize(n));
    }
    let mut out = vec![0u8; n];
    fill(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_rejected() {
        assert!(matches!(bytes(0), Err(VaultError::InvalidSize(0))));
    }

    #[test]
    fn returns_requested_length() {
        assert_eq!(bytes(1).unwrap().len(), 1);
        assert_eq!(bytes(64).unwrap().len(), 64);
    }

    #[test]
    fn rng_failure_is_not_reported_as_key_store() {
        let err = rng_error("entropy source unavailable");
        assert!(matches!(err, VaultError::RandomnessUnavailable(_)));
        assert_eq!(err.kind(), crate::errors::ErrorKind::Platform);
        assert!(!err.kind().is_retryable());
    }

    #[test]
    fn successive_calls_differ() {
        assert_ne!(bytes(32).unwrap(), bytes(32).unwrap());
    }
}
