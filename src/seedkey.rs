//----------------------------------------------------------------------------------------------
// Module seedkey
// Seed-and-key driver (C8): invokes user-supplied key derivation to unlock protected resources.
// Grounded in pyxcp/dllif.py and pyxcp/skloader.py's split between in-process DLL invocation and
// an out-of-process helper for 32/64-bit word-width mismatches between the master and the
// vendor-supplied key library.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedNKeyError {
    #[error("seed & key library could not be loaded: {0}")]
    LoadFailed(String),
    #[error("key derivation returned non-zero status {0}")]
    DerivationFailed(i32),
    #[error("out-of-process helper exited with status {0:?}")]
    HelperFailed(Option<i32>),
    #[error("I/O error talking to seed & key helper: {0}")]
    Io(#[from] std::io::Error),
}

/// Callback contract: `compute_key(privilege_bits, seed_bytes) -> key_bytes`. The session never
/// links against a concrete key-derivation library; it only ever calls through this trait.
pub trait SeedNKeyDriver: Send + Sync {
    fn compute_key(&self, privilege_bits: u8, seed: &[u8]) -> Result<Vec<u8>, SeedNKeyError>;
}

/// A driver backed by a plain Rust closure -- the common case when the key algorithm is known
/// and implemented directly rather than loaded from a vendor DLL.
pub struct ClosureDriver<F>(pub F)
where
    F: Fn(u8, &[u8]) -> Result<Vec<u8>, SeedNKeyError> + Send + Sync;

impl<F> SeedNKeyDriver for ClosureDriver<F>
where
    F: Fn(u8, &[u8]) -> Result<Vec<u8>, SeedNKeyError> + Send + Sync,
{
    fn compute_key(&self, privilege_bits: u8, seed: &[u8]) -> Result<Vec<u8>, SeedNKeyError> {
        (self.0)(privilege_bits, seed)
    }
}

/// Out-of-process mode: spawn a helper binary with `privilege seed_hex` on argv, read the
/// derived key as a hex string from stdout. Used when the key library's word width doesn't
/// match the master process (spec.md section 4.8).
pub struct ProcessDriver {
    pub helper_path: std::path::PathBuf,
}

impl SeedNKeyDriver for ProcessDriver {
    fn compute_key(&self, privilege_bits: u8, seed: &[u8]) -> Result<Vec<u8>, SeedNKeyError> {
        use std::process::Command;
        let seed_hex: String = seed.iter().map(|b| format!("{b:02x}")).collect();
        let output = Command::new(&self.helper_path).arg(privilege_bits.to_string()).arg(&seed_hex).output()?;
        if !output.status.success() {
            return Err(SeedNKeyError::HelperFailed(output.status.code()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let trimmed = text.trim();
        let mut key = Vec::with_capacity(trimmed.len() / 2);
        let mut chars = trimmed.chars();
        while let (Some(hi), Some(lo)) = (chars.next(), chars.next()) {
            let byte_str: String = [hi, lo].iter().collect();
            let byte = u8::from_str_radix(&byte_str, 16)
                .map_err(|_| SeedNKeyError::DerivationFailed(-1))?;
            key.push(byte);
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_driver_invokes_callback() {
        let driver = ClosureDriver(|privilege, seed: &[u8]| {
            assert_eq!(privilege, 4);
            Ok(seed.iter().map(|b| b ^ 0xFF).collect())
        });
        let key = driver.compute_key(4, &[0x12, 0x34, 0x56, 0x78]).unwrap();
        assert_eq!(key, vec![0xED, 0xCB, 0xA9, 0x87]);
    }
}
