//! Round-robin API key selection

use std::sync::atomic::{AtomicUsize, Ordering};

use super::UpstreamError;

/// Owns the vendor API keys and the rotation cursor
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next key in rotation order
    pub fn next_key(&self) -> Result<&str, UpstreamError> {
        match self.keys.len() {
            0 => Err(UpstreamError::NotConfigured("no API keys configured".into())),
            1 => Ok(&self.keys[0]),
            n => {
                // Relaxed is enough: this only spreads load
                let i = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
                Ok(&self.keys[i])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_is_even_and_ordered() {
        let pool = CredentialPool::new(vec!["a".into(), "b".into(), "c".into()]);
        let picked: Vec<&str> = (0..6).map(|_| pool.next_key().unwrap()).collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_single_key_bypasses_rotation() {
        let pool = CredentialPool::new(vec!["only".into()]);
        for _ in 0..3 {
            assert_eq!(pool.next_key().unwrap(), "only");
        }
    }

    #[test]
    fn test_empty_pool_is_a_config_error() {
        let pool = CredentialPool::new(Vec::new());
        assert!(matches!(
            pool.next_key(),
            Err(UpstreamError::NotConfigured(_))
        ));
    }
}
