//! Liveness tokens — generation counter guarding stale writes
//!
//! The session actor owns a [`Liveness`]. Each piece of background work gets a
//! [`LivenessToken`] stamped with the generation current at issue time.
//! Advancing the generation (sign-out, new sign-in, shutdown) revokes every
//! outstanding token at once; work holding a revoked token must not write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Liveness {
    generation: Arc<AtomicU64>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Token valid until the next [`Liveness::advance`]
    pub fn token(&self) -> LivenessToken {
        LivenessToken {
            generation: Arc::clone(&self.generation),
            issued: self.current(),
        }
    }

    /// Revoke all outstanding tokens; returns the new generation
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Clone)]
pub struct LivenessToken {
    generation: Arc<AtomicU64>,
    issued: u64,
}

impl LivenessToken {
    pub fn is_live(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.issued
    }

    pub fn generation(&self) -> u64 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_revokes_outstanding_tokens() {
        let liveness = Liveness::new();
        let first = liveness.token();
        assert!(first.is_live());

        assert_eq!(liveness.advance(), 1);
        let second = liveness.token();

        assert!(!first.is_live());
        assert!(second.is_live());
        assert_eq!(second.generation(), 1);
    }

    #[test]
    fn test_clones_share_the_counter() {
        let liveness = Liveness::new();
        let token = liveness.token();
        liveness.clone().advance();
        assert!(!token.is_live());
    }
}
