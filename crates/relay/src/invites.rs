use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;

const CODE_LEN: usize = 8;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Single-use invite codes gating signup.
///
/// Authenticated users mint codes; each code admits exactly one signup and
/// is burned the moment it is consumed. Cheaply cloneable; clones share one
/// ledger.
#[derive(Clone, Default)]
pub struct InviteLedger {
    codes: Arc<Mutex<HashMap<String, String>>>,
}

impl InviteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh code, recording who minted it. Regenerates on the
    /// unlikely collision with an outstanding code.
    pub async fn issue(&self, creator: &str) -> String {
        let mut codes = self.codes.lock().await;
        loop {
            let code = generate_code();
            if !codes.contains_key(&code) {
                codes.insert(code.clone(), creator.to_string());
                return code;
            }
        }
    }

    /// Consume a code. Exactly one caller per code observes `true`; the
    /// rest, like callers with unknown codes, observe `false`.
    pub async fn consume(&self, code: &str) -> bool {
        self.codes.lock().await.remove(code).is_some()
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn issued_codes_are_well_formed() {
        let ledger = InviteLedger::new();
        for _ in 0..50 {
            let code = ledger.issue("alice").await;
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn issued_codes_are_unique() {
        let ledger = InviteLedger::new();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(ledger.issue("alice").await));
        }
    }

    #[tokio::test]
    async fn consume_succeeds_exactly_once() {
        let ledger = InviteLedger::new();
        let code = ledger.issue("alice").await;

        assert!(ledger.consume(&code).await);
        assert!(!ledger.consume(&code).await);
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let ledger = InviteLedger::new();
        assert!(!ledger.consume("NOTACODE").await);
    }

    #[tokio::test]
    async fn concurrent_consume_admits_one_winner() {
        let ledger = InviteLedger::new();
        let code = ledger.issue("alice").await;

        let (first, second) = tokio::join!(ledger.consume(&code), ledger.consume(&code));
        assert!(
            first ^ second,
            "exactly one concurrent consume may win, got {first} and {second}"
        );
    }

    #[tokio::test]
    async fn clones_share_one_ledger() {
        let ledger = InviteLedger::new();
        let clone = ledger.clone();

        let code = clone.issue("alice").await;
        assert!(ledger.consume(&code).await);
        assert!(!clone.consume(&code).await);
    }
}
