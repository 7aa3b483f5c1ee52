//! Account rotation - cyclic trial order over a campaign's account snapshot

use chrono::{DateTime, Utc};
use rotamail_storage::models::AccountSnapshot;

/// Cyclic trial order `[pointer, pointer+1, ..., pointer+n-1] mod n`.
///
/// The worker walks this order for one recipient, skipping accounts that
/// are on cooldown or quota-exhausted at trial time.
pub fn trial_order(len: usize, pointer: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    (0..len).map(|i| (pointer + i) % len).collect()
}

/// Whether any account in the snapshot is currently usable
pub fn has_usable(accounts: &[AccountSnapshot], now: DateTime<Utc>) -> bool {
    accounts.iter().any(|a| a.is_usable(now))
}

/// Cycle reset: every account gets its full quota back.
///
/// Cooldowns are time-based, not cycle-based, so `disabled_until` is left
/// untouched.
pub fn cycle_reset(accounts: &mut [AccountSnapshot]) {
    for account in accounts.iter_mut() {
        account.remaining = account.max_per_cycle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use rotamail_storage::models::Credential;

    fn snapshot(email: &str, remaining: i32) -> AccountSnapshot {
        AccountSnapshot {
            email: email.to_string(),
            host: "smtp.example.com".to_string(),
            port: 587,
            secure: false,
            credential: Credential::Password {
                user: email.to_string(),
                pass: "pw".to_string(),
            },
            max_per_cycle: 10,
            remaining,
            fail_count: 0,
            disabled_until: None,
        }
    }

    #[test]
    fn test_trial_order_wraps() {
        assert_eq!(trial_order(4, 2), vec![2, 3, 0, 1]);
        assert_eq!(trial_order(3, 0), vec![0, 1, 2]);
        assert_eq!(trial_order(3, 7), vec![1, 2, 0]);
        assert!(trial_order(0, 5).is_empty());
    }

    #[test]
    fn test_has_usable() {
        let now = Utc::now();
        let mut accounts = vec![snapshot("a@x.com", 0), snapshot("b@x.com", 1)];
        assert!(has_usable(&accounts, now));

        accounts[1].remaining = 0;
        assert!(!has_usable(&accounts, now));

        accounts[1].remaining = 3;
        accounts[1].disabled_until = Some(now + Duration::minutes(5));
        assert!(!has_usable(&accounts, now));
    }

    #[test]
    fn test_cycle_reset_keeps_cooldowns() {
        let now = Utc::now();
        let until = now + Duration::minutes(20);
        let mut accounts = vec![snapshot("a@x.com", 0), snapshot("b@x.com", 0)];
        accounts[0].disabled_until = Some(until);

        cycle_reset(&mut accounts);

        assert_eq!(accounts[0].remaining, 10);
        assert_eq!(accounts[1].remaining, 10);
        // cooldown untouched: the reset only restores quota
        assert_eq!(accounts[0].disabled_until, Some(until));
        assert!(!accounts[0].is_usable(now));
        assert!(accounts[1].is_usable(now));
    }
}
