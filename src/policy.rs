//! Naming and validity rules applied to every certificate the key tool issues.

use bon::Builder;
use time::{Duration, OffsetDateTime};

use crate::cert::params::Validity;
use crate::error::{KeyToolError, Result};

/// How far certificates are back-dated and how long they live.
///
/// Back-dating absorbs clock skew between the process that mints the
/// certificates and the peers that validate them.
#[derive(Clone, Copy, Debug, Builder, PartialEq, Eq)]
pub struct ValidityPolicy {
    #[builder(default = Duration::days(365))]
    pub ca_backdate: Duration,
    #[builder(default = Duration::days(3650))]
    pub ca_lifetime: Duration,
    #[builder(default = Duration::days(1))]
    pub leaf_backdate: Duration,
    #[builder(default = Duration::days(825))]
    pub leaf_lifetime: Duration,
}

impl Default for ValidityPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ValidityPolicy {
    /// Window for a root certificate authority minted at `now`.
    ///
    /// Fails with [`KeyToolError::InvalidInput`] when either end falls outside
    /// the years an X.509 certificate can carry.
    pub fn ca_window(&self, now: OffsetDateTime) -> Result<Validity> {
        let now = truncate_to_seconds(now);
        let not_before = backdated(now, self.ca_backdate)?;
        let not_after = extended(now, self.ca_lifetime)?;
        window(not_before, not_after)
    }

    /// Window for a leaf minted at `now`, clamped into the issuer's window.
    ///
    /// Fails with [`KeyToolError::SigningError`] when nothing of the leaf
    /// window overlaps the issuer's.
    pub fn leaf_window(&self, now: OffsetDateTime, issuer: &Validity) -> Result<Validity> {
        let now = truncate_to_seconds(now);
        let not_before = backdated(now, self.leaf_backdate)?.max(issuer.not_before);
        let not_after = extended(now, self.leaf_lifetime)?.min(issuer.not_after);
        if not_before >= not_after {
            return Err(KeyToolError::SigningError(format!(
                "issuer validity {} .. {} leaves no room for a new certificate",
                issuer.not_before, issuer.not_after
            )));
        }
        window(not_before, not_after)
    }
}

/// Years an X.509 time can express: UTCTime starts at 1950 and
/// GeneralizedTime stops at 9999.
const ENCODABLE_YEARS: std::ops::RangeInclusive<i32> = 1950..=9999;

fn backdated(now: OffsetDateTime, by: Duration) -> Result<OffsetDateTime> {
    now.checked_sub(by).ok_or_else(|| {
        KeyToolError::InvalidInput(format!("back-dating {now} by {by} is out of range"))
    })
}

fn extended(now: OffsetDateTime, by: Duration) -> Result<OffsetDateTime> {
    now.checked_add(by).ok_or_else(|| {
        KeyToolError::InvalidInput(format!("a lifetime of {by} from {now} is out of range"))
    })
}

fn window(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Result<Validity> {
    if not_before >= not_after {
        return Err(KeyToolError::InvalidInput(format!(
            "empty validity window {not_before} .. {not_after}"
        )));
    }
    for at in [not_before, not_after] {
        if !ENCODABLE_YEARS.contains(&at.year()) {
            return Err(KeyToolError::InvalidInput(format!(
                "validity time {at} is outside the years 1950 to 9999 a certificate can carry"
            )));
        }
    }
    Ok(Validity {
        not_before,
        not_after,
    })
}

/// X.509 times carry whole seconds only.
pub fn truncate_to_seconds(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_nanosecond(0).unwrap_or(at)
}

/// Fresh certificate serial: 16 random bytes, positive, with no leading zero
/// octet so the INTEGER encoding is always exactly 16 bytes long.
pub fn random_serial_number() -> Vec<u8> {
    let mut serial = rand::random::<[u8; 16]>();
    serial[0] = (serial[0] & 0x7f) | 0x40;
    serial.to_vec()
}

/// True when `name` can be placed in a DNS subject alternative name.
pub fn is_dns_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// DNS names for a leaf: the subject itself when usable, then `extra`,
/// without duplicates.
pub fn leaf_dns_names(subject: &str, extra: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let candidates = std::iter::once(subject).chain(extra.iter().map(String::as_str));
    for name in candidates {
        if is_dns_name(name) && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    #[test]
    fn test_default_ca_window() {
        let now = at(1_700_000_000) + Duration::milliseconds(750);
        let window = ValidityPolicy::default().ca_window(now).unwrap();
        assert_eq!(window.not_before, at(1_700_000_000) - Duration::days(365));
        assert_eq!(window.not_after, at(1_700_000_000) + Duration::days(3650));
    }

    #[test]
    fn test_leaf_window_is_clamped_into_issuer() {
        let policy = ValidityPolicy::default();
        let issuer = Validity {
            not_before: at(1_700_000_000),
            not_after: at(1_700_000_000) + Duration::days(30),
        };
        let leaf = policy.leaf_window(at(1_700_000_000), &issuer).unwrap();
        assert!(issuer.contains(&leaf));
        assert_eq!(leaf.not_before, issuer.not_before);
        assert_eq!(leaf.not_after, issuer.not_after);
    }

    #[test]
    fn test_leaf_window_after_issuer_expiry_is_rejected() {
        let policy = ValidityPolicy::default();
        let issuer = Validity {
            not_before: at(1_000_000_000),
            not_after: at(1_000_000_000) + Duration::days(1),
        };
        let err = policy.leaf_window(at(1_700_000_000), &issuer).unwrap_err();
        assert!(matches!(err, KeyToolError::SigningError(_)));
    }

    #[test]
    fn test_overflowing_lifetime_is_rejected() {
        let policy = ValidityPolicy::builder()
            .ca_lifetime(Duration::days(5_000_000))
            .build();
        let err = policy.ca_window(at(1_700_000_000)).unwrap_err();
        assert!(matches!(err, KeyToolError::InvalidInput(_)), "{err}");
    }

    #[test]
    fn test_backdate_before_1950_is_rejected() {
        let policy = ValidityPolicy::builder()
            .ca_backdate(Duration::days(100 * 365))
            .build();
        let err = policy.ca_window(at(1_700_000_000)).unwrap_err();
        assert!(matches!(err, KeyToolError::InvalidInput(_)), "{err}");
        assert!(err.to_string().contains("1950"), "{err}");
    }

    #[test]
    fn test_overflowing_leaf_lifetime_is_rejected() {
        let policy = ValidityPolicy::builder()
            .leaf_lifetime(Duration::days(5_000_000))
            .build();
        let issuer = policy.ca_window(at(1_700_000_000)).unwrap();
        let err = policy.leaf_window(at(1_700_000_000), &issuer).unwrap_err();
        assert!(matches!(err, KeyToolError::InvalidInput(_)), "{err}");
    }

    #[test]
    fn test_serial_numbers_are_positive_and_fresh() {
        let a = random_serial_number();
        let b = random_serial_number();
        assert_eq!(a.len(), 16);
        assert_eq!(a[0] & 0xc0, 0x40);
        assert_ne!(a, b);
    }

    #[test]
    fn test_dns_names() {
        assert!(is_dns_name("server"));
        assert!(is_dns_name("config.example.com"));
        assert!(!is_dns_name("My CA"));
        assert!(!is_dns_name("-leading"));
        assert!(!is_dns_name(""));

        let names = leaf_dns_names("client", &["localhost".to_string(), "CLIENT".to_string()]);
        assert_eq!(names, vec!["client".to_string(), "localhost".to_string()]);
        assert_eq!(leaf_dns_names("My CA", &["localhost".to_string()]), vec!["localhost"]);
    }
}
