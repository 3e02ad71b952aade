//! Verification outcomes attached to decrypted values
//!
//! Signature failures never abort a decrypt call. The cleartext comes back
//! wrapped in [`Verified`] and the caller decides whether to show, flag or
//! withhold it.

use drive_crypto::SignatureStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a signature could not be confirmed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureFailure {
    /// The entity carries no signature
    Missing,
    /// No verification keys were available for the signer
    NoVerificationKeys,
    /// The signature did not verify
    Invalid(String),
}

impl fmt::Display for SignatureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("signature missing"),
            Self::NoVerificationKeys => f.write_str("no verification keys"),
            Self::Invalid(reason) => write!(f, "invalid signature: {}", reason),
        }
    }
}

/// Verification state of a decrypted value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// Signature checked and valid
    Verified,
    /// Decrypted, but the signature could not be confirmed
    Unverified(SignatureFailure),
}

impl VerificationStatus {
    /// Whether the signature checked out
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Failure reason, if any
    pub fn failure(&self) -> Option<&SignatureFailure> {
        match self {
            Self::Verified => None,
            Self::Unverified(reason) => Some(reason),
        }
    }

    /// Combine two statuses; the result is verified only if both are
    pub fn and(self, other: VerificationStatus) -> VerificationStatus {
        match self {
            Self::Verified => other,
            unverified => unverified,
        }
    }
}

impl From<SignatureStatus> for VerificationStatus {
    fn from(status: SignatureStatus) -> Self {
        match status {
            SignatureStatus::Verified(_) => Self::Verified,
            SignatureStatus::NotSigned => Self::Unverified(SignatureFailure::Missing),
            SignatureStatus::NotChecked => Self::Unverified(SignatureFailure::NoVerificationKeys),
            SignatureStatus::Failed(reason) => Self::Unverified(SignatureFailure::Invalid(reason)),
        }
    }
}

/// A decrypted value together with its verification status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verified<T> {
    /// The decrypted value
    pub value: T,
    /// Signature verification outcome
    pub status: VerificationStatus,
}

impl<T> Verified<T> {
    /// Create with an explicit status
    pub fn new(value: T, status: VerificationStatus) -> Self {
        Self { value, status }
    }

    /// A value whose signature verified
    pub fn verified(value: T) -> Self {
        Self::new(value, VerificationStatus::Verified)
    }

    /// A value whose signature could not be confirmed
    pub fn unverified(value: T, reason: SignatureFailure) -> Self {
        Self::new(value, VerificationStatus::Unverified(reason))
    }

    /// Whether the signature checked out
    pub fn is_verified(&self) -> bool {
        self.status.is_verified()
    }

    /// Transform the value, keeping the status
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Verified<U> {
        Verified {
            value: f(self.value),
            status: self.status,
        }
    }

    /// Drop the status
    pub fn into_inner(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_crypto::KeyId;

    #[test]
    fn test_from_signature_status() {
        let id = KeyId::from_bytes(&[1u8; 8]).unwrap();
        assert!(VerificationStatus::from(SignatureStatus::Verified(id)).is_verified());
        assert_eq!(
            VerificationStatus::from(SignatureStatus::NotSigned).failure(),
            Some(&SignatureFailure::Missing)
        );
        assert_eq!(
            VerificationStatus::from(SignatureStatus::Failed("bad".into())),
            VerificationStatus::Unverified(SignatureFailure::Invalid("bad".into()))
        );
    }

    #[test]
    fn test_and_never_upgrades() {
        let unverified = VerificationStatus::Unverified(SignatureFailure::Missing);
        assert!(!unverified.clone().and(VerificationStatus::Verified).is_verified());
        assert!(!VerificationStatus::Verified.and(unverified).is_verified());
        assert!(VerificationStatus::Verified.and(VerificationStatus::Verified).is_verified());
    }

    #[test]
    fn test_map_keeps_status() {
        let v = Verified::unverified(2, SignatureFailure::Missing).map(|x| x * 2);
        assert_eq!(v.value, 4);
        assert!(!v.is_verified());
    }
}
