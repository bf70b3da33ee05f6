//! Transfer status definitions.
//!
//! Status IDs are designed for PostgreSQL storage as SMALLINT.

use std::fmt;

/// Lifecycle of a transfer row.
///
/// Terminal states: CONCLUDED (10), FAILED (-10). A failed transfer can
/// additionally carry the reversed marker (a separate column), set once the
/// compensating credit has been confirmed back onto the source account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TransferStatus {
    /// Row persisted, remote legs not finished yet.
    Processing = 0,

    /// Terminal: debit and credit both confirmed.
    Concluded = 10,

    /// Terminal: the saga gave up. [`FailureKind`] says where.
    Failed = -10,
}

impl TransferStatus {
    /// Check if no more transitions are possible.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Concluded | TransferStatus::Failed)
    }

    /// Get the numeric status ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::Processing),
            10 => Some(TransferStatus::Concluded),
            -10 => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Processing => "PROCESSING",
            TransferStatus::Concluded => "CONCLUDED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}

/// Where a failed saga gave up, and what that means for the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The account service rejected the debit. Nothing moved, nothing to
    /// compensate.
    DebitRejected,

    /// The debit call failed with an unknown outcome; a compensating credit
    /// was applied in case it landed.
    DebitFailed,

    /// Debit landed, credit failed, compensation restored the source. Net
    /// zero.
    CreditFailed,

    /// Debit landed and the compensating credit ALSO failed. Funds are
    /// stuck on the wrong side until reconciliation.
    CompensationFailed,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::DebitRejected => "DEBIT_REJECTED",
            FailureKind::DebitFailed => "DEBIT_FAILED",
            FailureKind::CreditFailed => "CREDIT_FAILED",
            FailureKind::CompensationFailed => "COMPENSATION_FAILED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "DEBIT_REJECTED" => Some(FailureKind::DebitRejected),
            "DEBIT_FAILED" => Some(FailureKind::DebitFailed),
            "CREDIT_FAILED" => Some(FailureKind::CreditFailed),
            "COMPENSATION_FAILED" => Some(FailureKind::CompensationFailed),
            _ => None,
        }
    }

    /// True when money is known or suspected to be out of place.
    #[inline]
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, FailureKind::CompensationFailed)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransferStatus::Concluded.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
        assert!(!TransferStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_id_roundtrip() {
        let statuses = [
            TransferStatus::Processing,
            TransferStatus::Concluded,
            TransferStatus::Failed,
        ];

        for status in statuses {
            let id = status.id();
            let recovered = TransferStatus::from_id(id).unwrap();
            assert_eq!(status, recovered);
        }
    }

    #[test]
    fn test_invalid_status_id() {
        assert!(TransferStatus::from_id(999).is_none());
        assert!(TransferStatus::from_id(-999).is_none());
        assert!(TransferStatus::try_from(5i16).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransferStatus::Processing.to_string(), "PROCESSING");
        assert_eq!(TransferStatus::Concluded.to_string(), "CONCLUDED");
        assert_eq!(TransferStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_failure_kind_codes_roundtrip() {
        let kinds = [
            FailureKind::DebitRejected,
            FailureKind::DebitFailed,
            FailureKind::CreditFailed,
            FailureKind::CompensationFailed,
        ];
        for kind in kinds {
            assert_eq!(FailureKind::from_code(kind.code()), Some(kind));
        }
        assert!(FailureKind::from_code("UNKNOWN").is_none());
    }

    #[test]
    fn test_only_compensation_failures_need_reconciliation() {
        assert!(FailureKind::CompensationFailed.needs_reconciliation());
        assert!(!FailureKind::DebitRejected.needs_reconciliation());
        assert!(!FailureKind::DebitFailed.needs_reconciliation());
        assert!(!FailureKind::CreditFailed.needs_reconciliation());
    }
}
