use crate::db_types::{PaymentStatus, PendingPayment};

/// The result of a ledger compare-and-set.
///
/// `Conflict` is not an error: it means the row had already left `Pending` when the call arrived, which is exactly
/// what happens when a webhook is delivered twice or when the expiry sweep races a legitimate settlement. Callers
/// treat it as "already resolved" and move on.
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// The CAS won. Carries the updated row.
    Applied(PendingPayment),
    /// The row was already in the given terminal state.
    Conflict(PaymentStatus),
}

impl TransitionResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionResult::Applied(_))
    }
}

/// The result of an archive write. The archive is insert-once per order id; a second write reports
/// `AlreadyRecorded` so that replayed webhooks stay no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertHistoryResult {
    Inserted,
    AlreadyRecorded,
}
