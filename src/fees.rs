//! Fee payment status derivation.
//!
//! Status is a pure function of the amounts, re-derived on every payment
//! update so repeated writes are idempotent. `overdue` is accepted as an
//! input/filter value but never derived here; it is stamped by an external
//! scheduled job.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeStatus {
    Pending,
    Partial,
    Paid,
}

impl FeeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeeStatus::Pending => "pending",
            FeeStatus::Partial => "partial",
            FeeStatus::Paid => "paid",
        }
    }
}

pub fn derive_status(amount: f64, paid_amount: f64) -> FeeStatus {
    if paid_amount >= amount {
        FeeStatus::Paid
    } else if paid_amount > 0.0 {
        FeeStatus::Partial
    } else {
        FeeStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaid_is_pending() {
        assert_eq!(derive_status(100.0, 0.0), FeeStatus::Pending);
    }

    #[test]
    fn partial_payment_between_zero_and_amount() {
        assert_eq!(derive_status(100.0, 40.0), FeeStatus::Partial);
        assert_eq!(derive_status(100.0, 99.99), FeeStatus::Partial);
    }

    #[test]
    fn full_or_overpayment_is_paid() {
        assert_eq!(derive_status(100.0, 100.0), FeeStatus::Paid);
        assert_eq!(derive_status(100.0, 120.0), FeeStatus::Paid);
    }

    #[test]
    fn rederiving_after_more_payments_is_idempotent() {
        let mut paid = 0.0;
        assert_eq!(derive_status(60.0, paid), FeeStatus::Pending);
        paid += 20.0;
        assert_eq!(derive_status(60.0, paid), FeeStatus::Partial);
        assert_eq!(derive_status(60.0, paid), FeeStatus::Partial);
        paid += 40.0;
        assert_eq!(derive_status(60.0, paid), FeeStatus::Paid);
        assert_eq!(derive_status(60.0, paid), FeeStatus::Paid);
    }
}
