//! Per-run cost accounting.
//!
//! Every chargeable adapter call is admitted through the run's
//! [`CostLedger`] before it is issued. A charge that would exceed the
//! ceiling is refused, the call is never made, and the stage ends with
//! whatever it produced so far.

use std::sync::Mutex;

/// A refused charge: admitting it would exceed the per-run ceiling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cost ceiling {ceiling} would be exceeded (spent {spent}, requested {requested})")]
pub struct BudgetExhausted {
    /// The configured per-run ceiling.
    pub ceiling: f64,
    /// Units already spent.
    pub spent: f64,
    /// The refused charge amount.
    pub requested: f64,
}

/// Running cost counter for one pipeline run (currency-neutral units).
#[derive(Debug)]
pub struct CostLedger {
    ceiling: f64,
    spent: Mutex<f64>,
}

impl CostLedger {
    /// A ledger with the given ceiling. A ceiling of zero admits nothing.
    pub fn new(ceiling: f64) -> Self {
        Self {
            ceiling,
            spent: Mutex::new(0.0),
        }
    }

    /// Atomically admit a charge, or refuse it if the ceiling would be
    /// exceeded. Zero-amount charges are always admitted.
    pub fn try_charge(&self, label: &str, amount: f64) -> Result<(), BudgetExhausted> {
        let mut spent = self.spent.lock().expect("cost ledger lock");
        if *spent + amount > self.ceiling {
            tracing::warn!(
                label,
                amount,
                spent = *spent,
                ceiling = self.ceiling,
                "charge refused, cost ceiling reached",
            );
            return Err(BudgetExhausted {
                ceiling: self.ceiling,
                spent: *spent,
                requested: amount,
            });
        }
        *spent += amount;
        tracing::debug!(label, amount, total = *spent, "charge admitted");
        Ok(())
    }

    /// Units spent so far.
    pub fn spent(&self) -> f64 {
        *self.spent.lock().expect("cost ledger lock")
    }

    /// The configured ceiling.
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }
}
