//! Selection lifecycle state machine
//!
//! ```text
//!   Empty ──run──► Draft ──save──► Saved ──seal──► Sealed
//!     ▲              │  ▲            │               │
//!     │              └──┘ run        │             unseal
//!     └──────clear───────────────────┤               │
//!                                    │               ▼
//!                                    └◄──save/seal── Unsealed
//! ```
//!
//! `check_transition` is pure: it decides whether an event is legal from a
//! state given a snapshot of the facts that guard it. Callers persist the
//! result with a versioned write so the decision and the write are atomic.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PayoutError, PayoutResult};
use crate::model::{CycleId, SelectionState};

/// Something a caller asks the selection to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionEvent {
    Run,
    Save,
    Clear,
    Seal,
    Unseal,
    /// Edit a winner: override, tier settings or removal
    Mutate,
    Disburse,
}

impl fmt::Display for SelectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionEvent::Run => "run selection on",
            SelectionEvent::Save => "save",
            SelectionEvent::Clear => "clear",
            SelectionEvent::Seal => "seal",
            SelectionEvent::Unseal => "unseal",
            SelectionEvent::Mutate => "edit",
            SelectionEvent::Disburse => "disburse",
        };
        f.write_str(name)
    }
}

/// Facts a transition may depend on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionContext {
    pub winner_count: usize,
    pub processed_count: usize,
    pub batch_in_flight: bool,
    pub allow_unsealed_disbursement: bool,
}

/// The three acknowledgements required to seal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealConfirmation {
    #[serde(default)]
    pub data_reviewed: bool,
    #[serde(default)]
    pub confirmed_final: bool,
    #[serde(default)]
    pub understood_irreversible: bool,
}

impl SealConfirmation {
    pub fn all() -> Self {
        Self {
            data_reviewed: true,
            confirmed_final: true,
            understood_irreversible: true,
        }
    }

    /// Names of the acknowledgements that were not given
    pub fn missing(&self) -> Vec<String> {
        [
            ("data_reviewed", self.data_reviewed),
            ("confirmed_final", self.confirmed_final),
            ("understood_irreversible", self.understood_irreversible),
        ]
        .into_iter()
        .filter(|(_, given)| !given)
        .map(|(name, _)| name.to_string())
        .collect()
    }

    pub fn check(&self) -> PayoutResult<()> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PayoutError::ConfirmationRequired { missing })
        }
    }
}

/// Pure: decide the state an event leads to, or why it is refused
pub fn check_transition(
    cycle_id: &CycleId,
    from: SelectionState,
    event: SelectionEvent,
    ctx: &TransitionContext,
) -> PayoutResult<SelectionState> {
    use SelectionEvent as E;
    use SelectionState::*;

    let invalid = |reason: &str| PayoutError::InvalidTransition {
        from,
        event: event.to_string(),
        reason: reason.to_string(),
    };
    let in_flight = || {
        PayoutError::ConcurrencyConflict(format!(
            "a disbursement batch is in flight for cycle {}",
            cycle_id
        ))
    };
    let processed = || PayoutError::PayoutsAlreadyProcessed {
        cycle_id: cycle_id.clone(),
        processed: ctx.processed_count,
    };

    match (event, from) {
        (E::Run, Empty | Draft) => Ok(Draft),
        (E::Run, Sealed) => Err(PayoutError::SelectionSealed(cycle_id.clone())),
        (E::Run, Saved | Unsealed) => Err(invalid("clear the saved selection first")),

        (E::Save, Draft | Unsealed) if ctx.winner_count == 0 => {
            Err(invalid("the selection has no winners"))
        }
        (E::Save, Draft | Unsealed) => Ok(Saved),
        (E::Save, Sealed) => Err(PayoutError::SelectionSealed(cycle_id.clone())),
        (E::Save, _) => Err(invalid("only a draft or unsealed selection can be saved")),

        (E::Clear, Sealed) => Err(PayoutError::SelectionSealed(cycle_id.clone())),
        (E::Clear, Empty) => Err(invalid("there is nothing to clear")),
        (E::Clear, _) if ctx.processed_count > 0 => Err(processed()),
        (E::Clear, _) if ctx.batch_in_flight => Err(in_flight()),
        (E::Clear, _) => Ok(Empty),

        (E::Seal, Saved | Unsealed) if ctx.batch_in_flight => Err(in_flight()),
        (E::Seal, Saved | Unsealed) => Ok(Sealed),
        (E::Seal, Sealed) => Err(invalid("the selection is already sealed")),
        (E::Seal, _) => Err(invalid("save the selection before sealing")),

        (E::Unseal, Sealed) if ctx.processed_count > 0 => Err(processed()),
        (E::Unseal, Sealed) if ctx.batch_in_flight => Err(in_flight()),
        (E::Unseal, Sealed) => Ok(Unsealed),
        (E::Unseal, _) => Err(invalid("only a sealed selection can be unsealed")),

        (E::Mutate, Sealed) => Err(PayoutError::SelectionSealed(cycle_id.clone())),
        (E::Mutate, Empty) => Err(invalid("there are no winners to edit")),
        (E::Mutate, _) if ctx.batch_in_flight => Err(in_flight()),
        (E::Mutate, state) => Ok(state),

        (E::Disburse, Sealed) => Ok(Sealed),
        (E::Disburse, Saved | Unsealed) if ctx.allow_unsealed_disbursement => Ok(from),
        (E::Disburse, state) => Err(PayoutError::SelectionNotSealed {
            cycle_id: cycle_id.clone(),
            state,
        }),
    }
}
