use chrono::{FixedOffset, NaiveDate};
use uuid::Uuid;

use crate::error::{DeskError, Result};
use crate::models::{ContractStatus, HistoryEntry, MaintenanceContract};
use crate::schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Not yet due; completion is refused.
    Scheduled,
    Completable,
}

pub fn phase(contract: &MaintenanceContract, today: NaiveDate) -> CyclePhase {
    if today < contract.next_maintenance_date {
        CyclePhase::Scheduled
    } else {
        CyclePhase::Completable
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Defaults to today; the operator may back-date it.
    pub completed_on: Option<NaiveDate>,
    pub note: String,
    pub completed_by: String,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub contract: MaintenanceContract,
    pub history: HistoryEntry,
}

/// The forecast for the cycle after the current one.
pub fn forecast_next(contract: &MaintenanceContract, offset: FixedOffset) -> Result<NaiveDate> {
    match contract.planned_next_date {
        Some(planned) => Ok(planned),
        None => schedule::advance_at(contract.next_maintenance_date, contract.frequency, offset),
    }
}

/// Closes the current cycle and opens the next one.
///
/// Pure: the caller persists the returned contract and history entry together.
/// On any error the input contract is untouched and no entry is produced.
pub fn complete(
    contract: &MaintenanceContract,
    request: &CompletionRequest,
    today: NaiveDate,
    offset: FixedOffset,
) -> Result<Completion> {
    if contract.status != ContractStatus::Active {
        return Err(DeskError::validation(format!(
            "contract `{}` is inactive",
            contract.title
        )));
    }
    if phase(contract, today) == CyclePhase::Scheduled {
        return Err(DeskError::PrematureCompletion {
            earliest: contract.next_maintenance_date,
        });
    }

    let completed_on = request.completed_on.unwrap_or(today);
    if completed_on > today {
        return Err(DeskError::validation(format!(
            "completion date {completed_on} is in the future"
        )));
    }

    let resolved_next = match contract.planned_next_date {
        Some(planned) => planned,
        None => schedule::advance_at(today, contract.frequency, offset)?,
    };
    if resolved_next <= contract.next_maintenance_date {
        return Err(DeskError::validation(format!(
            "next maintenance {resolved_next} must fall after the current due date {}",
            contract.next_maintenance_date
        )));
    }

    let mut updated = contract.clone();
    updated.last_maintenance_date = Some(completed_on);
    updated.next_maintenance_date = resolved_next;
    updated.planned_next_date = None;

    let history = HistoryEntry {
        id: Uuid::new_v4(),
        contract_id: contract.id,
        completed_date: completed_on,
        next_date_assigned: resolved_next,
        note: request.note.trim().to_string(),
        completed_by: request.completed_by.clone(),
    };

    Ok(Completion {
        contract: updated,
        history,
    })
}
