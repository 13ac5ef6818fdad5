use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Fails if approving `candidate` would put two approved reservations of the
/// same classroom on the same slot of the same date.
pub(crate) fn check_no_conflict(reservations: &[Reservation], candidate: &Reservation) -> Result<(), EngineError> {
    for other in reservations {
        if other.id == candidate.id
            || other.status != ReservationStatus::Approved
            || other.classroom != candidate.classroom
        {
            continue;
        }
        if let Some((date, slot)) = candidate.first_shared_slot(other) {
            return Err(EngineError::Conflict {
                id: candidate.id,
                with: other.id,
                date,
                slot,
            });
        }
    }
    Ok(())
}
