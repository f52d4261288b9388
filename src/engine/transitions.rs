use crate::error::AppError;
use crate::models::status::RideStatus;

use RideStatus::*;

/// Statuses reachable in one step from `from`. Starting straight from
/// `Confirmed` (skipping `Arrived`) is allowed.
pub fn allowed_targets(from: RideStatus) -> &'static [RideStatus] {
    match from {
        Requested | DriverOffered => &[Confirmed],
        Confirmed => &[Arrived, Started, CancelledByCustomer, CancelledByDriver],
        Arrived => &[Started, InProgress, CancelledByCustomer, CancelledByDriver],
        Started => &[InProgress, Completed, CancelledByCustomer, CancelledByDriver],
        InProgress => &[Completed, CancelledByCustomer, CancelledByDriver],
        Completed | CancelledByCustomer | CancelledByDriver | Expired | CustomerSelected
        | DriverEnRoute => &[],
    }
}

pub fn is_terminal(status: RideStatus) -> bool {
    allowed_targets(status).is_empty()
}

/// Validates `from -> to`. Returns `Ok(false)` for a same-state request,
/// which callers treat as an idempotent no-op, and `Ok(true)` when the
/// change must be applied.
pub fn check_transition(from: RideStatus, to: RideStatus) -> Result<bool, AppError> {
    if from == to {
        return Ok(false);
    }

    if allowed_targets(from).contains(&to) {
        Ok(true)
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RideStatus; 12] = [
        Requested,
        DriverOffered,
        CustomerSelected,
        Confirmed,
        DriverEnRoute,
        Arrived,
        Started,
        InProgress,
        Completed,
        CancelledByCustomer,
        CancelledByDriver,
        Expired,
    ];

    #[test]
    fn finished_rides_accept_no_transition() {
        for from in [Completed, CancelledByCustomer, CancelledByDriver] {
            for to in ALL.into_iter().filter(|to| *to != from) {
                assert!(
                    matches!(
                        check_transition(from, to),
                        Err(AppError::InvalidTransition { .. })
                    ),
                    "{from} -> {to} should be rejected"
                );
            }
        }
    }

    #[test]
    fn same_state_is_a_no_op_everywhere() {
        for status in ALL {
            assert!(!check_transition(status, status).unwrap());
        }
    }

    #[test]
    fn start_is_reachable_from_confirmed_and_arrived() {
        assert!(check_transition(Confirmed, Started).unwrap());
        assert!(check_transition(Arrived, Started).unwrap());
        assert!(check_transition(Requested, Started).is_err());
    }

    #[test]
    fn completion_requires_a_started_ride() {
        assert!(check_transition(Started, Completed).unwrap());
        assert!(check_transition(InProgress, Completed).unwrap());
        assert!(check_transition(Arrived, Completed).is_err());
        assert!(check_transition(Confirmed, Completed).is_err());
    }

    #[test]
    fn reserved_aliases_are_terminal() {
        assert!(is_terminal(CustomerSelected));
        assert!(is_terminal(DriverEnRoute));
        assert!(!is_terminal(InProgress));
    }
}
