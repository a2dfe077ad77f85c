use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Half-open booking window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AppError> {
        let interval = Self { start, end };
        interval.validate()?;
        Ok(interval)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.start < self.end {
            Ok(())
        } else {
            Err(AppError::InvalidInterval {
                start: self.start,
                end: self.end,
            })
        }
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn minutes(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 60.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Driver,
    Vehicle,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Driver => f.write_str("driver"),
            ResourceKind::Vehicle => f.write_str("vehicle"),
        }
    }
}

/// A schedulable resource. Ordering puts drivers before vehicles, which fixes
/// the lock acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub id: Uuid,
}

impl ResourceKey {
    pub fn driver(id: Uuid) -> Self {
        Self {
            kind: ResourceKind::Driver,
            id,
        }
    }

    pub fn vehicle(id: Uuid) -> Self {
        Self {
            kind: ResourceKind::Vehicle,
            id,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// An interval already bound to a resource by an existing delivery.
#[derive(Debug, Clone, Copy)]
pub struct Booking {
    pub delivery_id: Uuid,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictCheck {
    pub resource: ResourceKey,
    pub conflicting_delivery: Option<Uuid>,
}

impl ConflictCheck {
    pub fn conflict(&self) -> bool {
        self.conflicting_delivery.is_some()
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self.conflicting_delivery {
            Some(delivery_id) => Err(AppError::SchedulingConflict {
                resource: self.resource.kind,
                delivery_id,
            }),
            None => Ok(()),
        }
    }
}

/// Scans the bookings of one resource for any overlap with `candidate`.
pub fn check_conflict(
    resource: ResourceKey,
    candidate: &Interval,
    existing: &[Booking],
) -> Result<ConflictCheck, AppError> {
    candidate.validate()?;

    let conflicting_delivery = existing
        .iter()
        .find(|booking| booking.interval.overlaps(candidate))
        .map(|booking| booking.delivery_id);

    Ok(ConflictCheck {
        resource,
        conflicting_delivery,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    fn window(from: (u32, u32), to: (u32, u32)) -> Interval {
        Interval {
            start: at(from.0, from.1),
            end: at(to.0, to.1),
        }
    }

    fn booked(interval: Interval) -> Booking {
        Booking {
            delivery_id: Uuid::new_v4(),
            interval,
        }
    }

    #[test]
    fn overlap_is_symmetric() {
        let windows = [
            window((9, 0), (10, 0)),
            window((9, 30), (10, 30)),
            window((10, 0), (11, 0)),
            window((8, 0), (12, 0)),
            window((10, 15), (10, 45)),
            window((11, 0), (11, 1)),
        ];

        for a in &windows {
            for b in &windows {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{a:?} vs {b:?}");
                if a.end <= b.start || b.end <= a.start {
                    assert!(!a.overlaps(b), "{a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn touching_boundaries_do_not_conflict() {
        let driver = ResourceKey::driver(Uuid::new_v4());
        let existing = [booked(window((10, 0), (11, 0)))];

        let overlapping = check_conflict(driver, &window((10, 30), (11, 30)), &existing).unwrap();
        assert!(overlapping.conflict());
        assert_eq!(overlapping.conflicting_delivery, Some(existing[0].delivery_id));

        let back_to_back = check_conflict(driver, &window((11, 0), (12, 0)), &existing).unwrap();
        assert!(!back_to_back.conflict());

        let before = check_conflict(driver, &window((9, 0), (10, 0)), &existing).unwrap();
        assert!(!before.conflict());
    }

    #[test]
    fn contained_window_conflicts() {
        let vehicle = ResourceKey::vehicle(Uuid::new_v4());
        let existing = [booked(window((8, 0), (12, 0)))];

        let check = check_conflict(vehicle, &window((9, 0), (9, 15)), &existing).unwrap();
        assert!(check.conflict());

        let err = check.into_result().unwrap_err();
        assert!(matches!(
            err,
            AppError::SchedulingConflict {
                resource: ResourceKind::Vehicle,
                ..
            }
        ));
    }

    #[test]
    fn empty_or_inverted_candidate_is_rejected() {
        let driver = ResourceKey::driver(Uuid::new_v4());

        let empty = window((10, 0), (10, 0));
        assert!(matches!(
            check_conflict(driver, &empty, &[]),
            Err(AppError::InvalidInterval { .. })
        ));

        assert!(Interval::new(at(11, 0), at(10, 0)).is_err());
        assert!(Interval::new(at(10, 0), at(11, 0)).is_ok());
    }

    #[test]
    fn drivers_sort_before_vehicles() {
        let id = Uuid::from_u128(1);
        let mut keys = vec![ResourceKey::vehicle(Uuid::nil()), ResourceKey::driver(id)];
        keys.sort();

        assert_eq!(keys[0].kind, ResourceKind::Driver);
    }
}
