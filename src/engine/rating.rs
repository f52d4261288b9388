use crate::models::rating::{RatingRecord, RatingSnapshot};

/// Average reported for a user nobody has rated yet. `count == 0`
/// distinguishes "unrated" from a genuinely low score.
pub const UNRATED_AVERAGE: f64 = 0.0;

/// Mean score rounded to one decimal place, with the number of ratings.
pub fn aggregate(records: &[RatingRecord]) -> RatingSnapshot {
    if records.is_empty() {
        return RatingSnapshot {
            average: UNRATED_AVERAGE,
            count: 0,
        };
    }

    let sum: f64 = records.iter().map(|r| f64::from(r.score)).sum();
    let mean = sum / records.len() as f64;

    RatingSnapshot {
        average: (mean * 10.0).round() / 10.0,
        count: records.len(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{UNRATED_AVERAGE, aggregate};
    use crate::models::rating::RatingRecord;

    fn rating(score: i16) -> RatingRecord {
        RatingRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::from_u128(1),
            rated_by: Uuid::new_v4(),
            score,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unrated_user_gets_the_default() {
        let snapshot = aggregate(&[]);
        assert_eq!(snapshot.average, UNRATED_AVERAGE);
        assert_eq!(snapshot.count, 0);
    }

    #[test]
    fn average_is_rounded_to_one_decimal() {
        let snapshot = aggregate(&[rating(5), rating(4), rating(4)]);
        assert_eq!(snapshot.average, 4.3);
        assert_eq!(snapshot.count, 3);
    }
}
