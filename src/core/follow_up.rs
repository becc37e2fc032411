use super::entity::{FieldPatch, fields};
use chrono::{DateTime, Days, Months, Utc};
use serde_json::Value;

/// Follow-up windows a broker can pick for a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpTimeframe {
    OneWeek,
    TwoWeeks,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl FollowUpTimeframe {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1_week" => Some(Self::OneWeek),
            "2_weeks" => Some(Self::TwoWeeks),
            "1_month" => Some(Self::OneMonth),
            "3_months" => Some(Self::ThreeMonths),
            "6_months" => Some(Self::SixMonths),
            "1_year" => Some(Self::OneYear),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneWeek => "1_week",
            Self::TwoWeeks => "2_weeks",
            Self::OneMonth => "1_month",
            Self::ThreeMonths => "3_months",
            Self::SixMonths => "6_months",
            Self::OneYear => "1_year",
        }
    }

    /// Due date counted from `from`; month arithmetic clamps to month end.
    pub fn due_from(self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OneWeek => from.checked_add_days(Days::new(7)),
            Self::TwoWeeks => from.checked_add_days(Days::new(14)),
            Self::OneMonth => from.checked_add_months(Months::new(1)),
            Self::ThreeMonths => from.checked_add_months(Months::new(3)),
            Self::SixMonths => from.checked_add_months(Months::new(6)),
            Self::OneYear => from.checked_add_months(Months::new(12)),
        }
    }
}

/// Fills `followUpDate` when the patch sets a timeframe without a date.
///
/// A `null` timeframe clears the date too. Unknown timeframes leave the patch
/// as it is.
pub fn derive_follow_up_date(patch: &mut FieldPatch, now: DateTime<Utc>) {
    if patch.contains(fields::FOLLOW_UP_DATE) {
        return;
    }

    let Some(timeframe) = patch.get(fields::FOLLOW_UP_TIMEFRAME) else {
        return;
    };

    let due = match timeframe {
        Value::Null => Value::Null,
        Value::String(raw) => {
            match FollowUpTimeframe::parse(raw).and_then(|timeframe| timeframe.due_from(now)) {
                Some(due) => Value::String(due.to_rfc3339()),
                None => return,
            }
        }
        _ => return,
    };

    patch.set(fields::FOLLOW_UP_DATE, due);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn jan_31() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_round_trip() {
        for timeframe in [
            FollowUpTimeframe::OneWeek,
            FollowUpTimeframe::TwoWeeks,
            FollowUpTimeframe::OneMonth,
            FollowUpTimeframe::ThreeMonths,
            FollowUpTimeframe::SixMonths,
            FollowUpTimeframe::OneYear,
        ] {
            assert_eq!(FollowUpTimeframe::parse(timeframe.as_str()), Some(timeframe));
        }
        assert_eq!(FollowUpTimeframe::parse("someday"), None);
    }

    #[test]
    fn test_month_end_clamps() {
        let due = FollowUpTimeframe::OneMonth.due_from(jan_31()).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2026, 2, 28, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_derive_adds_date() {
        let mut patch = FieldPatch::new().with(fields::FOLLOW_UP_TIMEFRAME, json!("2_weeks"));
        derive_follow_up_date(&mut patch, jan_31());
        let expected = Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap();
        assert_eq!(
            patch.get(fields::FOLLOW_UP_DATE),
            Some(&json!(expected.to_rfc3339()))
        );
    }

    #[test]
    fn test_derive_respects_explicit_date_and_unknown_values() {
        let mut explicit = FieldPatch::new()
            .with(fields::FOLLOW_UP_TIMEFRAME, json!("1_year"))
            .with(fields::FOLLOW_UP_DATE, json!("2030-01-01T00:00:00Z"));
        derive_follow_up_date(&mut explicit, jan_31());
        assert_eq!(
            explicit.get(fields::FOLLOW_UP_DATE),
            Some(&json!("2030-01-01T00:00:00Z"))
        );

        let mut unknown = FieldPatch::new().with(fields::FOLLOW_UP_TIMEFRAME, json!("someday"));
        derive_follow_up_date(&mut unknown, jan_31());
        assert!(!unknown.contains(fields::FOLLOW_UP_DATE));
    }

    #[test]
    fn test_clearing_timeframe_clears_date() {
        let mut patch = FieldPatch::new().with(fields::FOLLOW_UP_TIMEFRAME, Value::Null);
        derive_follow_up_date(&mut patch, jan_31());
        assert_eq!(patch.get(fields::FOLLOW_UP_DATE), Some(&Value::Null));
    }
}
