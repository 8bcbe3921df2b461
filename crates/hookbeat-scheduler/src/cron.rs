//! Six-field cron expression evaluation.
//!
//! Field order is `seconds minutes hours day-of-month month day-of-week`,
//! with `*`, `?` (day fields), lists, ranges, steps, and three-letter
//! month/weekday names. Day-of-week runs 0–6 with 0 = Sunday. Evaluation
//! happens in the process-local timezone.
//!
//! When both day fields are restricted, a date matches if *either* field
//! matches (classic cron behaviour); when at least one is a wildcard, both
//! must match.

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, SubsecRound,
    TimeZone, Timelike,
};

use crate::error::SchedulerError;

/// How far ahead [`CronExpr::next_after`] searches before giving up.
/// Bounds the walk for expressions like `0 0 0 30 2 *` that never fire.
const SEARCH_HORIZON_DAYS: i64 = 365 * 5 + 2;

const MONTH_ALIASES: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];
const DOW_ALIASES: [(&str, u32); 7] = [
    ("sun", 0),
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
];

/// A parsed six-field cron expression.
///
/// Parsing is the only fallible step; a parsed expression can be evaluated
/// repeatedly and concurrently (it is immutable and `Clone`).
#[derive(Debug, Clone)]
pub struct CronExpr {
    seconds: u64,
    minutes: u64,
    hours: u64,
    dom: u64,
    months: u64,
    dow: u64,
    /// Wildcard flags for the two day fields; they select the
    /// either-matches rule in [`day_matches`](Self::day_matches).
    dom_star: bool,
    dow_star: bool,
}

impl std::str::FromStr for CronExpr {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(SchedulerError::InvalidExpression(format!(
                "expected 6 fields (seconds minutes hours day-of-month month day-of-week), got {}",
                fields.len()
            )));
        }

        let (seconds, _) = parse_field(fields[0], "seconds", 0, 59, &[])?;
        let (minutes, _) = parse_field(fields[1], "minutes", 0, 59, &[])?;
        let (hours, _) = parse_field(fields[2], "hours", 0, 23, &[])?;
        let (dom, dom_star) = parse_field(fields[3], "day-of-month", 1, 31, &[])?;
        let (months, _) = parse_field(fields[4], "month", 1, 12, &MONTH_ALIASES)?;
        let (dow, dow_star) = parse_field(fields[5], "day-of-week", 0, 6, &DOW_ALIASES)?;

        Ok(Self {
            seconds,
            minutes,
            hours,
            dom,
            months,
            dow,
            dom_star,
            dow_star,
        })
    }
}

impl CronExpr {
    /// The earliest instant strictly after `after` satisfying every field,
    /// or `None` when no such instant exists inside the search horizon.
    pub fn next_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut from = after.naive_local().trunc_subsecs(0) + Duration::seconds(1);
        let limit = from + Duration::days(SEARCH_HORIZON_DAYS);

        loop {
            let candidate = self.search(from, limit)?;
            // A wall-clock time can be absent locally (DST spring-forward
            // gap); skip past it and keep searching.
            match Local.from_local_datetime(&candidate) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => return Some(dt),
                LocalResult::None => from = candidate + Duration::seconds(1),
            }
        }
    }

    /// Field-wise forward search over naive local time: advance the
    /// coarsest unsatisfied field, reset everything below it, and restart
    /// whenever a carry ripples upward.
    fn search(&self, mut t: NaiveDateTime, limit: NaiveDateTime) -> Option<NaiveDateTime> {
        'restart: loop {
            if t > limit {
                return None;
            }

            while !bit(self.months, t.month()) {
                t = start_of_next_month(&t)?;
                if t > limit {
                    return None;
                }
            }

            while !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                if t > limit {
                    return None;
                }
                if t.day() == 1 {
                    // Rolled into the next month; recheck the month field.
                    continue 'restart;
                }
            }

            while !bit(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                if t.hour() == 0 {
                    continue 'restart;
                }
            }

            while !bit(self.minutes, t.minute()) {
                t = t.date().and_hms_opt(t.hour(), t.minute(), 0)? + Duration::minutes(1);
                if t.minute() == 0 {
                    continue 'restart;
                }
            }

            while !bit(self.seconds, t.second()) {
                t = t + Duration::seconds(1);
                if t.second() == 0 {
                    continue 'restart;
                }
            }

            return Some(t);
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom_ok = bit(self.dom, date.day());
        let dow_ok = bit(self.dow, date.weekday().num_days_from_sunday());
        if self.dom_star || self.dow_star {
            dom_ok && dow_ok
        } else {
            dom_ok || dow_ok
        }
    }
}

fn bit(mask: u64, value: u32) -> bool {
    (mask & (1 << value)) != 0
}

fn start_of_next_month(t: &NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Parse one field into a bitmask of allowed values plus a wildcard flag.
///
/// Grammar per comma-separated item: `*`, `?`, `N`, `N-M`, with an
/// optional `/step` suffix; `N/step` runs from N to the field maximum.
fn parse_field(
    text: &str,
    label: &str,
    min: u32,
    max: u32,
    aliases: &[(&str, u32)],
) -> Result<(u64, bool), SchedulerError> {
    let invalid =
        |msg: String| SchedulerError::InvalidExpression(format!("{label} field {text:?}: {msg}"));

    let mut mask = 0u64;
    let mut star = false;

    for item in text.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step_str)) => {
                let step: u32 = step_str
                    .parse()
                    .map_err(|_| invalid(format!("bad step {step_str:?}")))?;
                if step == 0 {
                    return Err(invalid("step must be positive".into()));
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (lo, hi) = if range == "*" || range == "?" {
            star = true;
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                parse_value(a, aliases).ok_or_else(|| invalid(format!("bad value {a:?}")))?,
                parse_value(b, aliases).ok_or_else(|| invalid(format!("bad value {b:?}")))?,
            )
        } else {
            let v =
                parse_value(range, aliases).ok_or_else(|| invalid(format!("bad value {range:?}")))?;
            // "N/step" means N through the field maximum.
            if item.contains('/') {
                (v, max)
            } else {
                (v, v)
            }
        };

        if lo < min || hi > max || lo > hi {
            return Err(invalid(format!("{lo}-{hi} outside {min}-{max}")));
        }

        let mut v = lo;
        while v <= hi {
            mask |= 1 << v;
            v += step;
        }
    }

    if mask == 0 {
        return Err(invalid("matches nothing".into()));
    }
    Ok((mask, star))
}

/// A numeric value or a three-letter name (case-insensitive).
fn parse_value(s: &str, aliases: &[(&str, u32)]) -> Option<u32> {
    if let Ok(n) = s.parse::<u32>() {
        return Some(n);
    }
    let lower = s.to_ascii_lowercase();
    aliases
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(s: &str) -> CronExpr {
        s.parse().unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!("* * * * *".parse::<CronExpr>().is_err());
        assert!("* * * * * * *".parse::<CronExpr>().is_err());
        assert!("".parse::<CronExpr>().is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        for bad in [
            "61 * * * * *",
            "* 60 * * * *",
            "* * 24 * * *",
            "* * * 0 * *",
            "* * * 32 * *",
            "* * * * 13 *",
            "* * * * * 7",
            "* * * * * MON-XYZ",
            "*/0 * * * * *",
            "10-5 * * * * *",
            "not a cron at all x y",
        ] {
            assert!(bad.parse::<CronExpr>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn accepts_lists_ranges_steps_and_names() {
        let e = expr("0 15,45 8-17/2 * JAN-JUN MON-FRI");
        assert!(bit(e.minutes, 15) && bit(e.minutes, 45) && !bit(e.minutes, 30));
        assert!(bit(e.hours, 8) && bit(e.hours, 10) && !bit(e.hours, 9));
        assert!(bit(e.months, 1) && bit(e.months, 6) && !bit(e.months, 7));
        assert!(bit(e.dow, 1) && bit(e.dow, 5) && !bit(e.dow, 0));
    }

    #[test]
    fn question_mark_is_a_day_wildcard() {
        let e = expr("0 0 12 ? * 3");
        assert!(e.dom_star);
        assert!(!e.dow_star);
    }

    #[test]
    fn every_second_advances_by_one() {
        let e = expr("*/1 * * * * *");
        let after = local(2026, 8, 6, 10, 0, 0);
        assert_eq!(e.next_after(after).unwrap(), local(2026, 8, 6, 10, 0, 1));
    }

    #[test]
    fn result_is_strictly_after_even_at_an_exact_match() {
        let e = expr("0 30 9 * * *");
        let at = local(2026, 8, 6, 9, 30, 0);
        assert_eq!(e.next_after(at).unwrap(), local(2026, 8, 7, 9, 30, 0));
    }

    #[test]
    fn carries_across_hour_and_day() {
        let e = expr("0 0 9 * * *");
        assert_eq!(
            e.next_after(local(2026, 8, 6, 9, 0, 1)).unwrap(),
            local(2026, 8, 7, 9, 0, 0)
        );
        let e = expr("30 59 23 * * *");
        assert_eq!(
            e.next_after(local(2026, 12, 31, 23, 59, 45)).unwrap(),
            local(2027, 1, 1, 23, 59, 30)
        );
    }

    #[test]
    fn day_31_with_fixed_month_searches_across_years() {
        // January 31 exists; after February it is next year's.
        let e = expr("0 0 0 31 1 *");
        assert_eq!(
            e.next_after(local(2026, 2, 1, 0, 0, 0)).unwrap(),
            local(2027, 1, 31, 0, 0, 0)
        );
    }

    #[test]
    fn day_31_in_a_30_day_month_never_fires() {
        let e = expr("0 0 0 31 4 *");
        assert!(e.next_after(local(2026, 8, 6, 0, 0, 0)).is_none());
    }

    #[test]
    fn feb_29_resolves_to_a_leap_year() {
        let e = expr("0 0 12 29 2 *");
        assert_eq!(
            e.next_after(local(2025, 3, 1, 0, 0, 0)).unwrap(),
            local(2028, 2, 29, 12, 0, 0)
        );
    }

    #[test]
    fn restricted_dom_and_dow_match_either() {
        // The 13th of any month OR any Friday. 2026-08-06 is a Thursday.
        let e = expr("0 0 0 13 * 5");
        let next = e.next_after(local(2026, 8, 6, 0, 0, 0)).unwrap();
        assert_eq!(next, local(2026, 8, 7, 0, 0, 0)); // Friday the 7th
        let after_friday = e.next_after(next).unwrap();
        assert_eq!(after_friday, local(2026, 8, 13, 0, 0, 0)); // then the 13th
    }

    #[test]
    fn wildcard_dom_makes_dow_binding() {
        // Every Monday at noon; 2026-08-10 is a Monday.
        let e = expr("0 0 12 * * MON");
        assert_eq!(
            e.next_after(local(2026, 8, 6, 0, 0, 0)).unwrap(),
            local(2026, 8, 10, 12, 0, 0)
        );
    }

    #[test]
    fn successive_triggers_satisfy_every_field() {
        let cases = [
            "*/15 * * * * *",
            "0 */5 * * * *",
            "30 10 2 * * *",
            "0 0 0 1 * *",
            "0 0 9 * * 1-5",
            "0 15,45 8-17/3 10-20 3,6,9 *",
        ];
        for source in cases {
            let e = expr(source);
            let mut at = local(2026, 8, 6, 13, 21, 7);
            for _ in 0..4 {
                let next = e.next_after(at).expect(source);
                assert!(next > at, "{source}: {next} not after {at}");
                assert!(bit(e.seconds, next.second()), "{source}: second {next}");
                assert!(bit(e.minutes, next.minute()), "{source}: minute {next}");
                assert!(bit(e.hours, next.hour()), "{source}: hour {next}");
                assert!(bit(e.months, next.month()), "{source}: month {next}");
                assert!(
                    e.day_matches(next.date_naive()),
                    "{source}: day rule {next}"
                );
                at = next;
            }
        }
    }
}
