//! Timestep derivation for time-series metadata.
//!
//! WHOS reports an aggregation duration as an ISO-8601 string ("PT1H", "P1D"),
//! while a5 reports a `timeSupport` interval object keyed by unit names
//! (`{"hours": 1}`). Both are reduced to a timestep in hours for the FEWS
//! tables.

use std::collections::HashMap;

use chrono::{Months, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimestepError {
    #[error("Invalid ISO-8601 duration '{0}'")]
    InvalidDuration(String),

    #[error("Fractional {1} component not supported in duration '{0}'")]
    FractionalCalendarComponent(String, &'static str),
}

/// Anchor used to resolve calendar-based designators. A month counts the days
/// it actually spans starting from this date, so "P1M" is January 1970 (744 h)
/// and "P1Y" is the non-leap year 1970 (8760 h).
fn anchor() -> NaiveDate {
    // NaiveDate::default() is the Unix epoch, 1970-01-01.
    NaiveDate::default()
}

/// Converts an ISO-8601 duration to a number of hours.
///
/// Time designators (hours, minutes, seconds) and day/week designators map
/// exactly; year and month designators map through their anchored delta at
/// 1970-01-01.
pub fn iso_duration_to_hours(duration: &str) -> Result<f64, TimestepError> {
    let text = duration.trim();
    let body = text
        .strip_prefix('P')
        .ok_or_else(|| TimestepError::InvalidDuration(text.to_string()))?;
    if body.is_empty() {
        return Err(TimestepError::InvalidDuration(text.to_string()));
    }

    let (date_part, time_part) = match body.split_once('T') {
        Some((d, t)) => (d, t),
        None => (body, ""),
    };

    let mut years = 0.0;
    let mut months = 0.0;
    let mut hours = 0.0;

    for (value, designator) in designators(date_part, text)? {
        match designator {
            'Y' => years = value,
            'M' => months = value,
            'W' => hours += value * 24.0 * 7.0,
            'D' => hours += value * 24.0,
            _ => return Err(TimestepError::InvalidDuration(text.to_string())),
        }
    }
    for (value, designator) in designators(time_part, text)? {
        match designator {
            'H' => hours += value,
            'M' => hours += value / 60.0,
            'S' => hours += value / 3600.0,
            _ => return Err(TimestepError::InvalidDuration(text.to_string())),
        }
    }

    if years != 0.0 || months != 0.0 {
        if years.fract() != 0.0 {
            return Err(TimestepError::FractionalCalendarComponent(
                text.to_string(),
                "year",
            ));
        }
        if months.fract() != 0.0 {
            return Err(TimestepError::FractionalCalendarComponent(
                text.to_string(),
                "month",
            ));
        }
        let total_months = years as u32 * 12 + months as u32;
        let shifted = anchor() + Months::new(total_months);
        hours += (shifted - anchor()).num_days() as f64 * 24.0;
    }

    Ok(hours)
}

fn designators(part: &str, full: &str) -> Result<Vec<(f64, char)>, TimestepError> {
    let mut out = Vec::new();
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else if c.is_ascii_alphabetic() {
            let value = number
                .parse::<f64>()
                .map_err(|_| TimestepError::InvalidDuration(full.to_string()))?;
            out.push((value, c.to_ascii_uppercase()));
            number.clear();
        } else {
            return Err(TimestepError::InvalidDuration(full.to_string()));
        }
    }
    if !number.is_empty() {
        // Trailing digits without a designator.
        return Err(TimestepError::InvalidDuration(full.to_string()));
    }
    Ok(out)
}

/// Converts an a5 `timeSupport` interval object to hours.
///
/// Unit keys are accepted in singular or plural form; months count 31 days
/// and years 365 days, matching the upstream convention. An empty interval
/// yields `None`; unknown keys are ignored.
pub fn interval_to_hours(interval: &HashMap<String, f64>) -> Option<f64> {
    if interval.is_empty() {
        return None;
    }
    let mut seconds = 0.0;
    for (unit, value) in interval {
        seconds += match unit.as_str() {
            "millisecond" | "milliseconds" => value * 0.001,
            "second" | "seconds" => *value,
            "minute" | "minutes" => value * 60.0,
            "hour" | "hours" => value * 3600.0,
            "day" | "days" => value * 86_400.0,
            "week" | "weeks" => value * 86_400.0 * 7.0,
            "mon" | "month" | "months" => value * 86_400.0 * 31.0,
            "year" | "years" => value * 86_400.0 * 365.0,
            _ => 0.0,
        };
    }
    Some(seconds / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt1h_is_one_hour() {
        assert_eq!(iso_duration_to_hours("PT1H").unwrap(), 1.0);
    }

    #[test]
    fn time_designators_map_exactly() {
        assert_eq!(iso_duration_to_hours("PT30M").unwrap(), 0.5);
        assert_eq!(iso_duration_to_hours("PT90S").unwrap(), 0.025);
        assert_eq!(iso_duration_to_hours("P1D").unwrap(), 24.0);
        assert_eq!(iso_duration_to_hours("P1W").unwrap(), 168.0);
        assert_eq!(iso_duration_to_hours("P1DT6H").unwrap(), 30.0);
    }

    #[test]
    fn calendar_designators_use_anchored_delta() {
        // January 1970 has 31 days.
        assert_eq!(iso_duration_to_hours("P1M").unwrap(), 744.0);
        // 1970 is not a leap year.
        assert_eq!(iso_duration_to_hours("P1Y").unwrap(), 8760.0);
        // Jan + Feb 1970 = 31 + 28 days.
        assert_eq!(iso_duration_to_hours("P2M").unwrap(), 59.0 * 24.0);
    }

    #[test]
    fn invalid_durations_are_rejected() {
        assert!(iso_duration_to_hours("1H").is_err());
        assert!(iso_duration_to_hours("P").is_err());
        assert!(iso_duration_to_hours("PT1X").is_err());
        assert!(iso_duration_to_hours("PT1").is_err());
    }

    #[test]
    fn interval_objects_map_to_hours() {
        let mut interval = HashMap::new();
        interval.insert("hours".to_string(), 1.0);
        assert_eq!(interval_to_hours(&interval), Some(1.0));

        let mut interval = HashMap::new();
        interval.insert("months".to_string(), 1.0);
        assert_eq!(interval_to_hours(&interval), Some(744.0));

        let mut interval = HashMap::new();
        interval.insert("day".to_string(), 1.0);
        interval.insert("hours".to_string(), 12.0);
        assert_eq!(interval_to_hours(&interval), Some(36.0));
    }

    #[test]
    fn empty_interval_has_no_timestep() {
        assert_eq!(interval_to_hours(&HashMap::new()), None);
    }
}
