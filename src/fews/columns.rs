//! FEWS column names and the deterministic ordering of threshold columns.

/// Station table columns, in output order. PARENT_ID is appended when parent
/// identifiers have been synthesized.
pub const STATION_COLUMNS: [&str; 11] = [
    "STATION_ID",
    "STATION_NAME",
    "STATION_SHORTNAME",
    "TOOLTIP",
    "LATITUDE",
    "LONGITUDE",
    "ALTITUDE",
    "COUNTRY",
    "ORGANIZATION",
    "SUBBASIN",
    "TYPE",
];

/// Series table base columns; threshold columns and identifier columns
/// follow.
pub const SERIES_BASE_COLUMNS: [&str; 6] = [
    "STATION_ID",
    "EXTERNAL_LOCATION_ID",
    "EXTERNAL_PARAMETER_ID",
    "TIMESTEP_HOUR",
    "UNIT",
    "IMPORT_SOURCE",
];

/// Fixed stage thresholds, populated only for the stage variable.
pub const STAGE_THRESHOLD_COLUMNS: [&str; 3] = [
    "THRESHOLD_LOW_WATERS",
    "THRESHOLD_FLOOD_ALERT",
    "THRESHOLD_EVACUATION",
];

pub const MONTH_ABBREVS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub const MONTHLY_STATS: [&str; 6] = ["mean", "p01", "p10", "p50", "p90", "p99"];

/// Column name for a monthly statistic; `month` is 1-based (1 = January).
pub fn monthly_threshold_column(month: u32, stat: &str) -> Option<String> {
    let abbrev = MONTH_ABBREVS.get(month.checked_sub(1)? as usize)?;
    Some(format!("THRESHOLD_{}_{}", abbrev, stat))
}

/// Column name for a percentile given as a fraction: 0.05 -> THRESHOLD_P05.
pub fn percentile_column(fraction: f64) -> String {
    format!("THRESHOLD_P{:02}", (fraction * 100.0).round() as u32)
}

/// Sorts threshold column names into their canonical order: stage thresholds
/// first, then monthly statistics by month and statistic, then percentiles
/// ascending. Unknown names go last, alphabetically.
pub fn order_threshold_columns(mut names: Vec<String>) -> Vec<String> {
    names.sort_by(|a, b| threshold_rank(a).cmp(&threshold_rank(b)).then_with(|| a.cmp(b)));
    names.dedup();
    names
}

fn threshold_rank(name: &str) -> (u8, u32) {
    if let Some(position) = STAGE_THRESHOLD_COLUMNS.iter().position(|c| *c == name) {
        return (0, position as u32);
    }
    if let Some(rank) = monthly_rank(name) {
        return (1, rank);
    }
    if let Some(nn) = name
        .strip_prefix("THRESHOLD_P")
        .and_then(|tail| tail.parse::<u32>().ok())
    {
        return (2, nn);
    }
    (3, 0)
}

fn monthly_rank(name: &str) -> Option<u32> {
    let tail = name.strip_prefix("THRESHOLD_")?;
    let (abbrev, stat) = tail.split_once('_')?;
    let month = MONTH_ABBREVS.iter().position(|m| *m == abbrev)?;
    let stat = MONTHLY_STATS.iter().position(|s| *s == stat)?;
    Some((month * MONTHLY_STATS.len() + stat) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_columns_are_zero_padded() {
        assert_eq!(percentile_column(0.05), "THRESHOLD_P05");
        assert_eq!(percentile_column(0.5), "THRESHOLD_P50");
        assert_eq!(percentile_column(0.95), "THRESHOLD_P95");
    }

    #[test]
    fn monthly_columns_use_one_based_months() {
        assert_eq!(
            monthly_threshold_column(1, "mean").as_deref(),
            Some("THRESHOLD_jan_mean")
        );
        assert_eq!(
            monthly_threshold_column(12, "p99").as_deref(),
            Some("THRESHOLD_dec_p99")
        );
        assert_eq!(monthly_threshold_column(0, "mean"), None);
        assert_eq!(monthly_threshold_column(13, "mean"), None);
    }

    #[test]
    fn threshold_columns_sort_into_canonical_order() {
        let names = vec![
            "THRESHOLD_P95".to_string(),
            "THRESHOLD_feb_mean".to_string(),
            "THRESHOLD_EVACUATION".to_string(),
            "THRESHOLD_jan_p99".to_string(),
            "THRESHOLD_P05".to_string(),
            "THRESHOLD_LOW_WATERS".to_string(),
            "THRESHOLD_jan_mean".to_string(),
        ];
        assert_eq!(
            order_threshold_columns(names),
            vec![
                "THRESHOLD_LOW_WATERS",
                "THRESHOLD_EVACUATION",
                "THRESHOLD_jan_mean",
                "THRESHOLD_jan_p99",
                "THRESHOLD_feb_mean",
                "THRESHOLD_P05",
                "THRESHOLD_P95",
            ]
        );
    }

    #[test]
    fn duplicate_threshold_columns_collapse() {
        let names = vec![
            "THRESHOLD_jan_mean".to_string(),
            "THRESHOLD_jan_mean".to_string(),
        ];
        assert_eq!(order_threshold_columns(names).len(), 1);
    }
}
