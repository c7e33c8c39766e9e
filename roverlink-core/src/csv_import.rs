//! Mission waypoint import from comma separated coordinate files.
//!
//! The format is one `x,y` pair per line, no header. Blank lines are skipped.
//! A single malformed line rejects the whole file.

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::CsvError;
use crate::waypoint::MissionWaypoint;

/// Parse a coordinate file into an ordered mission.
///
/// Line numbers in errors are physical lines of `text`, blank lines included.
pub fn parse_mission(text: &str) -> Result<Vec<MissionWaypoint>, CsvError> {
    let mut points = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }

        let line = idx as u64 + 1;
        let point = split_fields(raw)
            .and_then(|record| parse_record(&record))
            .map_err(|reason| CsvError { line, reason })?;
        points.push(point);
    }

    log::debug!("Parsed {} mission waypoints", points.len());
    Ok(points)
}

/// Split one non-blank line into trimmed fields.
fn split_fields(raw: &str) -> Result<StringRecord, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(raw.as_bytes());

    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Ok(record),
        Ok(false) => Err("no fields".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_record(record: &StringRecord) -> Result<MissionWaypoint, String> {
    if record.len() != 2 {
        return Err(format!("expected 2 fields, found {}", record.len()));
    }
    let x = parse_coordinate(&record[0])?;
    let y = parse_coordinate(&record[1])?;
    Ok(MissionWaypoint::new(x, y))
}

fn parse_coordinate(field: &str) -> Result<f64, String> {
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("'{}' is not a finite number", field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(points: &[MissionWaypoint]) -> Vec<(f64, f64)> {
        points.iter().map(|p| (p.x, p.y)).collect()
    }

    #[test]
    fn test_parse_in_file_order() {
        let points = parse_mission("1,2\n3,4\n5,6").unwrap();
        assert_eq!(pairs(&points), vec![(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)]);
    }

    #[test]
    fn test_bad_line_rejects_everything() {
        let err = parse_mission("1,2\nbad\n3,4").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_blank_lines_and_whitespace() {
        let points = parse_mission("\n 1.5 , -2\r\n\r\n3,4e1\n\n").unwrap();
        assert_eq!(pairs(&points), vec![(1.5, -2.0), (3.0, 40.0)]);
    }

    #[test]
    fn test_field_count_must_be_two() {
        assert_eq!(parse_mission("1,2\n3,4,5").unwrap_err().line, 2);
        assert_eq!(parse_mission("7").unwrap_err().line, 1);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        assert_eq!(parse_mission("1,2\nNaN,3").unwrap_err().line, 2);
        assert_eq!(parse_mission("inf,3").unwrap_err().line, 1);
        assert_eq!(parse_mission("1,").unwrap_err().line, 1);
    }

    #[test]
    fn test_comma_only_line_is_an_error() {
        let err = parse_mission("1,2\n,\n3,4").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(parse_mission("1,2\n , \n3,4").unwrap_err().line, 2);
    }

    #[test]
    fn test_error_names_physical_line() {
        let err = parse_mission("\n1,2\n\nbad").unwrap_err();
        assert_eq!(err.line, 4);

        let err = parse_mission("\r\n\r\n1,2\r\n  \r\n3,x\r\n").unwrap_err();
        assert_eq!(err.line, 5);
    }

    #[test]
    fn test_empty_file_is_empty_mission() {
        assert!(parse_mission("").unwrap().is_empty());
    }
}
