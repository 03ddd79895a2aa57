use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::aif::AifCurve;
use crate::error::{ConfigError, DceError, ResourceError};

/// Read a prescribed arterial input function from a CSV file
///
/// The first two columns are time (seconds) and concentration. Any further
/// columns are ignored.
///
/// # Format details
///
/// - Lines starting with `#` are comments
/// - Rows whose first two fields are not numeric (column labels) are skipped
/// - Rows with fewer than two fields are skipped
/// - At least one valid data row is required, otherwise the file does not
///   describe an AIF and [ConfigError::NoAifSource] is returned
///
/// # Example
///
/// ```rust,no_run
/// use dcesol::data::parser::read_prescribed_aif;
///
/// let aif = read_prescribed_aif("path/to/aif.csv").unwrap();
/// println!("{} AIF samples", aif.len());
/// ```
pub fn read_prescribed_aif(path: impl AsRef<Path>) -> Result<AifCurve, DceError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ResourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    prescribed_aif_from_reader(file)
}

/// Parse a prescribed AIF from any reader, see [read_prescribed_aif]
pub fn prescribed_aif_from_reader<R: Read>(reader: R) -> Result<AifCurve, DceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut timing = Vec::new();
    let mut values = Vec::new();

    for record in reader.records() {
        let record = record.map_err(ResourceError::from)?;
        if record.len() < 2 {
            continue;
        }

        // column labels, or anything else that is not a data row
        let (Ok(time), Ok(value)) = (record[0].parse::<f64>(), record[1].parse::<f64>()) else {
            continue;
        };

        timing.push(time);
        values.push(value);
    }

    if timing.is_empty() {
        return Err(ConfigError::NoAifSource.into());
    }

    tracing::debug!("Prescribed AIF with {} samples", timing.len());
    Ok(AifCurve::new(timing, values)?)
}

/// Parse a prescribed AIF held in memory, see [read_prescribed_aif]
pub fn prescribed_aif_from_str(contents: &str) -> Result<AifCurve, DceError> {
    prescribed_aif_from_reader(contents.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_are_skipped() {
        let aif = prescribed_aif_from_str("#comment\n0,0\n1,0.5\n2,1.0\n").unwrap();
        assert_eq!(aif.times(), &[0.0, 1.0, 2.0]);
        assert_eq!(aif.values(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn header_rows_and_extra_columns_are_ignored() {
        let aif = prescribed_aif_from_str("time, conc, note\n0, 0.1, a\n5, 0.2\n").unwrap();
        assert_eq!(aif.times(), &[0.0, 5.0]);
        assert_eq!(aif.values(), &[0.1, 0.2]);
    }

    #[test]
    fn header_only_file_has_no_aif() {
        let err = prescribed_aif_from_str("time,concentration\n").unwrap_err();
        assert!(matches!(err, DceError::Config(ConfigError::NoAifSource)));
        assert!(err.to_string().contains("No AIF source derivable"));
    }

    #[test]
    fn short_rows_are_skipped() {
        let aif = prescribed_aif_from_str("1\n0,2\n\n3,4\n").unwrap();
        assert_eq!(aif.times(), &[0.0, 3.0]);
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let err = read_prescribed_aif("/nonexistent/dcesol/aif.csv").unwrap_err();
        assert!(matches!(err, DceError::Resource(ResourceError::Open { .. })));
    }
}
