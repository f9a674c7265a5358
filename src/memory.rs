//! Instance sizes as written in configuration (`"4g"`, `"0.5g"`, `"2048m"`)
//! and as sent to the API (megabytes).

use thiserror::Error;

/// Smallest non-zero instance size in MB, and the size granularity.
pub const MIN_SIZE_MB: u32 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeError {
    #[error("size cannot be empty")]
    Empty,

    #[error("invalid size \"{0}\": expected a number followed by m, mb, g or gb")]
    Format(String),

    #[error("size \"{0}\" is below the minimum of 0.5g")]
    TooSmall(String),

    #[error("size \"{0}\" must be a multiple of 0.5g (512m)")]
    NotMultiple(String),

    #[error("size \"{0}\" is too large")]
    TooLarge(String),
}

/// Parse a size into MB.
///
/// Units are case insensitive. Zero is accepted and means "no capacity"
/// for the topology element.
pub fn parse_size(input: &str) -> Result<u32, SizeError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(SizeError::Empty);
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| SizeError::Format(input.to_string()))?;

    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "m" | "mb" => 1.0,
        "g" | "gb" => 1024.0,
        _ => return Err(SizeError::Format(input.to_string())),
    };

    let mb = number * multiplier;
    if mb > u32::MAX as f64 {
        return Err(SizeError::TooLarge(input.to_string()));
    }
    if mb.fract() != 0.0 {
        return Err(SizeError::NotMultiple(input.to_string()));
    }
    let mb = mb as u32;

    if mb == 0 {
        return Ok(0);
    }
    if mb < MIN_SIZE_MB {
        return Err(SizeError::TooSmall(input.to_string()));
    }
    if mb % MIN_SIZE_MB != 0 {
        return Err(SizeError::NotMultiple(input.to_string()));
    }
    Ok(mb)
}

/// Format MB the way sizes are stored in state.
pub fn size_to_state(mb: u32) -> String {
    if mb % MIN_SIZE_MB == 0 {
        format!("{}g", f64::from(mb) / 1024.0)
    } else {
        format!("{}m", mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4g"), Ok(4096));
        assert_eq!(parse_size("0.5g"), Ok(512));
        assert_eq!(parse_size("2048m"), Ok(2048));
        assert_eq!(parse_size("1GB"), Ok(1024));
        assert_eq!(parse_size("1536MB"), Ok(1536));
        assert_eq!(parse_size("0g"), Ok(0));
    }

    #[test]
    fn test_parse_size_errors() {
        assert_eq!(parse_size(""), Err(SizeError::Empty));
        assert_eq!(parse_size("   "), Err(SizeError::Empty));
        assert_eq!(parse_size("256m"), Err(SizeError::TooSmall("256m".into())));
        assert_eq!(parse_size("1000m"), Err(SizeError::NotMultiple("1000m".into())));
        assert_eq!(parse_size("0.3g"), Err(SizeError::NotMultiple("0.3g".into())));
        assert!(matches!(parse_size("4"), Err(SizeError::Format(_))));
        assert!(matches!(parse_size("4t"), Err(SizeError::Format(_))));
        assert!(matches!(parse_size("g"), Err(SizeError::Format(_))));
    }

    #[test]
    fn test_parse_size_overflow() {
        assert_eq!(
            parse_size("5000000g"),
            Err(SizeError::TooLarge("5000000g".into()))
        );
        assert_eq!(
            parse_size("4294967296m"),
            Err(SizeError::TooLarge("4294967296m".into()))
        );
        assert_eq!(parse_size("4194304g"), Err(SizeError::TooLarge("4194304g".into())));
        assert!(parse_size("4194303.5g").is_ok());
    }

    #[test]
    fn test_size_to_state() {
        assert_eq!(size_to_state(512), "0.5g");
        assert_eq!(size_to_state(1536), "1.5g");
        assert_eq!(size_to_state(4096), "4g");
        assert_eq!(size_to_state(0), "0g");
        assert_eq!(size_to_state(1000), "1000m");
    }

    #[test]
    fn test_state_form_parses_back() {
        for mb in [512, 1024, 1536, 8192, 65536] {
            assert_eq!(parse_size(&size_to_state(mb)), Ok(mb));
        }
    }
}
