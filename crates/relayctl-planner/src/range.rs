//! Parser for textual port specs.
//!
//! Nodes declare their usable ports as a comma-separated list of single
//! ports and inclusive ranges, e.g. `"1000-2000,3000"`.

use thiserror::Error;

/// A port spec that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("port {0} out of range (1-65535)")]
    OutOfRange(u32),

    #[error("inverted range {start}-{end}")]
    Inverted { start: u16, end: u16 },
}

/// Parse a port spec into a sorted, deduplicated port list.
///
/// Ranges are inclusive on both ends. A missing or malformed range end
/// falls back to the start, so `"80-"` means just port 80; operators
/// write that when they reserve a slot they have not sized yet. Everything
/// else is strict: a malformed port or range start is an error rather than
/// a silently shrunk port set. An empty spec parses to an empty list.
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>, RangeError> {
    let mut ports = std::collections::BTreeSet::new();

    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_port(start.trim())?;
                let end = match end.trim() {
                    "" => start,
                    text => parse_port(text).unwrap_or(start),
                };
                if start > end {
                    return Err(RangeError::Inverted { start, end });
                }
                ports.extend(start..=end);
            }
            None => {
                ports.insert(parse_port(token)?);
            }
        }
    }

    Ok(ports.into_iter().collect())
}

fn parse_port(token: &str) -> Result<u16, RangeError> {
    let value: u32 = token
        .parse()
        .map_err(|_| RangeError::InvalidPort(token.to_string()))?;
    if value == 0 || value > u32::from(u16::MAX) {
        return Err(RangeError::OutOfRange(value));
    }
    Ok(value as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_ports_and_ranges() {
        assert_eq!(parse_port_spec("80").unwrap(), vec![80]);
        assert_eq!(parse_port_spec("80-82").unwrap(), vec![80, 81, 82]);
        assert_eq!(parse_port_spec("1000-2000,3000").unwrap().len(), 1002);
    }

    #[test]
    fn sorts_and_deduplicates() {
        assert_eq!(
            parse_port_spec("80,90-92,80").unwrap(),
            vec![80, 90, 91, 92]
        );
        assert_eq!(parse_port_spec("3000,1000").unwrap(), vec![1000, 3000]);
    }

    #[test]
    fn range_end_falls_back_to_start() {
        assert_eq!(parse_port_spec("80-").unwrap(), vec![80]);
        assert_eq!(parse_port_spec("80-x").unwrap(), vec![80]);
    }

    #[test]
    fn malformed_ports_are_rejected() {
        assert_eq!(
            parse_port_spec("x"),
            Err(RangeError::InvalidPort("x".to_string()))
        );
        assert_eq!(
            parse_port_spec("80,y,90"),
            Err(RangeError::InvalidPort("y".to_string()))
        );
        assert!(matches!(
            parse_port_spec("abc-90"),
            Err(RangeError::InvalidPort(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_and_inverted() {
        assert_eq!(parse_port_spec("0"), Err(RangeError::OutOfRange(0)));
        assert_eq!(parse_port_spec("70000"), Err(RangeError::OutOfRange(70000)));
        assert_eq!(
            parse_port_spec("90-80"),
            Err(RangeError::Inverted { start: 90, end: 80 })
        );
    }

    #[test]
    fn empty_specs_parse_to_nothing() {
        assert_eq!(parse_port_spec("").unwrap(), Vec::<u16>::new());
        assert_eq!(parse_port_spec("   ").unwrap(), Vec::<u16>::new());
        assert_eq!(parse_port_spec(",,80,").unwrap(), vec![80]);
    }

    #[test]
    fn boundary_ports_are_accepted() {
        assert_eq!(parse_port_spec("1,65535").unwrap(), vec![1, 65535]);
    }
}
