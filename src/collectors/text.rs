//! Line-oriented helpers shared by every output parser.
//!
//! None of these fail: a missing label or section is `None` (or, for
//! [`extract_section`], the untouched input).

const DIVIDER_CHARS: [char; 6] = ['-', '\u{2013}', '\u{2014}', '\u{2500}', '\u{2501}', '\u{2550}'];
const DIVIDER_MIN_LEN: usize = 10;

/// First line whose trimmed content contains `label`, compared without case.
pub fn first_line_containing<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let needle = label.to_lowercase();
    text.lines()
        .map(str::trim)
        .find(|line| line.to_lowercase().contains(&needle))
}

/// Trimmed remainder after the first colon.
pub fn value_after_colon(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, value)| value.trim())
}

/// Value of the first `Key: Value` line whose key equals `key` without case.
///
/// Stricter than [`first_line_containing`]: `SSID` does not match a `BSSID`
/// line, and alignment padding before the colon is ignored.
pub fn value_for_key<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(key).then(|| v.trim())
    })
}

pub fn digits_only(token: &str) -> String {
    token.chars().filter(char::is_ascii_digit).collect()
}

pub fn decimal_only(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect()
}

pub fn parse_u64_digits(token: &str) -> Option<u64> {
    digits_only(token).parse().ok()
}

pub fn parse_i32_loose(token: &str) -> Option<i32> {
    let cleaned = decimal_only(token);
    if let Ok(v) = cleaned.parse::<i32>() {
        return Some(v);
    }
    cleaned.parse::<f64>().ok().map(|v| v.round() as i32)
}

pub fn parse_f64_loose(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }
    let numeric: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | ','))
        .collect();
    if numeric.is_empty() {
        return None;
    }
    normalize_separators(&numeric).parse::<f64>().ok()
}

/// Resolves commas as either grouping or decimal separators.
///
/// With a dot present, or when every comma is followed by exactly three
/// digits ("1,201"), commas group thousands. Otherwise the first comma is a
/// decimal comma ("866,7").
fn normalize_separators(numeric: &str) -> String {
    if !numeric.contains(',') {
        return numeric.to_string();
    }
    let grouped = numeric.contains('.')
        || numeric
            .split(',')
            .skip(1)
            .all(|group| group.len() == 3 && group.chars().all(|c| c.is_ascii_digit()));
    if grouped {
        numeric.replace(',', "")
    } else {
        numeric.replacen(',', ".", 1)
    }
}

/// Some(trimmed) unless the value is blank.
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn is_divider(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= DIVIDER_MIN_LEN && trimmed.chars().all(|c| DIVIDER_CHARS.contains(&c))
}

/// Non-empty `|`-separated rows with exactly `columns` trimmed cells, as
/// produced by the PowerShell CIM queries.
pub fn query_rows<'a>(text: &'a str, columns: usize) -> impl Iterator<Item = Vec<&'a str>> + 'a {
    text.lines()
        .map(str::trim)
        .filter(|line| line.contains('|'))
        .map(move |line| line.splitn(columns, '|').map(str::trim).collect::<Vec<_>>())
        .filter(move |parts| parts.len() == columns)
}

/// Slice of `text` from the line equal to `title` up to the next divider.
///
/// Dividers directly under the title frame the heading and are kept; the
/// section ends at the first divider after body content. When no line
/// matches the title the whole input is returned.
pub fn extract_section<'a>(text: &'a str, title: &str) -> &'a str {
    let mut offset = 0;
    let mut start = None;
    let mut end = text.len();
    let mut seen_body = false;

    for line in text.split_inclusive('\n') {
        match start {
            None => {
                if line.trim().eq_ignore_ascii_case(title) {
                    start = Some(offset);
                }
            }
            Some(_) => {
                if is_divider(line) {
                    if seen_body {
                        end = offset;
                        break;
                    }
                } else if !line.trim().is_empty() {
                    seen_body = true;
                }
            }
        }
        offset += line.len();
    }

    match start {
        Some(start) => &text[start..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
————————————————————————————————————————
NETWORK
————————————————————————————————————————
    Primary IPv4         : en0
————————————————————————————————————————
WIFI
————————————————————————————————————————
    Interface Name       : en0
    SSID                 : HomeNet
————————————————————————————————————————
BLUETOOTH
————————————————————————————————————————
    Power                : On
";

    #[test]
    fn first_line_containing_ignores_case() {
        let text = "  Health Information:\n      Cycle Count: 312\n";
        assert_eq!(first_line_containing(text, "cycle count"), Some("Cycle Count: 312"));
        assert_eq!(first_line_containing(text, "Condition"), None);
    }

    #[test]
    fn value_after_colon_splits_on_first_colon_only() {
        assert_eq!(value_after_colon("BSSID: aa:bb:cc"), Some("aa:bb:cc"));
        assert_eq!(value_after_colon("no delimiter here"), None);
    }

    #[test]
    fn value_for_key_requires_exact_key() {
        let text = "     BSSID: aa:bb:cc:dd:ee:ff\n      SSID: HomeNet\n";
        assert_eq!(value_for_key(text, "ssid"), Some("HomeNet"));
        assert_eq!(value_for_key(text, "Channel"), None);
    }

    #[test]
    fn digit_and_decimal_coercion() {
        assert_eq!(digits_only("87%"), "87");
        assert_eq!(decimal_only("150.5 Mbps"), "150.5");
        assert_eq!(decimal_only("-56 dBm"), "-56");
        assert_eq!(parse_i32_loose("-71 dBm"), Some(-71));
        assert_eq!(parse_f64_loose("866,7"), Some(866.7));
        assert_eq!(parse_u64_digits("n/a"), None);
    }

    #[test]
    fn thousands_separators_are_not_decimal_commas() {
        assert_eq!(parse_f64_loose("1,201"), Some(1201.0));
        assert_eq!(parse_f64_loose("1,201 Mbps"), Some(1201.0));
        assert_eq!(parse_f64_loose("2,400,000"), Some(2_400_000.0));
        assert_eq!(parse_f64_loose("1,234.5"), Some(1234.5));
        assert_eq!(parse_f64_loose("866,7 Mbps"), Some(866.7));
        assert_eq!(parse_f64_loose("12,50"), Some(12.5));
        assert_eq!(parse_f64_loose("Mbps"), None);
    }

    #[test]
    fn query_rows_need_every_column() {
        let text = "a|b|c\r\nno separators\r\nshort|row\r\n x | y | z|w \r\n";
        let rows: Vec<Vec<&str>> = query_rows(text, 3).collect();
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["x", "y", "z|w"]]);
    }

    #[test]
    fn divider_needs_ten_dash_like_chars() {
        assert!(is_divider("----------"));
        assert!(is_divider("  ──────────────  "));
        assert!(!is_divider("---------"));
        assert!(!is_divider("-----x-----"));
    }

    #[test]
    fn extract_section_stops_at_next_divider() {
        let wifi = extract_section(DUMP, "wifi");
        assert!(wifi.starts_with("WIFI"));
        assert!(wifi.contains("SSID                 : HomeNet"));
        assert!(!wifi.contains("BLUETOOTH"));
        assert!(!wifi.contains("Primary IPv4"));
    }

    #[test]
    fn extract_section_runs_to_end_of_text() {
        let bt = extract_section(DUMP, "BLUETOOTH");
        assert!(bt.trim_end().ends_with("Power                : On"));
    }

    #[test]
    fn unframed_title_runs_to_first_divider() {
        let text = "\
NETWORK
    Primary IPv4         : en0
----------------------------------------
WIFI
    SSID                 : HomeNet
";
        let network = extract_section(text, "NETWORK");
        assert_eq!(network, "NETWORK\n    Primary IPv4         : en0\n");
    }

    #[test]
    fn extract_section_missing_title_returns_input() {
        let text = "SSID: HomeNet\nChannel: 36\n";
        assert_eq!(extract_section(text, "WIFI"), text);
    }
}
