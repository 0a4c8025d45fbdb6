//! A1 notation ranges

use std::fmt;
use std::str::FromStr;

use super::SheetsError;

/// A rectangular range such as `users!A2:C` or `'Team roster'!A5:C5`.
///
/// Columns and rows are 1-based. An `end_row` of `None` means the range is
/// unbounded downwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    pub start_column: u32,
    pub start_row: u32,
    pub end_column: u32,
    pub end_row: Option<u32>,
}

impl A1Range {
    /// Number of columns covered by the range
    pub const fn width(&self) -> u32 {
        self.end_column + 1 - self.start_column
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_name(f, &self.sheet)?;
        write!(
            f,
            "!{}{}:{}",
            column_letters(self.start_column),
            self.start_row,
            column_letters(self.end_column)
        )?;
        if let Some(end_row) = self.end_row {
            write!(f, "{end_row}")?;
        }
        Ok(())
    }
}

impl FromStr for A1Range {
    type Err = SheetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SheetsError::InvalidConfiguration(format!("invalid A1 range `{s}`"));

        let (sheet, cells) = split_sheet(s).ok_or_else(invalid)?;
        let (start, end) = cells.split_once(':').ok_or_else(invalid)?;
        let (start_column, start_row) = split_cell(start).ok_or_else(invalid)?;
        let (end_column, end_row) = split_cell(end).ok_or_else(invalid)?;
        let start_row = start_row.ok_or_else(invalid)?;

        if end_column < start_column || end_row.is_some_and(|end| end < start_row) {
            return Err(invalid());
        }

        Ok(Self {
            sheet,
            start_column,
            start_row,
            end_column,
            end_row,
        })
    }
}

/// Spreadsheet column letters for a 1-based column index (1 → `A`, 27 → `AA`).
#[allow(clippy::cast_possible_truncation)] // remainder is always < 26
pub fn column_letters(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let remainder = (index - 1) % 26;
        letters.push(char::from(b'A' + remainder as u8));
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// 1-based column index for spreadsheet column letters (`A` → 1, `AA` → 27).
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, ch| {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_uppercase() {
            return None;
        }
        acc.checked_mul(26)?.checked_add(u32::from(ch) - u32::from('A') + 1)
    })
}

fn write_sheet_name(f: &mut fmt::Formatter<'_>, sheet: &str) -> fmt::Result {
    let plain = !sheet.is_empty() && sheet.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if plain {
        f.write_str(sheet)
    } else {
        write!(f, "'{}'", sheet.replace('\'', "''"))
    }
}

fn split_sheet(s: &str) -> Option<(String, &str)> {
    if let Some(quoted) = s.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            if ch != '\'' {
                name.push(ch);
                continue;
            }
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                name.push('\'');
                continue;
            }
            let rest = quoted[idx + 1..].strip_prefix('!')?;
            return Some((name, rest));
        }
        None
    } else {
        let (sheet, rest) = s.split_once('!')?;
        if sheet.is_empty() {
            return None;
        }
        Some((sheet.to_string(), rest))
    }
}

fn split_cell(cell: &str) -> Option<(u32, Option<u32>)> {
    let digits_at = cell
        .find(|ch: char| ch.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(digits_at);
    let column = column_index(letters)?;
    let row = if digits.is_empty() {
        None
    } else {
        let row = digits.parse::<u32>().ok()?;
        if row == 0 {
            return None;
        }
        Some(row)
    };
    Some((column, row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn column_letters_roundtrip_edges() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(3), "C");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_index("AA"), Some(27));
        assert_eq!(column_index("c"), Some(3));
        assert_eq!(column_index("A1"), None);
        assert_eq!(column_index(""), None);
    }

    #[test]
    fn parses_unbounded_scan_range() {
        let range: A1Range = "users!A2:C".parse().unwrap();
        assert_eq!(
            range,
            A1Range {
                sheet: "users".to_string(),
                start_column: 1,
                start_row: 2,
                end_column: 3,
                end_row: None,
            }
        );
        assert_eq!(range.width(), 3);
        assert_eq!(range.to_string(), "users!A2:C");
    }

    #[test]
    fn parses_single_row_range() {
        let range: A1Range = "users!A5:C5".parse().unwrap();
        assert_eq!(range.end_row, Some(5));
        assert_eq!(range.to_string(), "users!A5:C5");
    }

    #[test]
    fn quotes_sheet_names_with_spaces() {
        let range = A1Range {
            sheet: "Bo's roster".to_string(),
            start_column: 1,
            start_row: 2,
            end_column: 3,
            end_row: Some(2),
        };
        let rendered = range.to_string();
        assert_eq!(rendered, "'Bo''s roster'!A2:C2");
        assert_eq!(rendered.parse::<A1Range>().unwrap(), range);
    }

    #[test]
    fn rejects_malformed_ranges() {
        for raw in ["A1:C", "users!A:C", "users!C2:A2", "users!A5:C2", "!A1:B2", "users!A0:C"] {
            assert!(raw.parse::<A1Range>().is_err(), "{raw} should be rejected");
        }
    }
}
