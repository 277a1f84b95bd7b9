//! Output formatting helpers for human-readable and JSON output.

use sysdata::record::Atom;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json { OutputFormat::Json } else { OutputFormat::Human }
    }
}

/// Print a table with aligned columns in human-readable format.
///
/// `headers` and each row in `rows` must have the same length.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in table_lines(headers, rows) {
        println!("{line}");
    }
}

fn table_lines(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    if rows.is_empty() {
        return Vec::new();
    }

    let col_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let align = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![align(headers.to_vec())];
    for row in rows {
        lines.push(align(row.iter().take(col_count).map(String::as_str).collect()));
    }
    lines
}

/// Rows of a key/value listing, with null shown as an empty cell.
pub fn pair_rows(pairs: &[(String, Atom)]) -> Vec<Vec<String>> {
    pairs
        .iter()
        .map(|(key, val)| {
            let shown = match val {
                Atom::Null => String::new(),
                other => other.to_string(),
            };
            vec![key.clone(), shown]
        })
        .collect()
}

/// JSON object of a key/value listing.
pub fn pairs_json(pairs: &[(String, Atom)]) -> Result<serde_json::Value, serde_json::Error> {
    let mut map = serde_json::Map::new();
    for (key, val) in pairs {
        map.insert(key.clone(), serde_json::to_value(val)?);
    }
    Ok(serde_json::Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_alignment() {
        let rows = vec![
            vec!["zA".to_string(), "4".to_string()],
            vec!["zLong".to_string(), String::new()],
        ];
        let lines = table_lines(&["KEY", "VALUE"], &rows);
        assert_eq!(lines, vec!["KEY    VALUE", "zA     4", "zLong"]);
        assert!(table_lines(&["KEY"], &[]).is_empty());
    }

    #[test]
    fn test_pairs() {
        let pairs = vec![("b".to_string(), Atom::Int(1)), ("a".to_string(), Atom::Null)];
        assert_eq!(pair_rows(&pairs)[1], vec!["a".to_string(), String::new()]);
        let json = pairs_json(&pairs).unwrap();
        assert_eq!(json["b"], serde_json::json!(1));
    }
}
