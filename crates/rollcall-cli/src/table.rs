//! Plain-text tables for the terminal.

use rollcall_core::{AttendanceRecord, RosterEntry};

/// Render rows under `headers`, padding every column to its widest cell.
fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let format_row = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let mut out = vec![
        format_row(headers.to_vec()),
        format_row(rule.iter().map(String::as_str).collect()),
    ];
    for row in rows {
        out.push(format_row(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

pub fn attendance(records: &[AttendanceRecord]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| vec![r.id.to_string(), r.name.clone(), r.timestamp.clone()])
        .collect();
    render(&["ID", "Name", "Timestamp"], &rows)
}

pub fn roster(entries: &[RosterEntry]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| vec![e.id.to_string(), e.name.clone()])
        .collect();
    render(&["ID", "Name"], &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attendance_table() {
        let records = vec![
            AttendanceRecord { id: 7, name: "Ada".into(), timestamp: "2026-10-16 09:00:00".into() },
            AttendanceRecord { id: 12, name: "Grace Hopper".into(), timestamp: "2026-10-16 09:05:10".into() },
        ];
        let expected = "\
ID  Name          Timestamp
--  ------------  -------------------
7   Ada           2026-10-16 09:00:00
12  Grace Hopper  2026-10-16 09:05:10";
        assert_eq!(attendance(&records), expected);
    }

    #[test]
    fn test_empty_roster_table() {
        assert_eq!(roster(&[]), "ID  Name\n--  ----");
    }
}
