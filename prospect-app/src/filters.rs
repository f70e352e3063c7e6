use std::io::BufRead;

/// Line that ends interactive entry.
pub const SENTINEL: &str = "done";

/// Read one entry per line until `done` (any case) or EOF. Blank lines are
/// skipped; entries are trimmed.
pub fn read_entries<R: BufRead>(reader: R) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let entry = line.trim();
        if entry.eq_ignore_ascii_case(SENTINEL) {
            break;
        }
        if !entry.is_empty() {
            out.push(entry.to_string());
        }
    }
    Ok(out)
}
