use llmperf_core::EvalError;

/// A delimited text table with a header row.
#[derive(Clone, Debug)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Clone, Debug)]
pub struct Row {
    /// 1-based line number in the source text.
    pub line: usize,
    pub cells: Vec<String>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(name))
    }
}

impl Row {
    pub fn get(&self, idx: Option<usize>) -> &str {
        idx.and_then(|i| self.cells.get(i)).map(|s| s.trim()).unwrap_or("")
    }
}

/// Parse comma- or tab-delimited text. The delimiter is taken from the header
/// line: tab when it contains one, comma otherwise. Blank lines and lines
/// starting with `#` are ignored. Fields may be double-quoted; `""` inside a
/// quoted field is a literal quote.
pub fn parse_table(text: &str, origin: &str) -> Result<Table, EvalError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

    let (header_line, header_text) = lines
        .next()
        .ok_or_else(|| EvalError::malformed(origin, "empty table (header row required)"))?;
    let delim = if header_text.contains('\t') { '\t' } else { ',' };
    let header: Vec<String> = split_record(header_text, delim)
        .map_err(|e| EvalError::malformed(origin, format!("line {header_line}: {e}")))?
        .into_iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, text) in lines {
        let cells = split_record(text, delim).map_err(|e| EvalError::malformed(origin, format!("line {line}: {e}")))?;
        if cells.len() > header.len() {
            return Err(EvalError::malformed(
                origin,
                format!("line {line}: {} fields but header has {}", cells.len(), header.len()),
            ));
        }
        rows.push(Row { line, cells });
    }

    Ok(Table { header, rows })
}

fn split_record(line: &str, delim: char) -> Result<Vec<String>, String> {
    let mut cells = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    cur.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                c => cur.push(c),
            }
        } else if c == '"' && cur.trim().is_empty() {
            cur.clear();
            in_quotes = true;
        } else if c == delim {
            cells.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    cells.push(cur);
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_tab_delimiter() {
        let t = parse_table("a\tb\n1\t2\n", "t").unwrap();
        assert_eq!(t.header, vec!["a", "b"]);
        assert_eq!(t.rows[0].cells, vec!["1", "2"]);
        assert_eq!(t.rows[0].line, 2);
    }

    #[test]
    fn quoted_fields_keep_delimiters() {
        let t = parse_table("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n", "t").unwrap();
        assert_eq!(t.rows[0].cells, vec!["x, y", "say \"hi\""]);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let t = parse_table("# tasks\na,b\n\n1,2\r\n# done\n", "t").unwrap();
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0].cells, vec!["1", "2"]);
    }

    #[test]
    fn short_rows_read_as_empty() {
        let t = parse_table("a,b,c\n1\n", "t").unwrap();
        assert_eq!(t.rows[0].get(t.column("c")), "");
        assert_eq!(t.rows[0].get(t.column("missing")), "");
    }

    #[test]
    fn rejects_unterminated_quote_and_wide_rows() {
        assert!(parse_table("a,b\n\"open,2\n", "t").is_err());
        assert!(parse_table("a,b\n1,2,3\n", "t").is_err());
        assert!(parse_table("", "t").is_err());
    }
}
