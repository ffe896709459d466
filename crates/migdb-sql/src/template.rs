//! Statement template scanning.
//!
//! A template is SQL text containing named markers such as `:user_id`. The
//! scanner splits a template into literal text and markers, leaving quoted
//! strings, quoted identifiers, comments, dollar-quoted bodies and `::` casts
//! untouched.

use crate::error::{Error, Result};

/// The character introducing a named marker.
pub const MARKER_SIGIL: char = ':';

/// Marker name reserved for the bulk `VALUES` insertion point.
pub const BULK_MARKER: &str = "VALUES";

/// A piece of a scanned template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal SQL text, copied through unchanged.
    Text(&'a str),
    /// A named marker, without its sigil.
    Marker {
        /// The marker name.
        name: &'a str,
        /// Byte offset of the sigil in the template.
        position: usize,
    },
}

/// Returns true for characters allowed in a marker name.
#[must_use]
pub const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A stretch of a template as seen by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region<'a> {
    /// SQL code, where markers and placeholders are recognized.
    Code {
        /// The code text.
        text: &'a str,
        /// Byte offset of `text` in the template.
        offset: usize,
    },
    /// A string literal, quoted identifier, comment or dollar-quoted body.
    Quoted(&'a str),
}

/// Splits a template into code and quoted regions.
///
/// Concatenating the regions gives back the template.
pub fn regions(template: &str) -> Result<Vec<Region<'_>>> {
    Scanner::new(template).run()
}

/// Splits a template into text and marker segments.
pub fn scan(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut text_start = 0;

    for region in regions(template)? {
        let Region::Code { text, offset } = region else {
            continue;
        };
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != MARKER_SIGIL as u8 {
                i += 1;
                continue;
            }

            // `::type` casts and any longer run of sigils are plain text.
            let run = bytes[i..]
                .iter()
                .take_while(|&&b| b == MARKER_SIGIL as u8)
                .count();
            if run > 1 {
                i += run;
                continue;
            }

            let name_len = bytes[i + 1..]
                .iter()
                .take_while(|&&b| is_name_char(b as char))
                .count();
            if name_len == 0 {
                i += 1;
                continue;
            }

            let position = offset + i;
            if position > text_start {
                segments.push(Segment::Text(&template[text_start..position]));
            }
            segments.push(Segment::Marker {
                name: &template[position + 1..position + 1 + name_len],
                position,
            });
            text_start = position + 1 + name_len;
            i += 1 + name_len;
        }
    }

    if template.len() > text_start {
        segments.push(Segment::Text(&template[text_start..]));
    }
    Ok(segments)
}

/// Returns the names of all markers in a template, in order of appearance.
pub fn marker_names(template: &str) -> Result<Vec<&str>> {
    Ok(scan(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Marker { name, .. } => Some(name),
            Segment::Text(_) => None,
        })
        .collect())
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    code_start: usize,
    regions: Vec<Region<'a>>,
}

impl<'a> Scanner<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            code_start: 0,
            regions: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn malformed(&self, position: usize, reason: &str) -> Error {
        Error::MalformedTemplate {
            position,
            reason: reason.to_string(),
            statement: self.input.to_string(),
        }
    }

    fn flush_code(&mut self, end: usize) {
        if end > self.code_start {
            self.regions.push(Region::Code {
                text: &self.input[self.code_start..end],
                offset: self.code_start,
            });
        }
    }

    fn run(mut self) -> Result<Vec<Region<'a>>> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                '\'' => self.skip_string()?,
                '"' => self.skip_quoted_identifier()?,
                '-' if self.peek_next() == Some('-') => self.skip_line_comment(),
                '/' if self.peek_next() == Some('*') => self.skip_block_comment()?,
                '$' => match self.dollar_tag() {
                    Some(tag) => self.skip_dollar_quoted(tag)?,
                    None => {
                        self.advance();
                        continue;
                    }
                },
                _ => {
                    self.advance();
                    continue;
                }
            }
            self.flush_code(start);
            self.regions.push(Region::Quoted(&self.input[start..self.pos]));
            self.code_start = self.pos;
        }
        self.flush_code(self.pos);
        Ok(self.regions)
    }

    /// Skips a single-quoted literal. `''` and backslash escapes do not close it.
    fn skip_string(&mut self) -> Result<()> {
        let start = self.pos;
        self.advance();
        loop {
            match self.advance() {
                Some('\\') => {
                    self.advance();
                }
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.advance();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Err(self.malformed(start, "unterminated string literal")),
            }
        }
    }

    fn skip_quoted_identifier(&mut self) -> Result<()> {
        let start = self.pos;
        self.advance();
        loop {
            match self.advance() {
                Some('"') => {
                    if self.peek() == Some('"') {
                        self.advance();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Err(self.malformed(start, "unterminated quoted identifier")),
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let start = self.pos;
        self.advance(); // /
        self.advance(); // *
        loop {
            match self.advance() {
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(self.malformed(start, "unterminated block comment")),
            }
        }
    }

    /// Returns the `$tag$` delimiter opening at the cursor, if any.
    ///
    /// A tag never starts with a digit, so `$1` stays a placeholder, and a `$`
    /// inside an identifier such as `a$b` opens nothing.
    fn dollar_tag(&self) -> Option<&'a str> {
        let input = self.input;
        if input[..self.pos]
            .chars()
            .next_back()
            .is_some_and(is_name_char)
        {
            return None;
        }
        let rest = &input[self.pos..];
        let tag_len = rest[1..].find('$')?;
        let tag = &rest[1..=tag_len];
        let valid_start = tag
            .chars()
            .next()
            .map_or(true, |c| c.is_ascii_alphabetic() || c == '_');
        (valid_start && tag.chars().all(is_name_char)).then(|| &rest[..tag_len + 2])
    }

    fn skip_dollar_quoted(&mut self, delimiter: &str) -> Result<()> {
        let start = self.pos;
        let body = start + delimiter.len();
        match self.input[body..].find(delimiter) {
            Some(end) => {
                self.pos = body + end + delimiter.len();
                Ok(())
            }
            None => Err(self.malformed(start, "unterminated dollar-quoted string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_markers() {
        let segments = scan("SELECT * FROM t WHERE a = :a AND b = :b_2").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("SELECT * FROM t WHERE a = "),
                Segment::Marker {
                    name: "a",
                    position: 26
                },
                Segment::Text(" AND b = "),
                Segment::Marker {
                    name: "b_2",
                    position: 37
                },
            ]
        );
    }

    #[test]
    fn test_casts_are_not_markers() {
        assert!(marker_names("SELECT '1'::int, x::text").unwrap().is_empty());
        assert_eq!(marker_names("SELECT :v::int").unwrap(), vec!["v"]);
    }

    #[test]
    fn test_quoted_regions_are_skipped() {
        let sql = "SELECT ':no', \"col:no\", 'it''s :no', 'a\\':no' -- :no\n /* :no */ , :yes";
        assert_eq!(marker_names(sql).unwrap(), vec!["yes"]);
    }

    #[test]
    fn test_lone_sigil_is_text() {
        let segments = scan("SELECT a := 1, ':'").unwrap();
        assert_eq!(segments, vec![Segment::Text("SELECT a := 1, ':'")]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = scan("SELECT 'abc").unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedTemplate { position: 7, .. }
        ));
    }

    #[test]
    fn test_unterminated_comment_and_identifier() {
        assert!(matches!(
            scan("SELECT 1 /* never closed"),
            Err(Error::MalformedTemplate { position: 9, .. })
        ));
        assert!(matches!(
            scan("SELECT \"col"),
            Err(Error::MalformedTemplate { .. })
        ));
    }

    #[test]
    fn test_utf8_text_is_preserved() {
        let segments = scan("SELECT 'é' || :name || 'ü'").unwrap();
        let rebuilt: String = segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => (*t).to_string(),
                Segment::Marker { name, .. } => format!(":{name}"),
            })
            .collect();
        assert_eq!(rebuilt, "SELECT 'é' || :name || 'ü'");
    }

    #[test]
    fn test_dollar_quoted_bodies_are_skipped() {
        let sql = "CREATE FUNCTION f() RETURNS int AS $$ SELECT :no $$ LANGUAGE sql; \
                   SELECT $body$ :no $x$ $body$, :yes, $1";
        assert_eq!(marker_names(sql).unwrap(), vec!["yes"]);
    }

    #[test]
    fn test_unterminated_dollar_quote() {
        assert!(matches!(
            scan("SELECT $tag$ never closed"),
            Err(Error::MalformedTemplate { position: 7, .. })
        ));
    }

    #[test]
    fn test_dollar_inside_identifier_is_code() {
        assert_eq!(
            marker_names("SELECT a$b, c$d$ FROM t WHERE x = :x").unwrap(),
            vec!["x"]
        );
    }

    #[test]
    fn test_regions_cover_the_template() {
        let sql = "SELECT 'a' || $$b$$ /* c */, :d";
        let rebuilt: String = regions(sql)
            .unwrap()
            .iter()
            .map(|r| match r {
                Region::Code { text, .. } | Region::Quoted(text) => *text,
            })
            .collect();
        assert_eq!(rebuilt, sql);
        assert_eq!(
            regions("a 'b' c").unwrap(),
            vec![
                Region::Code { text: "a ", offset: 0 },
                Region::Quoted("'b'"),
                Region::Code { text: " c", offset: 5 },
            ]
        );
    }
}
