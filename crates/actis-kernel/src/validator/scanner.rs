//! Boundary scanner: finds where logical lines end in a growing buffer.
//!
//! A logical line ends at a newline that is outside any string literal,
//! outside brackets, and not escaped by a trailing backslash. The scanner
//! keeps its state between calls so each increment is scanned once; when
//! the buffer ends somewhere ambiguous (a quote that may turn out to open a
//! triple-quoted string) it stops and waits for more text.
//!
//! Only ASCII bytes are structural, so scanning works on bytes and every
//! stopping point is a char boundary.

/// A string literal that has been opened but not closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenQuote {
    pub delim: u8,
    pub triple: bool,
    /// Offset of the opening quote within the scanned text.
    pub start: usize,
}

/// A closing bracket that did not match the innermost opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mismatch {
    pub offset: usize,
    pub found: char,
    pub expected: Option<char>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BoundaryScanner {
    pos: usize,
    quote: Option<OpenQuote>,
    brackets: Vec<(u8, usize)>,
    escaped: bool,
    in_comment: bool,
    /// A mismatched closer was seen; the line ends at the next newline.
    poisoned: bool,
    mismatches: Vec<Mismatch>,
}

fn closer_for(opener: u8) -> char {
    match opener {
        b'(' => ')',
        b'[' => ']',
        _ => '}',
    }
}

fn opener_for(closer: u8) -> u8 {
    match closer {
        b')' => b'(',
        b']' => b'[',
        _ => b'{',
    }
}

impl BoundaryScanner {
    /// Resume scanning `text`, which starts at the beginning of the current
    /// logical line. Returns the end offset (just past the newline) of the
    /// line once it is complete.
    ///
    /// With `at_eof`, lookahead that would otherwise wait for more input is
    /// resolved against the end of the text.
    pub fn next_line_end(&mut self, text: &str, at_eof: bool) -> Option<usize> {
        let bytes = text.as_bytes();

        while self.pos < bytes.len() {
            let i = self.pos;
            let b = bytes[i];

            if self.in_comment {
                if b != b'\n' {
                    self.pos += 1;
                    continue;
                }
                self.in_comment = false;
            }

            if let Some(quote) = self.quote {
                if self.escaped {
                    self.escaped = false;
                    self.pos += 1;
                    continue;
                }
                match b {
                    b'\\' => {
                        self.escaped = true;
                        self.pos += 1;
                    }
                    // Unterminated single-line string: the newline is
                    // handled below as if outside the string.
                    b'\n' if !quote.triple => self.quote = None,
                    c if c == quote.delim && quote.triple => {
                        let run = bytes[i..].iter().take(3).take_while(|&&c| c == quote.delim).count();
                        if run == 3 {
                            self.quote = None;
                            self.pos += 3;
                        } else if i + run == bytes.len() && !at_eof {
                            return None;
                        } else {
                            self.pos += 1;
                        }
                    }
                    c if c == quote.delim => {
                        self.quote = None;
                        self.pos += 1;
                    }
                    _ => self.pos += 1,
                }
                continue;
            }

            if self.escaped {
                match b {
                    b'\n' => {
                        self.escaped = false;
                        self.pos += 1;
                        continue;
                    }
                    b'\r' => {
                        self.pos += 1;
                        continue;
                    }
                    // A stray backslash; the lexer reports it.
                    _ => self.escaped = false,
                }
            }

            match b {
                b'#' => {
                    self.in_comment = true;
                    self.pos += 1;
                }
                b'\\' => {
                    self.escaped = true;
                    self.pos += 1;
                }
                b'"' | b'\'' => {
                    let run = bytes[i..].iter().take(3).take_while(|&&c| c == b).count();
                    if run < 3 && i + run == bytes.len() && !at_eof {
                        return None;
                    }
                    let triple = run == 3;
                    self.quote = Some(OpenQuote {
                        delim: b,
                        triple,
                        start: i,
                    });
                    self.pos += if triple { 3 } else { 1 };
                }
                b'(' | b'[' | b'{' => {
                    self.brackets.push((b, i));
                    self.pos += 1;
                }
                b')' | b']' | b'}' => {
                    match self.brackets.last() {
                        Some(&(open, _)) if open == opener_for(b) => {
                            self.brackets.pop();
                        }
                        top => {
                            self.mismatches.push(Mismatch {
                                offset: i,
                                found: b as char,
                                expected: top.map(|&(open, _)| closer_for(open)),
                            });
                            self.poisoned = true;
                        }
                    }
                    self.pos += 1;
                }
                b'\n' => {
                    self.pos += 1;
                    if self.brackets.is_empty() || self.poisoned {
                        return Some(self.pos);
                    }
                }
                _ => self.pos += 1,
            }
        }

        None
    }

    /// Reset for the next logical line, returning the mismatches seen on the
    /// line just completed.
    pub fn take_line(&mut self) -> Vec<Mismatch> {
        let mismatches = std::mem::take(&mut self.mismatches);
        *self = Self::default();
        mismatches
    }

    /// Prefix of the current text whose tokens can no longer change: up to
    /// an open string, or up to where scanning stopped.
    pub fn settled_len(&self) -> usize {
        match self.quote {
            Some(quote) => quote.start,
            None => self.pos,
        }
    }

    pub fn open_quote(&self) -> Option<OpenQuote> {
        self.quote
    }

    /// Offsets of unclosed openers, outermost first.
    pub fn open_brackets(&self) -> impl Iterator<Item = (char, usize)> + '_ {
        self.brackets.iter().map(|&(b, offset)| (b as char, offset))
    }

    /// The text ended right after a line-continuation backslash.
    pub fn dangling_continuation(&self) -> bool {
        self.escaped && self.quote.is_none()
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `chunks` one at a time, collecting the logical lines found.
    fn lines(chunks: &[&str]) -> Vec<String> {
        let mut scanner = BoundaryScanner::default();
        let mut pending = String::new();
        let mut out = Vec::new();
        for chunk in chunks {
            pending.push_str(chunk);
            while let Some(end) = scanner.next_line_end(&pending, false) {
                out.push(pending.drain(..end).collect());
                scanner.take_line();
            }
        }
        out
    }

    #[test]
    fn simple_lines() {
        assert_eq!(lines(&["a = 1\nb = 2\n"]), vec!["a = 1\n", "b = 2\n"]);
    }

    #[test]
    fn brackets_join_lines() {
        assert_eq!(lines(&["x = [1,\n 2]\ny\n"]), vec!["x = [1,\n 2]\n", "y\n"]);
    }

    #[test]
    fn continuation_joins_lines() {
        assert_eq!(lines(&["x = 1 + \\\n 2\n"]), vec!["x = 1 + \\\n 2\n"]);
    }

    #[test]
    fn newline_in_string_does_not_count_inside_triple_quotes() {
        assert_eq!(lines(&["s = \"\"\"a\nb\"\"\"\n"]), vec!["s = \"\"\"a\nb\"\"\"\n"]);
    }

    #[test]
    fn bracket_in_string_or_comment_is_ignored() {
        assert_eq!(lines(&["s = '('  # (\n"]), vec!["s = '('  # (\n"]);
    }

    #[test]
    fn split_anywhere_gives_same_lines() {
        let text = "a = f(1,\n  \"\"\"x\n\"\"\")\nb = ''\nc = 2\n";
        let whole = lines(&[text]);
        for cut in 0..=text.len() {
            let (head, tail) = text.split_at(cut);
            assert_eq!(lines(&[head, tail]), whole, "split at {cut}");
        }
    }

    #[test]
    fn waits_on_ambiguous_quotes() {
        let mut scanner = BoundaryScanner::default();
        assert_eq!(scanner.next_line_end("x = \"\"", false), None);
        assert_eq!(scanner.settled_len(), 4);
        assert_eq!(scanner.next_line_end("x = \"\"\n", false), Some(7));
    }

    #[test]
    fn mismatched_closer_ends_line_at_newline() {
        let mut scanner = BoundaryScanner::default();
        assert_eq!(scanner.next_line_end("f(]\nx\n", false), Some(4));
        let mismatches = scanner.take_line();
        assert_eq!(
            mismatches,
            vec![Mismatch {
                offset: 2,
                found: ']',
                expected: Some(')'),
            }]
        );
    }

    #[test]
    fn reports_open_state_at_eof() {
        let mut scanner = BoundaryScanner::default();
        assert_eq!(scanner.next_line_end("print((1, 2)", true), None);
        assert_eq!(scanner.open_brackets().next(), Some(('(', 5)));

        let mut scanner = BoundaryScanner::default();
        assert_eq!(scanner.next_line_end("s = '''abc", true), None);
        assert!(scanner.open_quote().is_some_and(|q| q.triple && q.start == 4));

        let mut scanner = BoundaryScanner::default();
        assert_eq!(scanner.next_line_end("x = 1 + \\", true), None);
        assert!(scanner.dangling_continuation());
    }
}
