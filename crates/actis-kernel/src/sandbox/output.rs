//! Bounded capture of a script's stdout and stderr.

/// Per-stream capture ceiling.
pub const OUTPUT_LIMIT: usize = 64 * 1024;

/// Appended once when a stream hits the ceiling.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated] ...\n";

/// A text buffer that keeps the first `limit` bytes and marks the cut.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(OUTPUT_LIMIT)
    }
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn write(&mut self, data: &str) {
        if self.truncated {
            return;
        }
        let remaining = self.limit.saturating_sub(self.text.len());
        if data.len() <= remaining {
            self.text.push_str(data);
            return;
        }
        let mut cut = remaining;
        while !data.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&data[..cut]);
        self.text.push_str(TRUNCATION_MARKER);
        self.truncated = true;
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_limit_is_kept_verbatim() {
        let mut buffer = OutputBuffer::new(16);
        buffer.write("hello ");
        buffer.write("world");
        assert_eq!(buffer.as_str(), "hello world");
        assert!(!buffer.was_truncated());
    }

    #[test]
    fn exact_limit_is_not_truncated() {
        let mut buffer = OutputBuffer::new(5);
        buffer.write("hello");
        assert!(!buffer.was_truncated());
    }

    #[test]
    fn overflow_appends_marker_once() {
        let mut buffer = OutputBuffer::new(5);
        buffer.write("hello world");
        buffer.write("more");
        assert_eq!(buffer.as_str(), format!("hello{TRUNCATION_MARKER}"));
        assert!(buffer.was_truncated());
    }

    #[test]
    fn cut_respects_char_boundaries() {
        let mut buffer = OutputBuffer::new(2);
        buffer.write("héllo");
        assert!(buffer.as_str().starts_with('h'));
        assert!(buffer.as_str().ends_with(TRUNCATION_MARKER));
    }
}
