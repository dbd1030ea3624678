/// Carry-over framing of newline-delimited output read in arbitrary chunks.
///
/// Works on bytes so a multi-byte character split across two reads is only
/// decoded once its line is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_buffer_bytes: Option<usize>,
    overflowed_bytes: usize,
    discard_oversized: bool,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_buffer_bytes: Option<usize>) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer_bytes,
            overflowed_bytes: 0,
            discard_oversized: false,
            discarding: false,
        }
    }

    /// Like `new`, but a line that outgrows the limit is dropped whole, up to
    /// and including its terminator, instead of losing its leading bytes.
    pub fn discarding_oversized(max_buffer_bytes: usize) -> Self {
        Self {
            discard_oversized: true,
            ..Self::new(Some(max_buffer_bytes))
        }
    }

    /// Appends a chunk and returns every line it completed, without the
    /// terminator (`\n` or `\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(idx) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=idx).collect();
            if self.discarding {
                self.discarding = false;
                self.overflowed_bytes = self.overflowed_bytes.saturating_add(line.len());
                continue;
            }
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        if let Some(max) = self.max_buffer_bytes {
            if self.buffer.len() > max {
                if self.discard_oversized {
                    self.overflowed_bytes = self.overflowed_bytes.saturating_add(self.buffer.len());
                    self.buffer.clear();
                    self.discarding = true;
                } else {
                    let excess = self.buffer.len() - max;
                    self.buffer.drain(..excess);
                    self.overflowed_bytes = self.overflowed_bytes.saturating_add(excess);
                }
            }
        }

        lines
    }

    pub fn consume_overflowed_bytes(&mut self) -> usize {
        let value = self.overflowed_bytes;
        self.overflowed_bytes = 0;
        value
    }

    /// Returns the unterminated remainder and empties the buffer.
    pub fn flush(&mut self) -> String {
        let rest = std::mem::take(&mut self.buffer);
        if std::mem::take(&mut self.discarding) {
            self.overflowed_bytes = self.overflowed_bytes.saturating_add(rest.len());
            return String::new();
        }
        String::from_utf8_lossy(&rest).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::LineBuffer;

    #[test]
    fn splits_lf_and_crlf_lines() {
        let mut buffer = LineBuffer::new(None);
        let lines = buffer.push(b"a\nb\r\nc");
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(buffer.flush(), "c");
        assert_eq!(buffer.flush(), "");
    }

    #[test]
    fn carries_partial_lines_across_chunks() {
        let mut buffer = LineBuffer::new(None);
        assert!(buffer.push(b"{\"a\":").is_empty());
        assert_eq!(buffer.push(b"1}\n{\"b\""), vec!["{\"a\":1}"]);
        assert_eq!(buffer.push(b":2}\n"), vec!["{\"b\":2}"]);
    }

    #[test]
    fn keeps_multibyte_characters_split_between_reads() {
        let mut buffer = LineBuffer::new(None);
        let text = "héllo\n".as_bytes();
        assert!(buffer.push(&text[..2]).is_empty());
        assert_eq!(buffer.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn trims_unterminated_remainder_over_limit() {
        let mut buffer = LineBuffer::new(Some(4));
        assert_eq!(buffer.push(b"ok\nabcdef"), vec!["ok"]);
        assert_eq!(buffer.consume_overflowed_bytes(), 2);
        assert_eq!(buffer.consume_overflowed_bytes(), 0);
        assert_eq!(buffer.flush(), "cdef");
    }

    #[test]
    fn discards_oversized_line_whole_and_resumes_after_it() {
        let mut buffer = LineBuffer::discarding_oversized(4);
        assert!(buffer.push(b"abcdef").is_empty());
        assert!(buffer.push(b"gh").is_empty());
        assert_eq!(buffer.push(b"ij\nok\n"), vec!["ok"]);
        assert_eq!(buffer.consume_overflowed_bytes(), 11);

        assert!(buffer.push(b"toolong").is_empty());
        assert_eq!(buffer.flush(), "");
        assert_eq!(buffer.consume_overflowed_bytes(), 7);
    }
}
