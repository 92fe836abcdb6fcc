//! Size-bounded batching of log output
//!
//! Several child-output lines are sometimes accumulated before being sent
//! as one `LOG` envelope (for example while waiting for a server to finish
//! starting). The downstream chat transport has a message-size ceiling, so
//! the accumulated text is cut into chunks that never exceed it.

/// Accumulates lines and yields chunks of at most `max_chars` characters
#[derive(Debug)]
pub struct LogChunker {
    max_chars: usize,
    buf: String,
    buf_chars: usize,
}

impl LogChunker {
    /// Create a chunker. A zero maximum is treated as one character.
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            buf: String::new(),
            buf_chars: 0,
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Add a line, returning any chunks that are now complete.
    ///
    /// The buffer is flushed before it would overflow. A single line longer
    /// than the maximum is split on character boundaries.
    pub fn push(&mut self, line: &str) -> Vec<String> {
        let mut ready = Vec::new();
        let line_chars = line.chars().count();

        if !self.buf.is_empty() && self.buf_chars + line_chars > self.max_chars {
            ready.extend(self.take());
        }

        if line_chars <= self.max_chars {
            self.buf.push_str(line);
            self.buf_chars += line_chars;
            return ready;
        }

        let mut piece = String::new();
        let mut piece_chars = 0;
        for c in line.chars() {
            piece.push(c);
            piece_chars += 1;
            if piece_chars == self.max_chars {
                ready.push(std::mem::take(&mut piece));
                piece_chars = 0;
            }
        }
        self.buf = piece;
        self.buf_chars = piece_chars;
        ready
    }

    /// Take whatever is buffered, if anything
    pub fn take(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        self.buf_chars = 0;
        Some(std::mem::take(&mut self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_lines_accumulate() {
        let mut chunker = LogChunker::new(100);
        assert!(chunker.push("a\n").is_empty());
        assert!(chunker.push("b\n").is_empty());
        assert_eq!(chunker.take().as_deref(), Some("a\nb\n"));
        assert!(chunker.take().is_none());
    }

    #[test]
    fn test_flush_before_overflow() {
        let mut chunker = LogChunker::new(10);
        assert!(chunker.push("12345\n").is_empty());
        let ready = chunker.push("678\n");
        assert!(ready.is_empty(), "exactly at the limit should not flush");
        let ready = chunker.push("x\n");
        assert_eq!(ready, vec!["12345\n678\n".to_string()]);
        assert_eq!(chunker.take().as_deref(), Some("x\n"));
    }

    #[test]
    fn test_oversized_line_is_split() {
        let mut chunker = LogChunker::new(4);
        chunker.push("ab");
        let ready = chunker.push("0123456789");
        assert_eq!(ready, vec!["ab", "0123", "4567"]);
        assert_eq!(chunker.take().as_deref(), Some("89"));
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let mut chunker = LogChunker::new(2);
        let ready = chunker.push("ééé");
        assert_eq!(ready, vec!["éé"]);
        assert_eq!(chunker.take().as_deref(), Some("é"));
    }

    #[test]
    fn test_every_chunk_within_limit() {
        let mut chunker = LogChunker::new(50);
        let mut chunks = Vec::new();
        for i in 0..500 {
            chunks.extend(chunker.push(&format!("[{i:04}] loading spawn area {}\n", i % 7)));
        }
        chunks.extend(chunker.take());

        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
        let joined: String = chunks.concat();
        assert_eq!(joined.lines().count(), 500);
    }
}
