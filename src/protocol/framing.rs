//! Newline framing for socket requests.
//!
//! Bytes are buffered across reads and split on `\n` before any UTF-8 decoding, so
//! a request (or a multi-byte character) split over two reads is reassembled. A
//! request longer than the limit is reported once and skipped through its newline;
//! its prefix is never handed out as a request of its own.

/// One unit handed to the request handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete request line, without its terminator.
    Line(Vec<u8>),
    /// A request that exceeded the length limit.
    Oversized,
}

/// Accumulates socket bytes and yields complete request frames.
#[derive(Debug)]
pub struct RequestFramer {
    pending: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl RequestFramer {
    /// Create a framer accepting request lines of at most `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Whether bytes of an unterminated request are buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Append `bytes` and return every frame they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();

            // Tail of a request already answered as oversized.
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > self.max_len {
                frames.push(Frame::Oversized);
            } else {
                frames.push(Frame::Line(line));
            }
        }

        if self.pending.len() > self.max_len {
            self.pending.clear();
            if !self.discarding {
                self.discarding = true;
                frames.push(Frame::Oversized);
            }
        }
        frames
    }

    /// Hand out the buffered bytes as a request once the client has gone quiet.
    ///
    /// Clients that send a bare command without `\n` and wait for the reply are
    /// served this way.
    pub fn take_unterminated(&mut self) -> Option<Frame> {
        if std::mem::take(&mut self.discarding) {
            self.pending.clear();
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }
        Some(Frame::Line(std::mem::take(&mut self.pending)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(s: &str) -> Frame {
        Frame::Line(s.as_bytes().to_vec())
    }

    #[test]
    fn splits_on_newlines() {
        let mut framer = RequestFramer::new(64);
        let frames = framer.push(b"check A\nactivate B\n\n");
        assert_eq!(frames, vec![line("check A"), line("activate B"), line("")]);
        assert!(!framer.has_pending());
    }

    #[test]
    fn reassembles_request_split_across_reads() {
        let mut framer = RequestFramer::new(64);
        assert!(framer.push(b"check AB").is_empty());
        assert!(framer.has_pending());
        assert_eq!(framer.push(b"C123\n"), vec![line("check ABC123")]);
    }

    #[test]
    fn reassembles_multibyte_character_split_across_reads() {
        let mut framer = RequestFramer::new(64);
        let request = "check ключ\n".as_bytes();
        // Cut inside the two-byte `к`.
        assert!(framer.push(&request[..7]).is_empty());
        let frames = framer.push(&request[7..]);
        assert_eq!(frames, vec![line("check ключ")]);
    }

    #[test]
    fn oversized_request_is_reported_once_and_skipped() {
        let mut framer = RequestFramer::new(16);
        let long = format!("check {}", "K".repeat(40));

        let mut frames = framer.push(&long.as_bytes()[..20]);
        frames.extend(framer.push(&long.as_bytes()[20..]));
        frames.extend(framer.push(b"\ncheck OK\n"));

        assert_eq!(frames, vec![Frame::Oversized, line("check OK")]);
    }

    #[test]
    fn oversized_line_in_one_read_is_rejected() {
        let mut framer = RequestFramer::new(8);
        let frames = framer.push(b"check 0123456789\ncheck A\n");
        assert_eq!(frames, vec![Frame::Oversized, line("check A")]);
    }

    #[test]
    fn line_at_the_limit_is_accepted() {
        let mut framer = RequestFramer::new(7);
        assert_eq!(framer.push(b"check A\n"), vec![line("check A")]);
    }

    #[test]
    fn unterminated_request_is_taken_when_quiet() {
        let mut framer = RequestFramer::new(64);
        assert!(framer.push(b"check ABC123").is_empty());
        assert_eq!(framer.take_unterminated(), Some(line("check ABC123")));
        assert_eq!(framer.take_unterminated(), None);
    }

    #[test]
    fn unterminated_tail_of_oversized_request_is_dropped() {
        let mut framer = RequestFramer::new(8);
        assert_eq!(framer.push(b"check KKKK"), vec![Frame::Oversized]);
        assert!(framer.push(b"KK").is_empty());
        assert_eq!(framer.take_unterminated(), None);
        assert_eq!(framer.push(b"check\n"), vec![line("check")]);
    }
}
