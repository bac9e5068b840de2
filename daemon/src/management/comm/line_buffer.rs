/// Splits a chunked byte stream into lines.
///
/// The incomplete trailing fragment of a chunk is kept and prepended to the
/// next one, so a line split across reads (or a multi-byte character split
/// across reads) comes out whole. Decoding is lossy, `\r\n` endings are
/// accepted and blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending[scan_from..]
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|i| i + scan_from)
        else {
            return vec![];
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete.split(|b| *b == b'\n').filter_map(decode).collect()
    }

    /// Emits the last fragment at end of stream.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode(&rest)
    }
}

fn decode(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end_matches('\r');
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_is_carried_to_next_chunk() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"[INFO]: Bob jo"), Vec::<String>::new());
        assert_eq!(
            buffer.push(b"ined the game\r\nAlice left"),
            vec!["[INFO]: Bob joined the game"]
        );
        assert_eq!(buffer.push(b" the game\n\n\r\n  \nDone"), vec!["Alice left the game"]);
        assert_eq!(buffer.flush(), Some("Done".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "玩家 joined\n".as_bytes();
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&text[..2]).is_empty());
        assert_eq!(buffer.push(&text[2..]), vec!["玩家 joined"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"bad \xff byte\n"), vec!["bad \u{fffd} byte"]);
    }
}
