//! Incremental sentence segmentation for streaming synthesis.
//!
//! Segments are cut up to and including a terminating mark. Cuts keep the
//! leading whitespace of the text that followed the previous cut, so
//! `"Hello, world. Done"` becomes `"Hello,"`, `" world."` and, on flush,
//! `" Done"`.

/// Marks that always end a segment.
const TERMINATORS: &[char] = &[',', '。', '，', '？', '！', '；', ';', '：', ':', '?', '!'];

fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Byte offset just past the first segment boundary in `text`.
///
/// A run of consecutive marks (`"?!"`, `"..."`) stays in one segment. An
/// ASCII `.` only ends a segment when followed by whitespace, so decimals and
/// abbreviations inside a word are not split; a trailing `.` waits for more
/// input or for [`SentenceSegmenter::finish`].
fn find_cut(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = if c == '.' {
            match chars.peek() {
                Some((_, next)) => next.is_whitespace() || is_terminator(*next) || *next == '.',
                None => false,
            }
        } else {
            is_terminator(c)
        };
        if !boundary {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if is_terminator(next) || next == '.' {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        // A run that reaches the end of the buffer may still grow.
        if end == text.len() && text.ends_with('.') {
            return None;
        }
        return Some(end);
    }
    None
}

/// Running text buffer that yields segments as boundaries appear.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every segment it completes, in order.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();
        while let Some(end) = find_cut(&self.buffer) {
            let rest = self.buffer.split_off(end);
            out.push(std::mem::replace(&mut self.buffer, rest));
        }
        out
    }

    /// Flush whatever remains at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() { None } else { Some(rest) }
    }

    /// Drop buffered text.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Remove `<...>` markup (emotion and motion tags) and trim.
pub fn clean_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_owned()
}

/// Whether a cleaned segment has anything worth synthesizing.
pub fn is_speakable(cleaned: &str) -> bool {
    cleaned.chars().any(char::is_alphanumeric)
}
