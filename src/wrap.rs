//! Greedy word wrap against a measured width.
//!
//! Explicit `\n` always breaks. A line that already fits is kept verbatim.
//! Otherwise words are packed greedily; a single token wider than the limit
//! is cut into the longest character runs that fit (at least one character
//! per run, so the wrap always terminates).

/// Anything that can report the rendered width of a string.
pub trait TextMeasure {
    fn string_width(&self, text: &str) -> f64;
}

/// Wrap `text` so no line is wider than `max_width`.
pub fn wrap_text<M: TextMeasure + ?Sized>(measure: &M, max_width: f64, text: &str) -> Vec<String> {
    let mut lines = Vec::new();

    for line in text.split('\n') {
        if measure.string_width(line) <= max_width {
            lines.push(line.to_string());
            continue;
        }
        wrap_line(measure, max_width, line, &mut lines);
    }

    lines
}

fn wrap_line<M: TextMeasure + ?Sized>(
    measure: &M,
    max_width: f64,
    line: &str,
    out: &mut Vec<String>,
) {
    let mut current = String::new();

    for word in line.split(' ').filter(|w| !w.is_empty()) {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };

        if measure.string_width(&candidate) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }

        if measure.string_width(word) <= max_width {
            current = word.to_string();
        } else {
            let mut chunks = split_token(measure, max_width, word);
            // The last chunk may still take following words.
            current = chunks.pop().unwrap_or_default();
            out.extend(chunks);
        }
    }

    if !current.is_empty() {
        out.push(current);
    }
}

/// Split an unbreakable token into runs that each fit `max_width`.
fn split_token<M: TextMeasure + ?Sized>(measure: &M, max_width: f64, token: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut chunk = String::new();

    for c in token.chars() {
        chunk.push(c);
        if measure.string_width(&chunk) > max_width && chunk.chars().count() > 1 {
            chunk.pop();
            chunks.push(std::mem::take(&mut chunk));
            chunk.push(c);
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}
