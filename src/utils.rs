use crate::prelude::*;

pub fn format_date(date: DateTime) -> String {
  date.format("%d.%m.%Y %H:%M").to_string()
}

/// Escapes text for Telegram HTML parse mode
pub fn escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '&' => out.push_str("&amp;"),
      '"' => out.push_str("&quot;"),
      c => out.push(c),
    }
  }
  out
}

/// Telegram rejects messages over 4096 chars, keep room for entities
pub const MESSAGE_LIMIT: usize = 4000;

/// Splits text into messages of at most `limit` chars, preferring line breaks
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
  let limit = if limit == 0 { MESSAGE_LIMIT } else { limit };

  let mut chunks = Vec::new();
  let mut current = String::new();
  let mut current_len = 0;

  for line in text.lines() {
    let line_len = line.chars().count();

    if current_len > 0 && current_len + 1 + line_len > limit {
      chunks.push(std::mem::take(&mut current));
      current_len = 0;
    }

    if line_len > limit {
      let chars: Vec<char> = line.chars().collect();
      let mut pieces = chars.chunks(limit).peekable();
      while let Some(piece) = pieces.next() {
        let piece: String = piece.iter().collect();
        if pieces.peek().is_some() {
          chunks.push(piece);
        } else {
          current_len = piece.chars().count();
          current = piece;
        }
      }
      continue;
    }

    if current_len > 0 {
      current.push('\n');
      current_len += 1;
    }
    current.push_str(line);
    current_len += line_len;
  }

  if !current.is_empty() || chunks.is_empty() {
    chunks.push(current);
  }
  chunks
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_escape() {
    assert_eq!(
      escape("<b>Tom & \"Jerry\"</b>"),
      "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;"
    );
  }

  #[test]
  fn test_chunk_prefers_line_breaks() {
    let chunks = chunk_message("aaaa\nbbbb\ncc", 9);
    assert_eq!(chunks, vec!["aaaa\nbbbb", "cc"]);
  }

  #[test]
  fn test_chunk_splits_long_lines_on_char_boundaries() {
    let chunks = chunk_message("орехорех", 3);
    assert_eq!(chunks, vec!["оре", "хор", "ех"]);
    assert_eq!(chunk_message("", 10), vec![""]);
  }
}
