//! Preparing story text for a speech engine.

/// Words that end in a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "Dr", "Mr", "Mrs", "Ms", "Prof", "St", "Mt", "Jr", "Sr", "vs", "etc", "e.g", "i.e",
];

/// Strip markdown decoration the model likes to add (headers, emphasis,
/// list markers) and collapse all whitespace, newlines included, into
/// single spaces. Bracketed sound cues are kept.
///
/// Falls back to the trimmed input when cleaning would leave nothing.
pub fn clean_text_for_speech(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(|line| {
            let mut line = line.trim().trim_start_matches('#').trim_start();
            for marker in ["- ", "* ", "+ ", "> "] {
                if let Some(rest) = line.strip_prefix(marker) {
                    line = rest;
                    break;
                }
            }
            if let Some((number, rest)) = line.split_once(". ") {
                if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
                    line = rest;
                }
            }
            line
        })
        .collect();

    let stripped = lines
        .join(" ")
        .replace("**", "")
        .replace("__", "")
        .replace("~~", "")
        .replace(['*', '`'], "");

    let cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        text.trim().to_string()
    } else {
        cleaned
    }
}

/// Split text into pieces of at most `max_chars` characters.
///
/// Pieces break after sentence and clause punctuation where possible, then
/// at word boundaries, and only split inside a word that is longer than
/// `max_chars` on its own. Neighbouring short clauses are packed together so
/// a story does not turn into hundreds of tiny requests.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for clause in split_clauses(text) {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        for piece in fit_clause(clause, max_chars) {
            let needed = if current.is_empty() {
                char_len(&piece)
            } else {
                char_len(&current) + 1 + char_len(&piece)
            };
            if needed <= max_chars {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&piece);
            } else {
                chunks.push(std::mem::replace(&mut current, piece));
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut after punctuation that is followed by whitespace or the end of the
/// text, so "3.14", "1,000" and "e.g." inside a word stay whole.
fn split_clauses(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut clauses = Vec::new();
    let mut start = 0;

    for (i, &(pos, ch)) in chars.iter().enumerate() {
        let at_gap = chars.get(i + 1).map_or(true, |&(_, next)| next.is_whitespace());
        let boundary = match ch {
            '.' => at_gap && !is_abbreviation(&text[start..pos]),
            '!' | '?' | '…' | ',' | ';' | ':' => at_gap,
            _ => false,
        };
        if boundary {
            let end = pos + ch.len_utf8();
            clauses.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        clauses.push(&text[start..]);
    }
    clauses
}

fn is_abbreviation(before_dot: &str) -> bool {
    let word = before_dot.rsplit(char::is_whitespace).next().unwrap_or("");
    ABBREVIATIONS.contains(&word)
}

/// Break one clause into pieces that each fit `max_chars`.
fn fit_clause(clause: &str, max_chars: usize) -> Vec<String> {
    if char_len(clause) <= max_chars {
        return vec![clause.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in clause.split_whitespace() {
        let word_len = char_len(word);
        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(|part| part.iter().collect::<String>()));
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            char_len(&current) + 1 + word_len
        };
        if needed > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
