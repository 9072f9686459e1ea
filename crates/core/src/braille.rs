//! Uncontracted (grade 1) braille in Unicode braille patterns.

const LETTERS: [char; 26] = [
    '⠁', '⠃', '⠉', '⠙', '⠑', '⠋', '⠛', '⠓', '⠊', '⠚', '⠅', '⠇', '⠍', '⠝', '⠕', '⠏', '⠟', '⠗', '⠎', '⠞', '⠥', '⠧', '⠺',
    '⠭', '⠽', '⠵',
];

const CAPITAL: char = '⠠';
const NUMBER: char = '⠼';
const LETTER: char = '⠰';

fn punctuation(c: char) -> Option<&'static str> {
    let cell = match c {
        ',' => "⠂",
        ';' => "⠆",
        ':' => "⠒",
        '.' => "⠲",
        '!' => "⠖",
        '?' => "⠦",
        '\'' => "⠄",
        '-' => "⠤",
        '"' => "⠶",
        '(' => "⠐⠣",
        ')' => "⠐⠜",
        '/' => "⠸⠌",
        _ => return None,
    };
    Some(cell)
}

fn letter(c: char) -> Option<char> {
    let lower = c.to_ascii_lowercase();
    lower
        .is_ascii_lowercase()
        .then(|| LETTERS[(lower as u8 - b'a') as usize])
}

fn digit(c: char) -> Option<char> {
    match c {
        '0' => Some(LETTERS[9]),
        '1'..='9' => Some(LETTERS[(c as u8 - b'1') as usize]),
        _ => None,
    }
}

/// Transcribes `text`. Characters without a cell are copied through.
pub fn to_braille(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() * 3);
    let mut numeric = false;
    let mut caps_word = false;

    for (i, &c) in chars.iter().enumerate() {
        if let Some(cell) = digit(c) {
            if !numeric {
                out.push(NUMBER);
                numeric = true;
            }
            out.push(cell);
            continue;
        }

        // a decimal point or comma between digits stays in numeric mode
        let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if numeric && (c == '.' || c == ',') && next_is_digit {
            out.push_str(if c == '.' { "⠲" } else { "⠂" });
            continue;
        }

        if let Some(cell) = letter(c) {
            if numeric && ('a'..='j').contains(&c.to_ascii_lowercase()) {
                out.push(LETTER);
            }
            numeric = false;

            if c.is_ascii_uppercase() && !caps_word {
                let word_len = chars[i..].iter().take_while(|w| w.is_ascii_alphabetic()).count();
                let word_is_caps = chars[i..i + word_len].iter().all(|w| w.is_ascii_uppercase());
                let starts_word = i == 0 || !chars[i - 1].is_ascii_alphabetic();
                if starts_word && word_is_caps && word_len > 1 {
                    out.push(CAPITAL);
                    out.push(CAPITAL);
                    caps_word = true;
                } else {
                    out.push(CAPITAL);
                }
            }
            out.push(cell);
            continue;
        }

        numeric = false;
        caps_word = false;
        match punctuation(c) {
            Some(cell) => out.push_str(cell),
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters() {
        assert_eq!(to_braille("abc"), "⠁⠃⠉");
        assert_eq!(to_braille("xyz"), "⠭⠽⠵");
    }

    #[test]
    fn test_capitals_and_numbers() {
        assert_eq!(to_braille("Hi 2"), "⠠⠓⠊ ⠼⠃");
        assert_eq!(to_braille("10"), "⠼⠁⠚");
        assert_eq!(to_braille("OK"), "⠠⠠⠕⠅");
    }

    #[test]
    fn test_letter_sign_after_number() {
        assert_eq!(to_braille("3a"), "⠼⠉⠰⠁");
        assert_eq!(to_braille("3x"), "⠼⠉⠭");
    }

    #[test]
    fn test_punctuation_and_passthrough() {
        assert_eq!(to_braille("hi, you."), "⠓⠊⠂ ⠽⠕⠥⠲");
        assert_eq!(to_braille("1.5"), "⠼⠁⠲⠑");
        assert_eq!(to_braille("a\nb"), "⠁\n⠃");
    }
}
