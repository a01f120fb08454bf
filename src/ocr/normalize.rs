/// Cleans up common OCR confusions in cell text.
///
/// Full-width digits, Latin letters and slashes are folded to ASCII first;
/// then `I` before a slash, `O` next to digits and `l` between digits become
/// digits. Each rewrite looks at the text as it was before that rewrite.
/// Applying the function twice gives the same result as applying it once.
pub fn normalize_text(text: &str) -> String {
    let folded = text.chars().map(fold_full_width).collect::<Vec<_>>();
    let pass = replace_where(&folded, 'I', '1', |prev, next| {
        !prev.is_some_and(is_word) && next == Some('/')
    });
    let pass = replace_where(&pass, 'O', '0', |prev, next| {
        prev.is_some_and(is_digit) && next.is_some_and(is_digit)
    });
    let pass = replace_where(&pass, 'O', '0', |prev, next| {
        !prev.is_some_and(is_word) && next.is_some_and(is_digit)
    });
    let pass = replace_where(&pass, 'l', '1', |prev, next| {
        prev.is_some_and(is_digit) && next.is_some_and(is_digit)
    });
    pass.into_iter().collect::<String>().trim().to_string()
}

fn fold_full_width(ch: char) -> char {
    match ch {
        '０'..='９' | 'Ａ'..='Ｚ' | 'ａ'..='ｚ' | '／' => {
            char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch)
        }
        _ => ch,
    }
}

fn is_word(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

fn replace_where(
    chars: &[char],
    target: char,
    replacement: char,
    matches: impl Fn(Option<char>, Option<char>) -> bool,
) -> Vec<char> {
    chars
        .iter()
        .enumerate()
        .map(|(idx, &ch)| {
            if ch != target {
                return ch;
            }
            let prev = idx.checked_sub(1).map(|i| chars[i]);
            let next = chars.get(idx + 1).copied();
            if matches(prev, next) { replacement } else { ch }
        })
        .collect()
}
