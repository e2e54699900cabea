use std::collections::HashSet;

use crate::services::error::EngineError;

const MAX_WORD_LEN: usize = 64;

/// Splits text into normalized word tokens in text order, duplicates kept.
///
/// A token is a run of letters that may contain internal apostrophes
/// (`don't`, `o'clock`). Runs that touch digits or underscores are not words.
/// Tokens are lowercased and Latin diacritics are folded (`café` -> `cafe`).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut tainted = false;
    let mut pending_apostrophe = false;

    let mut flush = |current: &mut String, tainted: &mut bool| {
        if !current.is_empty() && !*tainted {
            tokens.push(std::mem::take(current));
        }
        current.clear();
        *tainted = false;
    };

    for ch in text.chars() {
        let ch = if matches!(ch, '\u{2019}' | '\u{2018}' | '\u{02BC}') { '\'' } else { ch };

        if ch.is_alphabetic() {
            if pending_apostrophe {
                current.push('\'');
                pending_apostrophe = false;
            }
            push_folded(&mut current, ch);
        } else if ch == '\'' && !current.is_empty() && !pending_apostrophe {
            pending_apostrophe = true;
        } else if ch.is_numeric() || ch == '_' {
            pending_apostrophe = false;
            tainted = true;
        } else {
            pending_apostrophe = false;
            flush(&mut current, &mut tainted);
        }
    }
    flush(&mut current, &mut tainted);

    tokens
}

/// Unique tokens in order of first appearance.
pub fn unique_words(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// Normalizes a single user-supplied word. Surrounding punctuation is
/// dropped; anything that yields zero or several tokens is rejected.
pub fn normalize_word(input: &str) -> Result<String, EngineError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("word must not be empty"));
    }

    let mut tokens = tokenize(trimmed);
    match tokens.len() {
        0 => Err(EngineError::validation(format!("'{trimmed}' contains no word"))),
        1 => {
            let word = tokens.remove(0);
            if word.chars().count() > MAX_WORD_LEN {
                return Err(EngineError::validation("word is too long"));
            }
            Ok(word)
        }
        _ => Err(EngineError::validation(format!(
            "'{trimmed}' must be a single word"
        ))),
    }
}

/// Possible base forms of an inflected word, most likely first.
pub fn base_form_candidates(word: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let len = word.chars().count();
    let mut push = |candidate: String| {
        if candidate.len() >= 2 && candidate != word && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    if let Some(stem) = word.strip_suffix("ies").filter(|_| len > 4) {
        push(format!("{stem}y"));
    }
    if let Some(stem) = word.strip_suffix("ing").filter(|_| len > 5) {
        push(stem.to_string());
        push(format!("{stem}e"));
        if let Some(single) = undouble(stem) {
            push(single);
        }
    }
    if let Some(stem) = word.strip_suffix("ied").filter(|_| len > 4) {
        push(format!("{stem}y"));
    }
    if let Some(stem) = word.strip_suffix("ed").filter(|_| len > 4) {
        push(stem.to_string());
        push(format!("{stem}e"));
        if let Some(single) = undouble(stem) {
            push(single);
        }
    }
    if let Some(stem) = word.strip_suffix("es").filter(|_| len > 3) {
        push(stem.to_string());
    }
    if word.ends_with('s') && !word.ends_with("ss") && len > 3 {
        push(word[..word.len() - 1].to_string());
    }

    out
}

fn undouble(stem: &str) -> Option<String> {
    let mut chars = stem.chars().rev();
    let last = chars.next()?;
    let before = chars.next()?;
    if last == before && !matches!(last, 'a' | 'e' | 'i' | 'o' | 'u' | 'l' | 's') {
        Some(stem[..stem.len() - last.len_utf8()].to_string())
    } else {
        None
    }
}

fn push_folded(out: &mut String, ch: char) {
    for lower in ch.to_lowercase() {
        match fold_diacritic(lower) {
            Some(folded) => out.push_str(folded),
            None => out.push(lower),
        }
    }
}

fn fold_diacritic(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'ç' | 'ć' | 'č' | 'ĉ' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' | 'ĝ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_and_normalizes() {
        let tokens = tokenize("The Café's menu—don’t panic! 42 mp3 files, well-known.");
        assert_eq!(
            tokens,
            vec!["the", "cafe's", "menu", "don't", "panic", "files", "well", "known"]
        );
    }

    #[test]
    fn trailing_and_leading_apostrophes_are_dropped() {
        assert_eq!(tokenize("'quoted' students' books"), vec!["quoted", "students", "books"]);
    }

    #[test]
    fn unique_words_keep_first_order() {
        assert_eq!(unique_words("b a B c a"), vec!["b", "a", "c"]);
    }

    #[test]
    fn normalize_word_rules() {
        assert_eq!(normalize_word("  Hello! ").unwrap(), "hello");
        assert_eq!(normalize_word("NAÏVE").unwrap(), "naive");
        assert!(matches!(normalize_word("   "), Err(EngineError::Validation(_))));
        assert!(matches!(normalize_word("two words"), Err(EngineError::Validation(_))));
        assert!(matches!(normalize_word("123"), Err(EngineError::Validation(_))));
    }

    #[test]
    fn base_forms() {
        assert!(base_form_candidates("running").contains(&"run".to_string()));
        assert!(base_form_candidates("making").contains(&"make".to_string()));
        assert!(base_form_candidates("studies").contains(&"study".to_string()));
        assert!(base_form_candidates("studied").contains(&"study".to_string()));
        assert!(base_form_candidates("watches").contains(&"watch".to_string()));
        assert!(base_form_candidates("cats").contains(&"cat".to_string()));
        assert!(base_form_candidates("liked").contains(&"like".to_string()));
        assert!(base_form_candidates("class").is_empty());
    }
}
