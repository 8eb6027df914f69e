//! Text folding shared by label matching and classification.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, strip diacritics and collapse whitespace.
///
/// Compatibility forms are decomposed first, so `º` folds to `o` and
/// full-width letters fold to ASCII.
pub fn fold(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    collapse_whitespace(&stripped.to_lowercase())
}

/// [`fold`] for rendered labels: punctuation other than `/` becomes space.
///
/// `"Nº Licencia:"` folds to `"no licencia"`; `"Grado/Categoría"` keeps
/// its slash.
pub fn fold_label(s: &str) -> String {
    let spaced: String = fold(s)
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '/' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_strips_accents_and_case() {
        assert_eq!(fold("  Guía   del  Perro "), "guia del perro");
        assert_eq!(fold("FEDERACIÓN"), "federacion");
    }

    #[test]
    fn fold_label_drops_punctuation() {
        assert_eq!(fold_label("Altura (cm):"), "altura cm");
        assert_eq!(fold_label("Grado/Categoría."), "grado/categoria");
        assert_eq!(fold_label("Nº Licencia"), "no licencia");
    }
}
