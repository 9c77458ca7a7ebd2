// overlay-search - unstructured peer-to-peer content-search overlay node
// Copyright (C) 2026  overlay-search contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Local file index matching rule.
//!
//! A query matches a filename iff every whitespace-separated query word
//! appears in the filename as a complete, word-boundary-delimited
//! substring, case-insensitively. Word boundaries are alphanumeric /
//! non-alphanumeric transitions, so `"Lo"` does not match
//! `"Lord of the rings"` but `"Lord"` does.

/// Split a lowercase string into its alphanumeric-run tokens.
fn word_tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether `filename` matches `query` under the word-boundary rule.
pub fn matches(filename: &str, query: &str) -> bool {
    let filename_lower = filename.to_lowercase();
    let query_lower = query.to_lowercase();

    let filename_tokens = word_tokens(&filename_lower);

    let mut query_words = query_lower.split_whitespace().peekable();
    if query_words.peek().is_none() {
        return false;
    }

    query_words.all(|word| filename_tokens.contains(&word))
}

/// Search a local file index for the filenames matching `query`,
/// preserving their original casing.
pub fn search_local<'a>(index: &'a [String], query: &str) -> Vec<&'a str> {
    index
        .iter()
        .filter(|filename| matches(filename, query))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &[&str] = &["Lord of the rings", "Happy Feet", "Logan"];

    fn index() -> Vec<String> {
        INDEX.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn short_prefix_does_not_match() {
        assert_eq!(search_local(&index(), "Lo"), Vec::<&str>::new());
    }

    #[test]
    fn whole_word_matches() {
        assert_eq!(search_local(&index(), "Lord"), vec!["Lord of the rings"]);
    }

    #[test]
    fn matching_is_case_insensitive_and_multi_word() {
        assert_eq!(search_local(&index(), "happy FEET"), vec!["Happy Feet"]);
    }

    #[test]
    fn all_words_must_be_present() {
        assert!(!matches("Happy Feet", "happy toes"));
        assert!(matches("Happy Feet", "feet happy"));
    }

    #[test]
    fn empty_query_matches_nothing() {
        assert!(!matches("Logan", ""));
    }
}
