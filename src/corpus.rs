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

//! Corpus Provider: the list of filenames this node can draw a local
//! search index from.

use rand::seq::SliceRandom;

use crate::error::OverlayResult;

/// Smallest and largest number of filenames a node samples into its local
/// index at startup.
const MIN_INDEX_SIZE: usize = 3;
const MAX_INDEX_SIZE: usize = 5;

/// Reads a newline-delimited list of candidate filenames, skipping blank
/// lines.
pub fn load(path: &str) -> OverlayResult<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Sample a uniform random count in `[3, 5]` from `corpus` without
/// replacement. If the corpus has fewer than 3 entries the whole corpus is
/// returned.
pub fn sample_index(corpus: &[String], rng: &mut impl rand::Rng) -> Vec<String> {
    if corpus.len() <= MIN_INDEX_SIZE {
        return corpus.to_vec();
    }

    let upper = MAX_INDEX_SIZE.min(corpus.len());
    let count = rng.gen_range(MIN_INDEX_SIZE..=upper);

    corpus
        .choose_multiple(rng, count)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn corpus() -> Vec<String> {
        (0..20).map(|i| format!("file-{}", i)).collect()
    }

    #[test]
    fn sample_is_within_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let sample = sample_index(&corpus(), &mut rng);
        assert!(sample.len() >= MIN_INDEX_SIZE);
        assert!(sample.len() <= MAX_INDEX_SIZE);
    }

    #[test]
    fn sample_has_no_duplicates() {
        let mut rng = StdRng::seed_from_u64(7);
        let sample = sample_index(&corpus(), &mut rng);
        let mut sorted = sample.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), sample.len());
    }

    #[test]
    fn tiny_corpus_is_returned_whole() {
        let mut rng = StdRng::seed_from_u64(3);
        let corpus = vec!["only-one".to_string()];
        assert_eq!(sample_index(&corpus, &mut rng), corpus);
    }

    #[test]
    fn load_skips_blank_lines() {
        let dir = std::env::temp_dir().join("overlay-search-corpus-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("corpus.txt");
        std::fs::write(&path, "Logan\n\nHappy Feet\n   \nMatrix\n").unwrap();

        let loaded = load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded, vec!["Logan", "Happy Feet", "Matrix"]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
