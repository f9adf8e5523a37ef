//! Grid Engine
//!
//! The 4x4 board. Solved categories stack as rows at the top; the remaining
//! words sit in row-major order below them. Words are never created or
//! destroyed, only moved between the unsolved arrangement and solved rows.
//!
//! All randomness comes from a caller-supplied [`DeterministicRng`], so a
//! grid built from the same seed always lays out the same way.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::core::rng::DeterministicRng;
use crate::game::puzzle::{Puzzle, CATEGORIES_PER_PUZZLE};
use crate::game::word::{Category, DifficultyColor, Guess, Word, WORDS_PER_CATEGORY};

/// Extra tiles a hint points at, one per most-selected color.
const HINT_EXTRA_COLORS: usize = 3;

/// Mutable board state for one play-through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    puzzle: Puzzle,
    /// Solved categories, top row first.
    solved: Vec<DifficultyColor>,
    /// Unsolved words, row-major, starting at row `solved.len()`.
    cells: Vec<Word>,
    selection: BTreeSet<Word>,
    /// Chronological, deduplicated guess history.
    guesses: Vec<Guess>,
}

impl Grid {
    /// Fresh board: all sixteen words, uniformly shuffled.
    pub fn new(puzzle: Puzzle, rng: &mut DeterministicRng) -> Self {
        let mut cells = puzzle.words();
        rng.shuffle(&mut cells);

        Self {
            puzzle,
            solved: Vec::with_capacity(CATEGORIES_PER_PUZZLE),
            cells,
            selection: BTreeSet::new(),
            guesses: Vec::new(),
        }
    }

    /// Rebuild a board by replaying a guess history.
    ///
    /// `arrangement` is a persisted row layout (solved rows included); its
    /// unsolved words keep their persisted order, and any puzzle word it is
    /// missing is appended in puzzle order. Without an arrangement the
    /// unsolved words use puzzle order.
    ///
    /// Deserialized words are reconciled against the puzzle by value. A guess
    /// that names words this puzzle does not have stays in the history but
    /// resolves nothing.
    pub fn reconstruct(puzzle: Puzzle, guesses: &[Guess], arrangement: Option<&[Vec<Word>]>) -> Self {
        let canonical: BTreeSet<Word> = puzzle.words().into_iter().collect();

        let mut cells: Vec<Word> = Vec::with_capacity(canonical.len());
        let mut placed = BTreeSet::new();
        for word in arrangement.into_iter().flatten().flatten() {
            if !canonical.contains(word) {
                warn!(word = %word, puzzle = puzzle.number(), "Dropping unknown word from saved arrangement");
                continue;
            }
            if placed.insert(word.clone()) {
                cells.push(word.clone());
            }
        }
        for word in puzzle.words() {
            if placed.insert(word.clone()) {
                cells.push(word);
            }
        }

        let mut grid = Self {
            puzzle,
            solved: Vec::with_capacity(CATEGORIES_PER_PUZZLE),
            cells,
            selection: BTreeSet::new(),
            guesses: Vec::with_capacity(guesses.len()),
        };

        for guess in guesses {
            let unknown = guess.iter().filter(|w| !canonical.contains(*w)).count();
            if unknown > 0 || !guess.is_complete() {
                warn!(
                    puzzle = grid.puzzle.number(),
                    size = guess.len(),
                    unknown,
                    "Saved guess does not fit this puzzle; keeping it unresolved"
                );
            }

            grid.record_guess(guess.clone());
            if let Some(color) = grid.matching_category(guess).map(Category::color) {
                grid.resolve_category(color);
            }
        }

        debug!(puzzle = grid.puzzle.number(), solved = grid.solved.len(), guesses = grid.guesses.len(), "Grid reconstructed");
        grid
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Puzzle this board was dealt from.
    pub fn puzzle(&self) -> &Puzzle {
        &self.puzzle
    }

    /// Number of solved rows (0..=4).
    pub fn solved_row_count(&self) -> usize {
        self.solved.len()
    }

    /// Solved categories in row order.
    pub fn solved_colors(&self) -> &[DifficultyColor] {
        &self.solved
    }

    /// True if the category has a solved row.
    pub fn is_solved(&self, color: DifficultyColor) -> bool {
        self.solved.contains(&color)
    }

    /// Unsolved words in row-major order.
    pub fn unsolved_cells(&self) -> &[Word] {
        &self.cells
    }

    /// Currently selected words.
    pub fn selection(&self) -> &BTreeSet<Word> {
        &self.selection
    }

    /// Selection as a guess.
    pub fn selection_guess(&self) -> Guess {
        self.selection.iter().cloned().collect()
    }

    /// Recorded guesses, oldest first.
    pub fn guesses(&self) -> &[Guess] {
        &self.guesses
    }

    /// Canonical board word for `text`.
    pub fn word(&self, text: &str) -> Option<Word> {
        self.puzzle.word(text)
    }

    /// Full board, top row first: solved rows hold their category's words,
    /// then unsolved words four per row.
    pub fn rows(&self) -> Vec<Vec<Word>> {
        let mut rows: Vec<Vec<Word>> = self
            .solved
            .iter()
            .filter_map(|color| self.puzzle.category(*color))
            .map(Category::to_words)
            .collect();
        rows.extend(self.cells.chunks(WORDS_PER_CATEGORY).map(<[Word]>::to_vec));
        rows
    }

    /// Largest number of `guess` words shared with any single category.
    pub fn match_count(&self, guess: &Guess) -> usize {
        self.puzzle
            .categories()
            .map(|c| c.overlap(guess))
            .max()
            .unwrap_or(0)
    }

    /// Category whose word set equals `guess`, if any.
    pub fn matching_category(&self, guess: &Guess) -> Option<&Category> {
        self.puzzle.categories().find(|c| c.matches(guess))
    }

    /// True if an identical word set is already in the history.
    pub fn has_guessed(&self, guess: &Guess) -> bool {
        self.guesses.contains(guess)
    }

    /// True once all four rows are solved by four distinct winning guesses.
    pub fn all_categories_solved(&self) -> bool {
        if self.solved.len() != CATEGORIES_PER_PUZZLE {
            return false;
        }
        let winning: BTreeSet<DifficultyColor> = self
            .guesses
            .iter()
            .filter_map(|g| self.matching_category(g))
            .map(Category::color)
            .collect();
        winning.len() == CATEGORIES_PER_PUZZLE
    }

    /// Categories solved by the player's own guesses (auto-solved rows excluded).
    pub fn player_solved_count(&self) -> usize {
        self.guesses
            .iter()
            .filter_map(|g| self.matching_category(g))
            .map(Category::color)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Unsolved categories, easiest first.
    pub fn unsolved_colors(&self) -> Vec<DifficultyColor> {
        DifficultyColor::ALL
            .into_iter()
            .filter(|c| !self.solved.contains(c))
            .collect()
    }

    /// Words a hint highlights: every selected word, plus the first
    /// unselected unsolved word (in grid order) of each of the three colors
    /// with the most selected words. Ties go to the easier color.
    pub fn hint_targets(&self) -> Vec<Word> {
        let mut counts: BTreeMap<DifficultyColor, usize> =
            DifficultyColor::ALL.into_iter().map(|c| (c, 0)).collect();
        for word in &self.selection {
            *counts.entry(word.color()).or_insert(0) += 1;
        }

        let mut ranked: Vec<(DifficultyColor, usize)> = counts.into_iter().collect();
        // Stable sort keeps ascending color order among equal counts
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let mut wanted: BTreeSet<DifficultyColor> =
            ranked.into_iter().take(HINT_EXTRA_COLORS).map(|(c, _)| c).collect();

        let mut targets: Vec<Word> = self.selection.iter().cloned().collect();
        for word in &self.cells {
            if wanted.is_empty() {
                break;
            }
            if !self.selection.contains(word) && wanted.remove(&word.color()) {
                targets.push(word.clone());
            }
        }
        targets
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Select or deselect an unsolved word. Returns true if the selection changed.
    ///
    /// Solved words and words not on the board are ignored, as is a fifth
    /// selection.
    pub fn toggle_select(&mut self, word: &Word) -> bool {
        if !self.cells.contains(word) {
            return false;
        }
        if self.selection.remove(word) {
            return true;
        }
        if self.selection.len() >= WORDS_PER_CATEGORY {
            return false;
        }
        self.selection.insert(word.clone())
    }

    /// Clear the selection.
    pub fn deselect_all(&mut self) {
        self.selection.clear();
    }

    /// Permute the unsolved words. Solved rows stay put.
    pub fn shuffle(&mut self, rng: &mut DeterministicRng) {
        rng.shuffle(&mut self.cells);
    }

    /// Append a guess unless an identical set is already recorded.
    /// Returns false for a duplicate.
    pub fn record_guess(&mut self, guess: Guess) -> bool {
        if self.has_guessed(&guess) {
            return false;
        }
        self.guesses.push(guess);
        true
    }

    /// Move a category's words into the next solved row and clear the
    /// selection. Returns false (and changes nothing) if already solved.
    pub fn resolve_category(&mut self, color: DifficultyColor) -> bool {
        if self.solved.contains(&color) || self.puzzle.category(color).is_none() {
            return false;
        }

        self.cells.retain(|w| w.color() != color);
        self.solved.push(color);
        self.selection.clear();
        true
    }
}
