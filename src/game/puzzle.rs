//! Puzzle Data
//!
//! A validated puzzle (four categories, one per color, sixteen distinct
//! words) and the catalog of all puzzles keyed by number.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Deserialize};

use crate::game::word::{Category, DifficultyColor, Word};

/// Categories per puzzle.
pub const CATEGORIES_PER_PUZZLE: usize = 4;

/// Tiles per board.
pub const WORDS_PER_PUZZLE: usize = 16;

// =============================================================================
// ERRORS
// =============================================================================

/// Malformed puzzle data. Fatal at load time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PuzzleError {
    /// Puzzle does not carry exactly four categories.
    #[error("Puzzle must have exactly 4 categories, got {0}")]
    WrongCategoryCount(usize),

    /// Two categories share a color.
    #[error("Duplicate category color: {0}")]
    DuplicateColor(DifficultyColor),

    /// A category does not carry exactly four words.
    #[error("Category {color} must have exactly 4 words, got {got}")]
    WrongWordCount {
        /// Offending category
        color: DifficultyColor,
        /// Words supplied
        got: usize,
    },

    /// A word occurs twice on the board.
    #[error("Duplicate word: {0}")]
    DuplicateWord(String),

    /// Two catalog entries share a puzzle number.
    #[error("Duplicate puzzle number: {0}")]
    DuplicateNumber(u32),

    /// Document could not be decoded.
    #[error("Puzzle parse error: {0}")]
    Parse(String),
}

// =============================================================================
// PUZZLE
// =============================================================================

#[derive(Serialize, Deserialize)]
struct PuzzleDoc {
    number: u32,
    colors: Vec<Category>,
}

/// One day's puzzle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PuzzleDoc", into = "PuzzleDoc")]
pub struct Puzzle {
    puzzle_number: u32,
    categories: BTreeMap<DifficultyColor, Category>,
}

impl TryFrom<PuzzleDoc> for Puzzle {
    type Error = PuzzleError;

    fn try_from(doc: PuzzleDoc) -> Result<Self, Self::Error> {
        Puzzle::new(doc.number, doc.colors)
    }
}

impl From<Puzzle> for PuzzleDoc {
    fn from(puzzle: Puzzle) -> Self {
        PuzzleDoc {
            number: puzzle.puzzle_number,
            colors: puzzle.categories.into_values().collect(),
        }
    }
}

impl Puzzle {
    /// Validate and assemble a puzzle.
    pub fn new(
        puzzle_number: u32,
        categories: impl IntoIterator<Item = Category>,
    ) -> Result<Self, PuzzleError> {
        let categories: Vec<Category> = categories.into_iter().collect();
        if categories.len() != CATEGORIES_PER_PUZZLE {
            return Err(PuzzleError::WrongCategoryCount(categories.len()));
        }

        let mut by_color = BTreeMap::new();
        let mut seen_words = BTreeSet::new();

        for category in categories {
            for word in category.words() {
                if !seen_words.insert(word.clone()) {
                    return Err(PuzzleError::DuplicateWord(word.clone()));
                }
            }
            let color = category.color();
            if by_color.insert(color, category).is_some() {
                return Err(PuzzleError::DuplicateColor(color));
            }
        }

        Ok(Self {
            puzzle_number,
            categories: by_color,
        })
    }

    /// Puzzle number.
    pub fn number(&self) -> u32 {
        self.puzzle_number
    }

    /// Category for a color.
    pub fn category(&self, color: DifficultyColor) -> Option<&Category> {
        self.categories.get(&color)
    }

    /// Categories in ascending difficulty.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// All sixteen words in puzzle order (yellow first, authored order within).
    pub fn words(&self) -> Vec<Word> {
        self.categories().flat_map(Category::to_words).collect()
    }

    /// Category containing `text`, if any.
    pub fn category_of(&self, text: &str) -> Option<&Category> {
        self.categories().find(|c| c.contains(text))
    }

    /// Canonical word for `text`, if it is on this board.
    pub fn word(&self, text: &str) -> Option<Word> {
        self.category_of(text).map(|c| Word::new(text, c.color()))
    }
}

// =============================================================================
// CATALOG
// =============================================================================

#[derive(Deserialize)]
struct CatalogDoc {
    games: Vec<Puzzle>,
}

/// Every known puzzle, keyed by number.
#[derive(Clone, Debug, Default)]
pub struct PuzzleCatalog {
    puzzles: BTreeMap<u32, Puzzle>,
}

impl PuzzleCatalog {
    /// Build from already-validated puzzles.
    pub fn from_puzzles(puzzles: impl IntoIterator<Item = Puzzle>) -> Result<Self, PuzzleError> {
        let mut map = BTreeMap::new();
        for puzzle in puzzles {
            let number = puzzle.number();
            if map.insert(number, puzzle).is_some() {
                return Err(PuzzleError::DuplicateNumber(number));
            }
        }
        Ok(Self { puzzles: map })
    }

    /// Parse a `{ "games": [...] }` document.
    pub fn from_json(json: &str) -> Result<Self, PuzzleError> {
        let doc: CatalogDoc =
            serde_json::from_str(json).map_err(|e| PuzzleError::Parse(e.to_string()))?;
        Self::from_puzzles(doc.games)
    }

    /// Look up a puzzle.
    pub fn get(&self, number: u32) -> Option<&Puzzle> {
        self.puzzles.get(&number)
    }

    /// Smallest puzzle number.
    pub fn min_number(&self) -> Option<u32> {
        self.puzzles.keys().next().copied()
    }

    /// Largest puzzle number.
    pub fn max_number(&self) -> Option<u32> {
        self.puzzles.keys().next_back().copied()
    }

    /// Number of puzzles.
    pub fn len(&self) -> usize {
        self.puzzles.len()
    }

    /// True if there are no puzzles.
    pub fn is_empty(&self) -> bool {
        self.puzzles.is_empty()
    }

    /// Iterate puzzles in number order.
    pub fn iter(&self) -> impl Iterator<Item = &Puzzle> {
        self.puzzles.values()
    }
}
