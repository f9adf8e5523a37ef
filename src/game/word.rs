//! Word & Category Model
//!
//! Immutable value types: the difficulty color, a word tagged with its color,
//! a category (four words plus a description) and a guess (a set of words).
//! Word text is normalized to uppercase on construction, so equality is
//! case-insensitive by the time two words are compared.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Deserialize};

use crate::game::puzzle::PuzzleError;

/// Words per category (and per guess).
pub const WORDS_PER_CATEGORY: usize = 4;

// =============================================================================
// DIFFICULTY COLOR
// =============================================================================

/// Difficulty tier of a category, ordered from easiest to hardest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DifficultyColor {
    /// Easiest
    Yellow = 1,
    /// Second tier
    Green = 2,
    /// Third tier
    Blue = 3,
    /// Hardest
    Purple = 4,
}

impl DifficultyColor {
    /// Every color, in ascending difficulty.
    pub const ALL: [DifficultyColor; 4] = [
        DifficultyColor::Yellow,
        DifficultyColor::Green,
        DifficultyColor::Blue,
        DifficultyColor::Purple,
    ];

    /// Difficulty level (1 = easiest, 4 = hardest).
    #[inline]
    pub fn difficulty_level(self) -> u8 {
        self as u8
    }

    /// Color for a difficulty level (1-4).
    pub fn from_level(level: u8) -> Option<DifficultyColor> {
        match level {
            1 => Some(DifficultyColor::Yellow),
            2 => Some(DifficultyColor::Green),
            3 => Some(DifficultyColor::Blue),
            4 => Some(DifficultyColor::Purple),
            _ => None,
        }
    }

    /// Lowercase name, as stored in documents.
    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyColor::Yellow => "yellow",
            DifficultyColor::Green => "green",
            DifficultyColor::Blue => "blue",
            DifficultyColor::Purple => "purple",
        }
    }
}

impl fmt::Display for DifficultyColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WORD
// =============================================================================

#[derive(Deserialize)]
struct WordDoc {
    text: String,
    color: DifficultyColor,
}

/// A tile word and the color of the category it belongs to.
///
/// Two words with the same text and color are interchangeable; that is what
/// lets a deserialized copy stand in for the live grid's instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "WordDoc")]
pub struct Word {
    text: String,
    color: DifficultyColor,
}

impl From<WordDoc> for Word {
    fn from(doc: WordDoc) -> Self {
        Word::new(doc.text, doc.color)
    }
}

impl Word {
    /// Create a word; text is trimmed and uppercased.
    pub fn new(text: impl AsRef<str>, color: DifficultyColor) -> Self {
        Self {
            text: normalize(text.as_ref()),
            color,
        }
    }

    /// Display text (uppercase).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Category color.
    pub fn color(&self) -> DifficultyColor {
        self.color
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Canonical form used for every word comparison.
pub(crate) fn normalize(text: &str) -> String {
    text.trim().to_uppercase()
}

// =============================================================================
// CATEGORY
// =============================================================================

#[derive(Deserialize)]
struct CategoryDoc {
    color: DifficultyColor,
    #[serde(rename = "label")]
    description: String,
    words: Vec<String>,
}

/// One secret grouping of a puzzle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CategoryDoc")]
pub struct Category {
    color: DifficultyColor,
    #[serde(rename = "label")]
    description: String,
    words: [String; WORDS_PER_CATEGORY],
}

impl TryFrom<CategoryDoc> for Category {
    type Error = PuzzleError;

    fn try_from(doc: CategoryDoc) -> Result<Self, Self::Error> {
        Category::new(doc.color, doc.description, doc.words)
    }
}

impl Category {
    /// Build a category from exactly four distinct words.
    pub fn new<S: AsRef<str>>(
        color: DifficultyColor,
        description: impl Into<String>,
        words: impl IntoIterator<Item = S>,
    ) -> Result<Self, PuzzleError> {
        let normalized: Vec<String> = words.into_iter().map(|w| normalize(w.as_ref())).collect();

        let words: [String; WORDS_PER_CATEGORY] = normalized
            .try_into()
            .map_err(|got: Vec<String>| PuzzleError::WrongWordCount { color, got: got.len() })?;

        let distinct: BTreeSet<&str> = words.iter().map(String::as_str).collect();
        if distinct.len() != WORDS_PER_CATEGORY {
            return Err(PuzzleError::DuplicateWord(format!("within {} category", color)));
        }

        Ok(Self {
            color,
            description: description.into(),
            words,
        })
    }

    /// Category color.
    pub fn color(&self) -> DifficultyColor {
        self.color
    }

    /// Human-readable connection ("Things that are yellow").
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Member words, uppercase, in authored order.
    pub fn words(&self) -> &[String; WORDS_PER_CATEGORY] {
        &self.words
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, text: &str) -> bool {
        let needle = normalize(text);
        self.words.iter().any(|w| *w == needle)
    }

    /// Member words as colored [`Word`]s.
    pub fn to_words(&self) -> Vec<Word> {
        self.words.iter().map(|w| Word::new(w, self.color)).collect()
    }

    /// How many words of `guess` belong to this category (by text).
    pub fn overlap(&self, guess: &Guess) -> usize {
        guess.iter().filter(|w| self.contains(w.text())).count()
    }

    /// True if `guess` is exactly this category's word set.
    pub fn matches(&self, guess: &Guess) -> bool {
        guess.len() == WORDS_PER_CATEGORY && self.overlap(guess) == WORDS_PER_CATEGORY
    }

    /// "A, B, C, D" for result screens.
    pub fn word_list_string(&self) -> String {
        self.words.join(", ")
    }
}

// =============================================================================
// GUESS
// =============================================================================

/// The words a player had selected when submitting. Order is irrelevant.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guess(BTreeSet<Word>);

impl Guess {
    /// Empty guess.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no words.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the guess holds a full four words.
    pub fn is_complete(&self) -> bool {
        self.0.len() == WORDS_PER_CATEGORY
    }

    /// Membership test.
    pub fn contains(&self, word: &Word) -> bool {
        self.0.contains(word)
    }

    /// Iterate words in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Word> {
        self.0.iter()
    }

    /// Add a word; returns false if it was already present.
    pub fn insert(&mut self, word: Word) -> bool {
        self.0.insert(word)
    }
}

impl FromIterator<Word> for Guess {
    fn from_iter<I: IntoIterator<Item = Word>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
