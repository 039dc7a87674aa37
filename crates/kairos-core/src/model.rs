//! Input data model: answer keys and student rosters.
//!
//! These are the shapes the excluded collaborators (forms, file loaders)
//! hand to the engine.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AnalysisError;

/// Ordered mapping from item id (`Q1..Qn`) to the correct option letter.
///
/// Item ids are implied by position, so the mapping is always contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnswerKey {
    letters: Vec<char>,
}

impl AnswerKey {
    /// Build a key from one letter per item.
    pub fn new(letters: Vec<char>) -> Result<Self, AnalysisError> {
        let letters = letters
            .into_iter()
            .enumerate()
            .map(|(j, c)| {
                let upper = c.to_ascii_uppercase();
                if upper.is_ascii_alphabetic() {
                    Ok(upper)
                } else {
                    Err(AnalysisError::InvalidAnswerKey(format!(
                        "{} has non-letter answer '{c}'",
                        item_id(j)
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { letters })
    }

    /// Parse a free-form key such as `"A, B, C, C"` or `"abcc"`.
    ///
    /// Spaces and commas are dropped and the rest is uppercased; every
    /// remaining character is one item.
    pub fn from_letters(input: &str) -> Result<Self, AnalysisError> {
        let cleaned: Vec<char> = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .collect();
        Self::new(cleaned)
    }

    /// Build a key from `(item id, letter)` pairs in any order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut indexed = Vec::new();
        for (id, value) in pairs {
            let id = id.as_ref();
            let index = parse_item_id(id).ok_or_else(|| {
                AnalysisError::InvalidAnswerKey(format!("'{id}' is not an item id of the form Q<n>"))
            })?;
            let mut chars = value.as_ref().trim().chars();
            let letter = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(AnalysisError::InvalidAnswerKey(format!(
                        "{id} must map to a single letter, got '{}'",
                        value.as_ref()
                    )))
                }
            };
            indexed.push((index, letter));
        }

        indexed.sort_by_key(|(index, _)| *index);
        for (expected, (index, _)) in (1..).zip(&indexed) {
            if *index != expected {
                return Err(AnalysisError::InvalidAnswerKey(format!(
                    "item ids must be contiguous Q1..Q{}, found Q{index} at position {expected}",
                    indexed.len()
                )));
            }
        }

        Self::new(indexed.into_iter().map(|(_, c)| c).collect())
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    /// Correct letter for item `j` (0-based).
    pub fn letter(&self, j: usize) -> Option<char> {
        self.letters.get(j).copied()
    }

    /// Item ids in key order.
    pub fn item_ids(&self) -> Vec<String> {
        (0..self.letters.len()).map(item_id).collect()
    }

    /// `(item id, letter)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (String, char)> + '_ {
        self.letters.iter().enumerate().map(|(j, &c)| (item_id(j), c))
    }

    /// Whether `answer` is the correct response to item `j`.
    ///
    /// Case and whitespace are ignored. Blank, `-`, multi-letter or
    /// out-of-range answers are simply wrong.
    pub fn is_correct(&self, j: usize, answer: &str) -> bool {
        match (self.letter(j), normalize_answer(answer)) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self.letters.iter().collect();
        write!(f, "{s}")
    }
}

impl Serialize for AnswerKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.letters.len()))?;
        for (id, letter) in self.iter() {
            map.serialize_entry(&id, &letter.to_string())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AnswerKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = AnswerKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from Q1..Qn to single letters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AnswerKey, A::Error> {
                let mut pairs: Vec<(String, String)> = Vec::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    pairs.push((k, v));
                }
                AnswerKey::from_pairs(pairs).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(KeyVisitor)
    }
}

/// Item id for 0-based position `j`.
pub fn item_id(j: usize) -> String {
    format!("Q{}", j + 1)
}

fn parse_item_id(id: &str) -> Option<usize> {
    id.trim()
        .strip_prefix('Q')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n >= 1)
}

/// Reduce a raw answer to a single uppercase ASCII letter, if it is one.
pub fn normalize_answer(raw: &str) -> Option<char> {
    let mut letters = raw.chars().filter(|c| !c.is_whitespace());
    match (letters.next(), letters.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
        _ => None,
    }
}

/// One student's raw answers, in answer-key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAnswers {
    /// Student display name.
    pub name: String,
    /// Chosen option per item; `-` or empty for no answer.
    #[serde(default)]
    pub answers: Vec<String>,
}

impl StudentAnswers {
    pub fn new<S: Into<String>>(name: impl Into<String>, answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered list of students and their answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    students: Vec<StudentAnswers>,
}

impl Roster {
    pub fn new(students: Vec<StudentAnswers>) -> Self {
        Self { students }
    }

    /// Append a student, keeping input order.
    pub fn push(&mut self, student: StudentAnswers) {
        self.students.push(student);
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&StudentAnswers> {
        self.students.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StudentAnswers> {
        self.students.iter()
    }

    /// Chosen answer of student `i` for item `j`, or `""` if absent.
    pub fn answer(&self, i: usize, j: usize) -> &str {
        self.students
            .get(i)
            .and_then(|s| s.answers.get(j))
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl FromIterator<StudentAnswers> for Roster {
    fn from_iter<T: IntoIterator<Item = StudentAnswers>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
