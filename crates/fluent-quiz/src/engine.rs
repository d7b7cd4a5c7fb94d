//! Difficulty ladder, anti-repeat lists and grading.
//!
//! Everything in this module is a pure function of the history and stats
//! values handed in; reading and writing the session store is the job of
//! [`crate::service::QuizService`].
//!
//! # Ladder
//!
//! The candidate level comes from the accuracy and trailing streak over the
//! most recent window of history:
//!
//! | Level | Accuracy | Streak |
//! |---|---|---|
//! | `beginner` | any | any |
//! | `beginner-intermediate` | > 0.55 | any |
//! | `intermediate` | > 0.65 | >= 3 |
//! | `intermediate-advanced` | > 0.75 | >= 5 |
//! | `advanced` | > 0.85 | >= 7 |
//!
//! The candidate is then capped at one step above the difficulty of the most
//! recent entry. Falling is unrestricted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::QuizSettings;
use crate::model::{Difficulty, GeneratedQuestion, QuizHistoryEntry, QuizStats};

/// Number of recent entries considered by the ladder and the anti-repeat lists.
pub const RECENT_WINDOW: usize = 20;

/// Maximum number of entries kept in the quiz history.
pub const HISTORY_CAP: usize = 50;

/// Number of trailing entries searched for a pending question's difficulty.
pub const PENDING_LOOKUP: usize = 5;

/// `(accuracy floor, streak floor)` for ladder indices 1 through 4.
const TIERS: [(f64, usize); 4] = [(0.55, 0), (0.65, 3), (0.75, 5), (0.85, 7)];

/// Lower-cases and trims an answer for comparison.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Grades a submitted answer by exact match after [`normalize`].
///
/// # Examples
///
/// ```
/// use fluent_quiz::engine::grade;
///
/// assert!(grade("Hola ", "hola"));
/// assert!(!grade("Hola", "Adios"));
/// ```
#[must_use]
pub fn grade(submitted: &str, correct: &str) -> bool {
    normalize(submitted) == normalize(correct)
}

/// Folds one graded answer into the running stats.
///
/// Counters saturate at `u32::MAX`; stats written through the raw slot
/// routes can hold any value.
#[must_use]
pub const fn next_stats(current: QuizStats, is_correct: bool) -> QuizStats {
    QuizStats {
        correct: current.correct.saturating_add(if is_correct { 1 } else { 0 }),
        total: current.total.saturating_add(1),
        streak: if is_correct {
            current.streak.saturating_add(1)
        } else {
            0
        },
    }
}

/// Maps accuracy and streak to a ladder index before the hysteresis cap.
#[must_use]
pub fn candidate_index(accuracy: f64, streak: usize) -> usize {
    TIERS
        .iter()
        .enumerate()
        .filter(|(_, (floor, min_streak))| accuracy > *floor && streak >= *min_streak)
        .map(|(i, _)| i + 1)
        .max()
        .unwrap_or(0)
}

/// Accuracy and streak over a window of history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentPerformance {
    /// Entries in the window.
    pub total: usize,
    /// Correct entries in the window.
    pub correct: usize,
    /// `correct / total`, or 0 for an empty window.
    pub accuracy: f64,
    /// Trailing run of correct entries, newest first.
    pub streak: usize,
}

/// Constraints handed to the question oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    /// Language being practised.
    pub language: String,
    /// Recently answered correctly; do not repeat.
    pub avoid_list: Vec<String>,
    /// Recently failed; may come back, just not immediately.
    pub failed_list: Vec<String>,
    /// Text of the immediately preceding question, never to be repeated next.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_question: Option<String>,
    /// Level the engine wants the question pitched at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty_hint: Option<Difficulty>,
}

impl GenerationContext {
    /// Returns `true` if `question` repeats the immediately preceding question.
    #[must_use]
    pub fn is_immediate_repeat(&self, question: &GeneratedQuestion) -> bool {
        self.last_question
            .as_deref()
            .is_some_and(|last| normalize(last) == normalize(&question.question))
    }
}

/// The adaptive quiz algorithm, parameterized by window sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizEngine {
    recent_window: usize,
    history_cap: usize,
    pending_lookup: usize,
    trust_reported: bool,
}

impl Default for QuizEngine {
    fn default() -> Self {
        Self {
            recent_window: RECENT_WINDOW,
            history_cap: HISTORY_CAP,
            pending_lookup: PENDING_LOOKUP,
            trust_reported: false,
        }
    }
}

impl QuizEngine {
    /// Creates an engine using the window sizes from `settings`.
    #[must_use]
    pub const fn new(settings: &QuizSettings) -> Self {
        Self {
            recent_window: settings.recent_window,
            history_cap: settings.history_cap,
            pending_lookup: settings.pending_lookup,
            trust_reported: settings.trust_reported_difficulty,
        }
    }

    /// Maximum history length this engine maintains.
    #[must_use]
    pub const fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Returns the most recent `recent_window` entries, oldest first.
    #[must_use]
    pub fn recent<'a>(&self, history: &'a [QuizHistoryEntry]) -> &'a [QuizHistoryEntry] {
        let start = history.len().saturating_sub(self.recent_window);
        &history[start..]
    }

    /// De-duplicated texts of correctly answered questions in the window.
    #[must_use]
    pub fn avoid_list(&self, history: &[QuizHistoryEntry]) -> Vec<String> {
        unique_texts(self.recent(history).iter().filter(|e| e.is_correct))
    }

    /// De-duplicated texts of failed questions in the window.
    #[must_use]
    pub fn failed_list(&self, history: &[QuizHistoryEntry]) -> Vec<String> {
        unique_texts(self.recent(history).iter().filter(|e| !e.is_correct))
    }

    /// Accuracy and trailing streak over the window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn performance(&self, history: &[QuizHistoryEntry]) -> RecentPerformance {
        let recent = self.recent(history);
        let total = recent.len();
        let correct = recent.iter().filter(|e| e.is_correct).count();
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        let streak = recent.iter().rev().take_while(|e| e.is_correct).count();

        RecentPerformance {
            total,
            correct,
            accuracy,
            streak,
        }
    }

    /// Picks the difficulty for the next question.
    ///
    /// # Examples
    ///
    /// ```
    /// use fluent_quiz::{Difficulty, QuizEngine};
    ///
    /// let engine = QuizEngine::default();
    /// assert_eq!(engine.next_difficulty(&[]), Difficulty::Beginner);
    /// ```
    #[must_use]
    pub fn next_difficulty(&self, history: &[QuizHistoryEntry]) -> Difficulty {
        let performance = self.performance(history);
        let candidate = candidate_index(performance.accuracy, performance.streak);

        let index = self
            .recent(history)
            .last()
            .map_or(candidate, |previous| {
                candidate.min(previous.difficulty.index() + 1)
            });

        Difficulty::from_index(index)
    }

    /// Builds the oracle constraints for the next question.
    #[must_use]
    pub fn generation_context(
        &self,
        language: &str,
        history: &[QuizHistoryEntry],
    ) -> GenerationContext {
        GenerationContext {
            language: language.to_string(),
            avoid_list: self.avoid_list(history),
            failed_list: self.failed_list(history),
            last_question: history
                .last()
                .map(|e| e.question_text.clone())
                .filter(|text| !text.is_empty()),
            difficulty_hint: Some(self.next_difficulty(history)),
        }
    }

    /// Recovers the difficulty assigned when `question_id` was generated.
    ///
    /// Searches the last few entries for an unanswered entry with that id,
    /// newest first, and defaults to `Beginner`. `reported` (the level the
    /// client echoed back) is only consulted when the engine was built with
    /// `trustReportedDifficulty` set.
    #[must_use]
    pub fn assigned_difficulty(
        &self,
        history: &[QuizHistoryEntry],
        question_id: &str,
        reported: Option<Difficulty>,
    ) -> Difficulty {
        let start = history.len().saturating_sub(self.pending_lookup);
        history[start..]
            .iter()
            .rev()
            .find(|e| e.question_id == question_id && !e.answered)
            .map(|e| e.difficulty)
            .or(reported.filter(|_| self.trust_reported))
            .unwrap_or_default()
    }

    /// Appends an entry, evicting the oldest ones beyond the cap.
    pub fn record(&self, history: &mut Vec<QuizHistoryEntry>, entry: QuizHistoryEntry) {
        history.push(entry);
        truncate_oldest(history, self.history_cap);
    }
}

/// Drops the oldest items so that at most `cap` remain.
pub(crate) fn truncate_oldest<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

fn unique_texts<'a>(entries: impl Iterator<Item = &'a QuizHistoryEntry>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .map(|e| e.question_text.as_str())
        .filter(|text| !text.is_empty() && seen.insert(*text))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::QuestionKind;

    fn entry(text: &str, is_correct: bool, difficulty: Difficulty) -> QuizHistoryEntry {
        QuizHistoryEntry {
            question_id: format!("id-{text}"),
            question_text: text.to_string(),
            answer: "a".to_string(),
            correct_answer: "a".to_string(),
            is_correct,
            difficulty,
            timestamp: Utc::now(),
            answered: true,
        }
    }

    /// `wrong` incorrect entries followed by `right` correct ones, all at `level`.
    fn run(wrong: usize, right: usize, level: Difficulty) -> Vec<QuizHistoryEntry> {
        (0..wrong)
            .map(|i| entry(&format!("w{i}"), false, level))
            .chain((0..right).map(|i| entry(&format!("r{i}"), true, level)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Grading and stats
    // ------------------------------------------------------------------------

    #[test]
    fn test_grade_exact_after_normalization() {
        assert!(grade("Hola ", "hola"));
        assert!(grade("  MANZANA\n", "manzana"));
        assert!(!grade("Hola", "Adios"));
        // no fuzzy matching or accent folding
        assert!(!grade("manzanas", "manzana"));
        assert!(!grade("adios", "adiós"));
    }

    #[test]
    fn test_next_stats_streak() {
        let stats = QuizStats {
            correct: 3,
            total: 5,
            streak: 2,
        };
        let after_correct = next_stats(stats, true);
        assert_eq!(after_correct.streak, 3);
        assert_eq!(after_correct.correct, 4);
        assert_eq!(after_correct.total, 6);

        let after_wrong = next_stats(after_correct, false);
        assert_eq!(after_wrong.streak, 0);
        assert_eq!(after_wrong.correct, 4);
        assert_eq!(after_wrong.total, 7);
    }

    #[test]
    fn test_next_stats_keeps_correct_at_most_total() {
        let mut stats = QuizStats::default();
        for i in 0..30 {
            stats = next_stats(stats, i % 3 != 0);
            assert!(stats.correct <= stats.total);
        }
        assert_eq!(stats.total, 30);
    }

    #[test]
    fn test_next_stats_saturates_at_max() {
        let full = QuizStats {
            correct: u32::MAX,
            total: u32::MAX,
            streak: u32::MAX,
        };
        assert_eq!(next_stats(full, true), full);

        let after_wrong = next_stats(full, false);
        assert_eq!(after_wrong.total, u32::MAX);
        assert_eq!(after_wrong.streak, 0);
    }

    // ------------------------------------------------------------------------
    // Anti-repeat lists
    // ------------------------------------------------------------------------

    #[test]
    fn test_avoid_list_deduplicated_correct_only() {
        let engine = QuizEngine::default();
        let history = vec![
            entry("rojo", true, Difficulty::Beginner),
            entry("azul", false, Difficulty::Beginner),
            entry("rojo", true, Difficulty::Beginner),
            entry("verde", true, Difficulty::Beginner),
        ];
        let mut avoid = engine.avoid_list(&history);
        avoid.sort();
        assert_eq!(avoid, vec!["rojo".to_string(), "verde".to_string()]);
        assert_eq!(engine.failed_list(&history), vec!["azul".to_string()]);
    }

    #[test]
    fn test_lists_only_look_at_recent_window() {
        let engine = QuizEngine::default();
        let mut history = vec![entry("old-correct", true, Difficulty::Beginner)];
        history.extend((0..RECENT_WINDOW).map(|i| entry(&format!("q{i}"), false, Difficulty::Beginner)));

        assert!(engine.avoid_list(&history).is_empty());
        assert_eq!(engine.failed_list(&history).len(), RECENT_WINDOW);
        assert!(!engine
            .failed_list(&history)
            .contains(&"old-correct".to_string()));
    }

    #[test]
    fn test_question_can_be_in_both_lists() {
        let engine = QuizEngine::default();
        let history = vec![
            entry("gato", false, Difficulty::Beginner),
            entry("gato", true, Difficulty::Beginner),
        ];
        assert_eq!(engine.avoid_list(&history), vec!["gato".to_string()]);
        assert_eq!(engine.failed_list(&history), vec!["gato".to_string()]);
    }

    #[test]
    fn test_generation_context_carries_last_question() {
        let engine = QuizEngine::default();
        let history = vec![
            entry("uno", true, Difficulty::Beginner),
            entry("dos", false, Difficulty::Beginner),
        ];
        let ctx = engine.generation_context("Spanish", &history);
        assert_eq!(ctx.language, "Spanish");
        assert_eq!(ctx.last_question.as_deref(), Some("dos"));
        assert_eq!(ctx.avoid_list, vec!["uno".to_string()]);
        // accuracy 0.5 is not above the first threshold
        assert_eq!(ctx.difficulty_hint, Some(Difficulty::Beginner));

        let empty = engine.generation_context("Spanish", &[]);
        assert!(empty.last_question.is_none());
        assert_eq!(empty.difficulty_hint, Some(Difficulty::Beginner));
    }

    #[test]
    fn test_immediate_repeat_detection() {
        let ctx = GenerationContext {
            last_question: Some("¿Qué es 'perro'?".to_string()),
            ..GenerationContext::default()
        };
        let mut question = GeneratedQuestion {
            kind: QuestionKind::Written,
            question: "  ¿QUÉ es 'perro'? ".to_string(),
            correct_answer: "dog".to_string(),
            hint: String::new(),
        };
        assert!(ctx.is_immediate_repeat(&question));

        question.question = "¿Qué es 'gato'?".to_string();
        assert!(!ctx.is_immediate_repeat(&question));
    }

    // ------------------------------------------------------------------------
    // Performance and ladder
    // ------------------------------------------------------------------------

    #[test]
    fn test_performance_streak_counts_from_newest() {
        let engine = QuizEngine::default();
        let history = vec![
            entry("a", true, Difficulty::Beginner),
            entry("b", false, Difficulty::Beginner),
            entry("c", true, Difficulty::Beginner),
            entry("d", true, Difficulty::Beginner),
        ];
        let performance = engine.performance(&history);
        assert_eq!(performance.total, 4);
        assert_eq!(performance.correct, 3);
        assert_eq!(performance.streak, 2);
        assert!((performance.accuracy - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_performance_empty_history() {
        let performance = QuizEngine::default().performance(&[]);
        assert_eq!(performance.total, 0);
        assert!(performance.accuracy.abs() < f64::EPSILON);
        assert_eq!(performance.streak, 0);
    }

    #[test]
    fn test_candidate_index_tiers() {
        assert_eq!(candidate_index(0.0, 0), 0);
        assert_eq!(candidate_index(0.55, 10), 0);
        assert_eq!(candidate_index(0.56, 0), 1);
        assert_eq!(candidate_index(0.70, 2), 1);
        assert_eq!(candidate_index(0.70, 3), 2);
        assert_eq!(candidate_index(0.80, 5), 3);
        assert_eq!(candidate_index(0.80, 4), 2);
        assert_eq!(candidate_index(0.90, 7), 4);
        assert_eq!(candidate_index(0.90, 6), 3);
        assert_eq!(candidate_index(1.0, 100), 4);
    }

    #[test]
    fn test_empty_history_starts_at_beginner() {
        assert_eq!(QuizEngine::default().next_difficulty(&[]), Difficulty::Beginner);
    }

    #[test]
    fn test_ladder_rises_one_step_at_a_time() {
        let engine = QuizEngine::default();
        // 2 wrong then 18 right: accuracy 0.9, streak 18, qualifies for advanced
        let history = run(2, 18, Difficulty::Intermediate);
        assert_eq!(
            engine.next_difficulty(&history),
            Difficulty::IntermediateAdvanced
        );

        let from_beginner = run(2, 18, Difficulty::Beginner);
        assert_eq!(
            engine.next_difficulty(&from_beginner),
            Difficulty::BeginnerIntermediate
        );
    }

    #[test]
    fn test_ladder_monotonic_cap_for_every_previous_level() {
        let engine = QuizEngine::default();
        for previous in Difficulty::LADDER {
            let history = run(0, 20, previous);
            let next = engine.next_difficulty(&history);
            assert!(next.index() <= previous.index() + 1);
        }
    }

    #[test]
    fn test_ladder_can_fall_arbitrarily() {
        let engine = QuizEngine::default();
        let history = run(20, 0, Difficulty::Advanced);
        assert_eq!(engine.next_difficulty(&history), Difficulty::Beginner);
    }

    #[test]
    fn test_ladder_uses_recorded_level_of_newest_entry() {
        let engine = QuizEngine::default();
        let mut history = run(0, 9, Difficulty::Advanced);
        history.push(entry("last", true, Difficulty::Beginner));
        // accuracy 1.0 streak 10 -> candidate 4, capped by the newest entry
        assert_eq!(
            engine.next_difficulty(&history),
            Difficulty::BeginnerIntermediate
        );
    }

    #[test]
    fn test_accuracy_only_tier_needs_no_streak() {
        let engine = QuizEngine::default();
        let mut history = run(0, 6, Difficulty::BeginnerIntermediate);
        history.extend(run(4, 0, Difficulty::BeginnerIntermediate));
        // accuracy 0.6, streak 0
        assert_eq!(
            engine.next_difficulty(&history),
            Difficulty::BeginnerIntermediate
        );
    }

    // ------------------------------------------------------------------------
    // Pending difficulty lookup and cap
    // ------------------------------------------------------------------------

    #[test]
    fn test_assigned_difficulty_finds_unanswered_entry() {
        let engine = QuizEngine::default();
        let mut pending = entry("pending", false, Difficulty::Intermediate);
        pending.question_id = "q-7".to_string();
        pending.answered = false;
        let history = vec![entry("x", true, Difficulty::Beginner), pending];

        assert_eq!(
            engine.assigned_difficulty(&history, "q-7", None),
            Difficulty::Intermediate
        );
    }

    #[test]
    fn test_assigned_difficulty_ignores_answered_and_old_entries() {
        let engine = QuizEngine::default();
        let mut pending = entry("pending", false, Difficulty::Advanced);
        pending.question_id = "q-old".to_string();
        pending.answered = false;

        let mut history = vec![pending];
        history.extend(run(0, PENDING_LOOKUP, Difficulty::Intermediate));
        assert_eq!(
            engine.assigned_difficulty(&history, "q-old", None),
            Difficulty::Beginner
        );

        // answered entries never match, even with the same id
        let answered = vec![entry("r0", true, Difficulty::Advanced)];
        assert_eq!(
            engine.assigned_difficulty(&answered, "id-r0", None),
            Difficulty::Beginner
        );
    }

    #[test]
    fn test_assigned_difficulty_ignores_reported_by_default() {
        let engine = QuizEngine::default();
        assert_eq!(
            engine.assigned_difficulty(&[], "nope", Some(Difficulty::Advanced)),
            Difficulty::Beginner
        );
    }

    #[test]
    fn test_assigned_difficulty_uses_reported_when_trusted() {
        let engine = QuizEngine::new(&QuizSettings {
            trust_reported_difficulty: true,
            ..QuizSettings::default()
        });
        assert_eq!(
            engine.assigned_difficulty(&[], "nope", Some(Difficulty::Intermediate)),
            Difficulty::Intermediate
        );

        // a pending entry still wins over the echoed level
        let mut pending = entry("pending", false, Difficulty::BeginnerIntermediate);
        pending.question_id = "q-1".to_string();
        pending.answered = false;
        assert_eq!(
            engine.assigned_difficulty(&[pending], "q-1", Some(Difficulty::Advanced)),
            Difficulty::BeginnerIntermediate
        );
    }

    #[test]
    fn test_record_applies_fifo_cap() {
        let engine = QuizEngine::default();
        let mut history = Vec::new();
        for i in 0..(HISTORY_CAP + 7) {
            engine.record(&mut history, entry(&format!("q{i}"), true, Difficulty::Beginner));
            assert_eq!(history.len(), (i + 1).min(HISTORY_CAP));
        }
        assert_eq!(history.first().unwrap().question_text, "q7");
        assert_eq!(
            history.last().unwrap().question_text,
            format!("q{}", HISTORY_CAP + 6)
        );
    }
}
