//! Grade normalization and grade-to-health tables.
//!
//! # Responsibility
//! - Convert percent grades to letters with inclusive lower bounds.
//! - Map letters to health deltas, depending on whether the task is an exam.
//! - Express the undo-then-reapply swap as one net delta.
//!
//! # Invariants
//! - Percent grades are within `0..=100`.
//! - When both percent and letter are supplied, the percent wins.

use super::task::TaskType;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Letter grade scale, best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeLetter {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

const ALL_LETTERS: [GradeLetter; 11] = [
    GradeLetter::APlus,
    GradeLetter::A,
    GradeLetter::AMinus,
    GradeLetter::BPlus,
    GradeLetter::B,
    GradeLetter::BMinus,
    GradeLetter::CPlus,
    GradeLetter::C,
    GradeLetter::CMinus,
    GradeLetter::D,
    GradeLetter::F,
];

/// Errors from grade parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeError {
    /// Neither percent nor letter was supplied.
    Missing,
    PercentOutOfRange(i64),
    UnknownLetter(String),
}

impl Display for GradeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(
                f,
                "missing grade: provide either grade_percent or grade_letter"
            ),
            Self::PercentOutOfRange(value) => {
                write!(f, "grade percent must be between 0 and 100, got {value}")
            }
            Self::UnknownLetter(value) => {
                let valid = ALL_LETTERS
                    .iter()
                    .map(|letter| letter.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "invalid grade letter `{value}`; must be one of: {valid}")
            }
        }
    }
}

impl Error for GradeError {}

impl GradeLetter {
    /// Converts a percent grade using inclusive lower bounds.
    pub fn from_percent(percent: i64) -> Result<Self, GradeError> {
        if !(0..=100).contains(&percent) {
            return Err(GradeError::PercentOutOfRange(percent));
        }

        const LOWER_BOUNDS: [(i64, GradeLetter); 10] = [
            (90, GradeLetter::APlus),
            (85, GradeLetter::A),
            (80, GradeLetter::AMinus),
            (76, GradeLetter::BPlus),
            (72, GradeLetter::B),
            (68, GradeLetter::BMinus),
            (64, GradeLetter::CPlus),
            (60, GradeLetter::C),
            (55, GradeLetter::CMinus),
            (50, GradeLetter::D),
        ];

        Ok(LOWER_BOUNDS
            .iter()
            .find(|(bound, _)| percent >= *bound)
            .map_or(Self::F, |(_, letter)| *letter))
    }

    /// Parses a letter grade; surrounding whitespace and case are ignored.
    pub fn parse(value: &str) -> Result<Self, GradeError> {
        let normalized = value.trim().to_ascii_uppercase();
        ALL_LETTERS
            .iter()
            .copied()
            .find(|letter| letter.as_str() == normalized)
            .ok_or_else(|| GradeError::UnknownLetter(value.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::AMinus => "A-",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::BMinus => "B-",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::CMinus => "C-",
            Self::D => "D",
            Self::F => "F",
        }
    }

    /// Health delta earned by this letter on a task of kind `task_type`.
    ///
    /// B and B- are free on exams but cost 1 on other graded work.
    pub fn health_delta(self, task_type: TaskType) -> i32 {
        match self {
            Self::APlus => 1,
            Self::A | Self::AMinus | Self::BPlus => 0,
            Self::B | Self::BMinus => {
                if task_type.is_exam() {
                    0
                } else {
                    -1
                }
            }
            Self::CPlus => -2,
            Self::C => -3,
            Self::CMinus | Self::D => -4,
            Self::F => -5,
        }
    }
}

impl Display for GradeLetter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw grade input as reported by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeInput {
    pub percent: Option<i64>,
    pub letter: Option<String>,
}

impl GradeInput {
    pub fn percent(value: i64) -> Self {
        Self {
            percent: Some(value),
            letter: None,
        }
    }

    pub fn letter(value: impl Into<String>) -> Self {
        Self {
            percent: None,
            letter: Some(value.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.percent.is_none() && self.letter.is_none()
    }

    /// Normalizes input into a stored grade. Percent wins over letter.
    pub fn resolve(&self) -> Result<Grade, GradeError> {
        if let Some(percent) = self.percent {
            let letter = GradeLetter::from_percent(percent)?;
            // from_percent guarantees 0..=100.
            let percent = u8::try_from(percent).map_err(|_| GradeError::PercentOutOfRange(percent))?;
            return Ok(Grade {
                letter,
                percent: Some(percent),
            });
        }

        match self.letter.as_deref() {
            Some(letter) => Ok(Grade {
                letter: GradeLetter::parse(letter)?,
                percent: None,
            }),
            None => Err(GradeError::Missing),
        }
    }
}

/// Normalized grade stored on a completion status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub letter: GradeLetter,
    pub percent: Option<u8>,
}

impl Grade {
    /// Human-readable summary used as the completed-event message.
    pub fn describe(&self, health_delta: i32) -> String {
        let mut message = format!("Grade {}", self.letter);
        if let Some(percent) = self.percent {
            message.push_str(&format!(" ({percent}%)"));
        }
        if health_delta != 0 {
            message.push_str(&format!(", health {health_delta:+}"));
        }
        message
    }
}

/// Net adjustment that swaps an applied delta `old` for `new` in one step.
pub fn net_health_delta(old: i32, new: i32) -> i32 {
    new.saturating_sub(old)
}

#[cfg(test)]
mod tests {
    use super::{net_health_delta, Grade, GradeError, GradeInput, GradeLetter};
    use crate::model::task::TaskType;

    #[test]
    fn percent_boundaries_are_inclusive() {
        let cases = [
            (100, GradeLetter::APlus),
            (90, GradeLetter::APlus),
            (89, GradeLetter::A),
            (85, GradeLetter::A),
            (80, GradeLetter::AMinus),
            (76, GradeLetter::BPlus),
            (72, GradeLetter::B),
            (68, GradeLetter::BMinus),
            (64, GradeLetter::CPlus),
            (60, GradeLetter::C),
            (55, GradeLetter::CMinus),
            (54, GradeLetter::D),
            (50, GradeLetter::D),
            (49, GradeLetter::F),
            (0, GradeLetter::F),
        ];
        for (percent, expected) in cases {
            assert_eq!(
                GradeLetter::from_percent(percent).unwrap(),
                expected,
                "percent {percent}"
            );
        }
    }

    #[test]
    fn percent_outside_range_is_rejected() {
        assert_eq!(
            GradeLetter::from_percent(101),
            Err(GradeError::PercentOutOfRange(101))
        );
        assert_eq!(
            GradeLetter::from_percent(-1),
            Err(GradeError::PercentOutOfRange(-1))
        );
    }

    #[test]
    fn letters_parse_case_insensitively() {
        assert_eq!(GradeLetter::parse(" b+ ").unwrap(), GradeLetter::BPlus);
        assert_eq!(GradeLetter::parse("a").unwrap(), GradeLetter::A);
        assert!(matches!(
            GradeLetter::parse("E"),
            Err(GradeError::UnknownLetter(_))
        ));
    }

    #[test]
    fn b_grades_only_cost_health_outside_exams() {
        assert_eq!(GradeLetter::B.health_delta(TaskType::Exam), 0);
        assert_eq!(GradeLetter::BMinus.health_delta(TaskType::Exam), 0);
        assert_eq!(GradeLetter::B.health_delta(TaskType::Assignment), -1);
        assert_eq!(GradeLetter::BMinus.health_delta(TaskType::Assignment), -1);
    }

    #[test]
    fn delta_table_matches_scale() {
        let task = TaskType::Assignment;
        assert_eq!(GradeLetter::APlus.health_delta(task), 1);
        assert_eq!(GradeLetter::A.health_delta(task), 0);
        assert_eq!(GradeLetter::AMinus.health_delta(task), 0);
        assert_eq!(GradeLetter::BPlus.health_delta(task), 0);
        assert_eq!(GradeLetter::CPlus.health_delta(task), -2);
        assert_eq!(GradeLetter::C.health_delta(task), -3);
        assert_eq!(GradeLetter::CMinus.health_delta(task), -4);
        assert_eq!(GradeLetter::D.health_delta(task), -4);
        assert_eq!(GradeLetter::F.health_delta(task), -5);
    }

    #[test]
    fn percent_wins_over_letter() {
        let input = GradeInput {
            percent: Some(55),
            letter: Some("A+".to_string()),
        };
        assert_eq!(
            input.resolve().unwrap(),
            Grade {
                letter: GradeLetter::CMinus,
                percent: Some(55),
            }
        );
    }

    #[test]
    fn empty_input_is_missing() {
        assert_eq!(GradeInput::default().resolve(), Err(GradeError::Missing));
    }

    #[test]
    fn net_delta_swaps_old_for_new() {
        assert_eq!(net_health_delta(1, -5), -6);
        assert_eq!(net_health_delta(-4, 1), 5);
        assert_eq!(net_health_delta(0, 0), 0);
    }

    #[test]
    fn describe_mentions_letter_percent_and_delta() {
        let grade = Grade {
            letter: GradeLetter::CMinus,
            percent: Some(55),
        };
        assert_eq!(grade.describe(-4), "Grade C- (55%), health -4");
        let letter_only = Grade {
            letter: GradeLetter::A,
            percent: None,
        };
        assert_eq!(letter_only.describe(0), "Grade A");
    }
}
