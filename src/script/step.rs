//! Script building blocks
//!
//! Every operation the store performs against the remote engine is expressed
//! as a [`Script`]: guards checked first, then steps, then one terminal
//! output. The Lua renderer and the in-process engine both consume this form.

use std::fmt;

/// One end of a score range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    /// Unbounded below
    NegInf,
    /// Unbounded above
    PosInf,
    /// Includes the value
    Inclusive(f64),
    /// Excludes the value
    Exclusive(f64),
}

impl ScoreBound {
    /// True if `score` satisfies this bound used as a range minimum
    pub fn admits_above(&self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => true,
            ScoreBound::PosInf => false,
            ScoreBound::Inclusive(v) => score >= *v,
            ScoreBound::Exclusive(v) => score > *v,
        }
    }

    /// True if `score` satisfies this bound used as a range maximum
    pub fn admits_below(&self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => false,
            ScoreBound::PosInf => true,
            ScoreBound::Inclusive(v) => score <= *v,
            ScoreBound::Exclusive(v) => score < *v,
        }
    }
}

/// Range argument syntax: `-inf`, `+inf`, `19`, `(19`
impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::NegInf => f.write_str("-inf"),
            ScoreBound::PosInf => f.write_str("+inf"),
            ScoreBound::Inclusive(v) => write!(f, "{}", v),
            ScoreBound::Exclusive(v) => write!(f, "({}", v),
        }
    }
}

/// A single primitive write
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set hash fields
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Delete keys
    Del { keys: Vec<String> },
    /// Add set members
    SAdd { key: String, members: Vec<String> },
    /// Remove set members
    SRem { key: String, members: Vec<String> },
    /// Add a scored member
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    /// Remove a scored member
    ZRem { key: String, member: String },
}

/// A step of a script body
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Run a primitive write
    Exec(Command),
    /// Remove `record` from every index its auxiliary lists name, then drop
    /// the lists
    Unindex { record: String },
    /// Copy all members of a set into `dest`
    CopySet { dest: String, source: String },
    /// Copy members of a sorted index whose score lies in `[min, max]` into
    /// the set `dest`. Copies nothing when the range is empty.
    CopyRange {
        dest: String,
        source: String,
        min: ScoreBound,
        max: ScoreBound,
    },
    /// Copy a whole sorted index, scores included
    CopySorted { dest: String, source: String },
    /// Drop members of the sorted `key` whose score lies in `[min, max]`
    RemoveRange {
        key: String,
        min: ScoreBound,
        max: ScoreBound,
    },
    /// Intersect sets or sorted sets into a sorted `dest`
    Intersect { dest: String, sources: Vec<String> },
    /// Union sets or sorted sets into a sorted `dest`
    Union { dest: String, sources: Vec<String> },
    /// Union plain sets into the set `dest`
    UnionSets { dest: String, sources: Vec<String> },
    /// Union every set-typed key matching a glob pattern into `dest`
    UnionMatching { dest: String, pattern: String },
    /// Store the members of `base` not in any of `subtract`
    Difference {
        dest: String,
        base: String,
        subtract: Vec<String>,
    },
}

/// Precondition of a guarded write
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    /// None of the keys may exist, else `CONFLICT`
    Absent { keys: Vec<String> },
    /// The hash field must exist (`NOT_FOUND`) and equal `expected`
    /// (`CONFLICT`)
    Matches {
        key: String,
        field: String,
        expected: String,
    },
}

/// Server-side sort and pagination of a result key
#[derive(Debug, Clone, PartialEq)]
pub struct SortStage {
    /// Key holding the matched record keys
    pub source: String,
    /// Hash field to sort by, `None` keeps the result key's order
    pub by: Option<String>,
    /// Lexicographic rather than numeric comparison
    pub alpha: bool,
    /// Descending order
    pub descending: bool,
    /// Hash fields fetched per matched record
    pub get: Vec<String>,
    /// Leading matches to skip
    pub offset: usize,
    /// Maximum rows returned, `None` for unbounded
    pub limit: Option<usize>,
}

/// What a script returns
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Status string `OK` after a successful guarded write
    Status,
    /// `[total, rows]` where rows holds `get.len()` values per match
    Page(SortStage),
    /// Delete every record named by `source`, returning the count
    Purge { source: String, all_ids: String },
}

/// Status returned by a write script
pub const STATUS_OK: &str = "OK";
/// Status returned when a guard detects a concurrent change
pub const STATUS_CONFLICT: &str = "CONFLICT";
/// Status returned when a guarded record does not exist
pub const STATUS_NOT_FOUND: &str = "NOT_FOUND";

/// A complete server-side program
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// Checked in order before any step runs
    pub guards: Vec<Guard>,
    /// Body
    pub steps: Vec<Step>,
    /// Terminal output
    pub output: Output,
    /// Temporary keys deleted when the script ends, on success or failure
    pub cleanup: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_syntax() {
        assert_eq!(ScoreBound::NegInf.to_string(), "-inf");
        assert_eq!(ScoreBound::PosInf.to_string(), "+inf");
        assert_eq!(ScoreBound::Inclusive(19.0).to_string(), "19");
        assert_eq!(ScoreBound::Exclusive(19.0).to_string(), "(19");
        assert_eq!(ScoreBound::Inclusive(56.8).to_string(), "56.8");
        assert_eq!(ScoreBound::Exclusive(-1.5).to_string(), "(-1.5");
    }

    #[test]
    fn test_bound_admission() {
        assert!(ScoreBound::Inclusive(19.0).admits_above(19.0));
        assert!(!ScoreBound::Exclusive(19.0).admits_above(19.0));
        assert!(ScoreBound::Exclusive(19.0).admits_above(19.5));
        assert!(ScoreBound::Inclusive(19.0).admits_below(19.0));
        assert!(!ScoreBound::Exclusive(19.0).admits_below(19.0));
        assert!(ScoreBound::NegInf.admits_above(f64::MIN));
        assert!(ScoreBound::PosInf.admits_below(f64::MAX));
        assert!(!ScoreBound::PosInf.admits_above(0.0));
    }
}
