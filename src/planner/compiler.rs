//! Predicate compiler
//!
//! Turns a predicate tree into script steps that leave the matching record
//! keys in a single result key.
//!
//! # Translation
//!
//! - Discrete fields read `E:F:<token>` sets; numeric fields read the `E:F`
//!   sorted set by score range
//! - And / Or become sorted-set intersection / union
//! - Every intermediate result is written to a fresh temporary key; index
//!   keys are only ever read
//!
//! Compilation is pure: nothing touches the remote engine until the
//! assembled script runs.

use tracing::debug;

use super::ast::Predicate;
use super::keygen::TempKeys;
use crate::error::{StoreError, StoreResult};
use crate::item::Value;
use crate::keys;
use crate::schema::{EntityIndexSpec, FieldClass};
use crate::script::{ScoreBound, Step};

/// Compiled predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Key holding the matching record keys once `steps` ran
    pub result: String,
    /// Steps computing `result`
    pub steps: Vec<Step>,
    /// Temporary keys the steps write to
    pub temp_keys: Vec<String>,
}

/// Compiles predicates of one entity
pub struct PredicateCompiler<'a> {
    spec: &'a EntityIndexSpec,
    keys: TempKeys,
    steps: Vec<Step>,
}

impl<'a> PredicateCompiler<'a> {
    /// Creates a compiler allocating temporary keys under `temp_prefix`
    pub fn new(spec: &'a EntityIndexSpec, temp_prefix: &str) -> Self {
        Self::with_keys(spec, TempKeys::new(temp_prefix, spec.entity()))
    }

    /// Creates a compiler using a caller-supplied key generator
    pub fn with_keys(spec: &'a EntityIndexSpec, keys: TempKeys) -> Self {
        Self {
            spec,
            keys,
            steps: Vec::new(),
        }
    }

    /// Compiles top-level predicates.
    ///
    /// Several predicates are combined with AND; none matches every item.
    pub fn compile(mut self, predicates: &[Predicate]) -> StoreResult<Fragment> {
        let result = match predicates {
            [single] => self.node(single)?,
            many => self.and(many)?,
        };

        debug!(
            event = "PREDICATE_COMPILED",
            entity = self.spec.entity(),
            steps = self.steps.len(),
            temp_keys = self.keys.allocated().len(),
        );

        Ok(Fragment {
            result,
            steps: self.steps,
            temp_keys: self.keys.into_keys(),
        })
    }

    fn node(&mut self, predicate: &Predicate) -> StoreResult<String> {
        match predicate {
            Predicate::And(children) => self.and(children),
            Predicate::Or(children) => self.or(children),
            Predicate::Equal(field, value) => self.equal(field, value),
            Predicate::NotEqual(field, value) => self.not_equal(field, value),
            Predicate::GreaterThan(field, value) => {
                self.range(predicate, field, value, ScoreBound::Exclusive, true)
            }
            Predicate::GreaterOrEqual(field, value) => {
                self.range(predicate, field, value, ScoreBound::Inclusive, true)
            }
            Predicate::LowerThan(field, value) => {
                self.range(predicate, field, value, ScoreBound::Exclusive, false)
            }
            Predicate::LowerOrEqual(field, value) => {
                self.range(predicate, field, value, ScoreBound::Inclusive, false)
            }
            Predicate::In(field, values) => self.is_in(field, values),
            Predicate::NotIn(field, values) => self.not_in(field, values),
        }
    }

    fn and(&mut self, children: &[Predicate]) -> StoreResult<String> {
        match children {
            [] => {
                let dest = self.keys.next_key();
                let source = self.all_ids();
                self.steps.push(Step::CopySet {
                    dest: dest.clone(),
                    source,
                });
                Ok(dest)
            }
            [single] => self.node(single),
            many => {
                let sources = many
                    .iter()
                    .map(|child| self.node(child))
                    .collect::<StoreResult<Vec<_>>>()?;
                let dest = self.keys.next_key();
                self.steps.push(Step::Intersect {
                    dest: dest.clone(),
                    sources,
                });
                Ok(dest)
            }
        }
    }

    fn or(&mut self, children: &[Predicate]) -> StoreResult<String> {
        match children {
            [] => Ok(self.keys.next_key()),
            [single] => self.node(single),
            many => {
                let sources = many
                    .iter()
                    .map(|child| self.node(child))
                    .collect::<StoreResult<Vec<_>>>()?;
                let dest = self.keys.next_key();
                self.steps.push(Step::Union {
                    dest: dest.clone(),
                    sources,
                });
                Ok(dest)
            }
        }
    }

    fn equal(&mut self, field: &str, value: &Value) -> StoreResult<String> {
        let dest = self.keys.next_key();
        match self.class(field)? {
            FieldClass::Numeric => {
                let score = score_of(field, value)?;
                let source = self.zset(field);
                self.steps.push(Step::CopyRange {
                    dest: dest.clone(),
                    source,
                    min: ScoreBound::Inclusive(score),
                    max: ScoreBound::Inclusive(score),
                });
            }
            FieldClass::Discrete => {
                let source = self.set(field, value)?;
                self.steps.push(Step::CopySet {
                    dest: dest.clone(),
                    source,
                });
            }
        }
        Ok(dest)
    }

    fn not_equal(&mut self, field: &str, value: &Value) -> StoreResult<String> {
        let dest = self.keys.next_key();
        match self.class(field)? {
            FieldClass::Numeric => {
                let score = score_of(field, value)?;
                let source = self.zset(field);
                self.steps.push(Step::CopySorted {
                    dest: dest.clone(),
                    source,
                });
                self.steps.push(Step::RemoveRange {
                    key: dest.clone(),
                    min: ScoreBound::Inclusive(score),
                    max: ScoreBound::Inclusive(score),
                });
            }
            FieldClass::Discrete => {
                let excluded = self.set(field, value)?;
                let base = self.all_ids();
                self.steps.push(Step::Difference {
                    dest: dest.clone(),
                    base,
                    subtract: vec![excluded],
                });
            }
        }
        Ok(dest)
    }

    fn range(
        &mut self,
        predicate: &Predicate,
        field: &str,
        value: &Value,
        bound: fn(f64) -> ScoreBound,
        lower: bool,
    ) -> StoreResult<String> {
        if self.class(field)? != FieldClass::Numeric {
            return Err(StoreError::not_implemented(format!(
                "'{}' on non-numeric field '{}'",
                predicate.op_name(),
                field
            )));
        }
        let score = score_of(field, value)?;
        let (min, max) = if lower {
            (bound(score), ScoreBound::PosInf)
        } else {
            (ScoreBound::NegInf, bound(score))
        };

        let dest = self.keys.next_key();
        let source = self.zset(field);
        self.steps.push(Step::CopyRange {
            dest: dest.clone(),
            source,
            min,
            max,
        });
        Ok(dest)
    }

    fn is_in(&mut self, field: &str, values: &[Value]) -> StoreResult<String> {
        let class = self.class(field)?;
        let dest = self.keys.next_key();
        if values.is_empty() {
            return Ok(dest);
        }

        match class {
            FieldClass::Numeric => {
                let source = self.zset(field);
                for score in distinct_scores(field, values)? {
                    self.steps.push(Step::CopyRange {
                        dest: dest.clone(),
                        source: source.clone(),
                        min: ScoreBound::Inclusive(score),
                        max: ScoreBound::Inclusive(score),
                    });
                }
            }
            FieldClass::Discrete => {
                let sources = values
                    .iter()
                    .map(|value| self.set(field, value))
                    .collect::<StoreResult<Vec<_>>>()?;
                self.steps.push(Step::UnionSets {
                    dest: dest.clone(),
                    sources,
                });
            }
        }
        Ok(dest)
    }

    fn not_in(&mut self, field: &str, values: &[Value]) -> StoreResult<String> {
        let class = self.class(field)?;
        let dest = self.keys.next_key();
        if values.is_empty() {
            let source = self.all_ids();
            self.steps.push(Step::CopySet {
                dest: dest.clone(),
                source,
            });
            return Ok(dest);
        }

        match class {
            FieldClass::Numeric => {
                let source = self.zset(field);
                let mut min = ScoreBound::NegInf;
                for score in distinct_scores(field, values)? {
                    self.steps.push(Step::CopyRange {
                        dest: dest.clone(),
                        source: source.clone(),
                        min,
                        max: ScoreBound::Exclusive(score),
                    });
                    min = ScoreBound::Exclusive(score);
                }
                self.steps.push(Step::CopyRange {
                    dest: dest.clone(),
                    source,
                    min,
                    max: ScoreBound::PosInf,
                });
            }
            FieldClass::Discrete => {
                let subtract = values
                    .iter()
                    .map(|value| self.set(field, value))
                    .collect::<StoreResult<Vec<_>>>()?;
                let universe = self.keys.next_key();
                let pattern = keys::field_pattern(self.spec.entity(), field);
                self.steps.push(Step::UnionMatching {
                    dest: universe.clone(),
                    pattern,
                });
                let kept = self.keys.next_key();
                self.steps.push(Step::Difference {
                    dest: kept.clone(),
                    base: universe,
                    subtract,
                });
                // The pattern also matches bookkeeping sets of items whose id
                // starts with the field name; only registered records count.
                let registered = self.all_ids();
                self.steps.push(Step::Intersect {
                    dest: dest.clone(),
                    sources: vec![kept, registered],
                });
            }
        }
        Ok(dest)
    }

    fn class(&self, field: &str) -> StoreResult<FieldClass> {
        if !self.spec.is_filterable(field) {
            return Err(StoreError::UnindexedField(field.to_string()));
        }
        Ok(self.spec.class_of(field))
    }

    fn set(&self, field: &str, value: &Value) -> StoreResult<String> {
        let token = value.index_token().ok_or_else(|| {
            StoreError::invalid_value(format!(
                "{} value cannot be matched on field '{}'",
                value.type_name(),
                field
            ))
        })?;
        Ok(keys::set_key(self.spec.entity(), field, &token))
    }

    fn zset(&self, field: &str) -> String {
        keys::zset_key(self.spec.entity(), field)
    }

    fn all_ids(&self) -> String {
        keys::all_ids_key(self.spec.entity())
    }
}

fn score_of(field: &str, value: &Value) -> StoreResult<f64> {
    value.score().ok_or_else(|| {
        StoreError::invalid_value(format!(
            "numeric field '{}' compared with a {} value",
            field,
            value.type_name()
        ))
    })
}

/// Scores of `values`, ascending and without duplicates
fn distinct_scores(field: &str, values: &[Value]) -> StoreResult<Vec<f64>> {
    let mut scores = values
        .iter()
        .map(|value| score_of(field, value))
        .collect::<StoreResult<Vec<_>>>()?;
    scores.sort_by(f64::total_cmp);
    scores.dedup();
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn spec() -> EntityIndexSpec {
        EntityIndexSpec::new("users")
            .with_field("name", FieldDef::string().filterable())
            .with_field("age", FieldDef::integer().filterable())
            .with_field("height", FieldDef::float())
            .with_field("meta", FieldDef::object().filterable())
    }

    fn compile(predicates: &[Predicate]) -> StoreResult<Fragment> {
        let spec = spec();
        let keys = TempKeys::with_invocation("tmp", "users", Uuid::nil());
        PredicateCompiler::with_keys(&spec, keys).compile(predicates)
    }

    fn tmp(n: usize) -> String {
        format!("tmp:users:00000000000000000000000000000000:{}", n)
    }

    #[test]
    fn test_empty_predicate_matches_all() {
        let fragment = compile(&[]).unwrap();
        assert_eq!(fragment.result, tmp(0));
        assert_eq!(
            fragment.steps,
            vec![Step::CopySet {
                dest: tmp(0),
                source: "users:ids".to_string(),
            }]
        );
        assert_eq!(fragment.temp_keys, vec![tmp(0)]);
    }

    #[test]
    fn test_numeric_equal_is_point_range() {
        let fragment = compile(&[Predicate::eq("age", 19)]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![Step::CopyRange {
                dest: tmp(0),
                source: "users:age".to_string(),
                min: ScoreBound::Inclusive(19.0),
                max: ScoreBound::Inclusive(19.0),
            }]
        );
    }

    #[test]
    fn test_discrete_equal_copies_set() {
        let fragment = compile(&[Predicate::eq("name", "Bob")]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![Step::CopySet {
                dest: tmp(0),
                source: "users:name:Bob".to_string(),
            }]
        );
    }

    #[test]
    fn test_id_equal_uses_identity_set() {
        let fragment = compile(&[Predicate::eq("id", "a")]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![Step::CopySet {
                dest: tmp(0),
                source: "users:id:a".to_string(),
            }]
        );
    }

    #[test]
    fn test_range_bounds() {
        let gt = compile(&[Predicate::gt("age", 19)]).unwrap();
        let gte = compile(&[Predicate::gte("age", 19)]).unwrap();
        let lt = compile(&[Predicate::lt("age", 19)]).unwrap();
        let lte = compile(&[Predicate::lte("age", 19)]).unwrap();

        let bounds = |f: &Fragment| match &f.steps[0] {
            Step::CopyRange { min, max, .. } => (*min, *max),
            other => panic!("unexpected step {:?}", other),
        };
        assert_eq!(bounds(&gt), (ScoreBound::Exclusive(19.0), ScoreBound::PosInf));
        assert_eq!(bounds(&gte), (ScoreBound::Inclusive(19.0), ScoreBound::PosInf));
        assert_eq!(bounds(&lt), (ScoreBound::NegInf, ScoreBound::Exclusive(19.0)));
        assert_eq!(bounds(&lte), (ScoreBound::NegInf, ScoreBound::Inclusive(19.0)));
    }

    #[test]
    fn test_range_on_discrete_not_implemented() {
        let err = compile(&[Predicate::gt("name", "Bob")]).unwrap_err();
        assert!(matches!(err, StoreError::NotImplemented(_)));
    }

    #[test]
    fn test_unindexed_field() {
        assert_eq!(
            compile(&[Predicate::eq("height", 155.3)]).unwrap_err(),
            StoreError::UnindexedField("height".to_string())
        );
        assert_eq!(
            compile(&[Predicate::eq("nope", 1)]).unwrap_err(),
            StoreError::UnindexedField("nope".to_string())
        );
    }

    #[test]
    fn test_object_value_rejected() {
        let value = Value::Object(Default::default());
        let err = compile(&[Predicate::Equal("meta".into(), value)]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
    }

    #[test]
    fn test_non_numeric_value_on_numeric_field() {
        let err = compile(&[Predicate::eq("age", "old")]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
        let mixed = Predicate::is_in("age", [Value::from(1), Value::from("x")]);
        let err = compile(&[mixed]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
    }

    #[test]
    fn test_top_level_list_is_conjunction() {
        let fragment = compile(&[Predicate::eq("age", 19), Predicate::eq("name", "Bob")]).unwrap();
        assert_eq!(fragment.result, tmp(2));
        assert_eq!(
            fragment.steps.last(),
            Some(&Step::Intersect {
                dest: tmp(2),
                sources: vec![tmp(0), tmp(1)],
            })
        );
        assert_eq!(fragment.temp_keys, vec![tmp(0), tmp(1), tmp(2)]);
    }

    #[test]
    fn test_single_child_passes_through() {
        let fragment = compile(&[Predicate::or([Predicate::and([Predicate::eq("age", 19)])])])
            .unwrap();
        assert_eq!(fragment.steps.len(), 1);
        assert_eq!(fragment.result, tmp(0));
    }

    #[test]
    fn test_or_unions() {
        let fragment = compile(&[Predicate::or([
            Predicate::eq("age", 19),
            Predicate::eq("age", 7),
        ])])
        .unwrap();
        assert_eq!(
            fragment.steps.last(),
            Some(&Step::Union {
                dest: tmp(2),
                sources: vec![tmp(0), tmp(1)],
            })
        );
    }

    #[test]
    fn test_empty_or_matches_nothing() {
        let fragment = compile(&[Predicate::or([])]).unwrap();
        assert!(fragment.steps.is_empty());
        assert_eq!(fragment.result, tmp(0));
    }

    #[test]
    fn test_numeric_not_equal() {
        let fragment = compile(&[Predicate::ne("age", 7)]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![
                Step::CopySorted {
                    dest: tmp(0),
                    source: "users:age".to_string(),
                },
                Step::RemoveRange {
                    key: tmp(0),
                    min: ScoreBound::Inclusive(7.0),
                    max: ScoreBound::Inclusive(7.0),
                },
            ]
        );
    }

    #[test]
    fn test_discrete_not_equal() {
        let fragment = compile(&[Predicate::ne("name", "Bob")]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![Step::Difference {
                dest: tmp(0),
                base: "users:ids".to_string(),
                subtract: vec!["users:name:Bob".to_string()],
            }]
        );
    }

    #[test]
    fn test_numeric_in_dedups_points() {
        let fragment = compile(&[Predicate::is_in("age", [19, 7, 19])]).unwrap();
        let points: Vec<_> = fragment
            .steps
            .iter()
            .map(|s| match s {
                Step::CopyRange { min, max, .. } => (*min, *max),
                other => panic!("unexpected step {:?}", other),
            })
            .collect();
        assert_eq!(
            points,
            vec![
                (ScoreBound::Inclusive(7.0), ScoreBound::Inclusive(7.0)),
                (ScoreBound::Inclusive(19.0), ScoreBound::Inclusive(19.0)),
            ]
        );
    }

    #[test]
    fn test_numeric_not_in_covers_gaps() {
        let fragment = compile(&[Predicate::not_in("age", [19, 7])]).unwrap();
        let gaps: Vec<_> = fragment
            .steps
            .iter()
            .map(|s| match s {
                Step::CopyRange { min, max, .. } => (*min, *max),
                other => panic!("unexpected step {:?}", other),
            })
            .collect();
        assert_eq!(
            gaps,
            vec![
                (ScoreBound::NegInf, ScoreBound::Exclusive(7.0)),
                (ScoreBound::Exclusive(7.0), ScoreBound::Exclusive(19.0)),
                (ScoreBound::Exclusive(19.0), ScoreBound::PosInf),
            ]
        );
    }

    #[test]
    fn test_discrete_in_and_not_in() {
        let fragment = compile(&[Predicate::is_in("name", ["Bob", "Linda"])]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![Step::UnionSets {
                dest: tmp(0),
                sources: vec!["users:name:Bob".to_string(), "users:name:Linda".to_string()],
            }]
        );

        let fragment = compile(&[Predicate::not_in("name", ["Bob"])]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![
                Step::UnionMatching {
                    dest: tmp(1),
                    pattern: "users:name:*".to_string(),
                },
                Step::Difference {
                    dest: tmp(2),
                    base: tmp(1),
                    subtract: vec!["users:name:Bob".to_string()],
                },
                Step::Intersect {
                    dest: tmp(0),
                    sources: vec![tmp(2), "users:ids".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_empty_membership_lists() {
        let none = compile(&[Predicate::is_in::<i64>("age", [])]).unwrap();
        assert!(none.steps.is_empty());

        let all = compile(&[Predicate::not_in::<i64>("age", [])]).unwrap();
        assert_eq!(
            all.steps,
            vec![Step::CopySet {
                dest: tmp(0),
                source: "users:ids".to_string(),
            }]
        );
    }

    #[test]
    fn test_errors_in_nested_children_propagate() {
        let err = compile(&[Predicate::and([
            Predicate::eq("age", 19),
            Predicate::or([Predicate::eq("height", 1.0)]),
        ])])
        .unwrap_err();
        assert_eq!(err, StoreError::UnindexedField("height".to_string()));
    }
}
