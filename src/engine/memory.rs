//! In-process engine
//!
//! Interprets scripts against an in-memory keyspace with the command
//! semantics of the Redis backend: empty collections vanish, type mismatches
//! fail with `WRONGTYPE`, temporary keys are dropped whether or not the body
//! succeeded. A whole script runs under one write lock.
//!
//! Ordering is deterministic: sets iterate in insertion order, sorted sets
//! by score then member, and sort ties break on the element itself.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};

use super::{Backend, Reply};
use crate::error::{StoreError, StoreResult};
use crate::keys::{self, IndexKind};
use crate::script::{
    Command, Guard, Output, Script, ScoreBound, SortStage, Step, STATUS_CONFLICT,
    STATUS_NOT_FOUND, STATUS_OK,
};

#[derive(Debug, Clone)]
enum Entry {
    Hash(IndexMap<String, String>),
    Set(IndexSet<String>),
    Sorted(IndexMap<String, f64>),
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Transport(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
        key
    ))
}

/// Engine holding its keyspace in process memory
#[derive(Debug, Default)]
pub struct MemoryEngine {
    db: RwLock<Keyspace>,
}

impl MemoryEngine {
    /// Creates an engine with an empty keyspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys matching a glob pattern, in key order
    pub fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let db = self.db.read().map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(db.matching(pattern))
    }

    /// Members of a set or sorted set, in iteration order
    pub fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let db = self.db.read().map_err(|e| StoreError::Transport(e.to_string()))?;
        db.members(key)
    }

    /// Score of a sorted set member
    pub fn score(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let db = self.db.read().map_err(|e| StoreError::Transport(e.to_string()))?;
        match db.entries.get(key) {
            None => Ok(None),
            Some(Entry::Sorted(z)) => Ok(z.get(member).copied()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// A single hash field
    pub fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let db = self.db.read().map_err(|e| StoreError::Transport(e.to_string()))?;
        db.hget(key, field)
    }

    /// Runs one primitive write outside any script
    pub fn apply(&self, command: &Command) -> StoreResult<()> {
        let mut db = self.db.write().map_err(|e| StoreError::Transport(e.to_string()))?;
        db.command(command)
    }

    /// Runs a script synchronously
    pub fn run(&self, script: &Script) -> StoreResult<Reply> {
        let mut db = self.db.write().map_err(|e| StoreError::Transport(e.to_string()))?;
        let outcome = db.body(script);
        for key in &script.cleanup {
            db.entries.remove(key);
        }
        outcome
    }
}

#[async_trait]
impl Backend for MemoryEngine {
    async fn execute(&self, script: &Script) -> StoreResult<Reply> {
        self.run(script)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: BTreeMap<String, Entry>,
}

impl Keyspace {
    fn body(&mut self, script: &Script) -> StoreResult<Reply> {
        for guard in &script.guards {
            if let Some(status) = self.check(guard)? {
                return Ok(Reply::Bulk(status.to_string()));
            }
        }
        for step in &script.steps {
            self.step(step)?;
        }
        match &script.output {
            Output::Status => Ok(Reply::Bulk(STATUS_OK.to_string())),
            Output::Page(stage) => {
                let total = self.cardinality(&stage.source) as i64;
                let rows = self.sort(stage)?;
                Ok(Reply::Array(vec![Reply::Int(total), Reply::Array(rows)]))
            }
            Output::Purge { source, all_ids } => {
                let victims = self.members(source)?;
                for record in &victims {
                    self.entries.remove(record);
                    self.unindex(record)?;
                    self.srem(all_ids, std::slice::from_ref(record))?;
                }
                Ok(Reply::Int(victims.len() as i64))
            }
        }
    }

    fn check(&self, guard: &Guard) -> StoreResult<Option<&'static str>> {
        match guard {
            Guard::Absent { keys } => {
                if keys.iter().any(|k| self.entries.contains_key(k)) {
                    return Ok(Some(STATUS_CONFLICT));
                }
                Ok(None)
            }
            Guard::Matches {
                key,
                field,
                expected,
            } => match self.hget(key, field)? {
                None => Ok(Some(STATUS_NOT_FOUND)),
                Some(current) if &current != expected => Ok(Some(STATUS_CONFLICT)),
                Some(_) => Ok(None),
            },
        }
    }

    fn step(&mut self, step: &Step) -> StoreResult<()> {
        match step {
            Step::Exec(command) => self.command(command),
            Step::Unindex { record } => self.unindex(record),
            Step::CopySet { dest, source } => {
                let members = self.set_members(source)?;
                self.sadd(dest, &members)
            }
            Step::CopyRange {
                dest,
                source,
                min,
                max,
            } => {
                let members = self.range(source, min, max)?;
                self.sadd(dest, &members)
            }
            Step::CopySorted { dest, source } => {
                let copied = self.weighted(source)?;
                self.store_sorted(dest, copied);
                Ok(())
            }
            Step::RemoveRange { key, min, max } => {
                if let Some(entry) = self.entries.get_mut(key) {
                    let Entry::Sorted(z) = entry else {
                        return Err(wrong_type(key));
                    };
                    z.retain(|_, score| !(min.admits_above(*score) && max.admits_below(*score)));
                }
                self.drop_if_empty(key);
                Ok(())
            }
            Step::Intersect { dest, sources } => {
                let mut inputs = Vec::with_capacity(sources.len());
                for source in sources {
                    inputs.push(self.weighted(source)?);
                }
                let mut result = IndexMap::new();
                if let Some((first, rest)) = inputs.split_first() {
                    for (member, score) in first {
                        let mut total = *score;
                        let mut everywhere = true;
                        for other in rest {
                            match other.get(member) {
                                Some(s) => total += s,
                                None => {
                                    everywhere = false;
                                    break;
                                }
                            }
                        }
                        if everywhere {
                            result.insert(member.clone(), total);
                        }
                    }
                }
                self.store_sorted(dest, result);
                Ok(())
            }
            Step::Union { dest, sources } => {
                let mut result: IndexMap<String, f64> = IndexMap::new();
                for source in sources {
                    for (member, score) in self.weighted(source)? {
                        *result.entry(member).or_insert(0.0) += score;
                    }
                }
                self.store_sorted(dest, result);
                Ok(())
            }
            Step::UnionSets { dest, sources } => {
                let mut result = IndexSet::new();
                for source in sources {
                    result.extend(self.set_members(source)?);
                }
                self.store_set(dest, result);
                Ok(())
            }
            Step::UnionMatching { dest, pattern } => {
                for key in self.matching(pattern) {
                    if matches!(self.entries.get(&key), Some(Entry::Set(_))) {
                        let members = self.set_members(&key)?;
                        self.sadd(dest, &members)?;
                    }
                }
                Ok(())
            }
            Step::Difference {
                dest,
                base,
                subtract,
            } => {
                let mut result: IndexSet<String> = self.set_members(base)?.into_iter().collect();
                for key in subtract {
                    for member in self.set_members(key)? {
                        result.shift_remove(&member);
                    }
                }
                self.store_set(dest, result);
                Ok(())
            }
        }
    }

    fn command(&mut self, command: &Command) -> StoreResult<()> {
        match command {
            Command::HSet { key, fields } => {
                let entry = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::Hash(IndexMap::new()));
                let Entry::Hash(hash) = entry else {
                    return Err(wrong_type(key));
                };
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            Command::Del { keys } => {
                for key in keys {
                    self.entries.remove(key);
                }
                Ok(())
            }
            Command::SAdd { key, members } => self.sadd(key, members),
            Command::SRem { key, members } => self.srem(key, members),
            Command::ZAdd { key, score, member } => {
                let entry = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::Sorted(IndexMap::new()));
                let Entry::Sorted(z) = entry else {
                    return Err(wrong_type(key));
                };
                z.insert(member.clone(), *score);
                Ok(())
            }
            Command::ZRem { key, member } => {
                if let Some(entry) = self.entries.get_mut(key) {
                    let Entry::Sorted(z) = entry else {
                        return Err(wrong_type(key));
                    };
                    z.shift_remove(member);
                }
                self.drop_if_empty(key);
                Ok(())
            }
        }
    }

    /// Drops `record` from every index its auxiliary lists name, then the
    /// lists themselves
    fn unindex(&mut self, record: &str) -> StoreResult<()> {
        let zlist = keys::aux_list_key(record, IndexKind::Sorted);
        for index in self.set_members(&zlist)? {
            self.command(&Command::ZRem {
                key: index,
                member: record.to_string(),
            })?;
        }
        let slist = keys::aux_list_key(record, IndexKind::Discrete);
        for index in self.set_members(&slist)? {
            self.srem(&index, &[record.to_string()])?;
        }
        self.entries.remove(&zlist);
        self.entries.remove(&slist);
        Ok(())
    }

    fn sadd(&mut self, key: &str, members: &[String]) -> StoreResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(IndexSet::new()));
        let Entry::Set(set) = entry else {
            return Err(wrong_type(key));
        };
        set.extend(members.iter().cloned());
        Ok(())
    }

    fn srem(&mut self, key: &str, members: &[String]) -> StoreResult<()> {
        if let Some(entry) = self.entries.get_mut(key) {
            let Entry::Set(set) = entry else {
                return Err(wrong_type(key));
            };
            for member in members {
                set.shift_remove(member);
            }
        }
        self.drop_if_empty(key);
        Ok(())
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Sorted set members by score then member
    fn sorted(&self, key: &str) -> StoreResult<Vec<(String, f64)>> {
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Sorted(z)) => {
                let mut entries: Vec<(String, f64)> =
                    z.iter().map(|(m, s)| (m.clone(), *s)).collect();
                entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                Ok(entries)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Members with scores, plain set members scoring 1
    fn weighted(&self, key: &str) -> StoreResult<IndexMap<String, f64>> {
        match self.entries.get(key) {
            Some(Entry::Set(set)) => Ok(set.iter().map(|m| (m.clone(), 1.0)).collect()),
            _ => Ok(self.sorted(key)?.into_iter().collect()),
        }
    }

    fn range(&self, key: &str, min: &ScoreBound, max: &ScoreBound) -> StoreResult<Vec<String>> {
        Ok(self
            .sorted(key)?
            .into_iter()
            .filter(|(_, score)| min.admits_above(*score) && max.admits_below(*score))
            .map(|(member, _)| member)
            .collect())
    }

    /// Members of a set or sorted set; nothing for other types
    fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.entries.get(key) {
            Some(Entry::Set(_)) => self.set_members(key),
            Some(Entry::Sorted(_)) => Ok(self.sorted(key)?.into_iter().map(|(m, _)| m).collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn cardinality(&self, key: &str) -> usize {
        match self.entries.get(key) {
            Some(Entry::Set(set)) => set.len(),
            Some(Entry::Sorted(z)) => z.len(),
            _ => 0,
        }
    }

    fn store_set(&mut self, dest: &str, members: IndexSet<String>) {
        if members.is_empty() {
            self.entries.remove(dest);
        } else {
            self.entries.insert(dest.to_string(), Entry::Set(members));
        }
    }

    fn store_sorted(&mut self, dest: &str, members: IndexMap<String, f64>) {
        if members.is_empty() {
            self.entries.remove(dest);
        } else {
            self.entries.insert(dest.to_string(), Entry::Sorted(members));
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key) {
            Some(Entry::Hash(h)) => h.is_empty(),
            Some(Entry::Set(s)) => s.is_empty(),
            Some(Entry::Sorted(z)) => z.is_empty(),
            None => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    fn matching(&self, pattern: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|k| glob_match(pattern.as_bytes(), k.as_bytes()))
            .cloned()
            .collect()
    }

    /// Hash field read by a `*->field` pattern
    fn lookup(&self, key: &str, field: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(Entry::Hash(hash)) => hash.get(field).cloned(),
            _ => None,
        }
    }

    fn sort(&self, stage: &SortStage) -> StoreResult<Vec<Reply>> {
        let mut elements = match self.entries.get(&stage.source) {
            Some(Entry::Hash(_)) => return Err(wrong_type(&stage.source)),
            // Unordered sorts of a set come back lexicographic inside scripts.
            Some(Entry::Set(_)) if stage.by.is_none() => {
                let mut members = self.members(&stage.source)?;
                members.sort();
                members
            }
            _ => self.members(&stage.source)?,
        };

        if let Some(field) = &stage.by {
            let direction = |ord: Ordering| if stage.descending { ord.reverse() } else { ord };
            if stage.alpha {
                let mut keyed: Vec<(Option<String>, String)> = elements
                    .into_iter()
                    .map(|e| (self.lookup(&e, field), e))
                    .collect();
                keyed.sort_by(|a, b| direction(a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1))));
                elements = keyed.into_iter().map(|(_, e)| e).collect();
            } else {
                let mut keyed = Vec::with_capacity(elements.len());
                for element in elements {
                    let score = match self.lookup(&element, field) {
                        None => 0.0,
                        Some(text) => text.trim().parse::<f64>().map_err(|_| {
                            StoreError::Transport(
                                "ERR One or more scores can't be converted into double"
                                    .to_string(),
                            )
                        })?,
                    };
                    keyed.push((score, element));
                }
                keyed.sort_by(|a, b| direction(a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))));
                elements = keyed.into_iter().map(|(_, e)| e).collect();
            }
        }

        let start = stage.offset.min(elements.len());
        let end = match stage.limit {
            Some(limit) => start.saturating_add(limit).min(elements.len()),
            None => elements.len(),
        };

        let mut rows = Vec::with_capacity((end - start) * stage.get.len());
        for element in &elements[start..end] {
            for field in &stage.get {
                rows.push(match self.lookup(element, field) {
                    Some(value) => Reply::Bulk(value),
                    None => Reply::Nil,
                });
            }
        }
        Ok(rows)
    }
}

/// Glob matching with `*`, `?`, `[...]` classes and `\` escapes
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((b'[', rest)) => {
            let Some((&c, tail)) = text.split_first() else {
                return false;
            };
            match match_class(rest, c) {
                Some((true, after)) => glob_match(after, tail),
                _ => false,
            }
        }
        Some((b'\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && glob_match(&rest[1..], &text[1..])
        }
        Some((&p, rest)) => text.first() == Some(&p) && glob_match(rest, &text[1..]),
    }
}

/// Matches `c` against a class body following `[`, returning whether it
/// matched and the pattern after the closing `]`
fn match_class(mut pattern: &[u8], c: u8) -> Option<(bool, &[u8])> {
    let negate = pattern.first() == Some(&b'^');
    if negate {
        pattern = &pattern[1..];
    }
    let mut matched = false;
    let mut first = true;
    loop {
        match pattern {
            [] => return None,
            [b']', rest @ ..] if !first => return Some((matched != negate, rest)),
            [b'\\', x, rest @ ..] => {
                matched |= *x == c;
                pattern = rest;
            }
            [lo, b'-', hi, rest @ ..] if *hi != b']' => {
                let (lo, hi) = if lo <= hi { (*lo, *hi) } else { (*hi, *lo) };
                matched |= (lo..=hi).contains(&c);
                pattern = rest;
            }
            [x, rest @ ..] => {
                matched |= *x == c;
                pattern = rest;
            }
        }
        first = false;
    }
}
