//! Lua rendering
//!
//! Renders a [`Script`] into one Lua program for server-side evaluation.
//!
//! # Layout
//!
//! - Prelude of helper functions
//! - `body()`: guards, steps, output
//! - `body()` runs under `pcall`; temporary keys are deleted whether it
//!   succeeded or not, then any error is re-raised
//!
//! Temporary keys are passed as `ARGV` rather than inlined, so two
//! invocations of the same query render the same source and share one
//! cached script on the server.
//!
//! Lua caps the registers a single call may use, so long argument lists are
//! split into several calls with the same effect.

use std::collections::HashMap;

use super::step::{
    Command, Guard, Output, Script, ScoreBound, SortStage, Step, STATUS_CONFLICT,
    STATUS_NOT_FOUND, STATUS_OK,
};
use crate::keys::{AUX_SET_LIST_SUFFIX, AUX_ZSET_LIST_SUFFIX};

/// Arguments per rendered call
const MAX_CALL_ARGS: usize = 200;

/// A rendered program and its `ARGV`
#[derive(Debug, Clone, PartialEq)]
pub struct LuaScript {
    /// Program text
    pub source: String,
    /// Values bound to `ARGV[1..]`
    pub args: Vec<String>,
}

const PRELUDE: &str = r#"local function sadd_all(dest, members)
  for i = 1, #members, 1000 do
    redis.call('SADD', dest, unpack(members, i, math.min(i + 999, #members)))
  end
end
local function del_all(keys)
  for i = 1, #keys, 1000 do
    redis.call('DEL', unpack(keys, i, math.min(i + 999, #keys)))
  end
end
local function key_type(key)
  return redis.call('TYPE', key).ok
end
local function copy_set(dest, source)
  sadd_all(dest, redis.call('SMEMBERS', source))
end
local function copy_range(dest, source, min, max)
  sadd_all(dest, redis.call('ZRANGEBYSCORE', source, min, max))
end
local function union_matching(dest, pattern)
  for _, key in ipairs(redis.call('KEYS', pattern)) do
    if key_type(key) == 'set' then
      copy_set(dest, key)
    end
  end
end
local function members(key)
  local t = key_type(key)
  if t == 'zset' then
    return redis.call('ZRANGE', key, 0, -1)
  elseif t == 'set' then
    return redis.call('SMEMBERS', key)
  end
  return {}
end
local function cardinality(key)
  local t = key_type(key)
  if t == 'zset' then
    return redis.call('ZCARD', key)
  elseif t == 'set' then
    return redis.call('SCARD', key)
  end
  return 0
end
local function unindex(record)
  local zlist = record .. '__ZLIST__'
  for _, index in ipairs(redis.call('SMEMBERS', zlist)) do
    redis.call('ZREM', index, record)
  end
  local slist = record .. '__SLIST__'
  for _, index in ipairs(redis.call('SMEMBERS', slist)) do
    redis.call('SREM', index, record)
  end
  redis.call('DEL', zlist, slist)
end
local function purge(source, all_ids)
  local victims = members(source)
  for _, record in ipairs(victims) do
    redis.call('DEL', record)
    unindex(record)
    redis.call('SREM', all_ids, record)
  end
  return #victims
end
"#;

const EPILOGUE: &str = r#"if not ok then
  if type(result) == 'table' and result.err then
    return redis.error_reply(result.err)
  end
  return redis.error_reply(tostring(result))
end
return result
"#;

/// Renders a script
pub fn render(script: &Script) -> LuaScript {
    let mut renderer = Renderer::new(&script.cleanup);

    let prelude = PRELUDE
        .replace("__ZLIST__", AUX_ZSET_LIST_SUFFIX)
        .replace("__SLIST__", AUX_SET_LIST_SUFFIX);
    renderer.out.push_str(&prelude);
    renderer.line("local function body()");
    for guard in &script.guards {
        renderer.guard(guard);
    }
    for step in &script.steps {
        renderer.step(step);
    }
    renderer.output(&script.output);
    renderer.line("end");
    renderer.line("local ok, result = pcall(body)");
    if !script.cleanup.is_empty() {
        renderer.line("del_all(ARGV)");
    }
    renderer.out.push_str(EPILOGUE);

    LuaScript {
        source: renderer.out,
        args: script.cleanup.clone(),
    }
}

/// Quotes a string as a single-quoted Lua literal
pub fn lua_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

struct Renderer {
    out: String,
    argv: HashMap<String, usize>,
}

impl Renderer {
    fn new(temp_keys: &[String]) -> Self {
        let argv = temp_keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i + 1))
            .collect();
        Self {
            out: String::new(),
            argv,
        }
    }

    fn line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    /// A string argument: an `ARGV` slot for temporary keys, else a literal
    fn arg(&self, s: &str) -> String {
        match self.argv.get(s) {
            Some(i) => format!("ARGV[{}]", i),
            None => lua_quote(s),
        }
    }

    fn args<'s>(&self, items: impl IntoIterator<Item = &'s String>) -> String {
        items
            .into_iter()
            .map(|s| self.arg(s))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bound(&self, bound: &ScoreBound) -> String {
        lua_quote(&bound.to_string())
    }

    fn call(&mut self, args: &str) {
        let line = format!("  redis.call({})", args);
        self.line(&line);
    }

    fn guard(&mut self, guard: &Guard) {
        match guard {
            Guard::Absent { keys } => {
                for chunk in keys.chunks(MAX_CALL_ARGS) {
                    let line = format!(
                        "  if redis.call('EXISTS', {}) > 0 then return '{}' end",
                        self.args(chunk),
                        STATUS_CONFLICT
                    );
                    self.line(&line);
                }
            }
            Guard::Matches {
                key,
                field,
                expected,
            } => {
                let lines = [
                    "  do".to_string(),
                    format!(
                        "    local current = redis.call('HGET', {}, {})",
                        self.arg(key),
                        self.arg(field)
                    ),
                    format!("    if not current then return '{}' end", STATUS_NOT_FOUND),
                    format!(
                        "    if current ~= {} then return '{}' end",
                        self.arg(expected),
                        STATUS_CONFLICT
                    ),
                    "  end".to_string(),
                ];
                for line in &lines {
                    self.line(line);
                }
            }
        }
    }

    fn command(&mut self, command: &Command) {
        match command {
            Command::HSet { key, fields } => {
                for chunk in fields.chunks(MAX_CALL_ARGS / 2) {
                    let pairs = chunk
                        .iter()
                        .map(|(f, v)| format!("{}, {}", self.arg(f), self.arg(v)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let args = format!("'HMSET', {}, {}", self.arg(key), pairs);
                    self.call(&args);
                }
            }
            Command::Del { keys } => {
                for chunk in keys.chunks(MAX_CALL_ARGS) {
                    let args = format!("'DEL', {}", self.args(chunk));
                    self.call(&args);
                }
            }
            Command::SAdd { key, members } => self.members("SADD", key, members),
            Command::SRem { key, members } => self.members("SREM", key, members),
            Command::ZAdd { key, score, member } => {
                let args = format!(
                    "'ZADD', {}, {}, {}",
                    self.arg(key),
                    lua_quote(&score.to_string()),
                    self.arg(member)
                );
                self.call(&args);
            }
            Command::ZRem { key, member } => {
                let args = format!("'ZREM', {}, {}", self.arg(key), self.arg(member));
                self.call(&args);
            }
        }
    }

    fn members(&mut self, cmd: &str, key: &str, members: &[String]) {
        for chunk in members.chunks(MAX_CALL_ARGS) {
            let args = format!("'{}', {}, {}", cmd, self.arg(key), self.args(chunk));
            self.call(&args);
        }
    }

    /// `CMD dest numkeys sources...`, folding long source lists into `dest`
    fn store_numkeys(&mut self, cmd: &str, dest: &str, sources: &[String]) {
        for (i, chunk) in sources.chunks(MAX_CALL_ARGS).enumerate() {
            let args = if i == 0 {
                format!(
                    "'{}', {}, {}, {}",
                    cmd,
                    self.arg(dest),
                    chunk.len(),
                    self.args(chunk)
                )
            } else {
                format!(
                    "'{}', {}, {}, {}, {}",
                    cmd,
                    self.arg(dest),
                    chunk.len() + 1,
                    self.arg(dest),
                    self.args(chunk)
                )
            };
            self.call(&args);
        }
    }

    fn step(&mut self, step: &Step) {
        match step {
            Step::Exec(command) => self.command(command),
            Step::Unindex { record } => {
                let line = format!("  unindex({})", self.arg(record));
                self.line(&line);
            }
            Step::CopySet { dest, source } => {
                let line = format!("  copy_set({}, {})", self.arg(dest), self.arg(source));
                self.line(&line);
            }
            Step::CopyRange {
                dest,
                source,
                min,
                max,
            } => {
                let line = format!(
                    "  copy_range({}, {}, {}, {})",
                    self.arg(dest),
                    self.arg(source),
                    self.bound(min),
                    self.bound(max)
                );
                self.line(&line);
            }
            Step::CopySorted { dest, source } => {
                let args = format!(
                    "'ZUNIONSTORE', {}, 1, {}",
                    self.arg(dest),
                    self.arg(source)
                );
                self.call(&args);
            }
            Step::RemoveRange { key, min, max } => {
                let args = format!(
                    "'ZREMRANGEBYSCORE', {}, {}, {}",
                    self.arg(key),
                    self.bound(min),
                    self.bound(max)
                );
                self.call(&args);
            }
            Step::Intersect { dest, sources } => {
                self.store_numkeys("ZINTERSTORE", dest, sources)
            }
            Step::Union { dest, sources } => self.store_numkeys("ZUNIONSTORE", dest, sources),
            Step::UnionSets { dest, sources } => {
                for (i, chunk) in sources.chunks(MAX_CALL_ARGS).enumerate() {
                    let args = if i == 0 {
                        format!("'SUNIONSTORE', {}, {}", self.arg(dest), self.args(chunk))
                    } else {
                        format!(
                            "'SUNIONSTORE', {}, {}, {}",
                            self.arg(dest),
                            self.arg(dest),
                            self.args(chunk)
                        )
                    };
                    self.call(&args);
                }
            }
            Step::UnionMatching { dest, pattern } => {
                let line = format!(
                    "  union_matching({}, {})",
                    self.arg(dest),
                    self.arg(pattern)
                );
                self.line(&line);
            }
            Step::Difference {
                dest,
                base,
                subtract,
            } => {
                if subtract.is_empty() {
                    let line = format!("  copy_set({}, {})", self.arg(dest), self.arg(base));
                    self.line(&line);
                }
                for (i, chunk) in subtract.chunks(MAX_CALL_ARGS).enumerate() {
                    let from = if i == 0 { base } else { dest };
                    let args = format!(
                        "'SDIFFSTORE', {}, {}, {}",
                        self.arg(dest),
                        self.arg(from),
                        self.args(chunk)
                    );
                    self.call(&args);
                }
            }
        }
    }

    fn output(&mut self, output: &Output) {
        match output {
            Output::Status => {
                let line = format!("  return '{}'", STATUS_OK);
                self.line(&line);
            }
            Output::Page(stage) => self.page(stage),
            Output::Purge { source, all_ids } => {
                let line = format!(
                    "  return purge({}, {})",
                    self.arg(source),
                    self.arg(all_ids)
                );
                self.line(&line);
            }
        }
    }

    fn page(&mut self, stage: &SortStage) {
        let mut args = vec!["'SORT'".to_string(), self.arg(&stage.source)];
        match &stage.by {
            Some(field) => {
                args.push("'BY'".to_string());
                args.push(lua_quote(&format!("*->{}", field)));
                if stage.alpha {
                    args.push("'ALPHA'".to_string());
                }
                args.push(if stage.descending { "'DESC'" } else { "'ASC'" }.to_string());
            }
            None => {
                args.push("'BY'".to_string());
                args.push("'nosort'".to_string());
            }
        }
        for field in &stage.get {
            args.push("'GET'".to_string());
            args.push(lua_quote(&format!("*->{}", field)));
        }
        args.push("'LIMIT'".to_string());
        args.push(stage.offset.to_string());
        args.push(match stage.limit {
            Some(limit) => limit.to_string(),
            None => "-1".to_string(),
        });

        let total = format!("  local total = cardinality({})", self.arg(&stage.source));
        self.line(&total);
        let rows = format!("  local rows = redis.call({})", args.join(", "));
        self.line(&rows);
        self.line("  return {total, rows}");
    }
}
