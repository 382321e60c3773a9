//! Parsing of `scontrol show <unit>` output.
//!
//! `scontrol` prints one entity per block, each block opening with `JobId=<id>` or
//! `<Unit>Name=<name>` followed by whitespace separated `key=value` tokens.  A value is either
//! a plain scalar, a comma separated list, or a comma separated list of `key=value` pairs.
//! Anything containing `[` is kept verbatim so node ranges like `gpu[01-04,07]` survive.
use crate::*;
use serde::Serialize;
use std::hash::Hash;
use std::process::Command;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Job,
    Partition,
    Node,
}

impl EntityKind {
    pub const fn unit(self) -> &'static str {
        use EntityKind::*;
        match self {
            Job => "Job",
            Partition => "Partition",
            Node => "Node",
        }
    }

    /// Token prefix which opens a new entity block.
    pub const fn delimiter(self) -> &'static str {
        use EntityKind::*;
        match self {
            Job => "JobId=",
            Partition => "PartitionName=",
            Node => "NodeName=",
        }
    }

    const fn scontrol_arg(self) -> &'static str {
        use EntityKind::*;
        match self {
            Job => "job",
            Partition => "partition",
            Node => "node",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A bare token with no `=`
    Null,
    Scalar(String),
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

impl Value {
    pub fn parse(v: &str) -> Self {
        if !v.contains(',') || v.contains('[') {
            Value::Scalar(v.to_string())
        } else if v.contains('=') {
            Value::Map(
                v.split(',')
                    .map(|pair| match pair.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect(),
            )
        } else {
            Value::List(v.split(',').map(String::from).collect())
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Look up `key` in a key-value valued field.
    ///
    /// A map with a single entry has no comma, so it is parsed as a scalar `key=value`; that
    /// form is accepted here too.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        match self {
            Value::Map(m) => m.get(key).map(String::as_str),
            Value::Scalar(s) => match s.split_once('=') {
                Some((k, v)) if k == key => Some(v),
                _ => None,
            },
            Value::Null | Value::List(_) => None,
        }
    }
}

/// The fields of a single entity, in the order `scontrol` printed them.
pub type EntityRecord = IndexMap<String, Value>;

/// Key type of a parsed entity: numeric for jobs, the name for everything else.
pub trait EntityId: Sized + Hash + Eq {
    fn parse_id(s: &str) -> ParseResult<Self>;
}

impl EntityId for JobId {
    fn parse_id(s: &str) -> ParseResult<Self> {
        s.parse().map_err(|_| ParseError::EntityId(s.to_string()))
    }
}

impl EntityId for String {
    fn parse_id(s: &str) -> ParseResult<Self> {
        if s.is_empty() {
            Err(ParseError::EntityId(s.to_string()))
        } else {
            Ok(s.to_string())
        }
    }
}

fn parse_record<'a>(tokens: impl IntoIterator<Item = &'a str>) -> EntityRecord {
    tokens
        .into_iter()
        .map(|t| match t.split_once('=') {
            Some((k, v)) => (k.to_string(), Value::parse(v)),
            None => (t.to_string(), Value::Null),
        })
        .collect()
}

/// Split a dump into `(id, field tokens)` blocks.  A block opens at any token that starts with
/// the delimiter, so fields such as `ArrayJobId=` never open one.  Tokens before the first
/// delimiter are dropped.
fn split_blocks<'a>(text: &'a str, delimiter: &str) -> Vec<(&'a str, Vec<&'a str>)> {
    let mut blocks: Vec<(&str, Vec<&str>)> = Vec::new();
    for token in text.split_whitespace() {
        if let Some(id) = token.strip_prefix(delimiter) {
            blocks.push((id, Vec::new()));
        } else if let Some((_, fields)) = blocks.last_mut() {
            fields.push(token);
        }
    }
    blocks
}

/// Parse the output of `scontrol show <kind>`.  Blocks whose id does not parse are skipped.
pub fn parse_entities<K: EntityId>(text: &str, kind: EntityKind) -> IndexMap<K, EntityRecord> {
    let mut entities = IndexMap::default();
    for (id, fields) in split_blocks(text, kind.delimiter()) {
        match K::parse_id(id) {
            Ok(id) => {
                entities.insert(id, parse_record(fields));
            }
            Err(e) => tracing::warn!(unit = kind.unit(), "skipping entity: {}", e),
        }
    }
    tracing::debug!(unit = kind.unit(), count = entities.len(), "parsed scontrol output");
    entities
}

/// Run `scontrol show <kind>` and return its output.
pub fn scontrol_show(kind: EntityKind) -> Result<String> {
    let out = Command::new("scontrol")
        .args(&["show", kind.scontrol_arg()])
        .output()
        .context("failed to spawn scontrol")?;

    if out.status.success() {
        Ok(String::from_utf8(out.stdout)?)
    } else {
        bail!(
            "scontrol show {} failed with status: {}\n{}",
            kind.scontrol_arg(),
            out.status,
            String::from_utf8_lossy(&out.stderr)
        )
    }
}
