//! Decoding of a raw query string into a nested tree.
//!
//! Keys use bracket notation: `filter[age][$gte]=18` becomes
//! `filter -> age -> $gte -> "18"`. Empty brackets append to a list and small
//! numeric brackets address list positions. Nesting is clamped to
//! [`QueryConfig::max_depth`]; the unparsed remainder of a deeper key is kept
//! as one literal segment (`[e][f]`), which no field validator accepts.

use url::form_urlencoded;

use crate::config::QueryConfig;
use crate::errors::QueryError;

/// One node of a decoded query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Scalar(String),
    List(Vec<QueryValue>),
    /// Entries in first-seen order.
    Map(Vec<(String, QueryValue)>),
}

impl QueryValue {
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Look up a key of a map node.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Scalars of a scalar or a flat list; `None` for anything nested.
    #[must_use]
    pub fn scalars(&self) -> Option<Vec<&str>> {
        match self {
            Self::Scalar(value) => Some(vec![value.as_str()]),
            Self::List(items) => items.iter().map(QueryValue::as_scalar).collect(),
            Self::Map(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Name(String),
    Index(usize),
}

enum Node {
    Leaf(String),
    Branch(Vec<(Slot, Node)>),
}

/// Parse a raw (still percent-encoded) query string.
///
/// # Errors
///
/// Fails on values longer than `max_value_length`, on keys that are both a
/// value and a container, and on over-deep keys when `strict_depth` is set.
pub fn parse_query_string(raw: &str, config: &QueryConfig) -> Result<QueryValue, QueryError> {
    let mut root: Vec<(Slot, Node)> = Vec::new();

    for (key, value) in form_urlencoded::parse(raw.as_bytes()).take(config.max_parameters) {
        if key.is_empty() {
            continue;
        }
        if value.chars().count() > config.max_value_length {
            return Err(QueryError::ValueTooLong {
                field: key.into_owned(),
                max: config.max_value_length,
            });
        }
        let segments = split_key(&key, config)?;
        insert(&mut root, &segments, value.into_owned(), &key)?;
    }

    Ok(QueryValue::Map(
        root.into_iter()
            .map(|(slot, node)| (slot_name(slot), compact(node)))
            .collect(),
    ))
}

fn bracket_segment(content: &str, config: &QueryConfig) -> Segment {
    if content.is_empty() {
        return Segment::Push;
    }
    let canonical = content == "0" || !content.starts_with('0');
    if canonical
        && content.bytes().all(|b| b.is_ascii_digit())
        && let Ok(index) = content.parse::<usize>()
        && index <= config.array_limit
    {
        return Segment::Index(index);
    }
    Segment::Key(content.to_string())
}

fn split_key(key: &str, config: &QueryConfig) -> Result<Vec<Segment>, QueryError> {
    let Some(open) = key.find('[') else {
        return Ok(vec![Segment::Key(key.to_string())]);
    };
    if open == 0 {
        return Ok(vec![Segment::Key(key.to_string())]);
    }

    let mut segments = vec![Segment::Key(key[..open].to_string())];
    let mut rest = &key[open..];
    let mut depth = 0;

    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            break;
        };
        if depth == config.max_depth {
            if config.strict_depth {
                return Err(QueryError::TooDeep {
                    key: key.to_string(),
                    max_depth: config.max_depth,
                });
            }
            break;
        }
        segments.push(bracket_segment(&inner[..close], config));
        rest = &inner[close + 1..];
        depth += 1;
    }

    if !rest.is_empty() {
        if depth == 0 {
            return Ok(vec![Segment::Key(key.to_string())]);
        }
        segments.push(Segment::Key(rest.to_string()));
    }
    Ok(segments)
}

fn next_index(entries: &[(Slot, Node)]) -> usize {
    entries
        .iter()
        .filter_map(|(slot, _)| match slot {
            Slot::Index(i) => Some(i + 1),
            Slot::Name(_) => None,
        })
        .max()
        .unwrap_or(0)
}

fn is_list_like(entries: &[(Slot, Node)]) -> bool {
    entries.iter().all(|(slot, _)| matches!(slot, Slot::Index(_)))
}

fn insert(
    entries: &mut Vec<(Slot, Node)>,
    segments: &[Segment],
    value: String,
    key: &str,
) -> Result<(), QueryError> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(());
    };
    let slot = match first {
        Segment::Key(name) => Slot::Name(name.clone()),
        Segment::Index(index) => Slot::Index(*index),
        Segment::Push => Slot::Index(next_index(entries)),
    };
    let conflict = || QueryError::ConflictingShape {
        key: key.to_string(),
    };

    let position = entries.iter().position(|(existing, _)| *existing == slot);

    if rest.is_empty() {
        match position {
            None => entries.push((slot, Node::Leaf(value))),
            Some(i) => {
                let node = &mut entries[i].1;
                match node {
                    Node::Leaf(previous) => {
                        let previous = std::mem::take(previous);
                        *node = Node::Branch(vec![
                            (Slot::Index(0), Node::Leaf(previous)),
                            (Slot::Index(1), Node::Leaf(value)),
                        ]);
                    }
                    Node::Branch(children) if is_list_like(children) => {
                        let index = next_index(children);
                        children.push((Slot::Index(index), Node::Leaf(value)));
                    }
                    Node::Branch(_) => return Err(conflict()),
                }
            }
        }
        return Ok(());
    }

    let index = if let Some(i) = position {
        i
    } else {
        entries.push((slot, Node::Branch(Vec::new())));
        entries.len() - 1
    };
    match &mut entries[index].1 {
        Node::Branch(children) => insert(children, rest, value, key),
        Node::Leaf(_) => Err(conflict()),
    }
}

fn slot_name(slot: Slot) -> String {
    match slot {
        Slot::Name(name) => name,
        Slot::Index(index) => index.to_string(),
    }
}

fn compact(node: Node) -> QueryValue {
    match node {
        Node::Leaf(value) => QueryValue::Scalar(value),
        Node::Branch(mut children) => {
            if !children.is_empty() && is_list_like(&children) {
                children.sort_by_key(|(slot, _)| match slot {
                    Slot::Index(i) => *i,
                    Slot::Name(_) => usize::MAX,
                });
                QueryValue::List(children.into_iter().map(|(_, n)| compact(n)).collect())
            } else {
                QueryValue::Map(
                    children
                        .into_iter()
                        .map(|(slot, n)| (slot_name(slot), compact(n)))
                        .collect(),
                )
            }
        }
    }
}
