// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reversible key encoding for edge identities.
//!
//! An edge `(namespace, from, entity, direction, to)` maps onto two strings:
//!
//! - the **id** (`from:entity:direction:to`), the primary sort key within a
//!   namespace partition;
//! - the **base** (`namespace:from:entity:direction`), the partition key of the
//!   distance index.
//!
//! Empty fields are dropped from the joined string rather than left as empty
//! segments, so a partial id (just `from`, or `from:entity`) doubles as a scan
//! prefix. A missing direction is either omitted or, when a fixed-width key is
//! required, written as the [`INDETERMINATE`] sentinel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Segment separator inside ids and bases.
pub const SEPARATOR: char = ':';

/// Placeholder written for a missing direction in fixed-width keys.
pub const INDETERMINATE: &str = "~";

/// Orientation of a stored row relative to its `from` node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The relation points at `from`.
    #[serde(rename = "IN")]
    In,
    /// The relation points away from `from`.
    #[serde(rename = "OUT")]
    Out,
}

impl Direction {
    /// Key segment for this direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }

    /// The direction of the mirror row.
    pub fn invert(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not `IN` or `OUT`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown direction `{0}` (expected IN or OUT)")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            other => Err(ParseDirectionError(other.to_owned())),
        }
    }
}

/// Mirror-row direction for an optional direction. Undirected stays undirected.
pub fn invert_direction(direction: Option<Direction>) -> Option<Direction> {
    direction.map(Direction::invert)
}

fn direction_segment(direction: Option<Direction>, indeterminate: bool) -> &'static str {
    match direction {
        Some(d) => d.as_str(),
        None if indeterminate => INDETERMINATE,
        None => "",
    }
}

fn join_compact(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(part);
    }
    out
}

/// Composes the primary sort key `from:entity:direction:to`.
///
/// With `indeterminate`, a missing direction is written as `~`; otherwise it
/// is omitted. Empty fields are skipped entirely.
pub fn compose_id(
    from_node: &str,
    entity: &str,
    direction: Option<Direction>,
    to_node: &str,
    indeterminate: bool,
) -> String {
    join_compact(&[
        from_node,
        entity,
        direction_segment(direction, indeterminate),
        to_node,
    ])
}

/// Composes the distance-index partition key `namespace:from:entity:direction`.
pub fn compose_base(
    namespace: &str,
    from_node: &str,
    entity: &str,
    direction: Option<Direction>,
    indeterminate: bool,
) -> String {
    join_compact(&[
        namespace,
        from_node,
        entity,
        direction_segment(direction, indeterminate),
    ])
}

/// Prefix selecting every row from `from_node`, optionally narrowed to one
/// entity and one direction.
///
/// The trailing separator keeps `a` from matching rows of a sibling node `ab`.
pub fn scan_prefix(from_node: &str, entity: Option<&str>, direction: Option<Direction>) -> String {
    let entity = entity.unwrap_or("");
    // A direction without an entity cannot be expressed positionally.
    let direction = if entity.is_empty() { None } else { direction };
    let mut prefix = compose_id(from_node, entity, direction, "", false);
    prefix.push(SEPARATOR);
    prefix
}

/// Decoded form of a sort key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ParsedId {
    /// Origin node.
    pub from_node: String,
    /// Edge kind.
    pub entity: String,
    /// Row direction; `None` for undirected (or legacy) rows.
    pub direction: Option<Direction>,
    /// Target node.
    pub to_node: String,
}

/// Decodes a sort key produced by [`compose_id`].
///
/// The third segment is the direction when it is `IN`, `OUT` or `~`. Any other
/// value is read as the target node of a legacy three-segment id, and the
/// direction is `None`.
pub fn parse_id(id: &str) -> ParsedId {
    let mut parts = id.splitn(4, SEPARATOR);
    let from_node = parts.next().unwrap_or_default().to_owned();
    let entity = parts.next().unwrap_or_default().to_owned();
    let third = parts.next().unwrap_or_default();
    let fourth = parts.next().unwrap_or_default();

    let (direction, to_node) = match third {
        INDETERMINATE => (None, fourth.to_owned()),
        other => match other.parse::<Direction>() {
            Ok(direction) => (Some(direction), fourth.to_owned()),
            Err(_) => (None, other.to_owned()),
        },
    };

    ParsedId {
        from_node,
        entity,
        direction,
        to_node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn id_drops_empty_fields() {
        assert_eq!(compose_id("a", "", None, "", false), "a");
        assert_eq!(compose_id("a", "likes", None, "", false), "a:likes");
        assert_eq!(compose_id("a", "likes", None, "b", false), "a:likes:b");
        assert_eq!(compose_id("a", "likes", None, "b", true), "a:likes:~:b");
        assert_eq!(
            compose_id("a", "likes", Some(Direction::Out), "b", false),
            "a:likes:OUT:b"
        );
    }

    #[test]
    fn base_uses_sentinel_only_when_indeterminate() {
        assert_eq!(compose_base("ns", "a", "likes", None, false), "ns:a:likes");
        assert_eq!(compose_base("ns", "a", "likes", None, true), "ns:a:likes:~");
        assert_eq!(
            compose_base("ns", "a", "likes", Some(Direction::In), true),
            "ns:a:likes:IN"
        );
    }

    #[test]
    fn legacy_three_segment_id_reads_third_field_as_target() {
        let parsed = parse_id("a:likes:b");
        assert_eq!(parsed.from_node, "a");
        assert_eq!(parsed.entity, "likes");
        assert_eq!(parsed.direction, None);
        assert_eq!(parsed.to_node, "b");
    }

    #[test]
    fn sentinel_parses_as_undirected() {
        let parsed = parse_id("a:likes:~:b");
        assert_eq!(parsed.direction, None);
        assert_eq!(parsed.to_node, "b");
    }

    #[test]
    fn scan_prefix_is_terminated() {
        assert_eq!(scan_prefix("a", None, None), "a:");
        assert_eq!(scan_prefix("a", Some("likes"), None), "a:likes:");
        assert_eq!(
            scan_prefix("a", Some("likes"), Some(Direction::Out)),
            "a:likes:OUT:"
        );
        assert_eq!(scan_prefix("a", None, Some(Direction::Out)), "a:");
    }

    #[test]
    fn invert_is_an_involution() {
        assert_eq!(Direction::In.invert(), Direction::Out);
        assert_eq!(Direction::Out.invert().invert(), Direction::Out);
        assert_eq!(invert_direction(None), None);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.-]{1,12}".prop_filter("reserved direction literal", |s| {
            s != "IN" && s != "OUT"
        })
    }

    fn direction() -> impl Strategy<Value = Option<Direction>> {
        prop_oneof![Just(None), Just(Some(Direction::In)), Just(Some(Direction::Out))]
    }

    proptest! {
        #[test]
        fn compose_then_parse_round_trips(
            from in segment(),
            entity in segment(),
            dir in direction(),
            to in segment(),
            indeterminate in any::<bool>(),
        ) {
            let parsed = parse_id(&compose_id(&from, &entity, dir, &to, indeterminate));
            prop_assert_eq!(parsed, ParsedId {
                from_node: from,
                entity,
                direction: dir,
                to_node: to,
            });
        }
    }
}
