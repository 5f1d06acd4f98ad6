// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Decoded edge records.

use serde::{Deserialize, Serialize};

use crate::codec::{parse_id, Direction};
use crate::store::EdgeRow;

/// One stored row, decoded from its keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Partition scope.
    pub namespace: String,
    /// Origin node.
    pub from_node: String,
    /// Edge kind.
    pub entity: String,
    /// Row orientation; `None` for undirected.
    pub direction: Option<Direction>,
    /// Target node.
    pub to_node: String,
    /// Ranking score; smaller is closer.
    pub distance: f64,
    /// First write, ms since the Unix epoch.
    pub created_at: u64,
    /// Latest write, ms since the Unix epoch.
    pub updated_at: u64,
    /// Expiry stamp, Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl From<EdgeRow> for Edge {
    fn from(row: EdgeRow) -> Self {
        let parsed = parse_id(&row.id);
        Self {
            namespace: row.namespace,
            from_node: parsed.from_node,
            entity: parsed.entity,
            direction: parsed.direction,
            to_node: parsed.to_node,
            distance: row.distance,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ttl: row.ttl,
        }
    }
}

/// Both rows of one logical edge after a write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkedEdge {
    /// The `from -> to` row.
    pub forward: Edge,
    /// The `to -> from` row with inverted direction.
    pub mirror: Edge,
}

/// Rows removed by deleting one logical edge.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeletedEdge {
    /// The forward row, if it existed.
    pub forward: Option<Edge>,
    /// The mirror row, if it existed.
    pub mirror: Option<Edge>,
}
