// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed requests for every graph operation.
//!
//! Each request is a plain struct with defaults applied at construction and a
//! `validate` method run before any store access. Loosely typed input (JSON
//! lines, stream items) enters through [`LinkInput`], whose unknown fields
//! are ignored and whose missing fields take defaults.

use serde::{Deserialize, Serialize};

use crate::codec::{Direction, INDETERMINATE, SEPARATOR};
use crate::error::ValidationError;
use crate::settings::DEFAULT_ENTITY;
use crate::store::{DistanceRange, DEFAULT_DISTANCE};

/// Rejects empty strings, the key separator and the direction sentinel.
pub fn check_key_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    if value.contains(SEPARATOR) {
        return Err(ValidationError::new(
            field,
            format!("must not contain `{SEPARATOR}`"),
        ));
    }
    if value == INDETERMINATE {
        return Err(ValidationError::new(
            field,
            format!("`{INDETERMINATE}` is reserved"),
        ));
    }
    Ok(())
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new(field, "must be a finite number"))
    }
}

fn check_decrement(value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ValidationError::new(
            "decrement_path",
            "must be a finite, non-negative number",
        )),
        _ => Ok(()),
    }
}

/// Create or strengthen one logical edge (both rows).
#[derive(Clone, Debug, PartialEq)]
pub struct LinkRequest {
    /// Partition scope.
    pub namespace: String,
    /// Origin node.
    pub from_node: String,
    /// Target node.
    pub to_node: String,
    /// Edge kind.
    pub entity: String,
    /// Orientation; `None` for undirected.
    pub direction: Option<Direction>,
    /// Association weight scaled by the decay step. Defaults to `1.0`.
    pub distance: f64,
    /// Hard-set distance; bypasses decay when present.
    pub absolute_distance: Option<f64>,
    /// Per-request decay step; falls back to the configured one.
    pub decrement_path: Option<f64>,
}

impl LinkRequest {
    /// Undirected link of the default entity with the default weight.
    pub fn new(
        namespace: impl Into<String>,
        from_node: impl Into<String>,
        to_node: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            from_node: from_node.into(),
            to_node: to_node.into(),
            entity: DEFAULT_ENTITY.to_owned(),
            direction: None,
            distance: DEFAULT_DISTANCE,
            absolute_distance: None,
            decrement_path: None,
        }
    }

    /// Sets the entity.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Sets the direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets the association weight.
    pub fn distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    /// Sets a hard distance.
    pub fn absolute_distance(mut self, distance: f64) -> Self {
        self.absolute_distance = Some(distance);
        self
    }

    /// Sets the decay step.
    pub fn decrement_path(mut self, step: f64) -> Self {
        self.decrement_path = Some(step);
        self
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_key_field("namespace", &self.namespace)?;
        check_key_field("from_node", &self.from_node)?;
        check_key_field("to_node", &self.to_node)?;
        check_key_field("entity", &self.entity)?;
        if self.from_node == self.to_node {
            return Err(ValidationError::new("to_node", "must differ from from_node"));
        }
        check_finite("distance", self.distance)?;
        if let Some(absolute) = self.absolute_distance {
            check_finite("absolute_distance", absolute)?;
        }
        check_decrement(self.decrement_path)
    }
}

/// Loosely typed link, as read from JSON lines or a write stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkInput {
    /// Partition scope; may be supplied by the consumer instead.
    pub namespace: Option<String>,
    /// Origin node.
    pub from_node: Option<String>,
    /// Target node.
    pub to_node: Option<String>,
    /// Edge kind.
    pub entity: Option<String>,
    /// `"IN"`, `"OUT"`, or absent.
    pub direction: Option<String>,
    /// Association weight.
    pub distance: Option<f64>,
    /// Hard-set distance.
    pub absolute_distance: Option<f64>,
    /// Per-item decay step.
    pub decrement_path: Option<f64>,
}

impl LinkInput {
    /// Fills defaults and validates, producing a typed request.
    ///
    /// `namespace` and `entity` fill the corresponding fields when the input
    /// leaves them out.
    pub fn normalize(
        self,
        namespace: Option<&str>,
        entity: &str,
    ) -> Result<LinkRequest, ValidationError> {
        let direction = match self.direction.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<Direction>()
                    .map_err(|err| ValidationError::new("direction", err.to_string()))?,
            ),
        };
        let request = LinkRequest {
            namespace: self
                .namespace
                .or_else(|| namespace.map(str::to_owned))
                .unwrap_or_default(),
            from_node: self.from_node.unwrap_or_default(),
            to_node: self.to_node.unwrap_or_default(),
            entity: self.entity.unwrap_or_else(|| entity.to_owned()),
            direction,
            distance: self.distance.unwrap_or(DEFAULT_DISTANCE),
            absolute_distance: self.absolute_distance,
            decrement_path: self.decrement_path,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Link one node to many targets.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossLinkRequest {
    /// Partition scope.
    pub namespace: String,
    /// Origin node.
    pub from_node: String,
    /// Target nodes.
    pub to_nodes: Vec<String>,
    /// Edge kind.
    pub entity: String,
    /// Orientation of every link.
    pub direction: Option<Direction>,
    /// Association weight of every link.
    pub distance: f64,
    /// Hard-set distance of every link.
    pub absolute_distance: Option<f64>,
    /// Decay step.
    pub decrement_path: Option<f64>,
}

impl CrossLinkRequest {
    /// Undirected links of the default entity.
    pub fn new(
        namespace: impl Into<String>,
        from_node: impl Into<String>,
        to_nodes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            from_node: from_node.into(),
            to_nodes: to_nodes.into_iter().map(Into::into).collect(),
            entity: DEFAULT_ENTITY.to_owned(),
            direction: None,
            distance: DEFAULT_DISTANCE,
            absolute_distance: None,
            decrement_path: None,
        }
    }

    /// Sets the entity.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Sets the direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// One validated [`LinkRequest`] per target.
    pub fn into_links(self) -> Result<Vec<LinkRequest>, ValidationError> {
        if self.to_nodes.is_empty() {
            return Err(ValidationError::new("to_nodes", "needs at least one target"));
        }
        self.to_nodes
            .iter()
            .map(|to_node| {
                let link = LinkRequest {
                    namespace: self.namespace.clone(),
                    from_node: self.from_node.clone(),
                    to_node: to_node.clone(),
                    entity: self.entity.clone(),
                    direction: self.direction,
                    distance: self.distance,
                    absolute_distance: self.absolute_distance,
                    decrement_path: self.decrement_path,
                };
                link.validate().map(|()| link)
            })
            .collect()
    }
}

/// Link every unordered pair of a node collection.
#[derive(Clone, Debug, PartialEq)]
pub struct AllAllRequest {
    /// Partition scope.
    pub namespace: String,
    /// Nodes to interconnect; duplicates are ignored.
    pub nodes: Vec<String>,
    /// Edge kind.
    pub entity: String,
    /// Orientation, taken from the earlier node of each pair.
    pub direction: Option<Direction>,
    /// Association weight of every link.
    pub distance: f64,
    /// Hard-set distance of every link.
    pub absolute_distance: Option<f64>,
    /// Decay step.
    pub decrement_path: Option<f64>,
}

impl AllAllRequest {
    /// Undirected links of the default entity.
    pub fn new(
        namespace: impl Into<String>,
        nodes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
            entity: DEFAULT_ENTITY.to_owned(),
            direction: None,
            distance: DEFAULT_DISTANCE,
            absolute_distance: None,
            decrement_path: None,
        }
    }

    /// Sets the entity.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// One validated [`LinkRequest`] per unordered pair, in input order.
    pub fn into_links(self) -> Result<Vec<LinkRequest>, ValidationError> {
        let mut nodes: Vec<&String> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
        if nodes.len() < 2 {
            return Err(ValidationError::new("nodes", "needs at least two distinct nodes"));
        }
        let mut links = Vec::with_capacity(nodes.len() * (nodes.len() - 1) / 2);
        for (i, from_node) in nodes.iter().enumerate() {
            for to_node in &nodes[i + 1..] {
                let link = LinkRequest {
                    namespace: self.namespace.clone(),
                    from_node: (*from_node).clone(),
                    to_node: (*to_node).clone(),
                    entity: self.entity.clone(),
                    direction: self.direction,
                    distance: self.distance,
                    absolute_distance: self.absolute_distance,
                    decrement_path: self.decrement_path,
                };
                link.validate()?;
                links.push(link);
            }
        }
        Ok(links)
    }
}

/// Nearest neighbors of one node.
#[derive(Clone, Debug, PartialEq)]
pub struct ClosestRequest {
    /// Partition scope.
    pub namespace: String,
    /// Node whose neighbors are read.
    pub from_node: String,
    /// Edge kind.
    pub entity: String,
    /// Row direction; `None` reads undirected rows.
    pub direction: Option<Direction>,
    /// Inclusive distance bounds.
    pub range: DistanceRange,
    /// Farthest first.
    pub desc: bool,
    /// Maximum number of neighbors.
    pub limit: Option<usize>,
}

impl ClosestRequest {
    /// Unbounded, ascending read of the default entity.
    pub fn new(namespace: impl Into<String>, from_node: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            from_node: from_node.into(),
            entity: DEFAULT_ENTITY.to_owned(),
            direction: None,
            range: DistanceRange::unbounded(),
            desc: false,
            limit: None,
        }
    }

    /// Sets the entity.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Sets the direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets the distance bounds.
    pub fn range(mut self, range: DistanceRange) -> Self {
        self.range = range;
        self
    }

    /// Caps the number of neighbors.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_key_field("namespace", &self.namespace)?;
        check_key_field("from_node", &self.from_node)?;
        check_key_field("entity", &self.entity)?;
        if self.limit == Some(0) {
            return Err(ValidationError::new("limit", "must be at least 1 when set"));
        }
        Ok(())
    }
}

/// Every row from one node, optionally narrowed by entity and direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRequest {
    /// Partition scope.
    pub namespace: String,
    /// Origin node.
    pub from_node: String,
    /// Restrict to one entity.
    pub entity: Option<String>,
    /// Restrict to one direction; ignored without an entity.
    pub direction: Option<Direction>,
}

impl NodeRequest {
    /// All rows from `from_node`.
    pub fn new(namespace: impl Into<String>, from_node: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            from_node: from_node.into(),
            entity: None,
            direction: None,
        }
    }

    /// Restricts to one entity.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Restricts to one direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_key_field("namespace", &self.namespace)?;
        check_key_field("from_node", &self.from_node)?;
        if let Some(entity) = &self.entity {
            check_key_field("entity", entity)?;
        }
        Ok(())
    }
}

/// One logical edge, addressed from its forward row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeRequest {
    /// Partition scope.
    pub namespace: String,
    /// Origin node.
    pub from_node: String,
    /// Edge kind.
    pub entity: String,
    /// Orientation; `None` for undirected.
    pub direction: Option<Direction>,
    /// Target node.
    pub to_node: String,
}

impl EdgeRequest {
    /// Undirected edge of the default entity.
    pub fn new(
        namespace: impl Into<String>,
        from_node: impl Into<String>,
        to_node: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            from_node: from_node.into(),
            entity: DEFAULT_ENTITY.to_owned(),
            direction: None,
            to_node: to_node.into(),
        }
    }

    /// Sets the entity.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Sets the direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_key_field("namespace", &self.namespace)?;
        check_key_field("from_node", &self.from_node)?;
        check_key_field("entity", &self.entity)?;
        check_key_field("to_node", &self.to_node)
    }
}
