// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Removes sorts made redundant by another clause of the same query expression.

use riverbed_common::{JoinType, MapNode, RecordSourceNode, RseNode, SortClause, StreamId, ValueExpr};
use tracing::debug;

/// Drops or relocates ORDER BY and DISTINCT clauses of `rse` that another clause already satisfies.
///
/// * DISTINCT over exactly the GROUP BY keys of a single aggregate source is dropped.
/// * ORDER BY over the leading GROUP BY keys is dropped and the grouping reordered to match.
/// * ORDER BY over the leading DISTINCT keys is dropped and the projection reordered to match.
/// * ORDER BY on a single stream moves down to the nested expression that reads that stream.
pub fn check_sorts(rse: &mut RseNode) {
    eliminate_by_grouping(rse);
    eliminate_by_projection(rse);
    push_down(rse);
}

fn eliminate_by_grouping(rse: &mut RseNode) {
    if (rse.projection.is_none() && rse.sorted.is_none()) || rse.relations.len() != 1 {
        return;
    }
    let Some(RecordSourceNode::Aggregate(source)) = rse.relations.first_mut() else {
        return;
    };
    let Some(group) = source.group.as_mut() else {
        return;
    };
    let map = &source.map;

    if let Some(project) = &rse.projection
        && project.len() == group.len()
        && project.expressions.iter().all(|p| group.expressions.iter().any(|g| map_equal(g, p, map)))
    {
        set_direction(project, group);
        rse.projection = None;
        debug!("distinct satisfied by grouping");
    }

    if rse.projection.is_none()
        && let Some(sort) = &rse.sorted
        && sort.len() <= group.len()
        && sort.expressions.iter().all(|s| group.expressions[..sort.len()].iter().any(|g| map_equal(g, s, map)))
    {
        set_direction(sort, group);
        set_position(sort, group, |to, from| map_equal(to, from, map));
        rse.sorted = None;
        debug!("order satisfied by grouping");
    }
}

fn eliminate_by_projection(rse: &mut RseNode) {
    let (Some(sort), Some(project)) = (&rse.sorted, &mut rse.projection) else {
        return;
    };
    let count = sort.len();
    if count > project.len() || !sort.expressions.iter().all(|s| project.expressions[..count].iter().any(|p| same_field(s, p))) {
        return;
    }
    set_direction(sort, project);
    set_position(sort, project, same_field);
    rse.sorted = None;
    debug!("order satisfied by distinct");
}

fn push_down(rse: &mut RseNode) {
    if rse.projection.is_some() {
        return;
    }
    let Some(stream) = rse.sorted.as_ref().and_then(sort_stream) else {
        return;
    };
    let Some(path) = push_down_target(rse, stream) else {
        return;
    };

    let Some((&first, rest)) = path.split_first() else {
        return;
    };
    let Some(RecordSourceNode::Rse(inner)) = rse.relations.get_mut(first) else {
        return;
    };
    let Some(target) = nested_mut(inner, rest) else {
        return;
    };
    target.sorted = rse.sorted.take();
    debug!(stream, "order pushed into nested expression");
}

fn nested_mut<'r>(rse: &'r mut RseNode, path: &[usize]) -> Option<&'r mut RseNode> {
    match path.split_first() {
        None => Some(rse),
        Some((&index, rest)) => match rse.relations.get_mut(index)? {
            RecordSourceNode::Rse(inner) => nested_mut(inner, rest),
            _ => None,
        },
    }
}

/// The one stream every key of `sort` reads.
///
/// Only the first key may be an expression rather than a plain field.
fn sort_stream(sort: &SortClause) -> Option<StreamId> {
    let mut stream = None;
    for (i, expr) in sort.expressions.iter().enumerate() {
        let current = match expr.as_field() {
            Some(field) => field.stream,
            None if i == 0 => {
                let streams = expr.streams();
                if streams.len() != 1 {
                    return None;
                }
                streams.into_iter().next()?
            }
            None => return None,
        };
        match stream {
            None => stream = Some(current),
            Some(first) if first != current => return None,
            Some(_) => {}
        }
    }
    stream
}

/// Relation indices leading from `rse` to the nested expression that reads `stream` directly.
fn push_down_target(rse: &RseNode, stream: StreamId) -> Option<Vec<usize>> {
    let mut path = Vec::new();
    let mut current = rse;

    loop {
        let nested = !path.is_empty();
        if nested && (current.first.is_some() || current.skip.is_some() || current.sorted.is_some() || current.projection.is_some()) {
            return None;
        }

        let index = match current.join_type {
            JoinType::Inner if current.relations.len() == 1 => 0,
            JoinType::Inner => {
                let found = current.relations.iter().any(|node| node.as_relation() == Some(stream));
                return (found && nested).then_some(path);
            }
            JoinType::Left => 0,
            JoinType::Right | JoinType::Full => return None,
        };

        match current.relations.get(index)? {
            RecordSourceNode::Rse(inner) => {
                path.push(index);
                current = inner;
            }
            node => return (node.as_relation() == Some(stream) && nested).then_some(path),
        }
    }
}

fn same_field(a: &ValueExpr, b: &ValueExpr) -> bool {
    matches!((a.as_field(), b.as_field()), (Some(x), Some(y)) if x == y)
}

/// `source` maps to `target` through the aggregate map.
fn map_equal(source: &ValueExpr, target: &ValueExpr, map: &MapNode) -> bool {
    let (Some(source), Some(target)) = (source.as_field(), target.as_field()) else {
        return false;
    };
    map.source.iter().zip(&map.target).any(|(from, to)| from.as_field() == Some(source) && to.as_field() == Some(target))
}

fn set_direction(from: &SortClause, to: &mut SortClause) {
    let count = from.len();
    let len = to.len();
    to.direction.resize(len, Default::default());
    to.nulls.resize(len, Default::default());
    for i in 0..count.min(len) {
        to.direction[i] = from.direction_at(i);
        to.nulls[i] = from.nulls_at(i);
    }
}

/// Reorders the leading keys of `to` into the order of `from`.
fn set_position(from: &SortClause, to: &mut SortClause, same: impl Fn(&ValueExpr, &ValueExpr) -> bool) {
    let count = from.len().min(to.len());
    for (swap, wanted) in from.expressions.iter().take(count).enumerate() {
        for i in 0..count {
            if same(&to.expressions[i], wanted) {
                to.expressions.swap(swap, i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riverbed_common::{AggregateSource, NullsPlacement, SortDirection};

    fn field(stream: StreamId, id: u16) -> ValueExpr {
        ValueExpr::field(stream, id)
    }

    /// `SELECT ... FROM (aggregate over stream 0 grouped by fields 0, 1)` as stream 5.
    fn grouped() -> RseNode {
        let inner = RseNode::new(vec![RecordSourceNode::relation(0)]);
        let source = AggregateSource {
            stream: 5,
            rse: Box::new(inner),
            group: Some(SortClause::ascending(vec![field(0, 0), field(0, 1)])),
            map: MapNode { source: vec![field(0, 0), field(0, 1)], target: vec![field(5, 0), field(5, 1)] },
        };
        RseNode::new(vec![RecordSourceNode::Aggregate(source)])
    }

    fn group_of(rse: &RseNode) -> &SortClause {
        match &rse.relations[0] {
            RecordSourceNode::Aggregate(source) => source.group.as_ref().unwrap(),
            _ => panic!("expected an aggregate source"),
        }
    }

    #[test]
    fn test_distinct_over_group_keys_dropped() {
        let projection = SortClause::with_directions(vec![field(5, 1), field(5, 0)], vec![SortDirection::Descending, SortDirection::Ascending]);
        let mut rse = grouped().with_projection(projection);
        check_sorts(&mut rse);
        assert!(rse.projection.is_none());
        assert_eq!(group_of(&rse).direction, vec![SortDirection::Descending, SortDirection::Ascending]);
    }

    #[test]
    fn test_order_over_group_prefix_reorders_group() {
        let mut sort = SortClause::with_directions(vec![field(5, 1), field(5, 0)], vec![SortDirection::Descending, SortDirection::Ascending]);
        sort.nulls = vec![NullsPlacement::Last, NullsPlacement::Default];
        let mut rse = grouped().with_sort(sort);
        check_sorts(&mut rse);

        assert!(rse.sorted.is_none());
        let group = group_of(&rse);
        assert_eq!(group.expressions, vec![field(0, 1), field(0, 0)]);
        assert_eq!(group.direction[0], SortDirection::Descending);
        assert_eq!(group.nulls[0], NullsPlacement::Last);
    }

    #[test]
    fn test_order_on_unmapped_field_kept() {
        let mut rse = grouped().with_sort(SortClause::ascending(vec![field(5, 2)]));
        check_sorts(&mut rse);
        assert!(rse.sorted.is_some());
        assert_eq!(group_of(&rse).expressions, vec![field(0, 0), field(0, 1)]);
    }

    #[test]
    fn test_order_over_distinct_prefix_dropped() {
        let projection = SortClause::ascending(vec![field(0, 0), field(0, 1), field(0, 2)]);
        let sort = SortClause::with_directions(vec![field(0, 2), field(0, 0)], vec![SortDirection::Descending, SortDirection::Descending]);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0)]).with_projection(projection).with_sort(sort.clone());
        check_sorts(&mut rse);
        // field 2 is not among the first two DISTINCT keys
        assert_eq!(rse.sorted, Some(sort));

        let projection = SortClause::ascending(vec![field(0, 0), field(0, 2), field(0, 1)]);
        let sort = SortClause::with_directions(vec![field(0, 2), field(0, 0)], vec![SortDirection::Descending, SortDirection::Descending]);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0)]).with_projection(projection).with_sort(sort);
        check_sorts(&mut rse);
        assert!(rse.sorted.is_none());
        let projection = rse.projection.unwrap();
        assert_eq!(projection.expressions, vec![field(0, 2), field(0, 0), field(0, 1)]);
        assert_eq!(projection.direction, vec![SortDirection::Descending, SortDirection::Descending, SortDirection::Ascending]);
    }

    #[test]
    fn test_single_stream_order_pushed_into_join() {
        let join = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]);
        let sort = SortClause::ascending(vec![field(1, 0), field(1, 3)]);
        let mut rse = RseNode::new(vec![RecordSourceNode::Rse(Box::new(join))]).with_sort(sort.clone());
        check_sorts(&mut rse);

        assert!(rse.sorted.is_none());
        let RecordSourceNode::Rse(inner) = &rse.relations[0] else {
            panic!("expected nested expression");
        };
        assert_eq!(inner.sorted, Some(sort));
    }

    #[test]
    fn test_order_pushed_to_outer_side_of_left_join() {
        let join = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]).with_join_type(JoinType::Left);
        let mut rse = RseNode::new(vec![RecordSourceNode::Rse(Box::new(join))]).with_sort(SortClause::ascending(vec![field(0, 0)]));
        check_sorts(&mut rse);
        let RecordSourceNode::Rse(inner) = &rse.relations[0] else {
            panic!("expected nested expression");
        };
        assert!(inner.sorted.is_some());

        // The inner side of a left join cannot take the order.
        let join = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]).with_join_type(JoinType::Left);
        let mut rse = RseNode::new(vec![RecordSourceNode::Rse(Box::new(join))]).with_sort(SortClause::ascending(vec![field(1, 0)]));
        check_sorts(&mut rse);
        assert!(rse.sorted.is_some());
    }

    #[test]
    fn test_push_down_blocked() {
        let mut limited = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]);
        limited.first = Some(ValueExpr::literal(riverbed_common::Literal::Integer(10)));
        let mut rse = RseNode::new(vec![RecordSourceNode::Rse(Box::new(limited))]).with_sort(SortClause::ascending(vec![field(0, 0)]));
        check_sorts(&mut rse);
        assert!(rse.sorted.is_some());

        let join = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]);
        let mixed = SortClause::ascending(vec![field(0, 0), field(1, 0)]);
        let mut rse = RseNode::new(vec![RecordSourceNode::Rse(Box::new(join))]).with_sort(mixed);
        check_sorts(&mut rse);
        assert!(rse.sorted.is_some());

        // A flat join keeps its own order.
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]).with_sort(SortClause::ascending(vec![field(0, 0)]));
        check_sorts(&mut rse);
        assert!(rse.sorted.is_some());
    }
}
