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

//! Compilation of one query expression.
//!
//! [`compile_rse`] sequences the phases: decomposition of the filter,
//! inherited predicates, one river per sub-plan, then either the outer join
//! or the inner join loop, and finally sorts and the SKIP/FIRST/lock
//! wrappers. Nested expressions re-enter [`compile_rse`] on the same scratch.

use riverbed_common::{ActivatedWith, AggregateSource, BoolExpr, JoinType, RecordSource, RecordSourceNode, RseNode, SortClause, StreamId, StreamStates};
use std::mem;
use tracing::{debug, instrument, trace};

use super::conjuncts::ConjunctTable;
use super::decompose::decompose;
use super::equalities::distribute_equalities;
use super::plan_check::{check_indices, mark_indices, sort_indices_by_selectivity};
use super::river::{River, cross_join};
use super::sort::{SortRequest, gen_aggregate_distincts, gen_sort};
use super::sort_elimination::check_sorts;
use super::{Optimizer, OptimizerEnv};
use crate::catalog::RelationKind;
use crate::error::{OptimizerError, Result};
use crate::scratch::{CompilerScratch, StreamStateHolder};

/// Rows assumed for a virtual table.
const VIRTUAL_CARDINALITY: f64 = 100.0;

/// Compiles a top-level query expression into an executable plan.
///
/// Index descriptors bound while compiling are released before this returns,
/// on success and on error.
pub fn compile(env: OptimizerEnv<'_>, csb: &mut CompilerScratch, rse: &mut RseNode) -> Result<RecordSource> {
    let count = csb.stream_count();
    if count >= env.config.max_streams {
        return Err(OptimizerError::TooManyContexts { count, limit: env.config.max_streams });
    }
    let rsb = compile_rse(env, csb, rse, None)?;
    debug!(streams = count, "query expression compiled");
    Ok(rsb)
}

/// Compiles `rse`, given the predicates an enclosing expression hands down.
#[instrument(level = "debug", skip_all, fields(relations = rse.relations.len(), join = ?rse.join_type))]
pub fn compile_rse(env: OptimizerEnv<'_>, csb: &mut CompilerScratch, rse: &mut RseNode, parent: Option<&[BoolExpr]>) -> Result<RecordSource> {
    let mut opt = Optimizer::new(env, csb);
    opt.favor_first_rows = rse.flags.first_rows.unwrap_or(env.config.favor_first_rows);
    opt.join_type = rse.join_type;
    opt.compile(rse, parent)
}

impl Optimizer<'_> {
    fn compile(&mut self, rse: &mut RseNode, parent: Option<&[BoolExpr]>) -> Result<RecordSource> {
        if rse.relations.is_empty() {
            return Err(OptimizerError::InvalidExpression("query expression without relations".to_string()));
        }
        if let Some(plan) = &rse.plan {
            self.csb.assign_plan(plan);
        }

        check_sorts(rse);
        let mut sort = rse.sorted.clone();
        let project = rse.projection.clone();
        let mut aggregate = rse.aggregate.clone();

        self.build_conjuncts(rse, parent)?;
        for stream in rse.rse_streams() {
            self.csb.deactivate(stream);
        }

        let need_indices = !self.conjuncts.is_empty() || sort.is_some() || aggregate.is_some();
        let join_type = rse.join_type;
        let mut rivers: Vec<River> = Vec::new();
        for (position, node) in rse.relations.iter_mut().enumerate() {
            let inner_sub_stream = position > 0;
            self.local_streams.clear();
            let dependencies = node.outer_references();
            match self.compile_source(node, inner_sub_stream, need_indices)? {
                Some(rsb) => {
                    if join_type == JoinType::Inner || (join_type == JoinType::Left && !inner_sub_stream) {
                        rsb.find_used_streams(&mut self.sub_streams);
                        if join_type == JoinType::Left {
                            rsb.find_used_streams(&mut self.outer_streams);
                        }
                    }
                    let river = River::new(rsb, self.local_streams.clone()).with_dependencies(dependencies);
                    river.deactivate(self.csb);
                    rivers.push(river);
                }
                None => {
                    if let Some(&stream) = self.beds.last() {
                        self.outer_streams.push(stream);
                    }
                }
            }
        }

        // An aggregate hint is only an ordering wish; a real sort wins.
        if aggregate.is_some() && sort.is_none() {
            sort = aggregate.clone();
        } else {
            rse.aggregate = None;
            aggregate = None;
        }

        for &stream in &self.sub_streams {
            self.csb.activate(stream);
        }

        let original_sort = sort.clone();
        let mut sort_can_be_used = true;
        if sort.is_some() && project.is_some() {
            sort = None;
            sort_can_be_used = false;
        }

        let mut rsb = if join_type == JoinType::Inner { self.gen_inner(rse, rivers, &mut sort, &mut sort_can_be_used)? } else { self.gen_outer(rse, &mut rivers, &mut sort)? };

        if original_sort.is_some() && !sort_can_be_used {
            sort = original_sort;
        }
        if aggregate.is_some() && sort.is_some() {
            self.env.diagnostics.record_decision("aggregate", "grouping order not delivered by an index");
            rse.aggregate = None;
            sort = None;
        }

        for &stream in &self.compile_streams {
            if let Some(tail) = self.csb.get(stream) {
                check_indices(tail)?;
            }
        }

        if project.is_some() || sort.is_some() {
            self.key_streams.retain(|stream| !self.beds.contains(stream));
            if let Some(project) = &project {
                let request = SortRequest::new(&self.beds, project).with_dbkey_streams(&self.key_streams).refetch(self.favor_first_rows).project(true);
                rsb = gen_sort(self.csb, self.env.config, request, rsb)?;
            }
            if let Some(sort) = &sort {
                let request = SortRequest::new(&self.beds, sort).with_dbkey_streams(&self.key_streams).refetch(self.favor_first_rows);
                rsb = gen_sort(self.csb, self.env.config, request, rsb)?;
            }
        }

        if let Some(skip) = &rse.skip {
            rsb = RecordSource::Skip { input: Box::new(rsb), count: skip.clone() };
        }
        if let Some(first) = &rse.first {
            rsb = RecordSource::First { input: Box::new(rsb), count: first.clone() };
        }
        if rse.flags.write_lock {
            for &stream in &self.compile_streams {
                self.csb.get_mut(stream).flags.update = true;
            }
            rsb = RecordSource::Lock { input: Box::new(rsb) };
        }

        debug!(beds = ?self.beds, conjuncts = self.conjuncts.len(), "query expression planned");
        Ok(rsb)
    }

    /// Lays out the conjunct table: base conjuncts with their inferred
    /// equalities, then equalities distributed over inherited predicates,
    /// then the inherited predicates, then those only safe outside an outer join.
    fn build_conjuncts(&mut self, rse: &RseNode, parent: Option<&[BoolExpr]>) -> Result<()> {
        let limit = self.env.config.max_conjuncts;
        let mut base = Vec::new();
        if let Some(boolean) = &rse.boolean {
            decompose(boolean.clone(), &mut base, &*self.csb);
        }
        if base.len() > limit {
            return Err(OptimizerError::BlockExceeded { count: base.len(), limit });
        }
        let count = base.len();
        distribute_equalities(&mut base, count, limit);

        // Rows limited by FIRST/SKIP must not be filtered from outside.
        let parent = if rse.first.is_some() || rse.skip.is_some() { None } else { parent };

        let mut distributed = Vec::new();
        let mut inherited = Vec::new();
        let mut missing = Vec::new();
        if let Some(parent) = parent {
            for node in parent.iter().take(limit.saturating_sub(base.len())) {
                if rse.join_type != JoinType::Inner && node.possibly_unknown() {
                    if rse.join_type != JoinType::Full {
                        missing.push(node.clone());
                    }
                } else {
                    inherited.push(node.clone());
                }
            }

            let mut combined: Vec<BoolExpr> = base.iter().chain(&inherited).cloned().collect();
            let count = combined.len();
            distribute_equalities(&mut combined, count, limit);
            distributed = combined.split_off(count);
        }

        let total = base.len() + distributed.len() + inherited.len() + missing.len();
        if total > limit {
            return Err(OptimizerError::BlockExceeded { count: total, limit });
        }
        trace!(base = base.len(), distributed = distributed.len(), parent = inherited.len(), missing = missing.len(), "conjuncts");
        self.conjuncts = ConjunctTable::new(base, distributed, inherited, missing);
        Ok(())
    }

    /// Compiles one input of the expression. Relations only register their
    /// stream and yield nothing; every other input yields its sub-plan.
    fn compile_source(&mut self, node: &mut RecordSourceNode, inner_sub_stream: bool, need_indices: bool) -> Result<Option<RecordSource>> {
        match node {
            RecordSourceNode::Relation { stream } => {
                let stream = *stream;
                self.beds.push(stream);
                self.compile_streams.push(stream);
                self.compile_relation(stream, need_indices)?;
                Ok(None)
            }
            RecordSourceNode::Rse(inner) => {
                inner.compute_rse_streams(&mut self.beds);
                inner.compute_rse_streams(&mut self.local_streams);
                for relation in &inner.relations {
                    relation.compute_db_key_streams(&mut self.key_streams);
                }

                let env = self.env;
                let deliver = self.join_type == JoinType::Inner || (self.join_type == JoinType::Left && inner_sub_stream);
                if !deliver {
                    return compile_rse(env, self.csb, inner, None).map(Some);
                }

                let mut holder = StreamStateHolder::new(&mut *self.csb, &self.outer_streams);
                if self.join_type == JoinType::Left {
                    holder.activate_all();
                }
                let nested = inner.rse_streams();
                let delivered = deliverable(&self.conjuncts, &*holder, &nested);
                trace!(count = delivered.len(), "handing conjuncts to nested expression");
                compile_rse(env, &mut holder, inner, Some(delivered.as_slice())).map(Some)
            }
            RecordSourceNode::Aggregate(source) => {
                self.beds.push(source.stream);
                self.local_streams.push(source.stream);
                self.gen_aggregate(source).map(Some)
            }
            RecordSourceNode::Procedure(source) => {
                self.beds.push(source.stream);
                self.local_streams.push(source.stream);
                Ok(Some(RecordSource::ProcedureScan { stream: source.stream, alias: self.csb.alias(source.stream), procedure: source.name.clone(), inputs: source.inputs.clone() }))
            }
        }
    }

    /// Binds index descriptors and the cardinality estimate of a relation stream.
    fn compile_relation(&mut self, stream: StreamId, need_indices: bool) -> Result<()> {
        let relation = self.csb.get(stream).and_then(|tail| tail.relation.clone()).ok_or(OptimizerError::UnboundStream(stream))?;
        let metadata = self.env.metadata;
        let indexed = need_indices && matches!(relation.kind, RelationKind::Persistent | RelationKind::View);
        if indexed {
            self.bound_streams.push(stream);
        }

        let tail = self.csb.get_mut(stream);
        tail.indices = None;
        tail.cardinality = match relation.kind {
            RelationKind::Virtual(_) => VIRTUAL_CARDINALITY,
            _ => metadata.cardinality(&relation),
        };
        trace!(stream, relation = %relation.name, cardinality = tail.cardinality, "relation bound");

        if indexed {
            let mut indices = metadata.indices(&relation);
            if tail.plan.is_some() {
                tail.indices = Some(indices);
                mark_indices(tail, relation.id)?;
            } else {
                sort_indices_by_selectivity(&mut indices);
                tail.indices = Some(indices);
            }
        }
        Ok(())
    }

    /// Aggregate over a nested expression whose rows arrive in grouping order.
    fn gen_aggregate(&mut self, source: &mut AggregateSource) -> Result<RecordSource> {
        if let Some(group) = &source.group {
            source.rse.sorted = Some(group.clone());
        }
        let input = compile_rse(self.env, self.csb, &mut source.rse, None)?;
        let distinct_sorts = gen_aggregate_distincts(&*self.csb, &source.map)?;
        Ok(RecordSource::Aggregate {
            stream: source.stream,
            input: Box::new(input),
            group: source.group.as_ref().map(|group| group.expressions.clone()),
            map: source.map.clone(),
            distinct_sorts,
        })
    }

    /// Inner join of the relation streams and the sub-plan rivers.
    ///
    /// Streams whose index lookups are driven by already available rivers are
    /// joined first, one batch at a time, and folded into a single river.
    fn gen_inner(&mut self, rse: &RseNode, mut rivers: Vec<River>, sort: &mut Option<SortClause>, sort_can_be_used: &mut bool) -> Result<RecordSource> {
        // Later streams join to the sub-plans, so no index can deliver the order.
        if !rivers.is_empty() {
            *sort = None;
            *sort_can_be_used = false;
            while self.gen_equi_join(&mut rivers)? {}
            for &stream in &self.sub_streams {
                self.csb.activate(stream);
            }
        }

        let plan = rse.plan.as_ref();
        let mut pending = self.compile_streams.clone();
        loop {
            let (dependent, free) = self.find_index_relationship_streams(&pending);
            if !dependent.is_empty() && !free.is_empty() {
                *sort = None;
                *sort_can_be_used = false;
            }
            if dependent.is_empty() {
                if !free.is_empty() {
                    for river in &rivers {
                        river.deactivate(self.csb);
                    }
                }
                break;
            }

            pending = free;
            self.gen_join(&dependent, &mut rivers, sort, plan)?;
            let river = cross_join(self.env, self.csb, mem::take(&mut rivers))?;
            river.activate(self.csb);
            rivers.push(river);
        }

        self.gen_join(&pending, &mut rivers, sort, plan)?;
        while self.gen_equi_join(&mut rivers)? {}
        let river = cross_join(self.env, self.csb, rivers)?;
        Ok(self.gen_residual_boolean(river.rsb))
    }
}

/// Unused base conjuncts computable once the nested expression's own streams are active.
fn deliverable(conjuncts: &ConjunctTable, states: &dyn StreamStates, nested: &[StreamId]) -> Vec<BoolExpr> {
    let visible = ActivatedWith::new(states, nested);
    conjuncts.slots(0..conjuncts.base_count()).filter(|(_, conjunct)| conjunct.is_available() && conjunct.node.computable(&visible, None, false)).map(|(_, conjunct)| conjunct.node.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IndexDescriptor, MockMetadataProvider, StaticCatalog};
    use crate::optimizer::testing::{TestEnv, scratch};
    use riverbed_common::{AccessItem, JoinKind, Literal, MapNode, PlanConstraint, ValueExpr, get_plan};

    fn field(stream: StreamId, field: u16) -> ValueExpr {
        ValueExpr::field(stream, field)
    }

    fn int(value: i64) -> ValueExpr {
        ValueExpr::literal(Literal::Integer(value))
    }

    fn plan_text(rsb: &RecordSource) -> String {
        get_plan(&[rsb], false).trim().to_string()
    }

    fn single(boolean: BoolExpr) -> RseNode {
        RseNode::new(vec![RecordSourceNode::relation(0)]).with_boolean(boolean)
    }

    #[test]
    fn test_single_table_uses_index() {
        let test = TestEnv::with_catalog(StaticCatalog::new().with_relation("T0", 10_000.0, vec![IndexDescriptor::new(1, "T0_A", vec![0], 0.001)]));
        let mut csb = scratch(1);
        let mut rse = single(BoolExpr::eq(field(0, 0), int(5)));

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN (T0 INDEX (T0_A))");
        assert!(matches!(rsb, RecordSource::Filter { .. }));
        assert!(csb.get(0).unwrap().indices.is_none());
    }

    #[test]
    fn test_join_follows_index_relationship() {
        let catalog = StaticCatalog::new().with_relation("T0", 100.0, vec![]).with_relation("T1", 10_000.0, vec![IndexDescriptor::new(1, "T1_FK", vec![1], 0.0001)]);
        let test = TestEnv::with_catalog(catalog);
        let mut csb = scratch(2);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]).with_boolean(BoolExpr::eq(field(0, 0), field(1, 1)));

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN JOIN (T0 NATURAL, T1 INDEX (T1_FK))");
    }

    #[test]
    fn test_navigation_consumes_order() {
        let test = TestEnv::with_catalog(StaticCatalog::new().with_relation("T0", 1000.0, vec![IndexDescriptor::new(2, "T0_B", vec![1], 0.01)]));
        let mut csb = scratch(1);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0)]).with_sort(SortClause::ascending(vec![field(0, 1)]));

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN (T0 ORDER T0_B)");
        assert!(!matches!(rsb, RecordSource::Sort { .. }));
    }

    #[test]
    fn test_order_without_index_sorts() {
        let test = TestEnv::new();
        let mut csb = scratch(1);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0)]).with_sort(SortClause::ascending(vec![field(0, 1)]));

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN SORT (T0 NATURAL)");
        let RecordSource::Sort { map, .. } = &rsb else {
            panic!("expected a sort, got {rsb:?}");
        };
        assert!(!map.keys.is_empty());
    }

    #[test]
    fn test_skip_first_and_lock_wrappers() {
        let test = TestEnv::new();
        let mut csb = scratch(1);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0)]);
        rse.first = Some(int(10));
        rse.skip = Some(int(5));
        rse.flags.write_lock = true;

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        let RecordSource::Lock { input } = &rsb else {
            panic!("expected a lock, got {rsb:?}");
        };
        let RecordSource::First { input, .. } = input.as_ref() else {
            panic!("expected first below the lock");
        };
        assert!(matches!(input.as_ref(), RecordSource::Skip { .. }));
        assert!(csb.get(0).unwrap().flags.update);
    }

    #[test]
    fn test_conjunct_limit_is_fatal() {
        let mut test = TestEnv::new();
        test.config.max_conjuncts = 2;
        let mut csb = scratch(1);
        let boolean = BoolExpr::and(BoolExpr::and(BoolExpr::eq(field(0, 0), int(1)), BoolExpr::eq(field(0, 1), int(2))), BoolExpr::eq(field(0, 3), int(3)));
        let mut rse = single(boolean);

        let err = compile(test.env(), &mut csb, &mut rse).unwrap_err();
        assert!(matches!(err, OptimizerError::BlockExceeded { limit: 2, .. }));
    }

    #[test]
    fn test_stream_limit_is_fatal() {
        let mut test = TestEnv::new();
        test.config.max_streams = 1;
        let mut csb = scratch(2);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]);

        let err = compile(test.env(), &mut csb, &mut rse).unwrap_err();
        assert!(matches!(err, OptimizerError::TooManyContexts { count: 2, limit: 1 }));
    }

    #[test]
    fn test_stream_count_at_limit_is_fatal() {
        let mut test = TestEnv::new();
        test.config.max_streams = 2;
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]);

        let err = compile(test.env(), &mut scratch(2), &mut rse.clone()).unwrap_err();
        assert!(matches!(err, OptimizerError::TooManyContexts { count: 2, limit: 2 }));

        test.config.max_streams = 3;
        let rsb = compile(test.env(), &mut scratch(2), &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN JOIN (T0 NATURAL, T1 NATURAL)");
    }

    #[test]
    fn test_plan_index_must_be_used() {
        let catalog = StaticCatalog::new().with_relation("T0", 10_000.0, vec![IndexDescriptor::new(1, "T0_A", vec![0], 0.001)]);
        let test = TestEnv::with_catalog(catalog);
        let plan = PlanConstraint::indices(0, vec![AccessItem { relation_id: 1, index_id: 1, index_name: "T0_A".to_string() }]);

        let mut csb = scratch(1);
        let mut rse = single(BoolExpr::eq(field(0, 0), int(5))).with_plan(plan.clone());
        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN (T0 INDEX (T0_A))");

        let mut csb = scratch(1);
        let mut rse = single(BoolExpr::eq(field(0, 1), int(5))).with_plan(plan);
        let err = compile(test.env(), &mut csb, &mut rse).unwrap_err();
        assert!(matches!(err, OptimizerError::IndexUnused(ref name) if name == "T0_A"));
        assert!(csb.get(0).unwrap().indices.is_none());
    }

    #[test]
    fn test_nested_expression_receives_parent_conjuncts() {
        let catalog = StaticCatalog::new().with_relation("T1", 10_000.0, vec![IndexDescriptor::new(1, "T1_A", vec![0], 0.001)]);
        let test = TestEnv::with_catalog(catalog);
        let mut csb = scratch(2);
        let nested = RseNode::new(vec![RecordSourceNode::relation(1)]);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::Rse(Box::new(nested))]).with_boolean(BoolExpr::eq(field(1, 0), int(7)));

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        assert!(plan_text(&rsb).contains("T1 INDEX (T1_A)"));
        // The enclosing expression still evaluates its own copy.
        assert!(matches!(rsb, RecordSource::Filter { .. }));
    }

    #[test]
    fn test_aggregate_input_navigates_group() {
        let catalog = StaticCatalog::new().with_relation("T0", 1000.0, vec![IndexDescriptor::new(2, "T0_B", vec![1], 0.01)]);
        let test = TestEnv::with_catalog(catalog);
        let mut csb = scratch(2);
        let source = AggregateSource {
            stream: 1,
            rse: Box::new(RseNode::new(vec![RecordSourceNode::relation(0)])),
            group: Some(SortClause::ascending(vec![field(0, 1)])),
            map: MapNode { source: vec![field(0, 1)], target: vec![field(1, 0)] },
        };
        let mut rse = RseNode::new(vec![RecordSourceNode::Aggregate(source)]);

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        let RecordSource::Aggregate { input, group, distinct_sorts, .. } = &rsb else {
            panic!("expected an aggregate, got {rsb:?}");
        };
        assert!(matches!(input.as_ref(), RecordSource::IndexTableScan { index_name, .. } if index_name == "T0_B"));
        assert_eq!(group.as_ref().map(Vec::len), Some(1));
        assert!(distinct_sorts.is_empty());
    }

    #[test]
    fn test_left_join_keeps_outer_side_first() {
        let catalog = StaticCatalog::new().with_relation("T1", 10_000.0, vec![IndexDescriptor::new(1, "T1_A", vec![0], 0.001)]);
        let test = TestEnv::with_catalog(catalog);
        let mut csb = scratch(2);
        let mut rse = RseNode::new(vec![RecordSourceNode::relation(0), RecordSourceNode::relation(1)]).with_join_type(JoinType::Left).with_boolean(BoolExpr::eq(field(0, 0), field(1, 0)));

        let rsb = compile(test.env(), &mut csb, &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN JOIN (T0 NATURAL, T1 INDEX (T1_A))");
        assert!(matches!(rsb, RecordSource::NestedLoopJoin { kind: JoinKind::Outer, .. }));
    }

    #[test]
    fn test_metadata_consulted_once_per_relation() {
        let test = TestEnv::new();
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_indices().times(1).returning(|_| vec![IndexDescriptor::new(1, "T0_A", vec![0], 0.001)]);
        metadata.expect_cardinality().times(1).returning(|_| 10_000.0);
        let env = OptimizerEnv { cost_model: &test.cost_model, metadata: &metadata, diagnostics: &test.diagnostics, config: &test.config };

        let mut csb = scratch(1);
        let mut rse = single(BoolExpr::eq(field(0, 0), int(5)));
        let rsb = compile(env, &mut csb, &mut rse).unwrap();
        assert_eq!(plan_text(&rsb), "PLAN (T0 INDEX (T0_A))");
        assert_eq!(csb.get(0).unwrap().cardinality, 10_000.0);
    }

    #[test]
    fn test_virtual_relation_has_fixed_cardinality() {
        use crate::catalog::RelationDescriptor;
        use crate::scratch::StreamDefinition;
        use riverbed_common::VirtualTable;

        let test = TestEnv::new();
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_indices().never();
        metadata.expect_cardinality().never();
        let env = OptimizerEnv { cost_model: &test.cost_model, metadata: &metadata, diagnostics: &test.diagnostics, config: &test.config };

        let relation = RelationDescriptor { id: 40, name: "MON$STATEMENTS".to_string(), kind: RelationKind::Virtual(VirtualTable::Monitoring) };
        let mut csb = CompilerScratch::new([StreamDefinition::relation(0, relation, crate::optimizer::testing::format())]);
        let mut rse = single(BoolExpr::eq(field(0, 0), int(5)));
        let rsb = compile(env, &mut csb, &mut rse).unwrap();
        assert!(matches!(rsb, RecordSource::Filter { ref input, .. } if matches!(input.as_ref(), RecordSource::VirtualTableScan { .. })));
        assert_eq!(csb.get(0).unwrap().cardinality, VIRTUAL_CARDINALITY);
    }
}
