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

use proptest::prelude::*;
use riverbed_common::{AccessItem, AccessKind, AccessType, BoolExpr, CmpOp, Desc, DType, Format, JoinKind, JoinType, Literal, PlanConstraint, ProcedureSource, RecordSource, RecordSourceNode, RseNode, SortClause, StreamId, TextType, ValueExpr, get_plan};
use riverbed_core::optimizer::decompose::decompose;
use riverbed_core::{CollectingDiagnostics, CompilerScratch, DiagnosticEntry, HeuristicCostModel, IndexDescriptor, OptimizerConfig, OptimizerEnv, OptimizerError, RelationDescriptor, StaticCatalog, StreamDefinition, compile};

struct Fixture {
    cost_model: HeuristicCostModel,
    catalog: StaticCatalog,
    diagnostics: CollectingDiagnostics,
    config: OptimizerConfig,
}

impl Fixture {
    fn new(catalog: StaticCatalog) -> Self {
        Self { cost_model: HeuristicCostModel::new(), catalog, diagnostics: CollectingDiagnostics::new(), config: OptimizerConfig::new() }
    }

    fn env(&self) -> OptimizerEnv<'_> {
        OptimizerEnv { cost_model: &self.cost_model, metadata: &self.catalog, diagnostics: &self.diagnostics, config: &self.config }
    }
}

fn format() -> Format {
    Format::new(vec![Desc::of(DType::Long), Desc::of(DType::Long), Desc::varying(20, TextType::Ascii), Desc::of(DType::Double)])
}

fn scratch(count: usize) -> CompilerScratch {
    CompilerScratch::new((0..count).map(|s| StreamDefinition::relation(s, RelationDescriptor::persistent(s as u16 + 1, format!("T{s}")), format()).with_fields(0..4)))
}

fn field(stream: StreamId, field: u16) -> ValueExpr {
    ValueExpr::field(stream, field)
}

fn int(value: i64) -> ValueExpr {
    ValueExpr::literal(Literal::Integer(value))
}

fn relations(count: usize) -> Vec<RecordSourceNode> {
    (0..count).map(RecordSourceNode::relation).collect()
}

fn orders_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_relation("T0", 100.0, vec![])
        .with_relation("T1", 10_000.0, vec![IndexDescriptor::new(1, "T1_FK", vec![1], 0.0001), IndexDescriptor::new(2, "T1_AMOUNT", vec![3], 0.2)])
        .with_relation("T2", 5_000.0, vec![])
}

/// Predicates over three streams; each test picks a subset.
fn predicate_pool() -> Vec<BoolExpr> {
    vec![
        BoolExpr::eq(field(0, 0), field(1, 1)),
        BoolExpr::compare(CmpOp::Gtr, field(0, 1), int(5)),
        BoolExpr::eq(field(2, 1), field(0, 1)),
        BoolExpr::compare(CmpOp::Lss, field(1, 3), ValueExpr::literal(Literal::Double(2.5))),
        BoolExpr::eq(field(2, 0), int(7)),
        BoolExpr::between(field(1, 0), int(1), int(9)),
        BoolExpr::compare(CmpOp::Like, field(2, 2), ValueExpr::literal(Literal::text("ab%"))),
    ]
}

fn conjoin(predicates: Vec<BoolExpr>) -> Option<BoolExpr> {
    predicates.into_iter().reduce(BoolExpr::and)
}

fn evaluated_conjuncts(rsb: &RecordSource) -> Vec<BoolExpr> {
    let mut booleans = Vec::new();
    rsb.collect_booleans(&mut booleans);
    booleans.into_iter().flat_map(|boolean| boolean.conjuncts()).cloned().collect()
}

fn assert_no_predicate_loss(rsb: &RecordSource, boolean: &BoolExpr, csb: &CompilerScratch) {
    let mut expected = Vec::new();
    decompose(boolean.clone(), &mut expected, csb);
    let evaluated = evaluated_conjuncts(rsb);
    for conjunct in &expected {
        assert!(evaluated.contains(conjunct), "conjunct {conjunct} missing from plan {rsb:?}");
    }
}

#[test]
fn test_three_way_join_keeps_every_predicate() {
    let fixture = Fixture::new(orders_catalog());
    let mut csb = scratch(3);
    let boolean = conjoin(predicate_pool()).unwrap();
    let mut rse = RseNode::new(relations(3)).with_boolean(boolean.clone());

    let rsb = compile(fixture.env(), &mut csb, &mut rse).unwrap();
    assert_no_predicate_loss(&rsb, &boolean, &csb);
    assert!(get_plan(&[&rsb], false).contains("T1 INDEX (T1_FK"));
    for stream in 0..3 {
        assert!(csb.get(stream).unwrap().indices.is_none());
    }
}

#[test]
fn test_replanning_is_idempotent() {
    let fixture = Fixture::new(orders_catalog());
    let mut csb = scratch(3);
    let rse = RseNode::new(relations(3)).with_boolean(conjoin(predicate_pool()).unwrap()).with_sort(SortClause::ascending(vec![field(0, 1)]));

    let first = compile(fixture.env(), &mut csb, &mut rse.clone()).unwrap();
    let second = compile(fixture.env(), &mut csb, &mut rse.clone()).unwrap();
    assert_eq!(first, second);
    assert_eq!(get_plan(&[&first], true), get_plan(&[&second], true));
}

#[test]
fn test_unrelated_rivers_hash_joined() {
    let fixture = Fixture::new(StaticCatalog::new());
    let mut csb = scratch(2);
    let mut rse = RseNode::new(relations(2)).with_boolean(BoolExpr::eq(field(0, 0), field(1, 0)));

    let rsb = compile(fixture.env(), &mut csb, &mut rse).unwrap();
    let RecordSource::Filter { input, boolean } = &rsb else {
        panic!("expected the join keys re-checked above the join, got {rsb:?}");
    };
    assert_eq!(boolean, &BoolExpr::eq(field(0, 0), field(1, 0)));
    let RecordSource::HashJoin { args, keys } = input.as_ref() else {
        panic!("expected a hash join, got {input:?}");
    };
    assert_eq!(args.len(), 2);
    assert_eq!(keys.len(), 2);
    assert_eq!(fixture.diagnostics.decisions("equi_join").len(), 1);
}

#[test]
fn test_merge_join_when_preferred() {
    let mut fixture = Fixture::new(StaticCatalog::new());
    fixture.config.prefer_merge_join = true;
    let mut csb = scratch(2);
    let mut rse = RseNode::new(relations(2)).with_boolean(BoolExpr::eq(field(0, 0), field(1, 0)));

    let rsb = compile(fixture.env(), &mut csb, &mut rse).unwrap();
    let RecordSource::Filter { input, .. } = &rsb else {
        panic!("expected a filter, got {rsb:?}");
    };
    let RecordSource::MergeJoin { args, .. } = input.as_ref() else {
        panic!("expected a merge join, got {input:?}");
    };
    assert!(args.iter().all(|arg| matches!(arg, RecordSource::Sort { .. })));
}

#[test]
fn test_full_outer_join_has_anti_join_pass() {
    let fixture = Fixture::new(StaticCatalog::new());
    let mut csb = scratch(2);
    let on = BoolExpr::eq(field(0, 0), field(1, 0));
    let mut rse = RseNode::new(relations(2)).with_join_type(JoinType::Full).with_boolean(on.clone());

    let rsb = compile(fixture.env(), &mut csb, &mut rse).unwrap();
    let RecordSource::FullOuterJoin { first, second } = &rsb else {
        panic!("expected a full outer join, got {rsb:?}");
    };
    assert!(matches!(first.as_ref(), RecordSource::NestedLoopJoin { kind: JoinKind::Outer, .. }));
    assert!(matches!(second.as_ref(), RecordSource::NestedLoopJoin { kind: JoinKind::Anti, .. }));
    // The join condition is evaluated once per pass.
    for pass in [first, second] {
        assert!(evaluated_conjuncts(pass).contains(&on));
    }
    assert_eq!(fixture.diagnostics.decisions("outer_join").len(), 1);
}

#[test]
fn test_navigational_plan_requires_order() {
    let catalog = StaticCatalog::new().with_relation("T0", 1000.0, vec![IndexDescriptor::new(4, "T0_ORDER", vec![1], 0.01)]);
    let fixture = Fixture::new(catalog);
    let plan = PlanConstraint::Retrieve {
        stream: 0,
        access: Some(AccessType { kind: AccessKind::Navigational, items: vec![AccessItem { relation_id: 1, index_id: 4, index_name: "T0_ORDER".to_string() }] }),
    };
    let rse = RseNode::new(relations(1)).with_boolean(BoolExpr::eq(field(0, 0), int(1))).with_plan(plan);

    let mut csb = scratch(1);
    let err = compile(fixture.env(), &mut csb, &mut rse.clone()).unwrap_err();
    assert!(matches!(err, OptimizerError::IndexUnused(ref name) if name == "T0_ORDER"));
    assert!(csb.get(0).unwrap().indices.is_none());

    let mut csb = scratch(1);
    let mut ordered = rse.with_sort(SortClause::ascending(vec![field(0, 1)]));
    let rsb = compile(fixture.env(), &mut csb, &mut ordered).unwrap();
    assert_eq!(get_plan(&[&rsb], false).trim(), "PLAN (T0 ORDER T0_ORDER)");
}

#[test]
fn test_between_counts_against_conjunct_limit() {
    let mut fixture = Fixture::new(StaticCatalog::new());
    fixture.config.max_conjuncts = 1;
    let mut csb = scratch(1);
    let mut rse = RseNode::new(relations(1)).with_boolean(BoolExpr::between(field(0, 0), int(1), int(2)));

    let err = compile(fixture.env(), &mut csb, &mut rse).unwrap_err();
    assert!(matches!(err, OptimizerError::BlockExceeded { count: 2, limit: 1 }));
}

#[test]
fn test_procedure_source_scanned() {
    let fixture = Fixture::new(StaticCatalog::new());
    let definitions = vec![StreamDefinition { stream: 0, alias: Some("P".to_string()), ..StreamDefinition::default() }];
    let mut csb = CompilerScratch::new(definitions);
    let source = ProcedureSource { stream: 0, name: "GET_ROWS".to_string(), inputs: vec![int(3)] };
    let mut rse = RseNode::new(vec![RecordSourceNode::Procedure(source)]);

    let rsb = compile(fixture.env(), &mut csb, &mut rse).unwrap();
    assert!(matches!(rsb, RecordSource::ProcedureScan { ref procedure, .. } if procedure == "GET_ROWS"));
    assert_eq!(get_plan(&[&rsb], false).trim(), "PLAN (P NATURAL)");
}

#[test]
fn test_diagnostics_trail_records_candidates() {
    let fixture = Fixture::new(orders_catalog());
    let mut csb = scratch(2);
    let mut rse = RseNode::new(relations(2)).with_boolean(BoolExpr::eq(field(0, 0), field(1, 1)));

    compile(fixture.env(), &mut csb, &mut rse).unwrap();
    let entries = fixture.diagnostics.entries();
    assert!(entries.iter().any(|entry| matches!(entry, DiagnosticEntry::Candidate { stream: 1, description, .. } if description.contains("T1_FK"))));
    assert!(!fixture.diagnostics.decisions("join_order").is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_no_predicate_loss(mask in prop::collection::vec(any::<bool>(), 7), merge in any::<bool>()) {
        let chosen: Vec<BoolExpr> = predicate_pool().into_iter().zip(&mask).filter(|(_, keep)| **keep).map(|(predicate, _)| predicate).collect();
        prop_assume!(!chosen.is_empty());
        let boolean = conjoin(chosen).unwrap();

        let mut fixture = Fixture::new(orders_catalog());
        fixture.config.prefer_merge_join = merge;
        let mut csb = scratch(3);
        let mut rse = RseNode::new(relations(3)).with_boolean(boolean.clone());

        let rsb = compile(fixture.env(), &mut csb, &mut rse).unwrap();
        assert_no_predicate_loss(&rsb, &boolean, &csb);
        let mut used = rsb.used_streams();
        used.sort_unstable();
        prop_assert_eq!(used, vec![0, 1, 2]);
    }
}
