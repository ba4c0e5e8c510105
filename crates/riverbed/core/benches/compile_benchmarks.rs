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

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use riverbed_common::{BoolExpr, Desc, DType, Format, Literal, RecordSourceNode, RseNode, SortClause, ValueExpr};
use riverbed_core::{CompilerScratch, HeuristicCostModel, IndexDescriptor, NoopDiagnostics, OptimizerConfig, OptimizerEnv, RelationDescriptor, StaticCatalog, StreamDefinition, compile};

fn chain_catalog(streams: usize) -> StaticCatalog {
    (0..streams).fold(StaticCatalog::new(), |catalog, s| {
        let indices = vec![IndexDescriptor::new(1, format!("T{s}_PK"), vec![0], 1.0 / 10_000.0).unique(), IndexDescriptor::new(2, format!("T{s}_FK"), vec![1], 0.001)];
        catalog.with_relation(format!("T{s}"), 1_000.0 * (s as f64 + 1.0), indices)
    })
}

fn chain_query(streams: usize) -> (CompilerScratch, RseNode) {
    let format = Format::new(vec![Desc::of(DType::Long), Desc::of(DType::Long), Desc::of(DType::Double)]);
    let csb = CompilerScratch::new((0..streams).map(|s| StreamDefinition::relation(s, RelationDescriptor::persistent(s as u16 + 1, format!("T{s}")), format.clone()).with_fields(0..3)));

    let mut boolean = BoolExpr::compare(riverbed_common::CmpOp::Gtr, ValueExpr::field(0, 2), ValueExpr::literal(Literal::Double(10.0)));
    for s in 1..streams {
        boolean = BoolExpr::and(boolean, BoolExpr::eq(ValueExpr::field(s - 1, 0), ValueExpr::field(s, 1)));
    }
    let rse = RseNode::new((0..streams).map(RecordSourceNode::relation).collect()).with_boolean(boolean).with_sort(SortClause::ascending(vec![ValueExpr::field(0, 2)]));
    (csb, rse)
}

fn benchmark_chain_join(c: &mut Criterion) {
    let cost_model = HeuristicCostModel::new();
    let config = OptimizerConfig::new();
    let mut group = c.benchmark_group("compile_chain_join");

    for streams in [2usize, 4, 8] {
        let catalog = chain_catalog(streams);
        let env = OptimizerEnv { cost_model: &cost_model, metadata: &catalog, diagnostics: &NoopDiagnostics, config: &config };
        let (csb, rse) = chain_query(streams);
        group.bench_with_input(BenchmarkId::from_parameter(streams), &streams, |b, _| {
            b.iter(|| {
                let mut csb = csb.clone();
                let mut rse = rse.clone();
                black_box(compile(env, &mut csb, &mut rse))
            });
        });
    }
    group.finish();
}

criterion_group!(compile_benches, benchmark_chain_join);
criterion_main!(compile_benches);
