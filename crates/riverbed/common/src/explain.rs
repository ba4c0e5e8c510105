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

//! Plan text.
//!
//! The legacy form is one line per access path (`PLAN JOIN (A NATURAL, B INDEX (B_PK))`);
//! the detailed form prints one operator per line with indentation.

use crate::plan::{Inversion, JoinKind, RecordSource, ScanTarget};

/// Renders the access paths of `sources`, one per top-level plan.
pub fn get_plan(sources: &[&RecordSource], detailed: bool) -> String {
    let mut plan = String::new();
    for source in sources {
        if detailed {
            plan.push_str("\nSelect Expression");
            print_detailed(source, 1, &mut plan);
        } else {
            plan.push_str("\nPLAN ");
            print_legacy(source, 0, &mut plan);
        }
    }
    plan
}

fn print_legacy(source: &RecordSource, level: usize, plan: &mut String) {
    match source {
        RecordSource::FullTableScan(target) | RecordSource::ExternalTableScan(target) | RecordSource::VirtualTableScan { target, .. } => {
            leaf(plan, level, &format!("{} NATURAL", target.alias));
        }
        RecordSource::ProcedureScan { alias, .. } => leaf(plan, level, &format!("{alias} NATURAL")),
        RecordSource::BitmapTableScan { target, inversion } => {
            leaf(plan, level, &format!("{} INDEX ({})", target.alias, inversion.index_names().join(", ")));
        }
        RecordSource::IndexTableScan { target, index_name, inversion, .. } => {
            let mut text = format!("{} ORDER {index_name}", target.alias);
            if let Some(inversion) = inversion {
                text.push_str(&format!(" INDEX ({})", inversion.index_names().join(", ")));
            }
            leaf(plan, level, &text);
        }
        RecordSource::Conditional { first, second, .. } => {
            plan.push('(');
            print_legacy(first, level + 1, plan);
            plan.push_str(", ");
            print_legacy(second, level + 1, plan);
            plan.push(')');
        }
        RecordSource::NestedLoopJoin { args, .. } => group(plan, "JOIN", args.iter(), level),
        RecordSource::FullOuterJoin { first, second } => group(plan, "JOIN", [first.as_ref(), second.as_ref()].into_iter(), level),
        RecordSource::HashJoin { args, .. } => group(plan, "HASH", args.iter(), level),
        RecordSource::MergeJoin { args, .. } => group(plan, "MERGE", args.iter(), level),
        RecordSource::Sort { input, .. } => {
            plan.push_str("SORT (");
            print_legacy(input, level + 1, plan);
            plan.push(')');
        }
        RecordSource::Filter { input, .. } | RecordSource::Aggregate { input, .. } | RecordSource::Skip { input, .. } | RecordSource::First { input, .. } | RecordSource::Lock { input } => {
            print_legacy(input, level, plan)
        }
    }
}

fn leaf(plan: &mut String, level: usize, text: &str) {
    if level == 0 {
        plan.push('(');
    }
    plan.push_str(text);
    if level == 0 {
        plan.push(')');
    }
}

fn group<'a>(plan: &mut String, keyword: &str, args: impl Iterator<Item = &'a RecordSource>, level: usize) {
    plan.push_str(keyword);
    plan.push_str(" (");
    for (i, arg) in args.enumerate() {
        if i > 0 {
            plan.push_str(", ");
        }
        print_legacy(arg, level + 1, plan);
    }
    plan.push(')');
}

fn line(plan: &mut String, level: usize, text: &str) {
    plan.push('\n');
    plan.push_str(&"    ".repeat(level));
    plan.push_str("-> ");
    plan.push_str(text);
}

fn table(target: &ScanTarget) -> String {
    if target.alias == target.relation {
        format!("Table \"{}\"", target.relation)
    } else {
        format!("Table \"{}\" as \"{}\"", target.relation, target.alias)
    }
}

fn print_inversion(inversion: &Inversion, level: usize, plan: &mut String) {
    match inversion {
        Inversion::Index(retrieval) => {
            let kind = if retrieval.predicates.iter().all(|p| p.as_comparison().is_some_and(|c| c.op.is_equality())) { "Unique Scan" } else { "Range Scan" };
            line(plan, level, &format!("Index \"{}\" {kind}", retrieval.index_name));
        }
        Inversion::And(a, b) => {
            line(plan, level, "Bitmap And");
            print_inversion(a, level + 1, plan);
            print_inversion(b, level + 1, plan);
        }
        Inversion::Or(a, b) => {
            line(plan, level, "Bitmap Or");
            print_inversion(a, level + 1, plan);
            print_inversion(b, level + 1, plan);
        }
        Inversion::DbKey(_) => line(plan, level, "DBKEY"),
    }
}

fn print_detailed(source: &RecordSource, level: usize, plan: &mut String) {
    match source {
        RecordSource::FullTableScan(target) => line(plan, level, &format!("{} Full Scan", table(target))),
        RecordSource::ExternalTableScan(target) => line(plan, level, &format!("{} External Scan", table(target))),
        RecordSource::VirtualTableScan { target, table: kind } => line(plan, level, &format!("{} {kind:?} Scan", table(target))),
        RecordSource::ProcedureScan { alias, procedure, .. } => line(plan, level, &format!("Procedure \"{procedure}\" as \"{alias}\" Scan")),
        RecordSource::BitmapTableScan { target, inversion } => {
            line(plan, level, &format!("{} Access By ID", table(target)));
            line(plan, level + 1, "Bitmap");
            print_inversion(inversion, level + 2, plan);
        }
        RecordSource::IndexTableScan { target, index_name, inversion, .. } => {
            line(plan, level, &format!("{} Access By ID", table(target)));
            line(plan, level + 1, &format!("Index \"{index_name}\" Full Scan"));
            if let Some(inversion) = inversion {
                line(plan, level + 2, "Bitmap");
                print_inversion(inversion, level + 3, plan);
            }
        }
        RecordSource::Conditional { first, second, .. } => {
            line(plan, level, "Condition");
            print_detailed(first, level + 1, plan);
            print_detailed(second, level + 1, plan);
        }
        RecordSource::Filter { input, .. } => {
            line(plan, level, "Filter");
            print_detailed(input, level + 1, plan);
        }
        RecordSource::NestedLoopJoin { kind, args, .. } => {
            let kind = match kind {
                JoinKind::Inner => "inner",
                JoinKind::Outer => "outer",
                JoinKind::Anti => "anti",
            };
            line(plan, level, &format!("Nested Loop Join ({kind})"));
            for arg in args {
                print_detailed(arg, level + 1, plan);
            }
        }
        RecordSource::FullOuterJoin { first, second } => {
            line(plan, level, "Full Outer Join");
            print_detailed(first, level + 1, plan);
            print_detailed(second, level + 1, plan);
        }
        RecordSource::HashJoin { args, .. } => {
            line(plan, level, "Hash Join (inner)");
            for arg in args {
                print_detailed(arg, level + 1, plan);
            }
        }
        RecordSource::MergeJoin { args, .. } => {
            line(plan, level, "Merge Join (inner)");
            for arg in args {
                print_detailed(arg, level + 1, plan);
            }
        }
        RecordSource::Sort { input, map } => {
            let mut level = level;
            if map.flags.refetch {
                line(plan, level, "Refetch");
                level += 1;
            }
            let kind = if map.flags.project { "Unique Sort" } else { "Sort" };
            line(plan, level, &format!("{kind} (record length: {}, key length: {})", map.length, map.key_length));
            print_detailed(input, level + 1, plan);
        }
        RecordSource::Aggregate { input, .. } => {
            line(plan, level, "Aggregate");
            print_detailed(input, level + 1, plan);
        }
        RecordSource::Skip { input, count } => {
            line(plan, level, &format!("Skip {count} Records"));
            print_detailed(input, level + 1, plan);
        }
        RecordSource::First { input, count } => {
            line(plan, level, &format!("First {count} Records"));
            print_detailed(input, level + 1, plan);
        }
        RecordSource::Lock { input } => {
            line(plan, level, "Write Lock");
            print_detailed(input, level + 1, plan);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BoolExpr, ValueExpr};
    use crate::plan::IndexRetrieval;
    use crate::value::Literal;

    fn target(stream: usize, name: &str) -> ScanTarget {
        ScanTarget { stream, alias: name.to_string(), relation: name.to_string() }
    }

    fn sample() -> RecordSource {
        let inversion = Inversion::Index(IndexRetrieval {
            index_id: 0,
            index_name: "B_PK".to_string(),
            predicates: vec![BoolExpr::eq(ValueExpr::field(1, 0), ValueExpr::field(0, 0))],
        });
        RecordSource::NestedLoopJoin {
            kind: JoinKind::Inner,
            args: vec![
                RecordSource::FullTableScan(target(0, "A")),
                RecordSource::filter(
                    RecordSource::BitmapTableScan { target: target(1, "B"), inversion },
                    Some(BoolExpr::eq(ValueExpr::field(1, 1), ValueExpr::literal(Literal::Integer(1)))),
                ),
            ],
            boolean: None,
        }
    }

    #[test]
    fn test_legacy_plan() {
        assert_eq!(get_plan(&[&sample()], false), "\nPLAN JOIN (A NATURAL, B INDEX (B_PK))");
        let single = RecordSource::FullTableScan(target(0, "A"));
        assert_eq!(get_plan(&[&single], false), "\nPLAN (A NATURAL)");
    }

    #[test]
    fn test_detailed_plan() {
        let text = get_plan(&[&sample()], true);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "Select Expression");
        assert_eq!(lines[2], "    -> Nested Loop Join (inner)");
        assert_eq!(lines[3], "        -> Table \"A\" Full Scan");
        assert_eq!(lines[4], "        -> Filter");
        assert_eq!(lines[5], "            -> Table \"B\" Access By ID");
        assert_eq!(lines[7], "                    -> Index \"B_PK\" Unique Scan");
    }
}
