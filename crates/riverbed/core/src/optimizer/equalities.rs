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

//! Equality inference over the conjuncts of one query expression.

use riverbed_common::{BoolExpr, CmpOp, Comparison, FieldRef, ValueExpr};

/// Operators whose field operand may be replaced by any member of its equality class.
const INFERABLE_OPS: [CmpOp; 9] = [CmpOp::Eql, CmpOp::Gtr, CmpOp::Geq, CmpOp::Leq, CmpOp::Lss, CmpOp::Matching, CmpOp::Containing, CmpOp::Like, CmpOp::Similar];

/// Appends conjuncts implied by field equalities and returns how many were added.
///
/// From `a = b` and `a $ c` this infers `b $ c`. At most `base_count` conjuncts
/// are injected, and nothing at all once the doubled count would pass `max_conjuncts`.
pub fn distribute_equalities(conjuncts: &mut Vec<BoolExpr>, base_count: usize, max_conjuncts: usize) -> usize {
    if base_count * 2 > max_conjuncts {
        return 0;
    }

    let classes = equality_classes(conjuncts);
    if classes.is_empty() {
        return 0;
    }

    let mut count = 0;
    for class in classes.iter().filter(|class| class.len() >= 2) {
        for (i, outer) in class.iter().enumerate() {
            for inner in &class[i + 1..] {
                if count < base_count && augment(conjuncts, BoolExpr::eq(ValueExpr::Field(*outer), ValueExpr::Field(*inner))) {
                    count += 1;
                }
            }
        }
    }

    let snapshot = conjuncts.len();
    for slot in 0..snapshot {
        let Some(cmp) = conjuncts[slot].as_comparison().filter(|cmp| INFERABLE_OPS.contains(&cmp.op)).cloned() else {
            continue;
        };
        let (field, reverse) = match (cmp.arg1.as_field(), cmp.arg2.as_field()) {
            (Some(field), _) => (field, false),
            (None, Some(field)) => (field, true),
            (None, None) => continue,
        };
        let other = if reverse { &cmp.arg1 } else { &cmp.arg2 };
        if !other.is_constant_like() {
            continue;
        }

        let Some(class) = classes.iter().find(|class| class.contains(&field)) else {
            continue;
        };
        for &member in class.iter().filter(|&&member| member != field) {
            if count >= base_count {
                break;
            }
            if augment(conjuncts, inference_node(&cmp, member, reverse)) {
                count += 1;
            }
        }
    }

    count
}

/// Disjoint classes of fields known to be equal.
fn equality_classes(conjuncts: &[BoolExpr]) -> Vec<Vec<FieldRef>> {
    let mut classes: Vec<Vec<FieldRef>> = Vec::new();
    for node in conjuncts.iter().filter(|node| !node.is_deoptimized()) {
        let Some(cmp) = node.as_comparison().filter(|cmp| cmp.op == CmpOp::Eql) else {
            continue;
        };
        let (Some(field1), Some(field2)) = (cmp.arg1.as_field(), cmp.arg2.as_field()) else {
            continue;
        };

        if let Some(class) = classes.iter_mut().find(|class| class.contains(&field1)) {
            if !class.contains(&field2) {
                class.push(field2);
            }
        } else if let Some(class) = classes.iter_mut().find(|class| class.contains(&field2)) {
            class.push(field1);
        } else {
            classes.push(vec![field1, field2]);
        }
    }

    // A = B, C = D, B = C leaves two classes that share a member
    let mut i = 0;
    while i < classes.len() {
        let mut j = i + 1;
        while j < classes.len() {
            if classes[j].iter().any(|field| classes[i].contains(field)) {
                let absorbed = classes.remove(j);
                for field in absorbed {
                    if !classes[i].contains(&field) {
                        classes[i].push(field);
                    }
                }
                j = i + 1;
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    classes
}

/// Copy of `cmp` with its field operand replaced by `member`.
fn inference_node(cmp: &Comparison, member: FieldRef, reverse: bool) -> BoolExpr {
    let mut inferred = cmp.clone();
    if reverse {
        inferred.arg2 = ValueExpr::Field(member);
    } else {
        inferred.arg1 = ValueExpr::Field(member);
    }
    BoolExpr::Compare(Box::new(inferred))
}

fn augment(conjuncts: &mut Vec<BoolExpr>, node: BoolExpr) -> bool {
    if conjuncts.iter().any(|existing| existing.equivalent(&node)) {
        return false;
    }
    conjuncts.push(node);
    true
}
