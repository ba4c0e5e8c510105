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

//! Splitting a boolean into independently usable conjuncts.

use riverbed_common::{BoolExpr, CmpOp, Comparison, FormatSource, Literal, ValueExpr};

const LIKE_MATCH_ONE: char = '_';
const LIKE_MATCH_ANY: char = '%';
const SIMILAR_SPECIALS: &str = "[]()|^-+*%_?{}";

/// Pushes the conjuncts of `node` onto `out` and returns how many were pushed.
///
/// AND nodes are split. An OR stays a single conjunct, but a side that splits
/// into several conjuncts is rebuilt as a chain of ANDs. BETWEEN becomes a pair
/// of bounds and a LIKE/SIMILAR with a literal prefix gains a leading
/// STARTING WITH.
pub fn decompose(node: BoolExpr, out: &mut Vec<BoolExpr>, formats: &dyn FormatSource) -> usize {
    match node {
        BoolExpr::And(left, right) => decompose(*left, out, formats) + decompose(*right, out, formats),
        BoolExpr::Or(left, right) => {
            out.push(BoolExpr::or(regroup(*left, formats), regroup(*right, formats)));
            1
        }
        BoolExpr::Compare(cmp) => decompose_comparison(*cmp, out, formats),
        other => {
            out.push(other);
            1
        }
    }
}

/// One side of an OR, with its own conjuncts re-chained as `p0 AND (p1 AND ...)`.
fn regroup(node: BoolExpr, formats: &dyn FormatSource) -> BoolExpr {
    let mut parts = Vec::new();
    // decompose always pushes at least one conjunct
    let last = decompose(node, &mut parts, formats) - 1;
    let mut chain = parts.remove(last);
    for part in parts.into_iter().rev() {
        chain = BoolExpr::and(part, chain);
    }
    chain
}

fn decompose_comparison(cmp: Comparison, out: &mut Vec<BoolExpr>, formats: &dyn FormatSource) -> usize {
    match cmp.op {
        CmpOp::Between => {
            let Comparison { arg1, arg2, arg3, .. } = cmp;
            let Some(high) = arg3 else {
                out.push(BoolExpr::compare(CmpOp::Geq, arg1, arg2));
                return 1;
            };
            let low_arg = arg1.clone();
            out.push(BoolExpr::compare(CmpOp::Geq, low_arg, arg2));
            out.push(BoolExpr::compare(CmpOp::Leq, arg1, high));
            2
        }
        CmpOp::Like | CmpOp::Similar => match pattern_prefix(&cmp, formats) {
            Some(prefix) => {
                out.push(BoolExpr::compare(CmpOp::Starting, cmp.arg1.clone(), ValueExpr::literal(prefix)));
                out.push(BoolExpr::Compare(Box::new(cmp)));
                2
            }
            None => {
                out.push(BoolExpr::Compare(Box::new(cmp)));
                1
            }
        },
        _ => {
            out.push(BoolExpr::Compare(Box::new(cmp)));
            1
        }
    }
}

/// Literal prefix every value matching the pattern must start with.
///
/// Only applies when the pattern and escape are literal text and the matched
/// expression is text.
pub fn pattern_prefix(cmp: &Comparison, formats: &dyn FormatSource) -> Option<Literal> {
    let ValueExpr::Literal(pattern @ Literal::Text { .. }) = &cmp.arg2 else {
        return None;
    };
    let escape = match &cmp.arg3 {
        None => None,
        Some(ValueExpr::Literal(Literal::Text { value, .. })) => Some(value.chars().next()?),
        Some(_) => return None,
    };
    if !cmp.arg1.desc(formats).dtype.is_text() {
        return None;
    }

    let text = pattern.as_text()?;
    let prefix = match cmp.op {
        CmpOp::Like => like_prefix(text, escape)?,
        CmpOp::Similar => similar_prefix(text, escape)?,
        _ => return None,
    };
    if prefix.is_empty() {
        return None;
    }
    let text_type = match &pattern {
        Literal::Text { text_type, .. } => text_type.clone(),
        _ => Default::default(),
    };
    Some(Literal::Text { value: prefix, text_type })
}

pub fn like_prefix(pattern: &str, escape: Option<char>) -> Option<String> {
    let is_wildcard = |c: char| c == LIKE_MATCH_ONE || c == LIKE_MATCH_ANY;
    let mut chars = pattern.chars().peekable();
    if let Some(&first) = chars.peek()
        && Some(first) != escape
        && is_wildcard(first)
    {
        return None;
    }

    let mut prefix = String::new();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            match chars.next() {
                Some(literal) => prefix.push(literal),
                None => break,
            }
        } else if is_wildcard(c) {
            break;
        } else {
            prefix.push(c);
        }
    }
    Some(prefix)
}

/// Returns None for an escape followed by an ordinary character.
pub fn similar_prefix(pattern: &str, escape: Option<char>) -> Option<String> {
    let is_special = |c: char| SIMILAR_SPECIALS.contains(c);
    let mut chars = pattern.chars();
    let mut prefix = String::new();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            let next = chars.next()?;
            if Some(next) != escape && !is_special(next) {
                return None;
            }
            prefix.push(next);
        } else if is_special(c) {
            break;
        } else {
            prefix.push(c);
        }
    }
    Some(prefix)
}
