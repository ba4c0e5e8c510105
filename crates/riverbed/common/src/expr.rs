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

//! Expression trees walked by the optimizer.
//!
//! Value expressions and booleans are single-owner trees. The optimizer
//! clones them when it needs a second copy (inferred predicates, the second
//! pass of a full outer join) and never shares nodes between plan operators.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stream::{FieldId, SortedStreamList, StreamId, StreamStates};
use crate::value::{Desc, Literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub stream: StreamId,
    pub field: FieldId,
}

impl FieldRef {
    pub fn new(stream: StreamId, field: FieldId) -> Self {
        Self { stream, field }
    }
}

/// Looks up the descriptor of a stream field.
pub trait FormatSource {
    fn field_desc(&self, field: FieldRef) -> Option<Desc>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueExpr {
    Field(FieldRef),
    Literal(Literal),
    Parameter { index: u16, desc: Desc },
    Variable { index: u16, desc: Desc },
    Cast { source: Box<ValueExpr>, target: Desc },
    Function { name: String, args: Vec<ValueExpr>, result: Desc, volatile: bool },
    Coalesce { args: Vec<ValueExpr>, result: Desc },
    Aggregate { function: AggregateFunction, arg: Option<Box<ValueExpr>>, distinct: bool, result: Desc },
}

impl ValueExpr {
    pub fn field(stream: StreamId, field: FieldId) -> Self {
        ValueExpr::Field(FieldRef::new(stream, field))
    }

    pub fn literal(literal: Literal) -> Self {
        ValueExpr::Literal(literal)
    }

    pub fn cast(source: ValueExpr, target: Desc) -> Self {
        ValueExpr::Cast { source: Box::new(source), target }
    }

    pub fn as_field(&self) -> Option<FieldRef> {
        match self {
            ValueExpr::Field(field) => Some(*field),
            _ => None,
        }
    }

    /// Literal, parameter or variable: a value fixed for the whole execution.
    pub fn is_constant_like(&self) -> bool {
        matches!(self, ValueExpr::Literal(_) | ValueExpr::Parameter { .. } | ValueExpr::Variable { .. })
    }

    pub fn children(&self) -> Vec<&ValueExpr> {
        match self {
            ValueExpr::Field(_) | ValueExpr::Literal(_) | ValueExpr::Parameter { .. } | ValueExpr::Variable { .. } => Vec::new(),
            ValueExpr::Cast { source, .. } => vec![source.as_ref()],
            ValueExpr::Function { args, .. } | ValueExpr::Coalesce { args, .. } => args.iter().collect(),
            ValueExpr::Aggregate { arg, .. } => arg.iter().map(|a| a.as_ref()).collect(),
        }
    }

    /// Returns true when `pred` holds for every field referenced by the expression.
    pub fn all_fields(&self, pred: &mut dyn FnMut(FieldRef) -> bool) -> bool {
        match self {
            ValueExpr::Field(field) => pred(*field),
            _ => self.children().into_iter().all(|child| child.all_fields(&mut *pred)),
        }
    }

    pub fn desc(&self, formats: &dyn FormatSource) -> Desc {
        match self {
            ValueExpr::Field(field) => formats.field_desc(*field).unwrap_or_else(Desc::unknown),
            ValueExpr::Literal(literal) => literal.desc(),
            ValueExpr::Parameter { desc, .. } | ValueExpr::Variable { desc, .. } => desc.clone(),
            ValueExpr::Cast { target, .. } => target.clone(),
            ValueExpr::Function { result, .. } | ValueExpr::Coalesce { result, .. } | ValueExpr::Aggregate { result, .. } => result.clone(),
        }
    }

    /// Whether the expression can be evaluated given the current stream activation.
    ///
    /// With `only_current` every field must belong to `stream` (or a sub-query stream);
    /// otherwise fields of `stream` itself make the expression not computable.
    pub fn computable<S: StreamStates + ?Sized>(&self, states: &S, stream: Option<StreamId>, only_current: bool) -> bool {
        self.all_fields(&mut |field| field_computable(states, field, stream, only_current))
    }

    pub fn find_stream(&self, stream: StreamId) -> bool {
        !self.all_fields(&mut |field| field.stream != stream)
    }

    pub fn collect_streams(&self, streams: &mut SortedStreamList) {
        self.all_fields(&mut |field| {
            streams.insert(field.stream);
            true
        });
    }

    pub fn collect_fields(&self, fields: &mut Vec<FieldRef>) {
        self.all_fields(&mut |field| {
            fields.push(field);
            true
        });
    }

    pub fn streams(&self) -> SortedStreamList {
        let mut streams = SortedStreamList::new();
        self.collect_streams(&mut streams);
        streams
    }

    /// Can turn a NULL input into a non-NULL result.
    pub fn possibly_unknown(&self) -> bool {
        match self {
            ValueExpr::Coalesce { .. } => true,
            _ => self.children().into_iter().any(|child| child.possibly_unknown()),
        }
    }

    pub fn is_volatile(&self) -> bool {
        match self {
            ValueExpr::Function { volatile: true, .. } => true,
            _ => self.children().into_iter().any(|child| child.is_volatile()),
        }
    }

    /// Same value for every row: fields compare by reference, volatile and aggregate nodes never match.
    pub fn equivalent(&self, other: &ValueExpr) -> bool {
        match (self, other) {
            (ValueExpr::Field(a), ValueExpr::Field(b)) => a == b,
            (ValueExpr::Literal(a), ValueExpr::Literal(b)) => a == b,
            (ValueExpr::Parameter { index: a, .. }, ValueExpr::Parameter { index: b, .. }) => a == b,
            (ValueExpr::Variable { index: a, .. }, ValueExpr::Variable { index: b, .. }) => a == b,
            (ValueExpr::Cast { source: s1, target: t1 }, ValueExpr::Cast { source: s2, target: t2 }) => t1 == t2 && s1.equivalent(s2),
            (ValueExpr::Function { name: n1, args: a1, volatile: false, .. }, ValueExpr::Function { name: n2, args: a2, volatile: false, .. }) => n1 == n2 && all_equivalent(a1, a2),
            (ValueExpr::Coalesce { args: a1, .. }, ValueExpr::Coalesce { args: a2, .. }) => all_equivalent(a1, a2),
            _ => false,
        }
    }
}

fn all_equivalent(a: &[ValueExpr], b: &[ValueExpr]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
}

fn field_computable<S: StreamStates + ?Sized>(states: &S, field: FieldRef, stream: Option<StreamId>, only_current: bool) -> bool {
    if only_current {
        if Some(field.stream) != stream && !states.is_sub_stream(field.stream) {
            return false;
        }
    } else if Some(field.stream) == stream {
        return false;
    }
    states.is_active(field.stream)
}

impl fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Field(field) => write!(f, "#{}.{}", field.stream, field.field),
            ValueExpr::Literal(literal) => write!(f, "{literal}"),
            ValueExpr::Parameter { index, .. } => write!(f, "?{index}"),
            ValueExpr::Variable { index, .. } => write!(f, ":v{index}"),
            ValueExpr::Cast { source, target } => write!(f, "CAST({source} AS {})", target.dtype),
            ValueExpr::Function { name, args, .. } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            ValueExpr::Coalesce { args, .. } => {
                f.write_str("COALESCE(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            ValueExpr::Aggregate { function, arg, distinct, .. } => {
                write!(f, "{function:?}(")?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                match arg {
                    Some(arg) => write!(f, "{arg})"),
                    None => f.write_str("*)"),
                }
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[ValueExpr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eql,
    /// IS NOT DISTINCT FROM
    Equiv,
    Neq,
    Gtr,
    Geq,
    Lss,
    Leq,
    Between,
    Like,
    Similar,
    Starting,
    Containing,
    Matching,
}

impl CmpOp {
    pub fn is_symmetric(self) -> bool {
        matches!(self, CmpOp::Eql | CmpOp::Equiv | CmpOp::Neq)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eql | CmpOp::Equiv)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eql => "=",
            CmpOp::Equiv => "IS NOT DISTINCT FROM",
            CmpOp::Neq => "<>",
            CmpOp::Gtr => ">",
            CmpOp::Geq => ">=",
            CmpOp::Lss => "<",
            CmpOp::Leq => "<=",
            CmpOp::Between => "BETWEEN",
            CmpOp::Like => "LIKE",
            CmpOp::Similar => "SIMILAR TO",
            CmpOp::Starting => "STARTING WITH",
            CmpOp::Containing => "CONTAINING",
            CmpOp::Matching => "MATCHING",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    /// Must be evaluated as a row filter, never matched against an index.
    #[serde(default)]
    pub residual: bool,
    /// Excluded from equality inference.
    #[serde(default)]
    pub deoptimize: bool,
    /// Result may be cached for the whole execution.
    #[serde(default)]
    pub invariant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub op: CmpOp,
    pub arg1: ValueExpr,
    pub arg2: ValueExpr,
    /// Upper bound of BETWEEN, escape of LIKE/SIMILAR.
    #[serde(default)]
    pub arg3: Option<ValueExpr>,
    #[serde(default)]
    pub flags: NodeFlags,
}

impl Comparison {
    pub fn new(op: CmpOp, arg1: ValueExpr, arg2: ValueExpr) -> Self {
        Self { op, arg1, arg2, arg3: None, flags: NodeFlags::default() }
    }

    pub fn args(&self) -> impl Iterator<Item = &ValueExpr> {
        [&self.arg1, &self.arg2].into_iter().chain(self.arg3.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoolExpr {
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    Not(Box<BoolExpr>),
    Compare(Box<Comparison>),
    /// IS NULL
    Missing(ValueExpr),
}

impl BoolExpr {
    pub fn and(left: BoolExpr, right: BoolExpr) -> Self {
        BoolExpr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: BoolExpr, right: BoolExpr) -> Self {
        BoolExpr::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: BoolExpr) -> Self {
        BoolExpr::Not(Box::new(inner))
    }

    pub fn compare(op: CmpOp, arg1: ValueExpr, arg2: ValueExpr) -> Self {
        BoolExpr::Compare(Box::new(Comparison::new(op, arg1, arg2)))
    }

    pub fn between(arg1: ValueExpr, low: ValueExpr, high: ValueExpr) -> Self {
        let mut cmp = Comparison::new(CmpOp::Between, arg1, low);
        cmp.arg3 = Some(high);
        BoolExpr::Compare(Box::new(cmp))
    }

    pub fn eq(arg1: ValueExpr, arg2: ValueExpr) -> Self {
        Self::compare(CmpOp::Eql, arg1, arg2)
    }

    /// AND `node` onto an optional accumulated boolean.
    pub fn compose(existing: Option<BoolExpr>, node: BoolExpr) -> BoolExpr {
        match existing {
            Some(existing) => BoolExpr::and(existing, node),
            None => node,
        }
    }

    pub fn as_comparison(&self) -> Option<&Comparison> {
        match self {
            BoolExpr::Compare(cmp) => Some(cmp),
            _ => None,
        }
    }

    pub fn is_residual(&self) -> bool {
        matches!(self, BoolExpr::Compare(cmp) if cmp.flags.residual)
    }

    pub fn is_deoptimized(&self) -> bool {
        matches!(self, BoolExpr::Compare(cmp) if cmp.flags.deoptimize)
    }

    pub fn all_fields(&self, pred: &mut dyn FnMut(FieldRef) -> bool) -> bool {
        match self {
            BoolExpr::And(a, b) | BoolExpr::Or(a, b) => a.all_fields(pred) && b.all_fields(pred),
            BoolExpr::Not(inner) => inner.all_fields(pred),
            BoolExpr::Compare(cmp) => cmp.args().all(|arg| arg.all_fields(&mut *pred)),
            BoolExpr::Missing(value) => value.all_fields(pred),
        }
    }

    pub fn computable<S: StreamStates + ?Sized>(&self, states: &S, stream: Option<StreamId>, only_current: bool) -> bool {
        self.all_fields(&mut |field| field_computable(states, field, stream, only_current))
    }

    pub fn find_stream(&self, stream: StreamId) -> bool {
        !self.all_fields(&mut |field| field.stream != stream)
    }

    pub fn collect_streams(&self, streams: &mut SortedStreamList) {
        self.all_fields(&mut |field| {
            streams.insert(field.stream);
            true
        });
    }

    pub fn streams(&self) -> SortedStreamList {
        let mut streams = SortedStreamList::new();
        self.collect_streams(&mut streams);
        streams
    }

    /// Can evaluate to TRUE or FALSE when its inputs are NULL.
    pub fn possibly_unknown(&self) -> bool {
        match self {
            BoolExpr::Missing(_) | BoolExpr::Not(_) => true,
            BoolExpr::And(a, b) | BoolExpr::Or(a, b) => a.possibly_unknown() || b.possibly_unknown(),
            BoolExpr::Compare(cmp) => cmp.op == CmpOp::Equiv || cmp.args().any(|arg| arg.possibly_unknown()),
        }
    }

    /// Same predicate, treating `a = b` and `b = a` as one.
    pub fn equivalent(&self, other: &BoolExpr) -> bool {
        match (self, other) {
            (BoolExpr::Compare(a), BoolExpr::Compare(b)) => {
                if a.op != b.op {
                    return false;
                }
                let third = match (&a.arg3, &b.arg3) {
                    (None, None) => true,
                    (Some(x), Some(y)) => x.equivalent(y),
                    _ => false,
                };
                let straight = a.arg1.equivalent(&b.arg1) && a.arg2.equivalent(&b.arg2);
                let crossed = a.op.is_symmetric() && a.arg1.equivalent(&b.arg2) && a.arg2.equivalent(&b.arg1);
                third && (straight || crossed)
            }
            (BoolExpr::Missing(a), BoolExpr::Missing(b)) => a.equivalent(b),
            (BoolExpr::Not(a), BoolExpr::Not(b)) => a.equivalent(b),
            (BoolExpr::And(a1, a2), BoolExpr::And(b1, b2)) | (BoolExpr::Or(a1, a2), BoolExpr::Or(b1, b2)) => a1.equivalent(b1) && a2.equivalent(b2),
            _ => false,
        }
    }

    /// Flattens nested ANDs into their leaves, left to right.
    pub fn conjuncts(&self) -> Vec<&BoolExpr> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                BoolExpr::And(a, b) => {
                    pending.push(b.as_ref());
                    pending.push(a.as_ref());
                }
                other => out.push(other),
            }
        }
        out
    }
}

impl fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolExpr::And(a, b) => write!(f, "({a} AND {b})"),
            BoolExpr::Or(a, b) => write!(f, "({a} OR {b})"),
            BoolExpr::Not(inner) => write!(f, "NOT {inner}"),
            BoolExpr::Missing(value) => write!(f, "{value} IS NULL"),
            BoolExpr::Compare(cmp) => match (cmp.op, &cmp.arg3) {
                (CmpOp::Between, Some(high)) => write!(f, "{} BETWEEN {} AND {high}", cmp.arg1, cmp.arg2),
                (CmpOp::Like | CmpOp::Similar, Some(escape)) => write!(f, "{} {} {} ESCAPE {escape}", cmp.arg1, cmp.op.symbol(), cmp.arg2),
                _ => write!(f, "{} {} {}", cmp.arg1, cmp.op.symbol(), cmp.arg2),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::SortedStreamList;

    fn active(streams: &[StreamId]) -> SortedStreamList {
        streams.iter().copied().collect()
    }

    #[test]
    fn test_computable_excludes_own_stream() {
        let cond = BoolExpr::eq(ValueExpr::field(1, 0), ValueExpr::field(2, 0));
        let states = active(&[1, 2]);
        assert!(cond.computable(&states, None, false));
        assert!(!cond.computable(&states, Some(1), false));
        assert!(!cond.computable(&active(&[1]), None, false));
    }

    #[test]
    fn test_computable_only_current_stream() {
        let local = BoolExpr::compare(CmpOp::Gtr, ValueExpr::field(1, 0), ValueExpr::literal(Literal::Integer(3)));
        let join = BoolExpr::eq(ValueExpr::field(1, 0), ValueExpr::field(2, 0));
        let states = active(&[1, 2]);
        assert!(local.computable(&states, Some(1), true));
        assert!(!join.computable(&states, Some(1), true));
    }

    #[test]
    fn test_equivalent_is_commutative_for_equality_only() {
        let a = ValueExpr::field(1, 0);
        let b = ValueExpr::field(2, 3);
        assert!(BoolExpr::eq(a.clone(), b.clone()).equivalent(&BoolExpr::eq(b.clone(), a.clone())));
        assert!(!BoolExpr::compare(CmpOp::Lss, a.clone(), b.clone()).equivalent(&BoolExpr::compare(CmpOp::Lss, b, a)));
    }

    #[test]
    fn test_volatile_functions_are_never_equivalent() {
        let rand = ValueExpr::Function { name: "RAND".to_string(), args: vec![], result: Desc::unknown(), volatile: true };
        assert!(!rand.equivalent(&rand.clone()));
        let upper = ValueExpr::Function { name: "UPPER".to_string(), args: vec![ValueExpr::field(1, 1)], result: Desc::unknown(), volatile: false };
        assert!(upper.equivalent(&upper.clone()));
    }

    #[test]
    fn test_possibly_unknown() {
        let a = ValueExpr::field(1, 0);
        assert!(BoolExpr::Missing(a.clone()).possibly_unknown());
        assert!(BoolExpr::compare(CmpOp::Equiv, a.clone(), ValueExpr::field(2, 0)).possibly_unknown());
        assert!(!BoolExpr::eq(a.clone(), ValueExpr::field(2, 0)).possibly_unknown());
        let coalesce = ValueExpr::Coalesce { args: vec![a, ValueExpr::literal(Literal::Integer(0))], result: Desc::unknown() };
        assert!(BoolExpr::eq(coalesce, ValueExpr::field(2, 0)).possibly_unknown());
    }

    #[test]
    fn test_conjuncts_flattening() {
        let p = |n| BoolExpr::eq(ValueExpr::field(n, 0), ValueExpr::literal(Literal::Integer(n as i64)));
        let tree = BoolExpr::and(BoolExpr::and(p(1), p(2)), p(3));
        let leaves = tree.conjuncts();
        assert_eq!(leaves.len(), 3);
        assert!(leaves[0].equivalent(&p(1)));
        assert!(leaves[2].equivalent(&p(3)));
    }

    #[test]
    fn test_display() {
        let cond = BoolExpr::between(ValueExpr::field(0, 1), ValueExpr::literal(Literal::Integer(1)), ValueExpr::literal(Literal::Integer(9)));
        assert_eq!(cond.to_string(), "#0.1 BETWEEN 1 AND 9");
    }
}
