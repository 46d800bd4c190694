//! Reduction operators for `all_reduce`, `reduce`, and `scan`.
//!
//! Any `Fn(&T, &T) -> T` can be used as an operator. The named operators in
//! this module additionally declare a [`NativeOp`], the transport-level
//! equivalent a distributed backend may use in its place. An operator with
//! a native equivalent is commutative; one without is only assumed to be
//! associative, and the distributed backend combines its operands in rank
//! order.

use std::ops::{Add, BitAnd, BitOr, BitXor, Mul};

/// Reductions a transport understands without being handed a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOp {
    Sum,
    Product,
    Max,
    Min,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
}

/// A pure, associative binary operator over `T`.
pub trait ReduceOperation<T> {
    /// The transport-native equivalent of this operator, if any.
    const NATIVE: Option<NativeOp> = None;

    fn apply(&self, lhs: &T, rhs: &T) -> T;

    /// Whether operands may be combined in any order.
    fn is_commutative(&self) -> bool {
        Self::NATIVE.is_some()
    }
}

impl<T, F> ReduceOperation<T> for F
where
    F: Fn(&T, &T) -> T,
{
    fn apply(&self, lhs: &T, rhs: &T) -> T {
        self(lhs, rhs)
    }
}

/// Addition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plus;

impl<T> ReduceOperation<T> for Plus
where
    T: Add<Output = T> + Clone,
{
    const NATIVE: Option<NativeOp> = Some(NativeOp::Sum);

    fn apply(&self, lhs: &T, rhs: &T) -> T {
        lhs.clone() + rhs.clone()
    }
}

/// Multiplication.
#[derive(Debug, Clone, Copy, Default)]
pub struct Multiplies;

impl<T> ReduceOperation<T> for Multiplies
where
    T: Mul<Output = T> + Clone,
{
    const NATIVE: Option<NativeOp> = Some(NativeOp::Product);

    fn apply(&self, lhs: &T, rhs: &T) -> T {
        lhs.clone() * rhs.clone()
    }
}

/// The larger of the two operands; the left one on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maximum;

impl<T> ReduceOperation<T> for Maximum
where
    T: PartialOrd + Clone,
{
    const NATIVE: Option<NativeOp> = Some(NativeOp::Max);

    fn apply(&self, lhs: &T, rhs: &T) -> T {
        if rhs > lhs {
            rhs.clone()
        } else {
            lhs.clone()
        }
    }
}

/// The smaller of the two operands; the left one on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct Minimum;

impl<T> ReduceOperation<T> for Minimum
where
    T: PartialOrd + Clone,
{
    const NATIVE: Option<NativeOp> = Some(NativeOp::Min);

    fn apply(&self, lhs: &T, rhs: &T) -> T {
        if rhs < lhs {
            rhs.clone()
        } else {
            lhs.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BitwiseAnd;

impl<T> ReduceOperation<T> for BitwiseAnd
where
    T: BitAnd<Output = T> + Clone,
{
    const NATIVE: Option<NativeOp> = Some(NativeOp::BitwiseAnd);

    fn apply(&self, lhs: &T, rhs: &T) -> T {
        lhs.clone() & rhs.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BitwiseOr;

impl<T> ReduceOperation<T> for BitwiseOr
where
    T: BitOr<Output = T> + Clone,
{
    const NATIVE: Option<NativeOp> = Some(NativeOp::BitwiseOr);

    fn apply(&self, lhs: &T, rhs: &T) -> T {
        lhs.clone() | rhs.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BitwiseXor;

impl<T> ReduceOperation<T> for BitwiseXor
where
    T: BitXor<Output = T> + Clone,
{
    const NATIVE: Option<NativeOp> = Some(NativeOp::BitwiseXor);

    fn apply(&self, lhs: &T, rhs: &T) -> T {
        lhs.clone() ^ rhs.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalAnd;

impl ReduceOperation<bool> for LogicalAnd {
    const NATIVE: Option<NativeOp> = Some(NativeOp::LogicalAnd);

    fn apply(&self, lhs: &bool, rhs: &bool) -> bool {
        *lhs && *rhs
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalOr;

impl ReduceOperation<bool> for LogicalOr {
    const NATIVE: Option<NativeOp> = Some(NativeOp::LogicalOr);

    fn apply(&self, lhs: &bool, rhs: &bool) -> bool {
        *lhs || *rhs
    }
}

/// True when exactly one operand is true.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalXor;

impl ReduceOperation<bool> for LogicalXor {
    const NATIVE: Option<NativeOp> = Some(NativeOp::LogicalXor);

    fn apply(&self, lhs: &bool, rhs: &bool) -> bool {
        *lhs != *rhs
    }
}

/// Combine two equally long runs of values element by element.
pub(crate) fn combine<T, Op>(op: &Op, lhs: &[T], rhs: &[T]) -> Vec<T>
where
    Op: ReduceOperation<T>,
{
    lhs.iter().zip(rhs).map(|(l, r)| op.apply(l, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native_of<T, Op: ReduceOperation<T>>(_: &Op) -> Option<NativeOp> {
        Op::NATIVE
    }

    #[test]
    fn named_operators_apply_directly() {
        assert_eq!(Plus.apply(&2, &3), 5);
        assert_eq!(Multiplies.apply(&2.0, &3.5), 7.0);
        assert_eq!(Maximum.apply(&-1, &4), 4);
        assert_eq!(Minimum.apply(&"b".to_string(), &"a".to_string()), "a");
        assert_eq!(BitwiseAnd.apply(&0b1100u8, &0b1010u8), 0b1000);
        assert_eq!(BitwiseOr.apply(&0b1100u8, &0b1010u8), 0b1110);
        assert_eq!(BitwiseXor.apply(&0b1100u8, &0b1010u8), 0b0110);
        assert!(LogicalXor.apply(&true, &false));
        assert!(!LogicalXor.apply(&true, &true));
        assert!(!LogicalAnd.apply(&true, &false));
        assert!(LogicalOr.apply(&false, &true));
    }

    #[test]
    fn named_operators_have_native_equivalents() {
        assert_eq!(native_of::<i32, _>(&Maximum), Some(NativeOp::Max));
        assert_eq!(native_of::<i32, _>(&Minimum), Some(NativeOp::Min));
        assert_eq!(native_of::<u8, _>(&BitwiseXor), Some(NativeOp::BitwiseXor));
        assert_eq!(native_of::<bool, _>(&LogicalXor), Some(NativeOp::LogicalXor));
        assert!(ReduceOperation::<i64>::is_commutative(&Plus));
    }

    #[test]
    fn closures_pass_straight_through() {
        let concat = |a: &String, b: &String| format!("{}{}", a, b);
        assert_eq!(concat.apply(&"ab".to_string(), &"c".to_string()), "abc");
        assert_eq!(native_of::<String, _>(&concat), None);
        assert!(!ReduceOperation::<String>::is_commutative(&concat));
    }

    #[test]
    fn combine_works_element_wise() {
        assert_eq!(combine(&Maximum, &[1, 5, 3], &[4, 2, 3]), vec![4, 5, 3]);
    }
}
