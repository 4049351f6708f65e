//! Composite keys: the typed per-dimension values and their configurable
//! total order.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::sources::{MissingOrder, Order, SourceSpec};

/// A single dimension of a composite key.
///
/// `Missing` is a first-class value, not absence: it participates in the
/// ordering according to the source's missing placement rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyValue {
    /// The document had no value for this source.
    Missing,
    /// A string key (terms on a text field).
    Str(String),
    /// A signed integer key (numeric terms, date histogram epoch
    /// milliseconds, encoded geo tiles).
    I64(i64),
    /// A float key (histogram buckets, float terms).
    F64(f64),
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            KeyValue::Missing => {}
            KeyValue::Str(text) => text.hash(state),
            KeyValue::I64(val) => val.hash(state),
            KeyValue::F64(val) => val.to_bits().hash(state),
        }
    }
}

impl KeyValue {
    /// Builds a float key, collapsing `-0.0` into `0.0` so that hashing (on
    /// bits) agrees with equality. NaN must be rejected before this point.
    pub(crate) fn f64(val: f64) -> KeyValue {
        if val == 0.0 {
            KeyValue::F64(0.0)
        } else {
            KeyValue::F64(val)
        }
    }
}

/// An ordered tuple of key values, one per configured source, in source
/// declaration order. Identifies a bucket and doubles as the pagination
/// cursor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey(pub Vec<KeyValue>);

impl Borrow<[KeyValue]> for CompositeKey {
    fn borrow(&self) -> &[KeyValue] {
        &self.0
    }
}

/// Calculates the ordering between two values of one dimension.
///
/// Missing placement is resolved first: `First`/`Last` are absolute and skip
/// the direction negation, `Default` tracks the sort direction. Mixed-type
/// comparisons cannot occur for a correctly bound request.
pub(crate) fn key_value_ordering(
    left: &KeyValue,
    right: &KeyValue,
    order: Order,
    missing_order: MissingOrder,
) -> Ordering {
    use KeyValue as KV;
    let mut forced_ordering = false;
    let asc_ordering = match (left, right) {
        (KV::Missing, KV::Missing) => Ordering::Equal,
        (KV::Missing, _) => {
            forced_ordering = missing_order != MissingOrder::Default;
            match missing_order {
                MissingOrder::First | MissingOrder::Default => Ordering::Less,
                MissingOrder::Last => Ordering::Greater,
            }
        }
        (_, KV::Missing) => {
            forced_ordering = missing_order != MissingOrder::Default;
            match missing_order {
                MissingOrder::First | MissingOrder::Default => Ordering::Greater,
                MissingOrder::Last => Ordering::Less,
            }
        }
        (KV::Str(left), KV::Str(right)) => left.cmp(right),
        (KV::I64(left), KV::I64(right)) => left.cmp(right),
        (KV::F64(left), KV::F64(right)) => left.total_cmp(right),
        (left, right) => panic!("mixed-type composite key comparison: {left:?} vs {right:?}"),
    };
    if !forced_ordering && order == Order::Desc {
        asc_ordering.reverse()
    } else {
        asc_ordering
    }
}

/// The request's composite total order: dimension 0 compares first, ties
/// proceed to dimension 1, and so on.
#[derive(Clone, Debug)]
pub struct CompositeOrdering {
    dims: Vec<(Order, MissingOrder)>,
}

impl CompositeOrdering {
    pub(crate) fn from_sources(sources: &[SourceSpec]) -> CompositeOrdering {
        CompositeOrdering {
            dims: sources
                .iter()
                .map(|source| (source.order(), source.missing_order()))
                .collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_dims_for_tests(dims: Vec<(Order, MissingOrder)>) -> CompositeOrdering {
        CompositeOrdering { dims }
    }

    /// The `(direction, missing placement)` pair of one dimension.
    pub(crate) fn dim(&self, idx: usize) -> (Order, MissingOrder) {
        self.dims[idx]
    }

    /// Compares two composite keys under the configured per-dimension rules.
    pub fn cmp(&self, left: &CompositeKey, right: &CompositeKey) -> Ordering {
        self.cmp_values(&left.0, &right.0)
    }

    pub(crate) fn cmp_values(&self, left: &[KeyValue], right: &[KeyValue]) -> Ordering {
        debug_assert_eq!(left.len(), self.dims.len());
        debug_assert_eq!(right.len(), self.dims.len());
        for (idx, (order, missing_order)) in self.dims.iter().enumerate() {
            let ordering = key_value_ordering(&left[idx], &right[idx], *order, *missing_order);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}
