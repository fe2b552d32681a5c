//! Comparator implementations for index keys.
//!
//! Ordered indexes never rely on the natural order of their keys directly:
//! every comparison goes through a [`Comparator`], which is how descending
//! columns in composite keys are supported.

use alloc::vec::Vec;
use core::cmp::Ordering;
use marrow_core::Key;

pub use marrow_core::schema::Order;

/// Trait for comparing index keys.
pub trait Comparator<K> {
    /// Compares two keys according to the comparator's ordering.
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// Returns true if a < b according to this comparator.
    fn is_less(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Returns true if a == b according to this comparator.
    fn is_equal(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// A simple comparator for keys that implement Ord.
#[derive(Clone, Debug, Default)]
pub struct SimpleComparator {
    order: Order,
}

impl SimpleComparator {
    /// Creates a new simple comparator with the given order.
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    /// Creates an ascending comparator.
    pub fn asc() -> Self {
        Self::new(Order::Asc)
    }

    /// Creates a descending comparator.
    pub fn desc() -> Self {
        Self::new(Order::Desc)
    }

    /// Returns the order of this comparator.
    pub fn order(&self) -> Order {
        self.order
    }
}

impl<K: Ord> Comparator<K> for SimpleComparator {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self.order.apply(a.cmp(b))
    }
}

/// A comparator for (possibly composite) [`Key`]s with one sort direction per
/// component.
///
/// Components are compared with the natural order of `Value`, so a `Null`
/// component is less than any non-null one before the direction is applied.
/// Components past the end of the order list compare ascending; a key that is
/// a strict prefix of another sorts first.
#[derive(Clone, Debug, Default)]
pub struct KeyComparator {
    orders: Vec<Order>,
}

impl KeyComparator {
    /// Creates a new key comparator with the given per-component orders.
    pub fn new(orders: Vec<Order>) -> Self {
        Self { orders }
    }

    /// Creates an all-ascending comparator for `n` components.
    pub fn ascending(n: usize) -> Self {
        Self::new((0..n).map(|_| Order::Asc).collect())
    }

    /// Returns the orders of this comparator.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }
}

impl Comparator<Key> for KeyComparator {
    fn compare(&self, a: &Key, b: &Key) -> Ordering {
        let (a, b) = (a.components(), b.components());
        for (i, (av, bv)) in a.iter().zip(b.iter()).enumerate() {
            let order = self.orders.get(i).copied().unwrap_or_default();
            let cmp = order.apply(av.cmp(bv));
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        a.len().cmp(&b.len())
    }
}
