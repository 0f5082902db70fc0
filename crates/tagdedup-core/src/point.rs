//! Abstract view of a point: an unordered collection of (tag, value) string pairs.
//!
//! Hosts adapt their native record type by implementing `Point`; the engine only ever
//! iterates the pairs and never relies on their order.

use std::collections::{BTreeMap, HashMap};

/// A set of (tag, value) attribute pairs.
pub trait Point {
    /// Iterates the point's attributes in any order.
    fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + '_;
}

impl<K, V, S> Point for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }
}

impl<K, V> Point for BTreeMap<K, V>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }
}

impl<K, V> Point for [(K, V)]
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }
}

impl<K, V, const N: usize> Point for [(K, V); N]
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.as_slice().attributes()
    }
}

impl<K, V> Point for Vec<(K, V)>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.as_slice().attributes()
    }
}

impl<P> Point for &P
where
    P: Point + ?Sized,
{
    fn attributes(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        (**self).attributes()
    }
}
