use std::collections::BTreeMap;

/// Euclidean distance between two coordinate arrays.
pub fn euclidean<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += (x - y).powi(2);
    }
    sum.sqrt()
}

/// Memoizes distance evaluations over unordered pairs.
///
/// A fresh cache is built at the start of a node split and dropped when the
/// split completes, so each pair touched by the promotion and partition pass
/// is evaluated at most once.
pub struct CachedDistance<'a, D> {
    distance_fn: &'a dyn Fn(&D, &D) -> f64,
    cache: BTreeMap<(D, D), f64>,
}

impl<'a, D: Clone + Ord> CachedDistance<'a, D> {
    pub fn new<F: Fn(&D, &D) -> f64>(distance_fn: &'a F) -> Self {
        CachedDistance {
            distance_fn,
            cache: BTreeMap::new(),
        }
    }

    /// Returns the distance between `a` and `b`, computing it only if no
    /// ordering of the pair has been seen before.
    pub fn distance(&mut self, a: &D, b: &D) -> f64 {
        let key = (a.clone(), b.clone());
        if let Some(&distance) = self.cache.get(&key) {
            return distance;
        }
        let distance = (self.distance_fn)(a, b);
        self.cache.insert((b.clone(), a.clone()), distance);
        self.cache.insert(key, distance);
        distance
    }
}
