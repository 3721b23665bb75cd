use std::cmp::Ordering;

use crate::interval::{self, Interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("overlaps an existing entry")]
    Overlap,
}

pub type Comparator<K> = fn(&K, &K) -> Ordering;

type Link<K, V> = Option<Box<Node<K, V>>>;

#[derive(Debug, Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    height: i32,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn leaf(key: K, value: V) -> Box<Self> {
        Box::new(Self {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        })
    }

    fn update(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
    }

    fn balance(&self) -> i32 {
        height(&self.left) - height(&self.right)
    }
}

fn height<K, V>(link: &Link<K, V>) -> i32 {
    link.as_ref().map_or(0, |n| n.height)
}

/// Height-balanced (AVL) search tree whose comparator treats `Equal` as a
/// collision: no two stored keys ever compare `Equal`.
#[derive(Debug, Clone)]
pub struct Tree<K, V> {
    root: Link<K, V>,
    len: usize,
    cmp: Comparator<K>,
}

/// Tree keyed by time intervals; keys never overlap.
pub type IntervalTree<V> = Tree<Interval, V>;

impl<V> Tree<Interval, V> {
    pub fn new() -> Self {
        Self::with_comparator(interval::compare)
    }
}

impl<V> Default for Tree<Interval, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Tree<K, V> {
    pub fn with_comparator(cmp: Comparator<K>) -> Self {
        Self {
            root: None,
            len: 0,
            cmp,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the root, 0 when empty.
    pub fn height(&self) -> usize {
        height(&self.root) as usize
    }

    /// Would `put(key, _)` succeed? Never mutates.
    pub fn could_put(&self, key: &K) -> Result<(), TreeError> {
        match self.find(key) {
            Some(_) => Err(TreeError::Overlap),
            None => Ok(()),
        }
    }

    pub fn put(&mut self, key: K, value: V) -> Result<(), TreeError> {
        self.could_put(&key)?;
        self.root = Some(insert(self.root.take(), key, value, self.cmp));
        self.len += 1;
        Ok(())
    }

    /// Value stored under the key that compares `Equal` to `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|n| &n.value)
    }

    /// Stored key and value matching `key`.
    pub fn get_entry(&self, key: &K) -> Option<(&K, &V)> {
        self.find(key).map(|n| (&n.key, &n.value))
    }

    pub fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let (root, removed) = remove(self.root.take(), key, self.cmp);
        self.root = root;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Smallest entry.
    pub fn first(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_deref()?;
        while let Some(left) = node.left.as_deref() {
            node = left;
        }
        Some((&node.key, &node.value))
    }

    /// In-order traversal.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.root.as_deref())
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    fn find(&self, key: &K) -> Option<&Node<K, V>> {
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            cur = match (self.cmp)(key, &node.key) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(node),
            };
        }
        None
    }
}

fn rotate_right<K, V>(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    node.update();
    pivot.right = Some(node);
    pivot.update();
    pivot
}

fn rotate_left<K, V>(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    node.update();
    pivot.left = Some(node);
    pivot.update();
    pivot
}

fn rebalance<K, V>(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
    node.update();
    let balance = node.balance();
    if balance > 1 {
        if node.left.as_ref().is_some_and(|l| l.balance() < 0) {
            node.left = node.left.take().map(rotate_left);
        }
        return rotate_right(node);
    }
    if balance < -1 {
        if node.right.as_ref().is_some_and(|r| r.balance() > 0) {
            node.right = node.right.take().map(rotate_right);
        }
        return rotate_left(node);
    }
    node
}

// Caller has already ruled out an `Equal` key.
fn insert<K, V>(link: Link<K, V>, key: K, value: V, cmp: Comparator<K>) -> Box<Node<K, V>> {
    let Some(mut node) = link else {
        return Node::leaf(key, value);
    };
    if cmp(&key, &node.key) == Ordering::Greater {
        node.right = Some(insert(node.right.take(), key, value, cmp));
    } else {
        node.left = Some(insert(node.left.take(), key, value, cmp));
    }
    rebalance(node)
}

fn remove<K, V>(link: Link<K, V>, key: &K, cmp: Comparator<K>) -> (Link<K, V>, Option<(K, V)>) {
    let Some(mut node) = link else {
        return (None, None);
    };
    match cmp(key, &node.key) {
        Ordering::Less => {
            let (left, removed) = remove(node.left.take(), key, cmp);
            node.left = left;
            (Some(rebalance(node)), removed)
        }
        Ordering::Greater => {
            let (right, removed) = remove(node.right.take(), key, cmp);
            node.right = right;
            (Some(rebalance(node)), removed)
        }
        Ordering::Equal => {
            let Node {
                key,
                value,
                left,
                right,
                ..
            } = *node;
            let replacement = match (left, right) {
                (None, None) => None,
                (Some(l), None) => Some(l),
                (None, Some(r)) => Some(r),
                (Some(l), Some(r)) => {
                    let (rest, mut min) = take_min(r);
                    min.left = Some(l);
                    min.right = rest;
                    Some(rebalance(min))
                }
            };
            (replacement, Some((key, value)))
        }
    }
}

/// Detach the leftmost node, returning the remaining subtree and that node.
fn take_min<K, V>(mut node: Box<Node<K, V>>) -> (Link<K, V>, Box<Node<K, V>>) {
    match node.left.take() {
        None => {
            let right = node.right.take();
            (right, node)
        }
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        }
    }
}

pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn new(root: Option<&'a Node<K, V>>) -> Self {
        let mut iter = Self { stack: Vec::new() };
        iter.push_left(root);
        iter
    }

    fn push_left(&mut self, mut node: Option<&'a Node<K, V>>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::tests::iv;
    use proptest::prelude::*;

    fn assert_balanced<K, V>(link: &Link<K, V>) -> i32 {
        let Some(node) = link else { return 0 };
        let l = assert_balanced(&node.left);
        let r = assert_balanced(&node.right);
        assert!((l - r).abs() <= 1, "unbalanced node");
        assert_eq!(node.height, 1 + l.max(r));
        node.height
    }

    #[test]
    fn put_rejects_overlap() {
        let mut tree = IntervalTree::new();
        tree.put(iv(0, 5), "a").unwrap();
        tree.put(iv(10, 20), "b").unwrap();
        assert_eq!(tree.put(iv(3, 12), "c"), Err(TreeError::Overlap));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn could_put_does_not_mutate() {
        let mut tree = IntervalTree::new();
        tree.put(iv(0, 5), ()).unwrap();
        assert!(tree.could_put(&iv(6, 9)).is_ok());
        assert_eq!(tree.could_put(&iv(4, 9)), Err(TreeError::Overlap));
        assert_eq!(tree.len(), 1);
        assert!(tree.get(&iv(6, 9)).is_none());
    }

    #[test]
    fn get_matches_on_overlap() {
        let mut tree = IntervalTree::new();
        tree.put(iv(0, 10), "a").unwrap();
        tree.put(iv(20, 30), "b").unwrap();
        assert_eq!(tree.get(&iv(25, 26)), Some(&"b"));
        assert_eq!(tree.get_entry(&iv(2, 3)), Some((&iv(0, 10), &"a")));
        assert_eq!(tree.get(&iv(12, 15)), None);
    }

    #[test]
    fn keys_and_values_are_ordered_and_parallel() {
        let mut tree = IntervalTree::new();
        for (i, start) in [50, 10, 30, 70, 0].into_iter().enumerate() {
            tree.put(iv(start, start + 5), i).unwrap();
        }
        let keys = tree.keys();
        let values = tree.values();
        assert_eq!(keys, vec![iv(0, 5), iv(10, 15), iv(30, 35), iv(50, 55), iv(70, 75)]);
        assert_eq!(values, vec![4, 1, 2, 0, 3]);
        assert_eq!(tree.first(), Some((&iv(0, 5), &4)));
    }

    #[test]
    fn remove_returns_entry_and_keeps_balance() {
        let mut tree = IntervalTree::new();
        for i in 0..64 {
            tree.put(iv(i * 10, i * 10 + 5), i).unwrap();
        }
        assert_balanced(&tree.root);
        for i in (0..64).step_by(3) {
            assert_eq!(tree.remove(&iv(i * 10, i * 10 + 1)), Some((iv(i * 10, i * 10 + 5), i)));
            assert_balanced(&tree.root);
        }
        assert_eq!(tree.len(), 64 - 22);
        assert!(tree.remove(&iv(0, 1)).is_none());
        assert_eq!(tree.len(), 42);
    }

    #[test]
    fn sequential_inserts_stay_logarithmic() {
        let mut tree = IntervalTree::new();
        for i in 0..1024 {
            tree.put(iv(i * 2, i * 2), ()).unwrap();
        }
        assert!(tree.height() <= 11);
    }

    #[test]
    fn empty_tree() {
        let mut tree: IntervalTree<()> = IntervalTree::new();
        assert!(tree.is_empty());
        assert!(tree.first().is_none());
        assert!(tree.remove(&iv(0, 1)).is_none());
        assert!(tree.keys().is_empty());
    }

    #[test]
    fn custom_comparator() {
        let mut tree: Tree<u32, &str> = Tree::with_comparator(|a, b| (a / 10).cmp(&(b / 10)));
        tree.put(12, "teens").unwrap();
        assert_eq!(tree.put(15, "dup"), Err(TreeError::Overlap));
        tree.put(3, "units").unwrap();
        assert_eq!(tree.get(&19), Some(&"teens"));
    }

    proptest! {
        #[test]
        fn stored_keys_never_overlap(
            ops in prop::collection::vec((0i64..500, 0i64..20, any::<bool>()), 1..200)
        ) {
            let mut tree = IntervalTree::new();
            for (start, len, insert) in ops {
                let key = iv(start, start + len);
                if insert {
                    let _ = tree.put(key, ());
                } else {
                    tree.remove(&key);
                }
                assert_balanced(&tree.root);
            }
            let keys = tree.keys();
            prop_assert_eq!(keys.len(), tree.len());
            for pair in keys.windows(2) {
                prop_assert_eq!(interval::compare(&pair[0], &pair[1]), Ordering::Less);
            }
        }
    }
}
