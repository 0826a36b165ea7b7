//! C2: the generic persistent AVL tree (§4.2).
//!
//! Parameterised by a `Payload` (fixed-width, totally ordered against
//! itself and against arbitrary query keys) and an `Annotation` folded
//! bottom-up over the subtree. Every mutation writes a fresh O(log n)
//! spine of nodes and returns a new root offset; existing roots are never
//! touched, so old roots keep reading exactly what they read before
//! (persistence, §8 property 1).
//!
//! Generic over the payload/annotation types via monomorphisation rather
//! than trait objects (§9 "Dynamic dispatch"), since tree descent is the
//! query hot path.

use std::cmp::Ordering;

use tarmac_core::Off;

use crate::arena::{Arena, ArenaMut};

/// `0` is never a valid node offset: the header occupies bytes `0..32`.
pub const NIL: Off = 0;

/// A fixed-width, byte-encodable tree payload.
pub trait Payload: Copy {
    const ENCODED_LEN: usize;
    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

/// How a query key compares against a stored payload. `Less` means the key
/// sorts before the payload (the payload is "too far right"), `Greater`
/// the opposite. Implemented both by `Payload` types themselves (ordinary
/// key comparison) and by sentinel keys such as [`Infinity`].
pub trait KeyCmp<P> {
    fn key_cmp(&self, payload: &P) -> Ordering;
}

/// A sentinel that compares as strictly greater (`sign > 0`) or strictly
/// less (`sign < 0`) than every payload, used to find the maximum or
/// minimum element of a subtree via the normal successor/predecessor
/// machinery.
#[derive(Debug, Clone, Copy)]
pub struct Infinity {
    sign: i8,
}

impl Infinity {
    pub fn positive() -> Self {
        Infinity { sign: 1 }
    }
    pub fn negative() -> Self {
        Infinity { sign: -1 }
    }
}

impl<P> KeyCmp<P> for Infinity {
    fn key_cmp(&self, _payload: &P) -> Ordering {
        if self.sign < 0 {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

/// An annotation folded bottom-up over a payload tree.
pub trait Annotated<P: Payload>: Copy {
    const ENCODED_LEN: usize;
    fn identity() -> Self;
    fn leaf(payload: &P) -> Self;
    fn combine(left: &Self, mid: &Self, right: &Self) -> Self;
    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

/// The unit annotation, used by trees that need no bottom-up fold (§4.2:
/// "Annotation is omitted ... when `A` is the unit type").
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnnotation;

impl<P: Payload> Annotated<P> for NoAnnotation {
    const ENCODED_LEN: usize = 0;
    fn identity() -> Self {
        NoAnnotation
    }
    fn leaf(_payload: &P) -> Self {
        NoAnnotation
    }
    fn combine(_left: &Self, _mid: &Self, _right: &Self) -> Self {
        NoAnnotation
    }
    fn encode(&self, _buf: &mut [u8]) {}
    fn decode(_buf: &[u8]) -> Self {
        NoAnnotation
    }
}

struct Node<P, A> {
    payload: P,
    ann: A,
    left: Off,
    right: Off,
    height: u32,
    /// Subtree size (this node plus both children), carried independently
    /// of `Annotation` so `rank`/`select` stay O(log n) regardless of
    /// what (if anything) the annotation folds.
    size: u64,
}

fn node_size<P: Payload, A: Annotated<P>>() -> usize {
    P::ENCODED_LEN + A::ENCODED_LEN + 8 + 8 + 4 + 8
}

fn read_node<P: Payload, A: Annotated<P>, Ar: Arena>(
    arena: &Ar,
    off: Off,
) -> crate::arena::Result<Node<P, A>> {
    let bytes = arena.read_bytes(off, node_size::<P, A>())?;
    let mut pos = 0;
    let payload = P::decode(&bytes[pos..pos + P::ENCODED_LEN]);
    pos += P::ENCODED_LEN;
    let ann = A::decode(&bytes[pos..pos + A::ENCODED_LEN]);
    pos += A::ENCODED_LEN;
    let left = Off::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let right = Off::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let height = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
    pos += 4;
    let size = u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
    Ok(Node { payload, ann, left, right, height, size })
}

fn write_node<P: Payload, A: Annotated<P>, Ar: ArenaMut>(
    arena: &mut Ar,
    node: &Node<P, A>,
) -> crate::arena::Result<Off> {
    let mut bytes = vec![0u8; node_size::<P, A>()];
    let mut pos = 0;
    node.payload.encode(&mut bytes[pos..pos + P::ENCODED_LEN]);
    pos += P::ENCODED_LEN;
    node.ann.encode(&mut bytes[pos..pos + A::ENCODED_LEN]);
    pos += A::ENCODED_LEN;
    bytes[pos..pos + 8].copy_from_slice(&node.left.to_le_bytes());
    pos += 8;
    bytes[pos..pos + 8].copy_from_slice(&node.right.to_le_bytes());
    pos += 8;
    bytes[pos..pos + 4].copy_from_slice(&node.height.to_le_bytes());
    pos += 4;
    bytes[pos..pos + 8].copy_from_slice(&node.size.to_le_bytes());
    arena.append(&bytes, 8)
}

fn info_of<P: Payload, A: Annotated<P>, Ar: Arena>(
    arena: &Ar,
    off: Off,
) -> crate::arena::Result<(u32, A, u64)> {
    if off == NIL {
        return Ok((0, A::identity(), 0));
    }
    let node: Node<P, A> = read_node(arena, off)?;
    Ok((node.height, node.ann, node.size))
}

fn make_node<P: Payload, A: Annotated<P>, Ar: ArenaMut>(
    arena: &mut Ar,
    payload: P,
    left: Off,
    right: Off,
) -> crate::arena::Result<Off> {
    let (lh, lann, lsize) = info_of::<P, A, _>(arena, left)?;
    let (rh, rann, rsize) = info_of::<P, A, _>(arena, right)?;
    let height = 1 + lh.max(rh);
    let size = 1 + lsize + rsize;
    let ann = A::combine(&lann, &A::leaf(&payload), &rann);
    write_node(arena, &Node { payload, ann, left, right, height, size })
}

fn rotate_right<P: Payload, A: Annotated<P>, Ar: ArenaMut>(
    arena: &mut Ar,
    payload: P,
    left: Off,
    right: Off,
) -> crate::arena::Result<Off> {
    let left_node: Node<P, A> = read_node(arena, left)?;
    let new_right = make_node::<P, A, _>(arena, payload, left_node.right, right)?;
    make_node::<P, A, _>(arena, left_node.payload, left_node.left, new_right)
}

fn rotate_left<P: Payload, A: Annotated<P>, Ar: ArenaMut>(
    arena: &mut Ar,
    payload: P,
    left: Off,
    right: Off,
) -> crate::arena::Result<Off> {
    let right_node: Node<P, A> = read_node(arena, right)?;
    let new_left = make_node::<P, A, _>(arena, payload, left, right_node.left)?;
    make_node::<P, A, _>(arena, right_node.payload, new_left, right_node.right)
}

fn rebalance<P: Payload, A: Annotated<P>, Ar: ArenaMut>(
    arena: &mut Ar,
    payload: P,
    left: Off,
    right: Off,
) -> crate::arena::Result<Off> {
    let (lh, _, _) = info_of::<P, A, _>(arena, left)?;
    let (rh, _, _) = info_of::<P, A, _>(arena, right)?;
    let balance = lh as i64 - rh as i64;

    if balance > 1 {
        let left_node: Node<P, A> = read_node(arena, left)?;
        let (llh, _, _) = info_of::<P, A, _>(arena, left_node.left)?;
        let (lrh, _, _) = info_of::<P, A, _>(arena, left_node.right)?;
        if llh >= lrh {
            rotate_right::<P, A, _>(arena, payload, left, right)
        } else {
            let new_left =
                rotate_left::<P, A, _>(arena, left_node.payload, left_node.left, left_node.right)?;
            rotate_right::<P, A, _>(arena, payload, new_left, right)
        }
    } else if balance < -1 {
        let right_node: Node<P, A> = read_node(arena, right)?;
        let (rlh, _, _) = info_of::<P, A, _>(arena, right_node.left)?;
        let (rrh, _, _) = info_of::<P, A, _>(arena, right_node.right)?;
        if rrh >= rlh {
            rotate_left::<P, A, _>(arena, payload, left, right)
        } else {
            let new_right = rotate_right::<P, A, _>(
                arena,
                right_node.payload,
                right_node.left,
                right_node.right,
            )?;
            rotate_left::<P, A, _>(arena, payload, left, new_right)
        }
    } else {
        make_node::<P, A, _>(arena, payload, left, right)
    }
}

/// Insert (or, on duplicate key, replace) `payload` into the tree rooted
/// at `root`. Returns the new root offset; `root` itself keeps referring
/// to the tree as it was before this call.
pub fn insert<P, A, Ar>(arena: &mut Ar, root: Off, payload: P) -> crate::arena::Result<Off>
where
    P: Payload + KeyCmp<P>,
    A: Annotated<P>,
    Ar: ArenaMut,
{
    if root == NIL {
        return make_node::<P, A, _>(arena, payload, NIL, NIL);
    }
    let node: Node<P, A> = read_node(arena, root)?;
    match payload.key_cmp(&node.payload) {
        Ordering::Equal => make_node::<P, A, _>(arena, payload, node.left, node.right),
        Ordering::Less => {
            let new_left = insert::<P, A, _>(arena, node.left, payload)?;
            rebalance::<P, A, _>(arena, node.payload, new_left, node.right)
        }
        Ordering::Greater => {
            let new_right = insert::<P, A, _>(arena, node.right, payload)?;
            rebalance::<P, A, _>(arena, node.payload, node.left, new_right)
        }
    }
}

fn min_payload<P: Payload, A: Annotated<P>, Ar: Arena>(arena: &Ar, root: Off) -> crate::arena::Result<P> {
    let mut cur = root;
    loop {
        let node: Node<P, A> = read_node(arena, cur)?;
        if node.left == NIL {
            return Ok(node.payload);
        }
        cur = node.left;
    }
}

fn remove_min<P: Payload, A: Annotated<P>, Ar: ArenaMut>(
    arena: &mut Ar,
    root: Off,
) -> crate::arena::Result<Off> {
    let node: Node<P, A> = read_node(arena, root)?;
    if node.left == NIL {
        return Ok(node.right);
    }
    let new_left = remove_min::<P, A, _>(arena, node.left)?;
    rebalance::<P, A, _>(arena, node.payload, new_left, node.right)
}

/// Remove the payload matching `key`, if any. Returns the new root offset
/// unchanged if no payload matches.
pub fn remove<P, A, Ar, K>(arena: &mut Ar, root: Off, key: &K) -> crate::arena::Result<Off>
where
    P: Payload,
    A: Annotated<P>,
    Ar: ArenaMut,
    K: KeyCmp<P>,
{
    if root == NIL {
        return Ok(NIL);
    }
    let node: Node<P, A> = read_node(arena, root)?;
    match key.key_cmp(&node.payload) {
        Ordering::Less => {
            let new_left = remove::<P, A, _, _>(arena, node.left, key)?;
            rebalance::<P, A, _>(arena, node.payload, new_left, node.right)
        }
        Ordering::Greater => {
            let new_right = remove::<P, A, _, _>(arena, node.right, key)?;
            rebalance::<P, A, _>(arena, node.payload, node.left, new_right)
        }
        Ordering::Equal => {
            if node.left == NIL {
                return Ok(node.right);
            }
            if node.right == NIL {
                return Ok(node.left);
            }
            let succ = min_payload::<P, A, _>(arena, node.right)?;
            let new_right = remove_min::<P, A, _>(arena, node.right)?;
            rebalance::<P, A, _>(arena, succ, node.left, new_right)
        }
    }
}

/// Least payload in the subtree (§4.2 `lower_bound` via `Infinity(-1)`).
pub fn min<P, A, Ar>(arena: &Ar, root: Off) -> crate::arena::Result<Option<P>>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
{
    successor::<P, A, _, _>(arena, root, &Infinity::negative())
}

/// Greatest payload in the subtree (§4.2 `upper_bound` via `Infinity(+1)`).
pub fn max<P, A, Ar>(arena: &Ar, root: Off) -> crate::arena::Result<Option<P>>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
{
    predecessor::<P, A, _, _>(arena, root, &Infinity::positive())
}

/// Exact-key lookup.
pub fn find<P, A, Ar, K>(arena: &Ar, root: Off, key: &K) -> crate::arena::Result<Option<P>>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
    K: KeyCmp<P>,
{
    let mut cur = root;
    while cur != NIL {
        let node: Node<P, A> = read_node(arena, cur)?;
        cur = match key.key_cmp(&node.payload) {
            Ordering::Equal => return Ok(Some(node.payload)),
            Ordering::Less => node.left,
            Ordering::Greater => node.right,
        };
    }
    Ok(None)
}

/// Least payload with `key.key_cmp(payload) == Less` (strictly greater
/// than `key`).
pub fn successor<P, A, Ar, K>(arena: &Ar, root: Off, key: &K) -> crate::arena::Result<Option<P>>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
    K: KeyCmp<P>,
{
    let mut cur = root;
    let mut best: Option<P> = None;
    while cur != NIL {
        let node: Node<P, A> = read_node(arena, cur)?;
        if key.key_cmp(&node.payload) == Ordering::Less {
            best = Some(node.payload);
            cur = node.left;
        } else {
            cur = node.right;
        }
    }
    Ok(best)
}

/// Greatest payload with `key.key_cmp(payload) == Greater` (strictly less
/// than `key`).
pub fn predecessor<P, A, Ar, K>(arena: &Ar, root: Off, key: &K) -> crate::arena::Result<Option<P>>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
    K: KeyCmp<P>,
{
    let mut cur = root;
    let mut best: Option<P> = None;
    while cur != NIL {
        let node: Node<P, A> = read_node(arena, cur)?;
        if key.key_cmp(&node.payload) == Ordering::Greater {
            best = Some(node.payload);
            cur = node.right;
        } else {
            cur = node.left;
        }
    }
    Ok(best)
}

/// Number of payloads strictly less than `key`, plus the fold of the
/// annotation over exactly those payloads. O(log n): each node on the
/// descent contributes its left child's size in O(1) via the carried
/// `size` field, never re-walking a subtree.
pub fn rank<P, A, Ar, K>(arena: &Ar, root: Off, key: &K) -> crate::arena::Result<(u64, A)>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
    K: KeyCmp<P>,
{
    let mut cur = root;
    let mut count = 0u64;
    let mut ann = A::identity();
    while cur != NIL {
        let node: Node<P, A> = read_node(arena, cur)?;
        if key.key_cmp(&node.payload) == Ordering::Greater {
            let (_, lann, lsize) = info_of::<P, A, _>(arena, node.left)?;
            count += lsize + 1;
            ann = A::combine(&ann, &lann, &A::leaf(&node.payload));
            cur = node.right;
        } else {
            cur = node.left;
        }
    }
    Ok((count, ann))
}

/// The `n`-th payload (zero-based) in sorted order. O(log n) via the
/// carried `size` field.
pub fn select<P, A, Ar>(arena: &Ar, root: Off, n: u64) -> crate::arena::Result<Option<P>>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
{
    let mut cur = root;
    let mut remaining = n;
    while cur != NIL {
        let node: Node<P, A> = read_node(arena, cur)?;
        let (_, _, left_len) = info_of::<P, A, _>(arena, node.left)?;
        if remaining < left_len {
            cur = node.left;
        } else if remaining == left_len {
            return Ok(Some(node.payload));
        } else {
            remaining -= left_len + 1;
            cur = node.right;
        }
    }
    Ok(None)
}

/// In-order traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    InOrder,
    PreOrder,
}

/// Read-only traversal in the given order, invoking `f` on each payload.
pub fn walk<P, A, Ar>(
    arena: &Ar,
    root: Off,
    order: Order,
    f: &mut impl FnMut(&P),
) -> crate::arena::Result<()>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
{
    if root == NIL {
        return Ok(());
    }
    let node: Node<P, A> = read_node(arena, root)?;
    match order {
        Order::InOrder => {
            walk::<P, A, _>(arena, node.left, order, f)?;
            f(&node.payload);
            walk::<P, A, _>(arena, node.right, order, f)?;
        }
        Order::PreOrder => {
            f(&node.payload);
            walk::<P, A, _>(arena, node.left, order, f)?;
            walk::<P, A, _>(arena, node.right, order, f)?;
        }
    }
    Ok(())
}

/// The annotation of the whole subtree rooted at `off` (identity if nil).
pub fn subtree_annotation<P, A, Ar>(arena: &Ar, off: Off) -> crate::arena::Result<A>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
{
    Ok(info_of::<P, A, _>(arena, off)?.1)
}

pub fn height<P, A, Ar>(arena: &Ar, off: Off) -> crate::arena::Result<u32>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
{
    Ok(info_of::<P, A, _>(arena, off)?.0)
}

/// Number of payloads in the subtree rooted at `off`, read in O(1) from
/// the carried `size` field (identity 0 for `NIL`).
pub fn subtree_size<P, A, Ar>(arena: &Ar, off: Off) -> crate::arena::Result<u64>
where
    P: Payload,
    A: Annotated<P>,
    Ar: Arena,
{
    Ok(info_of::<P, A, _>(arena, off)?.2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaWriter;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct IntPayload(i64);

    impl Payload for IntPayload {
        const ENCODED_LEN: usize = 8;
        fn encode(&self, buf: &mut [u8]) {
            buf.copy_from_slice(&self.0.to_le_bytes());
        }
        fn decode(buf: &[u8]) -> Self {
            IntPayload(i64::from_le_bytes(buf.try_into().unwrap()))
        }
    }

    impl KeyCmp<IntPayload> for IntPayload {
        fn key_cmp(&self, other: &IntPayload) -> Ordering {
            self.0.cmp(&other.0)
        }
    }

    fn build_writer() -> ArenaWriter {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let path = path.to_path_buf();
        ArenaWriter::create(path, false, false).unwrap()
    }

    #[test]
    fn insert_find_and_order_preserved() {
        let mut w = build_writer();
        let mut root = NIL;
        let values = [5, 3, 8, 1, 4, 7, 9, 2, 6, 0];
        for &v in &values {
            root = insert::<IntPayload, NoAnnotation, _>(&mut w, root, IntPayload(v)).unwrap();
        }
        for &v in &values {
            let found = find::<IntPayload, NoAnnotation, _, _>(&w, root, &IntPayload(v)).unwrap();
            assert_eq!(found, Some(IntPayload(v)));
        }
        assert_eq!(find::<IntPayload, NoAnnotation, _, _>(&w, root, &IntPayload(42)).unwrap(), None);

        let mut collected = Vec::new();
        walk::<IntPayload, NoAnnotation, _>(&w, root, Order::InOrder, &mut |p| collected.push(p.0))
            .unwrap();
        let mut expected = values.to_vec();
        expected.sort_unstable();
        assert_eq!(collected, expected);
    }

    #[test]
    fn avl_balance_holds_after_many_inserts() {
        let mut w = build_writer();
        let mut root = NIL;
        for v in 0..200i64 {
            root = insert::<IntPayload, NoAnnotation, _>(&mut w, root, IntPayload(v)).unwrap();
        }
        // log2(200) ~= 7.6; a correctly balanced tree stays close to that.
        let h = height::<IntPayload, NoAnnotation, _>(&w, root).unwrap();
        assert!(h <= 12, "height {h} too large for a balanced 200-node tree");
    }

    #[test]
    fn rank_and_select_are_inverse() {
        let mut w = build_writer();
        let mut root = NIL;
        let mut values: Vec<i64> = (0..50).map(|v| v * 3).collect();
        for &v in &values {
            root = insert::<IntPayload, NoAnnotation, _>(&mut w, root, IntPayload(v)).unwrap();
        }
        values.sort_unstable();
        for (i, &v) in values.iter().enumerate() {
            let (n, _) = rank::<IntPayload, NoAnnotation, _, _>(&w, root, &IntPayload(v)).unwrap();
            assert_eq!(n, i as u64);
            let got = select::<IntPayload, NoAnnotation, _>(&w, root, i as u64).unwrap();
            assert_eq!(got, Some(IntPayload(v)));
        }
    }

    #[test]
    fn successor_predecessor_and_infinity_sentinels() {
        let mut w = build_writer();
        let mut root = NIL;
        for v in [10, 20, 30, 40] {
            root = insert::<IntPayload, NoAnnotation, _>(&mut w, root, IntPayload(v)).unwrap();
        }
        assert_eq!(
            successor::<IntPayload, NoAnnotation, _, _>(&w, root, &IntPayload(20)).unwrap(),
            Some(IntPayload(30))
        );
        assert_eq!(
            predecessor::<IntPayload, NoAnnotation, _, _>(&w, root, &IntPayload(20)).unwrap(),
            Some(IntPayload(10))
        );
        assert_eq!(
            successor::<IntPayload, NoAnnotation, _, _>(&w, root, &Infinity::negative()).unwrap(),
            Some(IntPayload(10))
        );
        assert_eq!(
            predecessor::<IntPayload, NoAnnotation, _, _>(&w, root, &Infinity::positive()).unwrap(),
            Some(IntPayload(40))
        );
    }

    #[test]
    fn remove_drops_key_and_keeps_rest_balanced() {
        let mut w = build_writer();
        let mut root = NIL;
        let values: Vec<i64> = (0..64).collect();
        for &v in &values {
            root = insert::<IntPayload, NoAnnotation, _>(&mut w, root, IntPayload(v)).unwrap();
        }
        for &v in &[10, 0, 63, 32] {
            root = remove::<IntPayload, NoAnnotation, _, _>(&mut w, root, &IntPayload(v)).unwrap();
            assert_eq!(find::<IntPayload, NoAnnotation, _, _>(&w, root, &IntPayload(v)).unwrap(), None);
        }
        let remaining: Vec<i64> = values.into_iter().filter(|v| ![10, 0, 63, 32].contains(v)).collect();
        let mut collected = Vec::new();
        walk::<IntPayload, NoAnnotation, _>(&w, root, Order::InOrder, &mut |p| collected.push(p.0))
            .unwrap();
        assert_eq!(collected, remaining);
        let h = height::<IntPayload, NoAnnotation, _>(&w, root).unwrap();
        assert!(h <= 10);
    }

    #[test]
    fn min_and_max_match_infinity_sentinels() {
        let mut w = build_writer();
        let mut root = NIL;
        for v in [5, 1, 9, 3, 7] {
            root = insert::<IntPayload, NoAnnotation, _>(&mut w, root, IntPayload(v)).unwrap();
        }
        assert_eq!(min::<IntPayload, NoAnnotation, _>(&w, root).unwrap(), Some(IntPayload(1)));
        assert_eq!(max::<IntPayload, NoAnnotation, _>(&w, root).unwrap(), Some(IntPayload(9)));
    }

    #[test]
    fn old_roots_stay_valid_after_further_inserts() {
        let mut w = build_writer();
        let root1 = insert::<IntPayload, NoAnnotation, _>(&mut w, NIL, IntPayload(1)).unwrap();
        let root2 = insert::<IntPayload, NoAnnotation, _>(&mut w, root1, IntPayload(2)).unwrap();
        assert_eq!(find::<IntPayload, NoAnnotation, _, _>(&w, root1, &IntPayload(2)).unwrap(), None);
        assert_eq!(
            find::<IntPayload, NoAnnotation, _, _>(&w, root2, &IntPayload(2)).unwrap(),
            Some(IntPayload(2))
        );
        assert_eq!(
            find::<IntPayload, NoAnnotation, _, _>(&w, root1, &IntPayload(1)).unwrap(),
            Some(IntPayload(1))
        );
    }
}
