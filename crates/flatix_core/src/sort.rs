//! Permutation sort and in-place reorder.
//!
//! Builds sort a permutation over row slots instead of moving the typed
//! arenas during comparison, then apply the permutation to every arena in
//! one cycle-following pass with a single temporary element per cycle.

use std::cmp::Ordering;

/// A target that can be reordered through one temporary slot.
///
/// `load_temp(i)` saves element `i`, `move_slot(dst, src)` copies element
/// `src` over element `dst`, and `store_temp(i)` writes the saved element
/// back at `i`.
pub(crate) trait Reorder {
    fn load_temp(&mut self, i: usize);
    fn store_temp(&mut self, i: usize);
    fn move_slot(&mut self, dst: usize, src: usize);
}

/// Sorts `perm` so that `perm[i]` is the slot holding the i-th smallest
/// element under `cmp`. Quicksort with median-of-three pivots, falling
/// back to insertion sort below `cutoff`.
///
/// `cmp` must be a total order; ties are broken by slot number so the
/// result is deterministic and duplicates keep their input order.
pub(crate) fn sort_permutation<F>(perm: &mut [u32], cutoff: usize, cmp: F)
where
    F: Fn(usize, usize) -> Ordering,
{
    let full = |a: u32, b: u32| {
        cmp(a as usize, b as usize).then_with(|| a.cmp(&b))
    };
    quicksort(perm, cutoff.max(2), &full);
}

fn quicksort<F>(perm: &mut [u32], cutoff: usize, cmp: &F)
where
    F: Fn(u32, u32) -> Ordering,
{
    let mut lo = 0usize;
    let mut hi = perm.len();
    // Recurse on the smaller side, loop on the larger.
    let mut stack: Vec<(usize, usize)> = Vec::new();
    loop {
        while hi - lo > cutoff {
            let mid = partition(&mut perm[lo..hi], cmp) + lo;
            if mid - lo < hi - mid {
                stack.push((mid, hi));
                hi = mid;
            } else {
                stack.push((lo, mid));
                lo = mid;
            }
        }
        insertion_sort(&mut perm[lo..hi], cmp);
        match stack.pop() {
            Some((l, h)) => {
                lo = l;
                hi = h;
            }
            None => break,
        }
    }
}

/// Hoare partition with a median-of-three pivot. Returns a split point
/// `m` with `1 <= m < len` such that every element of `[..m]` is `<=`
/// every element of `[m..]`.
fn partition<F>(part: &mut [u32], cmp: &F) -> usize
where
    F: Fn(u32, u32) -> Ordering,
{
    let len = part.len();
    let mid = len / 2;

    // Order first, middle and last; the median lands in the middle.
    if cmp(part[mid], part[0]) == Ordering::Less {
        part.swap(mid, 0);
    }
    if cmp(part[len - 1], part[mid]) == Ordering::Less {
        part.swap(len - 1, mid);
        if cmp(part[mid], part[0]) == Ordering::Less {
            part.swap(mid, 0);
        }
    }
    let pivot = part[mid];

    let mut i = 0usize;
    let mut j = len - 1;
    loop {
        while cmp(part[i], pivot) == Ordering::Less {
            i += 1;
        }
        while cmp(pivot, part[j]) == Ordering::Less {
            j -= 1;
        }
        if i >= j {
            return j + 1;
        }
        part.swap(i, j);
        i += 1;
        j -= 1;
    }
}

fn insertion_sort<F>(part: &mut [u32], cmp: &F)
where
    F: Fn(u32, u32) -> Ordering,
{
    for i in 1..part.len() {
        let mut j = i;
        while j > 0 && cmp(part[j], part[j - 1]) == Ordering::Less {
            part.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Applies `perm` to `target` so that the element ending up at slot `i`
/// is the one that was at slot `perm[i]`. Consumes `perm` (it is left as
/// the identity) and moves each element exactly once.
pub(crate) fn apply_permutation(perm: &mut [u32], target: &mut impl Reorder) {
    for start in 0..perm.len() {
        if perm[start] as usize == start {
            continue;
        }
        target.load_temp(start);
        let mut pos = start;
        loop {
            let src = perm[pos] as usize;
            perm[pos] = pos as u32;
            if src == start {
                target.store_temp(pos);
                break;
            }
            target.move_slot(pos, src);
            pos = src;
        }
    }
}
