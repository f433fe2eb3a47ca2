/// Sampling policy — optional gating, single draws and ranged distinct
/// multi-draws over a [`ResolvedPool`].
use tracing::trace;

use crate::core::pool::{PoolKind, ResolvedPool};
use crate::core::random::RandomSource;
use crate::schema::node::{OptionalSpec, RangeSpec};

/// Entries chosen for one visit, as pool indices in draw order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    indices: Vec<usize>,
}

impl Selection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The chosen entries, in draw order.
    pub fn values<'p>(&'p self, pool: &'p ResolvedPool) -> impl Iterator<Item = &'p str> + 'p {
        self.indices.iter().filter_map(move |&i| pool.get(i))
    }
}

/// Full per-visit policy: gate, then select.
pub fn sample<R: RandomSource + ?Sized>(
    pool: &ResolvedPool,
    optional: &OptionalSpec,
    range: &RangeSpec,
    rng: &mut R,
) -> Selection {
    if !passes_gate(optional, rng) {
        return Selection::empty();
    }
    select(pool, range, rng)
}

/// Optional-inclusion gate. Draws exactly one unit value when the node is
/// optional and none otherwise; the node is excluded when the draw exceeds
/// the configured chance.
pub fn passes_gate<R: RandomSource + ?Sized>(optional: &OptionalSpec, rng: &mut R) -> bool {
    if !optional.is_optional {
        return true;
    }
    let roll = rng.next_unit();
    let included = roll <= optional.value;
    trace!(roll, chance = optional.value, included, "optional gate");
    included
}

/// Selection without gating: one entry, or a distinct ranged subset.
pub fn select<R: RandomSource + ?Sized>(
    pool: &ResolvedPool,
    range: &RangeSpec,
    rng: &mut R,
) -> Selection {
    if pool.selectable_count() == 0 {
        return Selection::empty();
    }
    if !range.is_range {
        return Selection {
            indices: vec![sample_one(pool, rng)],
        };
    }
    let count = ranged_count(pool, range, rng);
    Selection {
        indices: sample_distinct(pool, count, rng),
    }
}

/// Draw a single entry index. Uniform pools pick an index directly;
/// weighted pools binary-search the cumulative weights.
pub fn sample_one<R: RandomSource + ?Sized>(pool: &ResolvedPool, rng: &mut R) -> usize {
    match pool.kind() {
        PoolKind::Uniform => rng.int_inclusive(0, pool.len() - 1),
        PoolKind::Weighted {
            weights,
            cumulative,
        } => {
            let total = cumulative.last().copied().unwrap_or(0.0);
            let target = rng.next_unit() * total;
            let index = cumulative.partition_point(|&c| c <= target);
            if index < weights.len() && weights[index] > 0.0 {
                index
            } else {
                // Rounding at the top end; fall back to the last drawable entry.
                weights.iter().rposition(|w| *w > 0.0).unwrap_or(0)
            }
        }
    }
}

/// Draw the ranged count: uniform in `[low, high]`, clamped to the number
/// of entries that can actually be drawn.
fn ranged_count<R: RandomSource + ?Sized>(
    pool: &ResolvedPool,
    range: &RangeSpec,
    rng: &mut R,
) -> usize {
    let (low, high) = range.value;
    let low = low.max(1) as usize;
    let high = (high as usize).max(low);
    let drawn = rng.int_inclusive(low, high);
    drawn.clamp(1, pool.selectable_count())
}

/// Draw `count` distinct entries without replacement. Weighted draws are
/// renormalized over whatever remains after each pick.
pub fn sample_distinct<R: RandomSource + ?Sized>(
    pool: &ResolvedPool,
    count: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..pool.len()).filter(|&i| pool.weight(i) > 0.0).collect();
    let mut chosen = Vec::with_capacity(count.min(remaining.len()));

    while chosen.len() < count && !remaining.is_empty() {
        let position = match pool.kind() {
            PoolKind::Uniform => rng.int_inclusive(0, remaining.len() - 1),
            PoolKind::Weighted { .. } => weighted_position(pool, &remaining, rng),
        };
        chosen.push(remaining.remove(position));
    }
    chosen
}

fn weighted_position<R: RandomSource + ?Sized>(
    pool: &ResolvedPool,
    remaining: &[usize],
    rng: &mut R,
) -> usize {
    let total: f64 = remaining.iter().map(|&i| pool.weight(i)).sum();
    let target = rng.next_unit() * total;
    let mut acc = 0.0;
    for (position, &index) in remaining.iter().enumerate() {
        acc += pool.weight(index);
        if target < acc {
            return position;
        }
    }
    remaining.len() - 1
}
