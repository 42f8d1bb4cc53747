use glam::{BVec3, DVec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// A box that contains nothing; the first `update` establishes real bounds.
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(-f64::MAX),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Length of the box diagonal, `|max - min|`.
    pub fn diagonal(&self) -> f64 {
        self.size().length()
    }

    /// Inclusive on all six faces.
    pub fn is_inside(&self, point: DVec3) -> bool {
        self.min.x <= point.x
            && point.x <= self.max.x
            && self.min.y <= point.y
            && point.y <= self.max.y
            && self.min.z <= point.z
            && point.z <= self.max.z
    }

    pub fn update(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn update_aabb(&mut self, other: &Aabb) {
        self.update(other.min);
        self.update(other.max);
    }

    /// Grows `max` so that every axis spans the largest extent of the box.
    pub fn make_cubic(&mut self) {
        let extent = self.size().max_element();
        self.max = self.min + DVec3::splat(extent);
    }
}

/// Octant code of `point` relative to the midpoint split of `aabb`.
///
/// Bit layout: x → bit 2, y → bit 1, z → bit 0. Points on or past the upper
/// face land in the upper half, points below `min` in the lower half.
pub fn node_index(aabb: &Aabb, point: DVec3) -> usize {
    let size = aabb.size();
    let half = |p: f64, min: f64, size: f64| -> usize {
        // `as` saturates: negatives and NaN become 0, +inf becomes usize::MAX
        ((2.0 * (p - min) / size) as usize).min(1)
    };

    let mx = half(point.x, aabb.min.x, size.x);
    let my = half(point.y, aabb.min.y, size.y);
    let mz = half(point.z, aabb.min.z, size.z);

    (mx << 2) | (my << 1) | mz
}

/// Box of octant `index`, bit layout as in [`node_index`]. All eight
/// children share the midpoint of `aabb` as their inner corner.
pub fn create_child_aabb(aabb: &Aabb, index: usize) -> Aabb {
    let center = aabb.min + aabb.size() * 0.5;
    let upper = octant_mask(index);

    Aabb::new(
        DVec3::select(upper, center, aabb.min),
        DVec3::select(upper, aabb.max, center),
    )
}

/// Axes on which octant `index` takes the upper half.
fn octant_mask(index: usize) -> BVec3 {
    BVec3::new(index & 0b100 != 0, index & 0b010 != 0, index & 0b001 != 0)
}
