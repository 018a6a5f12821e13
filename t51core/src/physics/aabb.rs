//! Axis-aligned bounding boxes and AABB-AABB narrow-phase collision.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Vec2 {
        Vec2 { x, y }
    }

    pub fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }

    pub fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }

    pub fn scale(self, k: f32) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }

    pub fn dot(self, rhs: Vec2) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Returns `Vec2::ZERO` unchanged rather than dividing by zero, matching the common
    /// "no input this tick" case for movement direction normalization.
    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len < f32::EPSILON {
            Vec2::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }
}

/// An axis-aligned box stored as two corner points, min and max.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Aabb {
        Aabb { min, max }
    }

    /// Translates a body-local AABB into world space given the body's position.
    pub fn to_world(self, position: Vec2) -> Aabb {
        Aabb::new(self.min.add(position), self.max.add(position))
    }
}

/// A narrow-phase contact between two world-space AABBs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// Unit normal pointing from body A toward body B's penetration direction.
    pub normal: Vec2,
    pub penetration: f32,
    pub point: Vec2,
}

/// Overlap test + contact generation in world space. Returns `None` if the boxes don't
/// overlap on both axes.
///
/// The x-component of the overlap rectangle's max corner is `min(aMax.x, bMax.x)` -- the
/// original C implementation this was ported from reused `bMax.y` here by mistake, which
/// this does not reproduce.
pub fn collide(a: Aabb, b: Aabb) -> Option<Contact> {
    let x_overlap = a.max.x.min(b.max.x) - a.min.x.max(b.min.x);
    let y_overlap = a.max.y.min(b.max.y) - a.min.y.max(b.min.y);

    if x_overlap <= 0.0 || y_overlap <= 0.0 {
        return None;
    }

    let (normal, penetration) = if x_overlap < y_overlap {
        let nx = if a.max.x > b.max.x { -1.0 } else { 1.0 };
        (Vec2::new(nx, 0.0), x_overlap)
    } else {
        let ny = if a.max.y > b.max.y { -1.0 } else { 1.0 };
        (Vec2::new(0.0, ny), y_overlap)
    };

    let overlap_min = Vec2::new(a.min.x.max(b.min.x), a.min.y.max(b.min.y));
    let overlap_max = Vec2::new(a.max.x.min(b.max.x), a.max.y.min(b.max.y));
    let point = overlap_min.add(overlap_max).scale(0.5);

    Some(Contact {
        normal,
        penetration,
        point,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_boxes_produce_a_contact() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 2.0));
        let b = Aabb::new(Vec2::new(1.0, 0.0), Vec2::new(3.0, 2.0));

        let contact = collide(a, b).expect("boxes overlap");
        assert_eq!(contact.normal, Vec2::new(-1.0, 0.0));
        assert!((contact.penetration - 1.0).abs() < 1e-6);
        assert_eq!(contact.point, Vec2::new(1.5, 1.0));
    }

    #[test]
    fn disjoint_boxes_produce_no_contact() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(5.0, 5.0), Vec2::new(6.0, 6.0));
        assert!(collide(a, b).is_none());
    }

    #[test]
    fn collision_is_symmetric() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 3.0));
        let b = Aabb::new(Vec2::new(1.0, 1.0), Vec2::new(3.0, 4.0));

        let ab = collide(a, b).unwrap();
        let ba = collide(b, a).unwrap();

        assert_eq!(ab.penetration, ba.penetration);
        assert_eq!(ab.point, ba.point);
        assert_eq!(ab.normal, ba.normal.scale(-1.0));
    }

    #[test]
    fn touching_but_not_overlapping_is_not_a_contact() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        assert!(collide(a, b).is_none());
    }
}
