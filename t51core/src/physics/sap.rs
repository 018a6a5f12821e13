//! Sweep-and-Prune broad-phase. Per axis, three conceptual parallel fields (endpoint value,
//! owning body, is-min flag) live in one `Vec<Endpoint>`, kept sorted by value via an
//! insertion sort that exploits temporal coherence between ticks (bodies move a little,
//! endpoints stay nearly sorted).
//!
//! A body never reads its own `SapHandle` -- it is an opaque cookie the
//! body carries and hands back to `insert`/`update`/`remove`. The actual endpoint indices a
//! handle refers to live inside `Sap` itself (`slots`), so a swap during re-sort only ever
//! touches `Sap`'s own bookkeeping, never a field on some external body struct.

use crate::physics::aabb::Aabb;
use hashbrown::HashMap;

pub type BodyId = usize;
type EndpointIndex = usize;

/// Opaque cookie returned by `Sap::insert`. Only ever passed back into `Sap`'s own methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SapHandle(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Clone, Copy, Debug)]
struct Endpoint {
    value: f32,
    body: BodyId,
    is_min: bool,
}

pub struct Sap {
    x: Vec<Endpoint>,
    y: Vec<Endpoint>,
    /// Indexed by `SapHandle`'s slot: `[x_min, x_max, y_min, y_max]` endpoint indices.
    slots: Vec<[EndpointIndex; 4]>,
    layers: Vec<u32>,
    free_slots: Vec<usize>,
    body_to_slot: HashMap<BodyId, usize>,
}

impl Sap {
    pub fn new() -> Sap {
        Sap {
            x: Vec::new(),
            y: Vec::new(),
            slots: Vec::new(),
            layers: Vec::new(),
            free_slots: Vec::new(),
            body_to_slot: HashMap::new(),
        }
    }

    fn axis(&self, axis: Axis) -> &Vec<Endpoint> {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut Vec<Endpoint> {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
        }
    }

    /// Registers a body with its world AABB and collision layer mask. Static bodies (those
    /// with no inverse mass) are inserted the same way so dynamic bodies still get contacts
    /// against them.
    pub fn insert(&mut self, body: BodyId, aabb: Aabb, layer: u32) -> SapHandle {
        let slot = self.free_slots.pop().unwrap_or_else(|| {
            self.slots.push([0; 4]);
            self.layers.push(0);
            self.slots.len() - 1
        });
        self.layers[slot] = layer;
        self.body_to_slot.insert(body, slot);

        self.insert_endpoint(Axis::X, body, aabb.min.x, true);
        self.insert_endpoint(Axis::X, body, aabb.max.x, false);
        self.insert_endpoint(Axis::Y, body, aabb.min.y, true);
        self.insert_endpoint(Axis::Y, body, aabb.max.y, false);

        self.reindex_axis(Axis::X);
        self.reindex_axis(Axis::Y);

        SapHandle(slot)
    }

    fn insert_endpoint(&mut self, axis: Axis, body: BodyId, value: f32, is_min: bool) {
        let arr = self.axis_mut(axis);
        let pos = arr.partition_point(|e| e.value < value);
        arr.insert(pos, Endpoint { value, body, is_min });
    }

    fn reindex_axis(&mut self, axis: Axis) {
        let field_base = if axis == Axis::X { 0 } else { 2 };
        let len = self.axis(axis).len();
        for i in 0..len {
            let e = self.axis(axis)[i];
            if let Some(&slot) = self.body_to_slot.get(&e.body) {
                let field = field_base + if e.is_min { 0 } else { 1 };
                self.slots[slot][field] = i;
            }
        }
    }

    /// Removes every endpoint belonging to `body` and frees its slot.
    pub fn remove(&mut self, handle: SapHandle, body: BodyId) {
        self.x.retain(|e| e.body != body);
        self.y.retain(|e| e.body != body);
        self.reindex_axis(Axis::X);
        self.reindex_axis(Axis::Y);
        self.body_to_slot.remove(&body);
        self.free_slots.push(handle.0);
    }

    /// Refreshes a body's world AABB and re-sorts each moved endpoint into place.
    pub fn update(&mut self, handle: SapHandle, aabb: Aabb) {
        self.set_value_and_resort(handle, 0, aabb.min.x);
        self.set_value_and_resort(handle, 1, aabb.max.x);
        self.set_value_and_resort(handle, 2, aabb.min.y);
        self.set_value_and_resort(handle, 3, aabb.max.y);
    }

    fn set_value_and_resort(&mut self, handle: SapHandle, field: usize, new_value: f32) {
        let axis = if field < 2 { Axis::X } else { Axis::Y };
        let index = self.slots[handle.0][field];
        self.axis_mut(axis)[index].value = new_value;
        self.insertion_sort_from(axis, index);
    }

    fn insertion_sort_from(&mut self, axis: Axis, mut index: usize) {
        loop {
            let arr = self.axis_mut(axis);
            if index > 0 && arr[index - 1].value > arr[index].value {
                arr.swap(index - 1, index);
                self.fix_slot(axis, index - 1);
                self.fix_slot(axis, index);
                index -= 1;
            } else if index + 1 < arr.len() && arr[index].value > arr[index + 1].value {
                arr.swap(index, index + 1);
                self.fix_slot(axis, index);
                self.fix_slot(axis, index + 1);
                index += 1;
            } else {
                break;
            }
        }
    }

    fn fix_slot(&mut self, axis: Axis, index: usize) {
        let e = self.axis(axis)[index];
        if let Some(&slot) = self.body_to_slot.get(&e.body) {
            let field_base = if axis == Axis::X { 0 } else { 2 };
            let field = field_base + if e.is_min { 0 } else { 1 };
            self.slots[slot][field] = index;
        }
    }

    fn y_range(&self, body: BodyId) -> (f32, f32) {
        let slot = self.body_to_slot[&body];
        let idxs = self.slots[slot];
        (self.y[idxs[2]].value, self.y[idxs[3]].value)
    }

    fn layers_intersect(&self, a: BodyId, b: BodyId) -> bool {
        let sa = self.body_to_slot[&a];
        let sb = self.body_to_slot[&b];
        self.layers[sa] & self.layers[sb] != 0
    }

    /// Sweeps the X axis emitting candidate pairs whose layers intersect and whose Y
    /// intervals overlap. A superset of truly overlapping pairs in world space; narrow-phase
    /// (`aabb::collide`) filters out the rest.
    pub fn sweep(&self) -> Vec<(BodyId, BodyId)> {
        let mut active: Vec<BodyId> = Vec::new();
        let mut pairs = Vec::new();

        for e in &self.x {
            if e.is_min {
                for &other in &active {
                    if self.layers_intersect(e.body, other) {
                        let (a_min, a_max) = self.y_range(e.body);
                        let (b_min, b_max) = self.y_range(other);
                        if a_min < b_max && b_min < a_max {
                            pairs.push((other, e.body));
                        }
                    }
                }
                active.push(e.body);
            } else {
                active.retain(|&b| b != e.body);
            }
        }

        pairs
    }

    #[cfg(test)]
    fn is_sorted(&self, axis: Axis) -> bool {
        self.axis(axis).windows(2).all(|w| w[0].value <= w[1].value)
    }
}

impl Default for Sap {
    fn default() -> Sap {
        Sap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::aabb::Vec2;

    fn aabb(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Aabb {
        Aabb::new(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y))
    }

    #[test]
    fn overlapping_bodies_produce_a_candidate_pair() {
        let mut sap = Sap::new();
        sap.insert(1, aabb(0.0, 0.0, 2.0, 2.0), 1);
        sap.insert(2, aabb(1.0, 0.0, 3.0, 2.0), 1);

        let pairs = sap.sweep();
        assert_eq!(pairs, vec![(1, 2)]);
    }

    #[test]
    fn disjoint_bodies_produce_no_pairs() {
        let mut sap = Sap::new();
        sap.insert(1, aabb(0.0, 0.0, 1.0, 1.0), 1);
        sap.insert(2, aabb(10.0, 10.0, 11.0, 11.0), 1);

        assert!(sap.sweep().is_empty());
    }

    #[test]
    fn non_intersecting_layers_are_filtered_out() {
        let mut sap = Sap::new();
        sap.insert(1, aabb(0.0, 0.0, 2.0, 2.0), 0b01);
        sap.insert(2, aabb(1.0, 0.0, 3.0, 2.0), 0b10);

        assert!(sap.sweep().is_empty());
    }

    #[test]
    fn update_after_move_keeps_axes_sorted() {
        let mut sap = Sap::new();
        let h1 = sap.insert(1, aabb(0.0, 0.0, 1.0, 1.0), 1);
        sap.insert(2, aabb(5.0, 0.0, 6.0, 1.0), 1);
        sap.insert(3, aabb(10.0, 0.0, 11.0, 1.0), 1);

        sap.update(h1, aabb(8.0, 0.0, 9.0, 1.0));

        assert!(sap.is_sorted(Axis::X));
        assert!(sap.is_sorted(Axis::Y));

        let pairs = sap.sweep();
        assert!(pairs.is_empty());
    }

    #[test]
    fn remove_drops_all_four_endpoints() {
        let mut sap = Sap::new();
        let h1 = sap.insert(1, aabb(0.0, 0.0, 1.0, 1.0), 1);
        sap.insert(2, aabb(0.5, 0.0, 1.5, 1.0), 1);

        sap.remove(h1, 1);
        assert_eq!(sap.x.len(), 2);
        assert_eq!(sap.y.len(), 2);
        assert!(sap.sweep().is_empty());
    }
}
