//! # Voxel Manipulator
//!
//! A dense copy of an arbitrary box of cells. The mesh builder reads its
//! 48³ snapshot through one of these, and region reads from the map land in
//! one.

use bitvec::prelude::BitVec;
use cgmath::{Point3, Vector3};

use super::{block::MapNode, NodePos};

/// An inclusive box of node positions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VoxelArea {
    /// Smallest corner
    pub min: NodePos,
    /// Largest corner, inclusive
    pub max: NodePos,
}

impl VoxelArea {
    /// Creates an area from two corners.
    pub fn new(a: NodePos, b: NodePos) -> Self {
        VoxelArea {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Number of nodes along each axis.
    pub fn extent(&self) -> Vector3<i32> {
        self.max - self.min + Vector3::new(1, 1, 1)
    }

    /// Number of nodes in the area.
    pub fn volume(&self) -> usize {
        let e = self.extent();
        (e.x as usize) * (e.y as usize) * (e.z as usize)
    }

    /// Whether a position lies inside.
    pub fn contains(&self, p: NodePos) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    /// Dense index of a contained position, z-major like map blocks.
    pub fn index(&self, p: NodePos) -> usize {
        let e = self.extent();
        let d = p - self.min;
        (d.z * e.y * e.x + d.y * e.x + d.x) as usize
    }

    /// Returns the area grown by `d` nodes on every side.
    pub fn padded(&self, d: i32) -> Self {
        VoxelArea {
            min: self.min - Vector3::new(d, d, d),
            max: self.max + Vector3::new(d, d, d),
        }
    }

    /// Iterates over every position, x fastest.
    pub fn iter(&self) -> impl Iterator<Item = NodePos> + '_ {
        (self.min.z..=self.max.z).flat_map(move |z| {
            (self.min.y..=self.max.y)
                .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| Point3::new(x, y, z)))
        })
    }
}

/// A dense, owned copy of a box of cells with a per-cell "has data" flag.
#[derive(Clone, Debug)]
pub struct VoxelManipulator {
    /// Covered positions
    pub area: VoxelArea,
    data: Vec<MapNode>,
    loaded: BitVec,
}

impl VoxelManipulator {
    /// Creates a manipulator whose cells are all `CONTENT_IGNORE` and unloaded.
    pub fn new(area: VoxelArea) -> Self {
        let volume = area.volume();
        VoxelManipulator {
            area,
            data: vec![MapNode::ignore(); volume],
            loaded: BitVec::repeat(false, volume),
        }
    }

    /// Cell at a position; `CONTENT_IGNORE` outside the area or where no
    /// data was copied in.
    pub fn get_node(&self, p: NodePos) -> MapNode {
        if !self.area.contains(p) {
            return MapNode::ignore();
        }
        self.data[self.area.index(p)]
    }

    /// Whether data was copied in for a position.
    pub fn is_loaded(&self, p: NodePos) -> bool {
        self.area.contains(p) && self.loaded[self.area.index(p)]
    }

    /// Writes a cell. Returns `false` outside the area.
    pub fn set_node(&mut self, p: NodePos, node: MapNode) -> bool {
        if !self.area.contains(p) {
            return false;
        }
        let i = self.area.index(p);
        self.data[i] = node;
        self.loaded.set(i, true);
        true
    }

    /// Copies a z-major box of cells with corner `origin` and edge `size`
    /// into the overlapping part of this manipulator.
    pub fn copy_from(&mut self, origin: NodePos, size: i32, nodes: &[MapNode]) {
        for z in 0..size {
            for y in 0..size {
                let row_start = Point3::new(origin.x, origin.y + y, origin.z + z);
                if row_start.y < self.area.min.y
                    || row_start.y > self.area.max.y
                    || row_start.z < self.area.min.z
                    || row_start.z > self.area.max.z
                {
                    continue;
                }
                for x in 0..size {
                    let p = Point3::new(origin.x + x, row_start.y, row_start.z);
                    if !self.area.contains(p) {
                        continue;
                    }
                    let src = ((z * size + y) * size + x) as usize;
                    if let Some(node) = nodes.get(src) {
                        let i = self.area.index(p);
                        self.data[i] = *node;
                        self.loaded.set(i, true);
                    }
                }
            }
        }
    }

    /// Number of cells that hold copied data.
    pub fn loaded_count(&self) -> usize {
        self.loaded.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_index_is_dense() {
        let area = VoxelArea::new(Point3::new(-1, -1, -1), Point3::new(1, 1, 1));
        assert_eq!(area.volume(), 27);
        let indices: Vec<usize> = area.iter().map(|p| area.index(p)).collect();
        assert_eq!(indices, (0..27).collect::<Vec<_>>());
    }

    #[test]
    fn copies_clip_to_area() {
        let area = VoxelArea::new(Point3::new(0, 0, 0), Point3::new(3, 3, 3));
        let mut vm = VoxelManipulator::new(area);
        let nodes = vec![MapNode::new(5); 8];
        vm.copy_from(Point3::new(3, 3, 3), 2, &nodes);
        assert_eq!(vm.loaded_count(), 1);
        assert_eq!(vm.get_node(Point3::new(3, 3, 3)).content, 5);
        assert_eq!(vm.get_node(Point3::new(4, 4, 4)), MapNode::ignore());
        assert!(!vm.is_loaded(Point3::new(0, 0, 0)));
    }
}
