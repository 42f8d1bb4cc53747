use glam::{DVec3, U8Vec3};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointData {
    pub position: DVec3,
    pub color: U8Vec3,
}

impl PointData {
    pub fn new(position: DVec3, color: U8Vec3) -> Self {
        Self { position, color }
    }
}
