pub mod config;
pub mod converter;
pub mod hierarchy;
pub mod metadata;
pub mod octree;
pub mod ply;
pub mod point;
pub mod prelude;
pub mod writer;
