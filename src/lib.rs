#![forbid(unsafe_code, unused)]

pub mod classify;
pub mod config;
pub mod defects;
pub mod displace;
pub mod errors;
pub mod float_types;
pub mod mesh;
pub mod noise;
pub mod pipeline;
pub mod pyramid;
pub mod raycast;
pub mod seed;
pub mod signal;
pub mod solid;
pub mod topology;
pub mod vertex;

#[cfg(test)]
mod tests;
