//! Pure lowering functions: given a backend and request parameters, build and submit a [`crate::graph::Graph`].

pub mod all_gather;
pub mod all_reduce;
pub mod broadcast;
pub mod reduce_scatter;
