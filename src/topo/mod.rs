//! 拓扑构建

mod star;

pub use star::{Star, StarOpts, build_star, star_host_ip};
