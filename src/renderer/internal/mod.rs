pub mod fallback;
pub mod uniform_ring;

pub(crate) use fallback::FallbackAttributes;
pub(crate) use uniform_ring::UniformRing;
