pub mod attachment;
pub mod attribute;
pub mod dimension;
pub mod ids;
pub mod product;
pub(crate) mod wire;
