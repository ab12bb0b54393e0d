/// "Resources" refers to middle-level objects created through the device context.
/// Each one owns its GPU memory and releases it on drop.

pub mod buffer;
pub mod image;
pub mod mesh;
pub mod model;
pub mod shader;
pub mod texture;
pub mod vertex;
