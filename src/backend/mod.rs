// Backend module - OpenGL abstraction layer
//
// Design: thin wrappers over the driver calls, one native object per type

pub mod buffer;
pub mod driver;
pub mod program;
pub mod shader;

pub use buffer::{draw_frame, QuadMesh};
pub use driver::GlDriver;
pub use program::{Program, ProgramBuilder, ProgramError};
pub use shader::ShaderStage;
