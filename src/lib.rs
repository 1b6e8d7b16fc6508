//! OpenGL sandbox: shader build helpers, quad geometry and the config and
//! hot-reload plumbing the `gl-sandbox` binary runs on.

pub mod backend;
pub mod config;
pub mod reload;
