// Shader object loading and management
//
// OpenGL compiles GLSL text at runtime. A `Shader` owns exactly one native
// shader object from compilation until it is detached (and deleted) after
// its program has been linked.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::driver::GlDriver;

/// Pipeline stage a shader object is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    pub fn gl_enum(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Geometry => glow::GEOMETRY_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader source {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create {stage} shader object: {reason}")]
    Create { stage: ShaderStage, reason: String },
}

/// Read a whole GLSL source file.
pub fn read_source<P: AsRef<Path>>(path: P) -> Result<String, ShaderError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| ShaderError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// One native shader object.
///
/// Ownership of the wrapper is ownership of the driver object: it ends in
/// `detach_from` or `delete`, both of which consume `self`.
pub struct Shader<D: GlDriver> {
    handle: D::Shader,
    stage: ShaderStage,
    label: String,
}

impl<D: GlDriver> fmt::Debug for Shader<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("handle", &self.handle)
            .field("stage", &self.stage)
            .field("label", &self.label)
            .finish()
    }
}

impl<D: GlDriver> Shader<D> {
    /// Create a shader object for `stage`, upload `source` and compile it.
    ///
    /// A compile failure is not an error here: the shader is returned in its
    /// failed state and the driver log is written out. Check `status()`.
    pub fn compile(
        driver: &D,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<Self, ShaderError> {
        let handle = driver
            .create_shader(stage)
            .map_err(|reason| ShaderError::Create { stage, reason })?;

        driver.shader_source(handle, source);

        log::debug!("Compiling {} shader: {} id: {:?}", stage, label, handle);
        driver.compile_shader(handle);

        let shader = Self {
            handle,
            stage,
            label: label.to_string(),
        };

        if !shader.status(driver) {
            shader.log_error(driver);
        }

        Ok(shader)
    }

    /// Read `path` and compile its contents. Nothing is created on a failed read.
    pub fn from_file<P: AsRef<Path>>(
        driver: &D,
        stage: ShaderStage,
        path: P,
    ) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let source = read_source(path)?;
        Self::compile(driver, stage, &path.display().to_string(), &source)
    }

    pub fn handle(&self) -> D::Shader {
        self.handle
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Did the last compile succeed?
    pub fn status(&self, driver: &D) -> bool {
        driver.shader_compile_status(self.handle)
    }

    pub fn info_log(&self, driver: &D) -> String {
        driver.shader_info_log(self.handle)
    }

    /// Driver log prefixed with where the source came from.
    pub fn diagnostic(&self, driver: &D) -> String {
        format!(
            "Shader compile failure in {}:\n{}",
            self.label,
            self.info_log(driver).trim_end()
        )
    }

    pub fn attach_to(&self, driver: &D, program: D::Program) {
        log::debug!("Attaching shader: {:?} to program: {:?}", self.handle, program);
        driver.attach_shader(program, self.handle);
    }

    /// Detach from `program` and delete the shader object.
    pub fn detach_from(self, driver: &D, program: D::Program) {
        log::debug!("Detaching shader: {:?} from program: {:?}", self.handle, program);
        driver.detach_shader(program, self.handle);
        self.delete(driver);
    }

    /// Delete the shader object without touching any program.
    pub fn delete(self, driver: &D) {
        log::debug!("Deleting shader: {:?}", self.handle);
        driver.delete_shader(self.handle);
    }

    fn log_error(&self, driver: &D) {
        log::error!("{}", self.diagnostic(driver));
    }
}
