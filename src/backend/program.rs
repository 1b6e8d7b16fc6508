// Program creation and linking
//
// A `ProgramBuilder` collects (stage, source) pairs, compiles a shader for
// each, attaches them, links, then detaches and deletes the shaders. Any
// stage that fails to read or compile, or a failed link, comes back as a
// `BuildFailure` that still owns the program handle.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::driver::GlDriver;
use super::shader::{read_source, Shader, ShaderError, ShaderStage};

/// A linked (or failed-to-link) program object
pub struct Program<D: GlDriver> {
    handle: D::Program,
}

impl<D: GlDriver> fmt::Debug for Program<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program").field("handle", &self.handle).finish()
    }
}

impl<D: GlDriver> Program<D> {
    pub fn handle(&self) -> D::Program {
        self.handle
    }

    pub fn link_status(&self, driver: &D) -> bool {
        driver.program_link_status(self.handle)
    }

    pub fn info_log(&self, driver: &D) -> String {
        driver.program_info_log(self.handle)
    }

    /// `None` when the driver has no attached-shader query (glow does not expose one).
    pub fn attached_shader_count(&self, driver: &D) -> Option<i32> {
        driver.attached_shader_count(self.handle)
    }

    /// Location of a named vertex attribute, if the program has it active.
    pub fn attrib_location(&self, driver: &D, name: &str) -> Option<u32> {
        driver.attrib_location(self.handle, name)
    }

    pub fn bind(&self, driver: &D) {
        driver.use_program(Some(self.handle));
    }

    pub fn delete(self, driver: &D) {
        log::debug!("Deleting program: {:?}", self.handle);
        driver.delete_program(self.handle);
    }
}

/// Why a single stage did not make it into the program
#[derive(Debug)]
pub enum StageFailureReason {
    /// No shader object was built (unreadable source or driver refusal)
    Missing(ShaderError),
    Compile(String),
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: ShaderStage,
    pub label: String,
    pub reason: StageFailureReason,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            StageFailureReason::Missing(err) => write!(f, "{} stage: {}", self.stage, err),
            StageFailureReason::Compile(log) => write!(f, "{} stage: {}", self.stage, log),
        }
    }
}

/// A program that was created but is not usable as built.
pub struct BuildFailure<D: GlDriver> {
    program: Program<D>,
    stages: Vec<StageFailure>,
    link_log: Option<String>,
}

impl<D: GlDriver> BuildFailure<D> {
    pub fn stages(&self) -> &[StageFailure] {
        &self.stages
    }

    pub fn failed_stages(&self) -> Vec<ShaderStage> {
        self.stages.iter().map(|s| s.stage).collect()
    }

    /// Driver link log, when the link itself failed.
    pub fn link_log(&self) -> Option<&str> {
        self.link_log.as_deref()
    }

    /// Take the broken program, e.g. to keep running with it anyway.
    pub fn into_program(self) -> Program<D> {
        self.program
    }
}

impl<D: GlDriver> fmt::Debug for BuildFailure<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildFailure")
            .field("program", &self.program)
            .field("stages", &self.stages)
            .field("link_log", &self.link_log)
            .finish()
    }
}

impl<D: GlDriver> fmt::Display for BuildFailure<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program {:?} failed to build", self.program.handle)?;
        for stage in &self.stages {
            write!(f, "\n  {}", stage)?;
        }
        if let Some(log) = &self.link_log {
            write!(f, "\n  link: {}", log.trim_end())?;
        }
        Ok(())
    }
}

#[derive(Error)]
pub enum ProgramError<D: GlDriver> {
    #[error("failed to create program object: {0}")]
    Create(String),
    #[error("{0}")]
    Build(BuildFailure<D>),
}

impl<D: GlDriver> fmt::Debug for ProgramError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::Create(reason) => f.debug_tuple("Create").field(reason).finish(),
            ProgramError::Build(failure) => f.debug_tuple("Build").field(failure).finish(),
        }
    }
}

#[derive(Debug, Clone)]
enum StageSource {
    File(PathBuf),
    Inline { label: String, text: String },
}

/// Collects shader stages and builds a program from them.
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    stages: Vec<(ShaderStage, StageSource)>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage read from a GLSL file.
    pub fn stage<P: AsRef<Path>>(mut self, stage: ShaderStage, path: P) -> Self {
        self.stages.push((stage, StageSource::File(path.as_ref().to_path_buf())));
        self
    }

    /// Add a stage from in-memory source; `label` names it in diagnostics.
    pub fn source(mut self, stage: ShaderStage, label: &str, text: &str) -> Self {
        self.stages.push((
            stage,
            StageSource::Inline {
                label: label.to_string(),
                text: text.to_string(),
            },
        ));
        self
    }

    /// Paths of every file-backed stage, for watching.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.stages
            .iter()
            .filter_map(|(_, src)| match src {
                StageSource::File(path) => Some(path.clone()),
                StageSource::Inline { .. } => None,
            })
            .collect()
    }

    /// Create the program and attach every stage that compiled, without
    /// linking. Stage failures are carried to `UnlinkedProgram::link`.
    pub fn attach<D: GlDriver>(&self, driver: &D) -> Result<UnlinkedProgram<D>, ProgramError<D>> {
        let handle = driver.create_program().map_err(ProgramError::Create)?;
        log::debug!("Created program: {:?} with {} stage(s)", handle, self.stages.len());

        let mut shaders = Vec::with_capacity(self.stages.len());
        let mut failures = Vec::new();

        for (stage, source) in &self.stages {
            let (label, built) = match source {
                StageSource::File(path) => {
                    let label = path.display().to_string();
                    let built = read_source(path)
                        .and_then(|text| Shader::<D>::compile(driver, *stage, &label, &text));
                    (label, built)
                }
                StageSource::Inline { label, text } => {
                    (label.clone(), Shader::<D>::compile(driver, *stage, label, text))
                }
            };

            match built {
                Ok(shader) => {
                    if !shader.status(driver) {
                        failures.push(StageFailure {
                            stage: *stage,
                            label,
                            reason: StageFailureReason::Compile(shader.diagnostic(driver)),
                        });
                    }
                    shader.attach_to(driver, handle);
                    shaders.push(shader);
                }
                Err(err) => {
                    log::error!("Skipping {} stage: {}", stage, err);
                    failures.push(StageFailure {
                        stage: *stage,
                        label,
                        reason: StageFailureReason::Missing(err),
                    });
                }
            }
        }

        Ok(UnlinkedProgram {
            program: Program { handle },
            shaders,
            failures,
        })
    }

    /// Attach every stage and link.
    pub fn link<D: GlDriver>(&self, driver: &D) -> Result<Program<D>, ProgramError<D>> {
        self.attach(driver)?.link(driver)
    }
}

/// A program with its shaders still attached, before linking
pub struct UnlinkedProgram<D: GlDriver> {
    program: Program<D>,
    shaders: Vec<Shader<D>>,
    failures: Vec<StageFailure>,
}

impl<D: GlDriver> UnlinkedProgram<D> {
    pub fn program(&self) -> &Program<D> {
        &self.program
    }

    pub fn shaders(&self) -> &[Shader<D>] {
        &self.shaders
    }

    /// Link, then detach and delete every shader.
    pub fn link(self, driver: &D) -> Result<Program<D>, ProgramError<D>> {
        let UnlinkedProgram {
            program,
            shaders,
            failures,
        } = self;

        driver.link_program(program.handle);

        // Shaders are linked in now (or never will be); drop them either way
        for shader in shaders {
            shader.detach_from(driver, program.handle);
        }

        let linked = program.link_status(driver);
        let link_log = if linked {
            None
        } else {
            let log = program.info_log(driver);
            log::error!("Program link failure ({:?}):\n{}", program.handle, log.trim_end());
            Some(log)
        };

        if linked && failures.is_empty() {
            log::info!("Linked program: {:?}", program.handle);
            return Ok(program);
        }

        Err(ProgramError::Build(BuildFailure {
            program,
            stages: failures,
            link_log,
        }))
    }
}

/// Program linked with a vertex shader
pub fn link_vertex<D: GlDriver>(driver: &D, vertex: impl AsRef<Path>) -> Result<Program<D>, ProgramError<D>> {
    ProgramBuilder::new().stage(ShaderStage::Vertex, vertex).link(driver)
}

/// Program linked with a fragment shader
pub fn link_fragment<D: GlDriver>(driver: &D, fragment: impl AsRef<Path>) -> Result<Program<D>, ProgramError<D>> {
    ProgramBuilder::new().stage(ShaderStage::Fragment, fragment).link(driver)
}

/// Program linked with vertex and fragment shaders
pub fn link_vertex_fragment<D: GlDriver>(
    driver: &D,
    vertex: impl AsRef<Path>,
    fragment: impl AsRef<Path>,
) -> Result<Program<D>, ProgramError<D>> {
    ProgramBuilder::new()
        .stage(ShaderStage::Vertex, vertex)
        .stage(ShaderStage::Fragment, fragment)
        .link(driver)
}

/// Program linked with vertex, geometry and fragment shaders
pub fn link_vertex_geometry_fragment<D: GlDriver>(
    driver: &D,
    vertex: impl AsRef<Path>,
    geometry: impl AsRef<Path>,
    fragment: impl AsRef<Path>,
) -> Result<Program<D>, ProgramError<D>> {
    ProgramBuilder::new()
        .stage(ShaderStage::Vertex, vertex)
        .stage(ShaderStage::Geometry, geometry)
        .stage(ShaderStage::Fragment, fragment)
        .link(driver)
}

/// Same as `link_vertex_fragment` minus the link, for pre-link setup such
/// as binding attribute locations.
pub fn attach_vertex_fragment<D: GlDriver>(
    driver: &D,
    vertex: impl AsRef<Path>,
    fragment: impl AsRef<Path>,
) -> Result<UnlinkedProgram<D>, ProgramError<D>> {
    ProgramBuilder::new()
        .stage(ShaderStage::Vertex, vertex)
        .stage(ShaderStage::Fragment, fragment)
        .attach(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::driver::testing::RecordingDriver;
    use std::fs;
    use tempfile::TempDir;

    const VERTEX: &str = "#version 410 core\nin vec3 position;\nlayout (location = 1) in vec3 color;\nout vec3 v_color;\nvoid main() { v_color = color; gl_Position = vec4(position, 1.0); }\n";
    const GEOMETRY: &str = "#version 410 core\nlayout (triangles) in;\nlayout (triangle_strip, max_vertices = 3) out;\nvoid main() { EmitVertex(); }\n";
    const FRAGMENT: &str = "#version 410 core\nin vec3 v_color;\nout vec4 frag_color;\nvoid main() { frag_color = vec4(v_color, 1.0); }\n";
    const BROKEN: &str = "#version 410 core\nvoid main() { frag_color = ";

    fn write_shaders(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        dir
    }

    #[test]
    fn vertex_fragment_links() {
        let dir = write_shaders(&[("quad.vert", VERTEX), ("quad.frag", FRAGMENT)]);
        let driver = RecordingDriver::new();

        let program = link_vertex_fragment(&driver, dir.path().join("quad.vert"), dir.path().join("quad.frag")).unwrap();

        assert!(program.link_status(&driver));
        assert_eq!(program.attached_shader_count(&driver), Some(0));
        assert_eq!(driver.live_shaders(), 0);
    }

    #[test]
    fn broken_stage_still_yields_a_program() {
        let dir = write_shaders(&[("quad.vert", VERTEX), ("broken.frag", BROKEN)]);
        let driver = RecordingDriver::new();

        let err = link_vertex_fragment(&driver, dir.path().join("quad.vert"), dir.path().join("broken.frag")).unwrap_err();

        let failure = match err {
            ProgramError::Build(failure) => failure,
            other => panic!("unexpected error: {other}"),
        };
        assert_eq!(failure.failed_stages(), vec![ShaderStage::Fragment]);
        assert!(failure.stages()[0].label.ends_with("broken.frag"));
        assert!(failure.link_log().is_some());
        assert!(failure.to_string().contains("fragment stage"));

        let program = failure.into_program();
        assert!(!program.link_status(&driver));
        assert_eq!(driver.live_programs(), 1);
        assert_eq!(driver.live_shaders(), 0);
    }

    #[test]
    fn missing_file_is_a_read_failure() {
        let dir = write_shaders(&[("quad.vert", VERTEX)]);
        let driver = RecordingDriver::new();

        let err = link_vertex_fragment(&driver, dir.path().join("quad.vert"), dir.path().join("missing.frag")).unwrap_err();

        let ProgramError::Build(failure) = err else {
            panic!("expected a build failure");
        };
        assert!(matches!(failure.stages()[0].reason, StageFailureReason::Missing(ShaderError::Read { .. })));
        assert_eq!(failure.stages()[0].stage, ShaderStage::Fragment);
    }

    #[test]
    fn shipped_shaders_link() {
        let shaders = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        let driver = RecordingDriver::new();

        let program = link_vertex_fragment(&driver, shaders.join("vertex.glsl"), shaders.join("fragment.glsl")).unwrap();

        assert!(program.link_status(&driver));
    }

    #[test]
    fn single_stage_helpers() {
        let dir = write_shaders(&[("quad.vert", VERTEX), ("quad.frag", FRAGMENT)]);
        let driver = RecordingDriver::new();

        let vertex_only = link_vertex(&driver, dir.path().join("quad.vert")).unwrap();
        let fragment_only = link_fragment(&driver, dir.path().join("quad.frag")).unwrap();

        assert!(vertex_only.link_status(&driver));
        assert!(fragment_only.link_status(&driver));
        assert_ne!(vertex_only.handle(), fragment_only.handle());
    }

    #[test]
    fn geometry_pipeline_links() {
        let dir = write_shaders(&[("quad.vert", VERTEX), ("quad.geom", GEOMETRY), ("quad.frag", FRAGMENT)]);
        let driver = RecordingDriver::new();

        let program = link_vertex_geometry_fragment(
            &driver,
            dir.path().join("quad.vert"),
            dir.path().join("quad.geom"),
            dir.path().join("quad.frag"),
        )
        .unwrap();

        assert!(program.link_status(&driver));
        assert_eq!(driver.live_shaders(), 0);
    }

    #[test]
    fn unlinked_variant_keeps_shaders_attached() {
        let dir = write_shaders(&[("quad.vert", VERTEX), ("quad.frag", FRAGMENT)]);
        let driver = RecordingDriver::new();

        let unlinked = attach_vertex_fragment(&driver, dir.path().join("quad.vert"), dir.path().join("quad.frag")).unwrap();
        assert_eq!(unlinked.program().attached_shader_count(&driver), Some(2));
        assert_eq!(unlinked.shaders().len(), 2);
        assert!(!unlinked.program().link_status(&driver));

        let program = unlinked.link(&driver).unwrap();
        assert!(program.link_status(&driver));
        assert_eq!(program.attached_shader_count(&driver), Some(0));
        assert_eq!(driver.live_shaders(), 0);
    }

    #[test]
    fn inline_sources_build() {
        let driver = RecordingDriver::new();
        let program = ProgramBuilder::new()
            .source(ShaderStage::Vertex, "inline.vert", VERTEX)
            .source(ShaderStage::Fragment, "inline.frag", FRAGMENT)
            .link(&driver)
            .unwrap();

        assert!(program.link_status(&driver));
        assert!(program.attrib_location(&driver, "position").is_some());
    }

    #[test]
    fn empty_builder_fails_to_link() {
        let driver = RecordingDriver::new();
        let err = ProgramBuilder::new().link(&driver).unwrap_err();

        let ProgramError::Build(failure) = err else {
            panic!("expected a build failure");
        };
        assert!(failure.stages().is_empty());
        assert!(failure.link_log().is_some());
    }

    #[test]
    fn create_failure_has_no_handle() {
        let driver = RecordingDriver::failing();
        let err = ProgramBuilder::new()
            .source(ShaderStage::Vertex, "inline.vert", VERTEX)
            .link(&driver)
            .unwrap_err();

        assert!(matches!(err, ProgramError::Create(_)));
        assert_eq!(driver.live_programs(), 0);
    }

    #[test]
    fn source_paths_lists_files_only() {
        let builder = ProgramBuilder::new()
            .stage(ShaderStage::Vertex, "shaders/vertex.glsl")
            .source(ShaderStage::Fragment, "inline.frag", FRAGMENT);

        assert_eq!(builder.source_paths(), vec![PathBuf::from("shaders/vertex.glsl")]);
    }

    #[test]
    fn delete_releases_the_program() {
        let driver = RecordingDriver::new();
        let program = ProgramBuilder::new()
            .source(ShaderStage::Vertex, "inline.vert", VERTEX)
            .link(&driver)
            .unwrap();

        program.delete(&driver);
        assert_eq!(driver.live_programs(), 0);
    }
}
