// GL driver seam
//
// Every native call the sandbox makes goes through `GlDriver`. The real
// implementation forwards to glow; tests use the recording driver below.

use std::fmt;

use glow::HasContext;

use super::shader::ShaderStage;

/// Buffer binding points used by the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    /// GL_ARRAY_BUFFER
    Vertex,
    /// GL_ELEMENT_ARRAY_BUFFER
    Index,
}

impl BufferTarget {
    fn gl_enum(self) -> u32 {
        match self {
            BufferTarget::Vertex => glow::ARRAY_BUFFER,
            BufferTarget::Index => glow::ELEMENT_ARRAY_BUFFER,
        }
    }
}

/// The subset of OpenGL the sandbox needs.
///
/// Implementors must only be called while their context is current on the
/// calling thread.
pub trait GlDriver {
    type Shader: Copy + fmt::Debug;
    type Program: Copy + fmt::Debug;
    type Buffer: Copy + fmt::Debug;
    type VertexArray: Copy + fmt::Debug;

    // Shader objects
    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    fn compile_shader(&self, shader: Self::Shader);
    fn shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    // Program objects
    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn link_program(&self, program: Self::Program);
    fn program_link_status(&self, program: Self::Program) -> bool;
    fn program_info_log(&self, program: Self::Program) -> String;
    /// Number of shaders attached to `program`, when the driver can tell.
    fn attached_shader_count(&self, _program: Self::Program) -> Option<i32> {
        None
    }
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn use_program(&self, program: Option<Self::Program>);
    fn delete_program(&self, program: Self::Program);

    // Vertex arrays and buffers
    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    /// Bind `buffer` to `target` and fill it with `data` (STATIC_DRAW).
    fn upload_buffer(&self, target: BufferTarget, buffer: Self::Buffer, data: &[u8]);
    fn delete_buffer(&self, buffer: Self::Buffer);
    /// Point attribute `index` at `size` floats and enable it.
    fn vertex_attrib_f32(&self, index: u32, size: i32, stride: i32, offset: i32);

    // Frame
    fn viewport(&self, width: i32, height: i32);
    fn clear(&self, color: [f32; 4]);
    /// Draw `count` u16 indices from the bound element buffer as triangles.
    fn draw_indexed_triangles(&self, count: i32);
    fn version_string(&self) -> String;
}

impl GlDriver for glow::Context {
    type Shader = glow::NativeShader;
    type Program = glow::NativeProgram;
    type Buffer = glow::NativeBuffer;
    type VertexArray = glow::NativeVertexArray;

    // SAFETY (all methods): the context is made current before the first
    // call and stays current on the event-loop thread for its whole life.

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String> {
        unsafe { HasContext::create_shader(self, stage.gl_enum()) }
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { HasContext::shader_source(self, shader, source) }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        unsafe { HasContext::compile_shader(self, shader) }
    }

    fn shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { self.get_shader_compile_status(shader) }
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.get_shader_info_log(shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { HasContext::delete_shader(self, shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { HasContext::create_program(self) }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { HasContext::attach_shader(self, program, shader) }
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { HasContext::detach_shader(self, program, shader) }
    }

    fn link_program(&self, program: Self::Program) {
        unsafe { HasContext::link_program(self, program) }
    }

    fn program_link_status(&self, program: Self::Program) -> bool {
        unsafe { self.get_program_link_status(program) }
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.get_program_info_log(program) }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.get_attrib_location(program, name) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { HasContext::use_program(self, program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { HasContext::delete_program(self, program) }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        unsafe { HasContext::create_vertex_array(self) }
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe { HasContext::bind_vertex_array(self, vertex_array) }
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        unsafe { HasContext::delete_vertex_array(self, vertex_array) }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { HasContext::create_buffer(self) }
    }

    fn upload_buffer(&self, target: BufferTarget, buffer: Self::Buffer, data: &[u8]) {
        unsafe {
            self.bind_buffer(target.gl_enum(), Some(buffer));
            self.buffer_data_u8_slice(target.gl_enum(), data, glow::STATIC_DRAW);
        }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { HasContext::delete_buffer(self, buffer) }
    }

    fn vertex_attrib_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        unsafe {
            self.vertex_attrib_pointer_f32(index, size, glow::FLOAT, false, stride, offset);
            self.enable_vertex_attrib_array(index);
        }
    }

    fn viewport(&self, width: i32, height: i32) {
        unsafe { HasContext::viewport(self, 0, 0, width, height) }
    }

    fn clear(&self, color: [f32; 4]) {
        unsafe {
            self.clear_color(color[0], color[1], color[2], color[3]);
            HasContext::clear(self, glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw_indexed_triangles(&self, count: i32) {
        unsafe { self.draw_elements(glow::TRIANGLES, count, glow::UNSIGNED_SHORT, 0) }
    }

    fn version_string(&self) -> String {
        unsafe { self.get_parameter_string(glow::VERSION) }
    }
}

/// In-memory driver for unit tests.
///
/// "Compiles" a shader when its source has a `void main()` and balanced
/// braces, and links a program when at least one shader is attached and
/// every attached shader compiled.
#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    use super::{BufferTarget, GlDriver, ShaderStage};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Upload { target: BufferTarget, len: usize },
        AttribPointer { index: u32, size: i32, stride: i32, offset: i32 },
        BindVertexArray(Option<u32>),
        UseProgram(Option<u32>),
        Clear([f32; 4]),
        Draw(i32),
    }

    #[derive(Debug, Default)]
    struct ShaderObject {
        source: String,
        compiled: bool,
        log: String,
    }

    #[derive(Debug, Default)]
    struct ProgramObject {
        attached: Vec<u32>,
        linked: bool,
        log: String,
    }

    #[derive(Debug, Default)]
    struct State {
        next_id: u32,
        shaders: HashMap<u32, ShaderObject>,
        programs: HashMap<u32, ProgramObject>,
        buffers: HashSet<u32>,
        vertex_arrays: HashSet<u32>,
        buffers_created: usize,
        calls: Vec<Call>,
    }

    impl State {
        fn alloc(&mut self) -> u32 {
            self.next_id += 1;
            self.next_id
        }
    }

    pub struct RecordingDriver {
        state: RefCell<State>,
        attributes: Vec<String>,
        fail_create: bool,
        buffer_limit: Option<usize>,
    }

    impl Default for RecordingDriver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RecordingDriver {
        pub fn new() -> Self {
            Self {
                state: RefCell::new(State::default()),
                attributes: vec!["position".to_string()],
                fail_create: false,
                buffer_limit: None,
            }
        }

        /// Active attribute names reported for every linked program.
        pub fn with_attributes(mut self, names: &[&str]) -> Self {
            self.attributes = names.iter().map(|s| s.to_string()).collect();
            self
        }

        /// Make every object creation fail, like a lost context.
        pub fn failing() -> Self {
            Self {
                fail_create: true,
                ..Self::new()
            }
        }

        /// Fail buffer creation once `limit` buffers have been handed out.
        pub fn with_buffer_limit(mut self, limit: usize) -> Self {
            self.buffer_limit = Some(limit);
            self
        }

        pub fn live_shaders(&self) -> usize {
            self.state.borrow().shaders.len()
        }

        pub fn live_programs(&self) -> usize {
            self.state.borrow().programs.len()
        }

        pub fn live_buffers(&self) -> usize {
            self.state.borrow().buffers.len()
        }

        pub fn live_vertex_arrays(&self) -> usize {
            self.state.borrow().vertex_arrays.len()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.borrow().calls.clone()
        }

        fn record(&self, call: Call) {
            self.state.borrow_mut().calls.push(call);
        }

        fn create(&self, what: &str) -> Result<u32, String> {
            if self.fail_create {
                return Err(format!("out of memory creating {what}"));
            }
            Ok(self.state.borrow_mut().alloc())
        }
    }

    fn looks_valid(source: &str) -> bool {
        let opens = source.matches('{').count();
        let closes = source.matches('}').count();
        source.contains("void main()") && opens > 0 && opens == closes
    }

    impl GlDriver for RecordingDriver {
        type Shader = u32;
        type Program = u32;
        type Buffer = u32;
        type VertexArray = u32;

        fn create_shader(&self, _stage: ShaderStage) -> Result<u32, String> {
            let id = self.create("shader")?;
            self.state.borrow_mut().shaders.insert(id, ShaderObject::default());
            Ok(id)
        }

        fn shader_source(&self, shader: u32, source: &str) {
            if let Some(obj) = self.state.borrow_mut().shaders.get_mut(&shader) {
                obj.source = source.to_string();
            }
        }

        fn compile_shader(&self, shader: u32) {
            if let Some(obj) = self.state.borrow_mut().shaders.get_mut(&shader) {
                obj.compiled = looks_valid(&obj.source);
                obj.log = if obj.compiled {
                    String::new()
                } else {
                    "0:1(1): error: syntax error, unexpected end of file".to_string()
                };
            }
        }

        fn shader_compile_status(&self, shader: u32) -> bool {
            self.state
                .borrow()
                .shaders
                .get(&shader)
                .map_or(false, |obj| obj.compiled)
        }

        fn shader_info_log(&self, shader: u32) -> String {
            self.state
                .borrow()
                .shaders
                .get(&shader)
                .map(|obj| obj.log.clone())
                .unwrap_or_default()
        }

        fn delete_shader(&self, shader: u32) {
            self.state.borrow_mut().shaders.remove(&shader);
        }

        fn create_program(&self) -> Result<u32, String> {
            let id = self.create("program")?;
            self.state.borrow_mut().programs.insert(id, ProgramObject::default());
            Ok(id)
        }

        fn attach_shader(&self, program: u32, shader: u32) {
            if let Some(obj) = self.state.borrow_mut().programs.get_mut(&program) {
                obj.attached.push(shader);
            }
        }

        fn detach_shader(&self, program: u32, shader: u32) {
            if let Some(obj) = self.state.borrow_mut().programs.get_mut(&program) {
                obj.attached.retain(|&s| s != shader);
            }
        }

        fn link_program(&self, program: u32) {
            let mut state = self.state.borrow_mut();
            let State { shaders, programs, .. } = &mut *state;
            if let Some(obj) = programs.get_mut(&program) {
                let all_compiled = obj
                    .attached
                    .iter()
                    .all(|s| shaders.get(s).map_or(false, |sh| sh.compiled));
                obj.linked = !obj.attached.is_empty() && all_compiled;
                obj.log = if obj.linked {
                    String::new()
                } else if obj.attached.is_empty() {
                    "error: no shaders attached to the program".to_string()
                } else {
                    "error: linking with uncompiled/unspecialized shader".to_string()
                };
            }
        }

        fn program_link_status(&self, program: u32) -> bool {
            self.state
                .borrow()
                .programs
                .get(&program)
                .map_or(false, |obj| obj.linked)
        }

        fn program_info_log(&self, program: u32) -> String {
            self.state
                .borrow()
                .programs
                .get(&program)
                .map(|obj| obj.log.clone())
                .unwrap_or_default()
        }

        fn attached_shader_count(&self, program: u32) -> Option<i32> {
            self.state
                .borrow()
                .programs
                .get(&program)
                .map(|obj| obj.attached.len() as i32)
        }

        fn attrib_location(&self, program: u32, name: &str) -> Option<u32> {
            if !self.program_link_status(program) {
                return None;
            }
            self.attributes.iter().position(|a| a == name).map(|i| i as u32)
        }

        fn use_program(&self, program: Option<u32>) {
            self.record(Call::UseProgram(program));
        }

        fn delete_program(&self, program: u32) {
            self.state.borrow_mut().programs.remove(&program);
        }

        fn create_vertex_array(&self) -> Result<u32, String> {
            let id = self.create("vertex array")?;
            self.state.borrow_mut().vertex_arrays.insert(id);
            Ok(id)
        }

        fn bind_vertex_array(&self, vertex_array: Option<u32>) {
            self.record(Call::BindVertexArray(vertex_array));
        }

        fn delete_vertex_array(&self, vertex_array: u32) {
            self.state.borrow_mut().vertex_arrays.remove(&vertex_array);
        }

        fn create_buffer(&self) -> Result<u32, String> {
            if self.buffer_limit == Some(self.state.borrow().buffers_created) {
                return Err("out of memory creating buffer".to_string());
            }
            let id = self.create("buffer")?;
            let mut state = self.state.borrow_mut();
            state.buffers_created += 1;
            state.buffers.insert(id);
            Ok(id)
        }

        fn upload_buffer(&self, target: BufferTarget, _buffer: u32, data: &[u8]) {
            self.record(Call::Upload { target, len: data.len() });
        }

        fn delete_buffer(&self, buffer: u32) {
            self.state.borrow_mut().buffers.remove(&buffer);
        }

        fn vertex_attrib_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
            self.record(Call::AttribPointer { index, size, stride, offset });
        }

        fn viewport(&self, _width: i32, _height: i32) {}

        fn clear(&self, color: [f32; 4]) {
            self.record(Call::Clear(color));
        }

        fn draw_indexed_triangles(&self, count: i32) {
            self.record(Call::Draw(count));
        }

        fn version_string(&self) -> String {
            "4.1 (recording driver)".to_string()
        }
    }
}
