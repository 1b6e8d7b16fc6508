// =============================================================================
// OPENGL SANDBOX - hello-quad with a shader build helper
// =============================================================================
//
// Opens a window, compiles and links a vertex + fragment shader pair,
// uploads a hard-coded quad and draws it every frame.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (App)                                         │
// │    └── glutin context + window surface                          │
// │          └── RenderState (program, quad mesh, glow context)     │
// │                └── backend: GlDriver -> Shader -> Program       │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Poll shader watcher, rebuild program if a source changed
// 2. Clear
// 3. Use program, draw quad
// 4. Swap buffers
//
// =============================================================================

use anyhow::{Context, Result};
use gl_sandbox::backend::{draw_frame, GlDriver, Program, ProgramError, QuadMesh};
use gl_sandbox::config::{Config, ShaderConfig};
use gl_sandbox::reload::ShaderWatcher;
use glutin::config::{Config as GlConfigHandle, ConfigTemplate, ConfigTemplateBuilder};
use glutin::context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version};
use glutin::display::{Display, DisplayApiPreference, GetGlDisplay};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::GlWindow;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::fs::OpenOptions;
use std::io::Write;
use std::num::NonZeroU32;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let (config, config_error) = Config::load();

    // Initialize logging
    init_logging(&config)?;
    log::info!("Starting OpenGL sandbox");
    if let Some(e) = config_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.resizable { "resizable" } else { "fixed size" }
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Initialization failures end the loop early; report them as the exit status
    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Initialize logging, optionally writing to a log file instead of stderr
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};

    let mut builder = Builder::new();
    builder.parse_filters(&config.debug.log_level);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }

    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {:?}", config.debug.log_file))?;

        writeln!(file, "=== OpenGL Sandbox Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;

        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// RENDER STATE
// =============================================================================

/// Everything that only exists while a GL context does.
///
/// IMPORTANT: Field order matters for Drop! The surface and context must go
/// before the window they were created for.
struct RenderState {
    gl: glow::Context,
    program: Program<glow::Context>,
    mesh: QuadMesh<glow::Context>,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    window: Window,
}

impl RenderState {
    /// Delete GL objects while the context is still current.
    fn destroy(self) {
        let RenderState { gl, program, mesh, .. } = self;
        program.delete(&gl);
        mesh.delete(&gl);
    }
}

/// Build the configured program, deciding what a failed build means.
fn build_program(gl: &glow::Context, shaders: &ShaderConfig) -> Result<Program<glow::Context>> {
    match shaders.program_builder().link(gl) {
        Ok(program) => Ok(program),
        Err(ProgramError::Build(failure)) if !shaders.fail_on_error => {
            log::error!("{}", failure);
            log::warn!("Continuing with a program that failed to build; output is undefined");
            Ok(failure.into_program())
        }
        Err(e) => Err(e).context("Failed to build shader program"),
    }
}

// =============================================================================
// DISPLAY + WINDOW
// =============================================================================

/// Pick the framebuffer config with the most samples.
fn pick_config(display: &Display, template: ConfigTemplate) -> Result<GlConfigHandle> {
    let configs = unsafe { display.find_configs(template) }.context("Failed to query framebuffer configs")?;
    configs
        .max_by_key(|config| config.num_samples())
        .context("No framebuffer config matches the request")
}

/// Open the GL display, choose a config and create a window compatible with it.
#[cfg(not(target_os = "windows"))]
fn create_window(event_loop: &ActiveEventLoop, attributes: WindowAttributes) -> Result<(Window, GlConfigHandle)> {
    #[cfg(target_os = "macos")]
    let preference = DisplayApiPreference::Cgl;
    #[cfg(not(target_os = "macos"))]
    let preference = DisplayApiPreference::Egl;

    let display_handle = event_loop
        .display_handle()
        .context("Failed to get display handle")?
        .as_raw();
    let display = unsafe { Display::new(display_handle, preference) }.context("Failed to open OpenGL display")?;

    let gl_config = pick_config(&display, ConfigTemplateBuilder::new().build())?;
    let window = glutin_winit::finalize_window(event_loop, attributes, &gl_config)
        .context("Failed to create window")?;

    Ok((window, gl_config))
}

/// WGL needs the window before it can enumerate configs.
#[cfg(target_os = "windows")]
fn create_window(event_loop: &ActiveEventLoop, attributes: WindowAttributes) -> Result<(Window, GlConfigHandle)> {
    let window = event_loop.create_window(attributes).context("Failed to create window")?;
    let raw_window_handle = window
        .window_handle()
        .context("Failed to get window handle")?
        .as_raw();

    let display_handle = event_loop
        .display_handle()
        .context("Failed to get display handle")?
        .as_raw();
    let display = unsafe { Display::new(display_handle, DisplayApiPreference::Wgl(Some(raw_window_handle))) }
        .context("Failed to open OpenGL display")?;

    let template = ConfigTemplateBuilder::new()
        .compatible_with_native_window(raw_window_handle)
        .build();
    let gl_config = pick_config(&display, template)?;

    Ok((window, gl_config))
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

pub struct App {
    config: Config,
    state: Option<RenderState>,
    watcher: Option<ShaderWatcher>,
    /// First unrecoverable error; returned from main after the loop exits
    fatal: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            state: None,
            watcher: None,
            fatal: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Create the window, the GL context and every GL object we draw with.
    fn init_gl(&self, event_loop: &ActiveEventLoop) -> Result<RenderState> {
        log::info!("Initializing OpenGL...");

        let window_attributes = Window::default_attributes()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable);

        let (window, gl_config) = create_window(event_loop, window_attributes)?;
        let raw_window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let gl_display = gl_config.display();
        let [major, minor] = self.config.graphics.gl_version;
        let context_attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(major, minor))))
            .with_profile(GlProfile::Core)
            .build(Some(raw_window_handle));

        let not_current = unsafe { gl_display.create_context(&gl_config, &context_attributes) }
            .with_context(|| format!("Failed to create OpenGL {}.{} core context", major, minor))?;

        let surface_attributes = window
            .build_surface_attributes(SurfaceAttributesBuilder::default())
            .context("Failed to build surface attributes")?;
        let surface = unsafe { gl_display.create_window_surface(&gl_config, &surface_attributes) }
            .context("Failed to create window surface")?;

        let context = not_current
            .make_current(&surface)
            .context("Failed to make OpenGL context current")?;

        if self.config.graphics.vsync {
            if let Err(e) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
                log::warn!("Failed to enable vsync: {}", e);
            }
        }

        let gl = unsafe { glow::Context::from_loader_function_cstr(|s| gl_display.get_proc_address(s)) };
        log::info!("OpenGL version supported by this platform: {}", gl.version_string());

        let program = build_program(&gl, &self.config.shaders)?;
        let mesh = QuadMesh::upload(&gl, &program)?;

        let size = window.inner_size();
        gl.viewport(size.width as i32, size.height as i32);

        log::info!("OpenGL initialized successfully!");
        Ok(RenderState {
            gl,
            program,
            mesh,
            surface,
            context,
            window,
        })
    }

    fn start_watcher(&mut self) {
        if !self.config.shaders.hot_reload {
            return;
        }
        let paths = self.config.shaders.program_builder().source_paths();
        match ShaderWatcher::new(&paths) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => log::warn!("Shader hot reload disabled: {:#}", e),
        }
    }

    // =========================================================================
    // HOT RELOAD
    // =========================================================================

    /// Rebuild the program from disk. A failed rebuild keeps the old program.
    fn reload_program(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        log::info!("Shader source changed, rebuilding program...");
        let program = match self.config.shaders.program_builder().link(&state.gl) {
            Ok(program) => program,
            Err(ProgramError::Build(failure)) => {
                log::error!("{}", failure);
                log::warn!("Keeping the previous program");
                failure.into_program().delete(&state.gl);
                return;
            }
            Err(e) => {
                log::error!("Shader reload failed: {}", e);
                return;
            }
        };

        // Attribute locations may move between programs, so rewire the quad
        let mesh = match QuadMesh::upload(&state.gl, &program) {
            Ok(mesh) => mesh,
            Err(e) => {
                log::error!("Failed to rebuild quad for new program: {:#}", e);
                program.delete(&state.gl);
                return;
            }
        };

        std::mem::replace(&mut state.program, program).delete(&state.gl);
        std::mem::replace(&mut state.mesh, mesh).delete(&state.gl);
        log::info!("Program reloaded");
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame.
    pub fn render_frame(&mut self) -> Result<()> {
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };

        draw_frame(&state.gl, self.config.graphics.clear_color, &state.program, &state.mesh);

        state
            .surface
            .swap_buffers(&state.context)
            .context("Failed to swap buffers")?;

        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        // Zero-sized (minimized) windows keep the old surface
        if let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) {
            state.surface.resize(&state.context, w, h);
            state.gl.viewport(width as i32, height as i32);
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    pub fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(state) = &self.state {
                state.window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.init_gl(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                self.start_watcher();
            }
            Err(e) => {
                log::error!("Failed to initialize OpenGL: {:#}", e);
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resize(size.width, size.height);
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(()) => self.update_fps(),
                Err(e) => log::error!("Render error: {:?}", e),
            },

            // ESC is the only key we listen to
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Check for shader edits, then ask for the next frame.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.watcher.as_ref().is_some_and(|w| w.poll_changed()) {
            self.reload_program();
        }

        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            log::info!("Cleaning up OpenGL resources...");
            state.destroy();
            log::info!("Cleanup complete");
        }
    }
}
