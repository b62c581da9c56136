use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Mat4;
use log::info;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use point_cloud_renderer::app::{
    camera_from_bounds, print_summary, simulate, FrameClock, HEADLESS_DT,
};
use point_cloud_renderer::{
    Bounds, DrawArgs, HeadlessDevice, PointBuffers, PointCloud, PointGenerator, Renderer,
    Settings,
};

const DEFAULT_HEADLESS_FRAMES: u32 = 60;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let mut settings = match &options.settings_path {
        Some(path) => {
            Settings::load(path).with_context(|| format!("failed to load settings {path}"))?
        }
        None => Settings::default(),
    };
    if options.seed.is_some() {
        settings.seed = options.seed;
    }

    let headless_frames = options.frames.unwrap_or(DEFAULT_HEADLESS_FRAMES);
    if options.headless {
        return run_headless(settings, headless_frames);
    }
    match run_interactive(settings.clone(), options.frames) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode (set DISPLAY or install a GPU driver to enable rendering)."
                );
                run_headless(settings, headless_frames)
            } else {
                Err(err)
            }
        }
    }
}

fn run_headless(settings: Settings, frames: u32) -> Result<()> {
    let mut generator = PointGenerator::new(settings);
    let mut cloud = PointCloud::new();
    generator.init(&mut cloud);
    println!(
        "Generated {} points on a shell of radius {:.2}",
        cloud.len(),
        generator.settings().shell_radius
    );

    let device = HeadlessDevice::new();
    let mut buffers = PointBuffers::new(device.clone());
    buffers
        .sync(&mut cloud)
        .context("failed to upload initial point buffers")?;
    let uploads = simulate(&mut generator, &mut cloud, &mut buffers, frames, HEADLESS_DT)
        .context("failed to upload point buffers")?;
    println!(
        "Ran {frames} frame(s) with {uploads} position upload(s), rotation {:.1} degrees",
        generator.elapsed_angle().to_degrees()
    );

    match buffers.args() {
        Some(args) => {
            let args = bytemuck::pod_read_unaligned::<DrawArgs>(&device.read(args));
            println!(
                "Draw args: index_count={} instance_count={}",
                args.index_count, args.instance_count
            );
        }
        None => println!("Draw args: none (empty cloud)"),
    }
    print_summary(&cloud);

    let live = device.live_buffers();
    buffers.release();
    println!(
        "Released {live} buffer(s); {} still allocated",
        device.live_buffers()
    );
    Ok(())
}

fn run_interactive(settings: Settings, frame_limit: Option<u32>) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::<()>::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = PointCloudApp::new(settings, frame_limit);
    event_loop.run_app(&mut app).context("event loop failed")?;
    app.shutdown();

    match app.last_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct PointCloudApp {
    generator: PointGenerator,
    cloud: PointCloud,
    framing: Option<Bounds>,
    transform: Mat4,
    renderer: Option<Renderer>,
    clock: FrameClock,
    frame_limit: Option<u32>,
    frames: u32,
    last_error: Option<anyhow::Error>,
}

impl PointCloudApp {
    fn new(settings: Settings, frame_limit: Option<u32>) -> Self {
        let mut generator = PointGenerator::new(settings);
        let mut cloud = PointCloud::new();
        generator.init(&mut cloud);
        let framing = cloud.bounds();
        Self {
            generator,
            cloud,
            framing,
            transform: Mat4::IDENTITY,
            renderer: None,
            clock: FrameClock::new(),
            frame_limit,
            frames: 0,
            last_error: None,
        }
    }

    fn create_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<Renderer> {
        let attributes = Window::default_attributes()
            .with_title("Point Cloud")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let renderer = block_on(Renderer::new(window))
            .map_err(|err| WindowInitError::from_error("renderer", format!("{err:#}")))?;
        Ok(renderer)
    }

    fn process_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        if window_id != renderer.window_id() {
            return Ok(());
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => renderer.resize(size),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape)
                {
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => {
                let dt = self.clock.tick();
                self.generator.step(&mut self.cloud, dt);
                renderer
                    .sync(&mut self.cloud)
                    .context("failed to upload point buffers")?;
                let camera = camera_from_bounds(self.framing, renderer.aspect());
                renderer.update_globals(&camera, self.transform, &self.cloud);
                if let Err(err) = renderer.render() {
                    match err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            let size = renderer.window().inner_size();
                            renderer.resize(size);
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            return Err(anyhow!("GPU is out of memory"));
                        }
                        other => {
                            info!("Surface unavailable ({other}); retrying next frame");
                        }
                    }
                }
                self.frames += 1;
                if self.frame_limit.is_some_and(|limit| self.frames >= limit) {
                    event_loop.exit();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.release_buffers();
        }
        if self.frames > 0 {
            println!("Rendered {} frame(s)", self.frames);
            print_summary(&self.cloud);
        }
    }
}

impl ApplicationHandler for PointCloudApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        match self.create_renderer(event_loop) {
            Ok(renderer) => {
                renderer.window().request_redraw();
                self.renderer = Some(renderer);
            }
            Err(err) => {
                self.last_error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Err(err) = self.process_event(event_loop, window_id, event) {
            self.last_error = Some(err);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.window().request_redraw();
        }
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

const USAGE: &str = "Usage: point-cloud [settings.xml] [--headless] [--frames N] [--seed S]";

struct CliOptions {
    settings_path: Option<String>,
    headless: bool,
    frames: Option<u32>,
    seed: Option<u64>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from<I: Iterator<Item = String>>(mut args: I) -> Result<Self> {
        let mut options = CliOptions {
            settings_path: None,
            headless: false,
            frames: None,
            seed: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a value"))?;
                    options.frames = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid frame count {value}"))?,
                    );
                }
                "--seed" => {
                    let value = args.next().ok_or_else(|| anyhow!("--seed needs a value"))?;
                    options.seed = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid seed {value}"))?,
                    );
                }
                "--help" | "-h" => return Err(anyhow!(USAGE)),
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
                path => {
                    if options.settings_path.is_some() {
                        return Err(anyhow!("Only one settings file may be given. {USAGE}"));
                    }
                    options.settings_path = Some(path.to_string());
                }
            }
        }
        Ok(options)
    }
}
