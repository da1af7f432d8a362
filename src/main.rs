use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{WindowAttributes, WindowId};

use seascape::{
    run_frames, Camera, FrameClock, NormalMapLoader, Renderer, SceneSettings, TimeStep,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let mut settings = SceneSettings::default();
    if let Some(path) = &options.normals {
        settings.water.normal_map = path.clone();
    }

    print_scene_summary(&settings);

    if options.headless {
        run_headless(&options)
    } else {
        run_windowed(settings, options)
    }
}

fn print_scene_summary(settings: &SceneSettings) {
    let sun = settings.sun.direction();
    println!("Composed ocean scene:");
    println!(
        " - water: {} x {} plane, distortion scale {}",
        settings.water.side, settings.water.side, settings.water.distortion_scale
    );
    println!(
        " - sky: turbidity {}, rayleigh {}, mie {} (g {})",
        settings.sky.turbidity,
        settings.sky.rayleigh,
        settings.sky.mie_coefficient,
        settings.sky.mie_directional_g
    );
    println!(
        " - sun: elevation {} deg, azimuth {} deg, direction ({:.4}, {:.4}, {:.4})",
        settings.sun.elevation_deg, settings.sun.azimuth_deg, sun.x, sun.y, sun.z
    );
}

/// Runs the frame driver without a GPU: the scene is composed, the clock
/// advances the configured number of frames against a counting sink, and
/// the final state is printed.
fn run_headless(options: &CliOptions) -> Result<()> {
    let frames = options.frames.unwrap_or(600);
    let mut clock = FrameClock::new(options.time_step());
    let mut submissions = 0u64;
    run_frames(&mut clock, frames, |_time| {
        submissions += 1;
    });
    println!(
        "Simulated {} frames: water time {:.3} s, {} submissions",
        clock.frames(),
        clock.time(),
        submissions
    );
    Ok(())
}

fn run_windowed(settings: SceneSettings, options: CliOptions) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        settings,
        options,
        state: None,
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(())
}

struct App {
    settings: SceneSettings,
    options: CliOptions,
    state: Option<SceneState>,
    last_error: Option<anyhow::Error>,
}

struct SceneState {
    renderer: Renderer,
    camera: Camera,
    clock: FrameClock,
    loader: Option<NormalMapLoader>,
    frame_limit: Option<u64>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<SceneState> {
        let window = Arc::new(
            event_loop
                .create_window(
                    WindowAttributes::default()
                        .with_title("Seascape")
                        .with_inner_size(PhysicalSize::new(1280, 720)),
                )
                .context("failed to create window")?,
        );

        let size = window.inner_size();
        info!(
            "viewport {}x{} at scale factor {}",
            size.width,
            size.height,
            window.scale_factor()
        );
        let renderer = block_on(Renderer::new(Arc::clone(&window), &self.settings))?;
        let camera = Camera::new(&self.settings.camera, size.width, size.height);

        // The normal map decodes off-thread; the water samples a flat
        // fallback until the result is polled in.
        let loader = NormalMapLoader::spawn(self.settings.water.normal_map.clone());

        Ok(SceneState {
            renderer,
            camera,
            clock: FrameClock::new(self.options.time_step()),
            loader: Some(loader),
            frame_limit: self.options.frames,
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => {
                state.renderer.window().request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                // Nothing can render without a surface; bail out before
                // entering the frame loop.
                self.last_error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if id != state.renderer.window_id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                state.camera.set_viewport(new_size.width, new_size.height);
                state.renderer.resize(new_size);
            }
            WindowEvent::RedrawRequested => {
                if let Some(loader) = state.loader.as_mut() {
                    if let Some(result) = loader.poll() {
                        if let Ok(map) = result {
                            state.renderer.install_normal_map(&map);
                        }
                        // Load errors were already logged by the loader;
                        // the flat fallback stays bound.
                        state.loader = None;
                    }
                }

                let time = state.clock.advance();
                match state.renderer.render(&state.camera, time) {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.renderer.window().inner_size();
                        state.renderer.resize(size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        self.last_error = Some(anyhow!("GPU is out of memory"));
                        event_loop.exit();
                        return;
                    }
                    Err(err) => {
                        info!("surface error, retrying next frame: {err:?}");
                    }
                }

                if state
                    .frame_limit
                    .is_some_and(|limit| state.clock.frames() >= limit)
                {
                    println!(
                        "Rendered {} frames: water time {:.3} s",
                        state.clock.frames(),
                        state.clock.time()
                    );
                    event_loop.exit();
                    return;
                }

                state.renderer.window().request_redraw();
            }
            _ => {}
        }
    }
}

struct CliOptions {
    headless: bool,
    frames: Option<u64>,
    wall_clock: bool,
    normals: Option<String>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut headless = false;
        let mut frames = None;
        let mut wall_clock = false;
        let mut normals = None;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => headless = true,
                "--wall-clock" => wall_clock = true,
                "--frames" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames requires a count"))?;
                    frames = Some(
                        value
                            .parse::<u64>()
                            .with_context(|| format!("invalid frame count: {value}"))?,
                    );
                }
                "--normals" => {
                    normals = Some(
                        args.next()
                            .ok_or_else(|| anyhow!("--normals requires a path"))?,
                    );
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --headless, --frames N, --wall-clock or --normals PATH"
                    ));
                }
            }
        }

        if wall_clock && headless {
            warn!("--wall-clock makes the headless clock depend on host timing");
        }

        Ok(Self {
            headless,
            frames,
            wall_clock,
            normals,
        })
    }

    fn time_step(&self) -> TimeStep {
        if self.wall_clock {
            TimeStep::Measured
        } else {
            TimeStep::default()
        }
    }
}
