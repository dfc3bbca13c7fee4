//! x11screen - demo entry point
//!
//! Opens a window, paints a gradient into a shared memory buffer and uploads
//! it, then echoes window events until the window is closed.

use std::env;
use std::process;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use x11rb::protocol::shm::CompletionEvent;
use x11rb::protocol::xproto::{DestroyNotifyEvent, DESTROY_NOTIFY_EVENT};
use x11rb::protocol::Event;
use x11screen::backend::null::NullRequest;
use x11screen::{
    Buffer, NullBackend, Point, Screen, ScreenConfig, Size, UploadRecipient, UploadedEvent,
    Window, WindowOptions, VERSION,
};

fn print_usage() {
    println!("x11screen v{}", VERSION);
    println!("X11 screen driver demo");
    println!();
    println!("Usage: x11screen [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -display <name>       X display to connect to (default: $DISPLAY)");
    println!("  -queue <n>            Per-window event queue depth (default: 64)");
    println!("  -width <n>            Window width (default: 1024)");
    println!("  -height <n>           Window height (default: 768)");
    println!("  -title <text>         Window title");
    println!("  -null                 Run against the in-memory backend");
    println!("  -h, --help            Show this help message");
    println!();
    println!("Examples:");
    println!("  x11screen -display :1 -title demo");
    println!("  x11screen -null -width 64 -height 64");
    println!();
}

#[derive(Debug)]
struct Config {
    screen: ScreenConfig,
    window: WindowOptions,
    null: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            screen: ScreenConfig::default(),
            window: WindowOptions::default().with_title("x11screen"),
            null: false,
        }
    }
}

fn parse_args() -> Result<Config, String> {
    let mut config = Config::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    let value = |i: usize, flag: &str| -> Result<String, String> {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("Missing value for {}", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-display" => {
                i += 1;
                config.screen.display = Some(value(i, "-display")?);
            }
            "-queue" => {
                i += 1;
                config.screen.event_queue_depth = value(i, "-queue")?
                    .parse()
                    .map_err(|_| "Invalid queue depth".to_string())?;
            }
            "-width" => {
                i += 1;
                config.window.width = value(i, "-width")?
                    .parse()
                    .map_err(|_| "Invalid width".to_string())?;
            }
            "-height" => {
                i += 1;
                config.window.height = value(i, "-height")?
                    .parse()
                    .map_err(|_| "Invalid height".to_string())?;
            }
            "-title" => {
                i += 1;
                config.window.title = Some(value(i, "-title")?);
            }
            "-null" => {
                config.null = true;
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Fill the buffer with a BGRA gradient
fn paint(buffer: &mut Buffer) {
    let Size { width, height } = buffer.size();
    let stride = buffer.stride();
    let pixels = buffer.pixels_mut();
    for y in 0..height as usize {
        for x in 0..width as usize {
            let px = &mut pixels[y * stride + 4 * x..][..4];
            px[0] = (x * 255 / width.max(1) as usize) as u8;
            px[1] = (y * 255 / height.max(1) as usize) as u8;
            px[2] = 0x80;
            px[3] = 0xff;
        }
    }
}

fn draw(screen: &Screen, window: &Window) -> x11screen::Result<Buffer> {
    let (width, height) = window.size();
    let mut buffer = screen.create_buffer(Size::new(width.into(), height.into()))?;
    paint(&mut buffer);

    let (tx, rx) = mpsc::channel::<UploadedEvent>();
    let recipient: Arc<dyn UploadRecipient> = Arc::new(tx);
    window.upload(&buffer, Point::new(0, 0), buffer.bounds(), Some(recipient))?;

    match rx.recv_timeout(Duration::from_secs(5)) {
        Ok(done) => log::info!(
            "uploaded segment 0x{:x} to window 0x{:x}",
            done.segment,
            done.drawable
        ),
        Err(_) => log::warn!("upload did not complete within 5s"),
    }
    Ok(buffer)
}

fn is_delete_request(screen: &Screen, event: &Event) -> bool {
    match event {
        Event::ClientMessage(ev) => {
            let atoms = screen.atoms();
            ev.type_ == atoms.wm_protocols && ev.data.as_data32()[0] == atoms.wm_delete_window
        }
        _ => false,
    }
}

fn run(screen: &Screen, window: Window) -> x11screen::Result<()> {
    let buffer = draw(screen, &window)?;

    while let Some(event) = window.next_event() {
        if is_delete_request(screen, &event) {
            log::info!("close requested");
            break;
        }
        if let Event::Expose(ev) = &event {
            if ev.count == 0 {
                window.upload(&buffer, Point::new(0, 0), buffer.bounds(), None)?;
            }
        }
        log::debug!("event: {:?}", event);
    }

    buffer.release();
    window.destroy();
    Ok(())
}

/// Drive the same flow against the null backend, standing in for the server
fn run_null(config: Config) -> x11screen::Result<()> {
    let backend = Arc::new(NullBackend::new());
    let screen = Screen::with_backend(Arc::clone(&backend), config.screen)?;
    let window = screen.create_window(&config.window)?;

    let (width, height) = window.size();
    let mut buffer = screen.create_buffer(Size::new(width.into(), height.into()))?;
    paint(&mut buffer);

    let (tx, rx) = mpsc::channel::<UploadedEvent>();
    window.upload(&buffer, Point::new(0, 0), buffer.bounds(), Some(Arc::new(tx)))?;

    for request in backend.requests() {
        if let NullRequest::ShmPutImage {
            sequence,
            drawable,
            segment,
        } = request
        {
            backend.push_event(Event::ShmCompletion(CompletionEvent {
                response_type: 0,
                sequence: sequence as u16,
                drawable,
                minor_event: 3,
                major_event: 0,
                shmseg: segment,
                offset: 0,
            }));
        }
    }
    match rx.recv_timeout(Duration::from_secs(5)) {
        Ok(done) => log::info!("null upload completed: {:?}", done),
        Err(_) => log::warn!("null upload did not complete"),
    }

    backend.push_event(Event::DestroyNotify(DestroyNotifyEvent {
        response_type: DESTROY_NOTIFY_EVENT,
        sequence: 0,
        event: window.id(),
        window: window.id(),
    }));
    while window.next_event().is_some() {}

    log::info!("resources before release: {:?}", screen.resource_counts());
    buffer.release();
    window.destroy();
    log::info!("resources after release: {:?}", screen.resource_counts());
    log::info!("{} requests issued", backend.requests().len());
    Ok(())
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    log::info!("x11screen v{}", VERSION);

    let result = if config.null {
        log::info!("Backend: null");
        run_null(config)
    } else {
        log::info!(
            "Display: {}",
            config.screen.display.as_deref().unwrap_or("$DISPLAY")
        );
        Screen::connect(config.screen.clone()).and_then(|screen| {
            let window = screen.create_window(&config.window)?;
            run(&screen, window)
        })
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
