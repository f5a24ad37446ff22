use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use visioncam::camera::ModeFilter;
use visioncam::notify::ChannelNotifier;
use visioncam::platform;
use visioncam::{
    BroadcastChannels, Camera, DeviceIdentity, Frame, MjpegServer, NetworkManager,
    VisionCameraConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    visioncam::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: visioncam-cli <list-devices|list-modes|serve> [args] [--json]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args),
        "list-modes" => cmd_list_modes(&args),
        "serve" => cmd_serve(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn wants_json(args: &[String]) -> bool {
    args.iter().any(|arg| arg == "--json")
}

fn positional(args: &[String], index: usize) -> Option<&String> {
    args.iter().skip(2).filter(|arg| !arg.starts_with("--")).nth(index)
}

fn cmd_list_devices(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let devices = platform::list_devices()?;
    if wants_json(args) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            match d.driver {
                Some(driver) => println!("{} [{}]", d.identity, driver),
                None => println!("{}", d.identity),
            }
        }
    }
    Ok(())
}

fn cmd_list_modes(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = positional(args, 0) else {
        eprintln!("Usage: visioncam-cli list-modes <device_path> [--json]");
        std::process::exit(1);
    };

    let mut device = platform::open_device(&DeviceIdentity::new(path.as_str(), path.as_str()))?;
    let modes = device.enumerate_modes()?;
    let filter = ModeFilter::default();

    if wants_json(args) {
        println!("{}", serde_json::to_string(&modes)?);
    } else {
        for mode in modes {
            let mark = if filter.accepts(&mode) { "*" } else { " " };
            println!("{} {}", mark, mode);
        }
    }
    Ok(())
}

fn cmd_serve(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = positional(args, 0)
        .map(PathBuf::from)
        .unwrap_or_else(VisionCameraConfig::default_path);
    let config = VisionCameraConfig::load_from_file(&config_path)?;
    config.validate()?;

    let network = NetworkManager::for_platform(config.network.managed, &config.network_settings());
    log::info!("Network state: {:?}", network.state());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let channels = BroadcastChannels::new();
    let (notifier, mut events) = ChannelNotifier::new();
    runtime.spawn(async move {
        while let Some(event) = events.recv().await {
            log::info!("Settings changed on {}", event.camera);
        }
    });

    let camera = Camera::open(
        config.camera_params(),
        Arc::new(channels.clone()),
        Arc::new(notifier),
    )?;

    let server = if config.stream.enabled {
        let addr = config.stream.socket_addr()?;
        Some(runtime.block_on(MjpegServer::bind(
            channels,
            camera.name(),
            addr,
            config.stream.jpeg_quality,
        ))?)
    } else {
        None
    };
    if let Some(endpoint) = camera.stream_endpoint() {
        println!("{}", serde_json::to_string(&endpoint)?);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut frame = Frame::empty();
    let mut published = 0u64;
    while running.load(Ordering::SeqCst) {
        if camera.capture_frame(&mut frame).is_none() {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        match camera.publish_frame(&frame) {
            Ok(()) => published += 1,
            Err(e) => log::debug!("Dropped frame: {}", e),
        }
    }

    log::info!("Stopping after {} frames", published);
    if let Some(server) = server {
        runtime.block_on(server.shutdown());
    }
    Ok(())
}
