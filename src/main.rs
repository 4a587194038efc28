use color_eyre::{eyre::eyre, Result};
use curtaind::config::{self, CurtainConfig};
use curtaind::console;
use curtaind::curtain::CurtainService;
use curtaind::gpio::rpi::{configure_switches, open_motor};
use curtaind::gpio::SysfsGpio;
use rppal::gpio::Gpio;
use tokio::io::BufReader;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    setup()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run());
    // stdin is read on a blocking thread that cannot be cancelled
    runtime.shutdown_background();
    result
}

async fn run() -> Result<()> {
    let config_path = config::resolve_path(std::env::args().nth(1));
    CurtainConfig::ensure_default(&config_path).await?;
    let config = CurtainConfig::load(&config_path).await?;
    info!("Loaded configuration from {}", config_path.display());

    // Pull resistors and motor outputs through rppal, edges through sysfs
    let gpio = Gpio::new().map_err(|e| eyre!("Failed to open GPIO: {}", e))?;
    let _pulls = configure_switches(
        &gpio,
        &[config.pins.switch_left, config.pins.switch_right],
        config.switches.pull_up,
    )?;
    let motor = open_motor(
        &gpio,
        config.pins.motor_left,
        config.pins.motor_right,
        config.motion.motor_active_level.level(),
    )?;

    let backend = SysfsGpio::new(config.watcher.sysfs_root.clone());
    let mut service = CurtainService::start(&config, backend, motor)
        .await
        .map_err(|e| eyre!("Failed to start curtain service: {}", e))?;

    let mut console_task = tokio::spawn(console::run(
        service.handle(),
        BufReader::new(tokio::io::stdin()),
    ));

    let result = tokio::select! {
        result = service.wait() => result.map_err(|e| eyre!("Curtain service failed: {}", e)),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
        exit = &mut console_task => match exit {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(eyre!("Console stopped: {}", e)),
            Err(e) => Err(eyre!("Console task panicked: {}", e)),
        },
    };

    console_task.abort();
    if let Err(e) = service.close().await {
        error!("Error while closing curtain service: {}", e);
    }
    result
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
