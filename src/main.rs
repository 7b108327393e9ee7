use clap::Parser;
use http_co2_sensor::config::Config;
use http_co2_sensor::device::{Accessory, BridgeContext, Service};
use http_co2_sensor::input::notification::NotificationServer;
use http_co2_sensor::registry::AccessoryRegistry;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "http-co2-sensor", version, about)]
struct Args {
    /// Path to the bridge configuration file
    #[arg(short, long, env = "HTTP_CO2_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address of the notification server (overrides the config file)
    #[arg(long, env = "NOTIFICATION_LISTEN")]
    notification_listen: Option<SocketAddr>,

    /// Read every accessory once, print the values and exit
    #[arg(long)]
    once: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    init_logger();
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };
    if let Some(addr) = args.notification_listen {
        config.bridge.notification_listen = addr;
    }
    info!("Configuration loaded from {}", config_path.display());

    let mut registry = AccessoryRegistry::new();
    http_co2_sensor::register(&mut registry);

    let accessories: Vec<Arc<dyn Accessory>> = config
        .accessories
        .iter()
        .filter_map(|block| registry.create(block))
        .collect();

    for accessory in &accessories {
        let services = accessory.services();
        if services.is_empty() {
            warn!("[{}] Not functional, no services published", accessory.name());
            continue;
        }
        for service in &services {
            info!(
                "[{}] {}: {}",
                accessory.name(),
                service.type_name(),
                service.describe()
            );
        }
    }

    if args.once {
        for accessory in &accessories {
            if let Err(e) = accessory.read_value().await {
                println!("{}: error: {}", accessory.name(), e);
                continue;
            }
            for service in accessory.services() {
                if matches!(service, Service::CarbonDioxideSensor(_)) {
                    println!("{}", service.describe());
                }
            }
        }
        return;
    }

    let ctx = BridgeContext::new();
    let mut tasks = Vec::new();
    for accessory in &accessories {
        tasks.extend(Arc::clone(accessory).start(&ctx));
    }

    let server = NotificationServer::new(
        Arc::clone(&ctx.notifications),
        config.bridge.notification_listen,
    );
    let server_cancel = ctx.cancel.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(server_cancel).await {
            error!("Notification server error: {}", e);
        }
    });

    info!(
        "HTTP CO2 sensor bridge running with {} accessory(s), press Ctrl+C to exit",
        accessories.len()
    );

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    ctx.cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    let _ = server_task.await;

    info!("HTTP CO2 sensor bridge stopped");
}
