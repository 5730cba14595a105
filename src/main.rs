use actix_server::ServerHandle;
use actix_web::{App, HttpServer, web::Data};
use anyhow::{Context, Result};
use clap::Parser;
use cportal::{
    api::Api,
    config::{AppConfig, Cli, PortalConfig},
    middleware::ActivityMw,
    network_backend::{NetworkBackend, SystemNetworkBackend},
    pages::Pages,
    portal::{Portal, session::ExitStatus, watchdog::Watchdog},
    services::{
        led::{LedSequence, StatusLed},
        localization::{LocalizationCatalog, LocalizationService},
        settings::{Defaults, SettingsValidator},
    },
};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use std::{io::Write, sync::Arc};
use tokio::signal::unix::{SignalKind, signal};

const SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const ERROR_EXIT_CODE: i32 = 1;

type PortalApi = Api<SystemNetworkBackend>;

#[actix_web::main]
async fn main() {
    let cli = Cli::parse();

    initialize(cli.debug);

    let code = match run(cli).await {
        Ok(status) => status.code(),
        Err(e) => {
            error!("application error: {e:#}");
            ERROR_EXIT_CODE
        }
    };

    info!("exit with code {code}");
    std::process::exit(code);
}

fn initialize(debug: bool) {
    log_panics::init();

    let mut builder = if debug || cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

async fn run(cli: Cli) -> Result<ExitStatus> {
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    let backend = Arc::new(SystemNetworkBackend::new(config.network.clone()));
    let led = StatusLed::spawn(&config.led_path);

    if config.reset {
        info!("reset captive portal networking");
        led.set(LedSequence::Cleanup);
        backend
            .teardown()
            .await
            .context("failed to reset networking")?;
        info!("captive portal networking reset complete");
        return Ok(ExitStatus::Success);
    }

    let result = serve(&config, backend.clone(), led.clone()).await;

    info!("clean up captive portal networking");
    led.set(LedSequence::Cleanup);
    if let Err(e) = backend.teardown().await {
        error!("cleanup failed: {e:#}");
    }
    led.set(LedSequence::Dark);

    result
}

async fn serve(
    config: &AppConfig,
    backend: Arc<SystemNetworkBackend>,
    led: StatusLed,
) -> Result<ExitStatus> {
    let defaults = config
        .defaults_file
        .as_deref()
        .map(Defaults::load)
        .transpose()
        .context("failed to load defaults")?;

    let pages = Pages::load(
        &config.portal.hostname,
        config.portal.apip,
        config.pages_dir.as_deref(),
    )
    .context("failed to load pages")?;

    let validator = SettingsValidator::new(
        LocalizationCatalog::new(config.localization.catalog.clone()),
        defaults,
        &config.portal.default_country,
    );

    info!("start access point {}", config.network.ap_ssid);
    led.set(LedSequence::AccessPointOff);
    backend
        .apply_access_point_config()
        .await
        .context("failed to start access point")?;
    led.set(LedSequence::AccessPointOn);

    let portal = Arc::new(Portal::new(
        backend,
        validator,
        LocalizationService::new(config.localization.target.clone()),
        led,
        config.portal.retries,
    ));
    let mut stop_rx = portal.subscribe_stop();

    let watchdog = Data::new(Watchdog::new(config.portal.idle_timeout()));
    tokio::spawn(watchdog.clone().into_inner().run(portal.clone()));

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let api = Data::new(PortalApi::new(portal.clone(), pages));
    let (server_handle, server_task) = run_server(&config.portal, api, watchdog)?;

    let status = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("ctrl-c received");
            portal.finish(ExitStatus::Interrupted)
        },
        _ = sigterm.recv() => {
            debug!("SIGTERM received");
            portal.finish(ExitStatus::Interrupted)
        },
        _ = stop_rx.recv() => {
            debug!("portal stop requested");
            portal.finish(ExitStatus::Incomplete)
        },
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
            portal.finish(ExitStatus::Incomplete)
        },
    };

    info!("shutting down with exit status {status:?}");
    server_handle.stop(true).await;

    Ok(status)
}

fn run_server(
    config: &PortalConfig,
    api: Data<PortalApi>,
    watchdog: Data<Watchdog>,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(ActivityMw)
            .app_data(watchdog.clone())
            .app_data(api.clone())
            .configure(PortalApi::routes)
    })
    .workers(1)
    .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
    .bind((config.apip, config.port))
    .context(format!(
        "failed to bind server to {}:{}",
        config.apip, config.port
    ))?
    .disable_signals()
    .run();

    info!("portal listening on http://{}:{}", config.apip, config.port);

    Ok((server.handle(), tokio::spawn(server)))
}
