#![deny(clippy::all)]
#![deny(rust_2018_idioms)]

use std::{error::Error, net::SocketAddr};

use adapter::Context;
use clap::{crate_version, Arg, Command};
use poller::{Application, EnvConfig, Registry};
use primitives::{config::configuration, util::logging::new_logger};
use slog::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Command::new("Poller")
        .version(crate_version!())
        .arg(
            Arg::new("config")
                .help("the config file for the poller, defaults to the config of the environment")
                .takes_value(true),
        )
        .get_matches();

    let env_config = EnvConfig::from_env()?;
    let config = configuration(env_config.env, cli.value_of("config"))?;

    let logger = new_logger("poller");
    info!(&logger, "Starting the poller"; "environment" => ?env_config.env, "fetch_timeout" => ?config.fetch_timeout());

    let context = Context::new(config, logger)?;
    let socket_addr = SocketAddr::new(env_config.ip_addr, env_config.port);

    Application::new(Registry::production(), context)
        .run(socket_addr)
        .await;

    Ok(())
}
