//! this binary starts the whoson server
//! to see the list of options, type: `whoson-server --help`
//!
//! Options are read from the configuration file (`/etc/gowhoson.json` unless `--config` says
//! otherwise), then overridden by the command line flags or their environment variables.
//! The server runs until it receives SIGINT or SIGTERM, then stops every listener, waits for
//! in-flight sessions and saves the snapshot file.

use std::path::PathBuf;
use std::process::exit;

use clap::{crate_version, value_t, App, Arg, ArgMatches};
use crossbeam::channel;
use tracing::info;
use whoson::config::{self, ServerConfig, SERVER_CONFIG};
use whoson::{logger, Result, WhosonError, WhosonServer};

fn main() {
    let matches = App::new("whoson-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a replicated whoson (who is logged on) server")
        .arg(Arg::with_name("config")
            .long("config")
            .value_name("FILE")
            .env("GOWHOSON_CONFIG")
            .help("config file path"))
        .arg(Arg::with_name("tcp")
            .long("tcp")
            .value_name("IP_ADDR:PORT|nostart")
            .env("GOWHOSON_SERVER_TCP")
            .help("sets the IP_ADDR:PORT the TCP server listens on"))
        .arg(Arg::with_name("udp")
            .long("udp")
            .value_name("IP_ADDR:PORT|nostart")
            .env("GOWHOSON_SERVER_UDP")
            .help("sets the IP_ADDR:PORT the UDP server listens on"))
        .arg(Arg::with_name("log")
            .long("log")
            .value_name("stdout|stderr|discard|FILE")
            .env("GOWHOSON_SERVER_LOG")
            .help("sets where log lines are written"))
        .arg(Arg::with_name("loglevel")
            .long("loglevel")
            .value_name("LEVEL")
            .env("GOWHOSON_SERVER_LOGLEVEL")
            .possible_values(&config::LOG_LEVELS)
            .help("sets the minimum level of logged events"))
        .arg(Arg::with_name("serverid")
            .long("serverid")
            .value_name("ID")
            .env("GOWHOSON_SERVER_SERVERID")
            .help("sets the worker id of session ids, 0 to 1023"))
        .arg(Arg::with_name("controlport")
            .long("controlport")
            .value_name("IP_ADDR:PORT")
            .env("GOWHOSON_SERVER_CONTROLPORT")
            .help("sets the IP_ADDR:PORT of the replication and dump service"))
        .arg(Arg::with_name("syncremote")
            .long("syncremote")
            .value_name("IP_ADDR:PORT,...")
            .env("GOWHOSON_SERVER_SYNCREMOTE")
            .help("sets the peers every write is replicated to"))
        .arg(Arg::with_name("savefile")
            .long("savefile")
            .value_name("FILE")
            .env("GOWHOSON_SERVER_SAVEFILE")
            .help("sets the snapshot file loaded at start and saved at shutdown"))
        .get_matches();

    let config = match build_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    if let Err(e) = run(config) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// reads the configuration file and applies the command line overrides
fn build_config(matches: &ArgMatches) -> Result<ServerConfig> {
    let path = matches
        .value_of("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SERVER_CONFIG));
    let mut config: ServerConfig = config::load(&path)?;

    let overrides = [
        ("tcp", &mut config.tcp),
        ("udp", &mut config.udp),
        ("log", &mut config.log),
        ("loglevel", &mut config.loglevel),
        ("controlport", &mut config.control_port),
        ("syncremote", &mut config.sync_remote),
        ("savefile", &mut config.save_file),
    ];
    for (name, value) in overrides {
        if let Some(flag) = matches.value_of(name) {
            *value = flag.to_string();
        }
    }
    if matches.is_present("serverid") {
        config.server_id = value_t!(matches, "serverid", u64)
            .map_err(|e| WhosonError::Parsing(format!("\"--serverid\" {}", e)))?;
    }

    config.validate()?;
    Ok(config)
}

fn run(config: ServerConfig) -> Result<()> {
    logger::init(&config.log, &config.loglevel)?;
    info!("whoson-server {}", env!("CARGO_PKG_VERSION"));
    info!(?config, "configuration");

    let running = WhosonServer::new(config).start()?;

    let (tx, rx) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .map_err(|e| WhosonError::StringErr(format!("could not install the signal handler: {}", e)))?;

    // an Err means the handler is gone, which also ends the wait
    let _ = rx.recv();
    info!("signal received, shutting down");
    running.shutdown()
}
