//! The whoson-client executable supports the following command line arguments:
//!
//! `whoson-client login <IP> <DATA> [--mode tcp|udp] [--server IP-PORT]`
//!
//!     Associate DATA with IP on the server.
//!
//! `whoson-client query <IP> [--mode tcp|udp] [--server IP-PORT]`
//!
//!     Print the data associated with IP.
//!
//! `whoson-client logout <IP> [--mode tcp|udp] [--server IP-PORT]`
//!
//!     Remove the record of IP.
//!
//! `whoson-client dump [--server IP-PORT] [--json]`
//!
//!     Print every live record of a server, read through its control port.
//!
//! `whoson-client config client|dump [--save]`
//!
//!     Print the effective configuration, and with --save write it to the configuration file.
//!
//! Options not given on the command line are taken from `~/.config/gowhoson/client.json`
//! (`serverctl.json` for `dump`), or from the file named by `--config`.
//! The server response is printed as is, e.g. `+LOGIN OK`. Errors are printed to STDERR and
//! give a non-zero exit code.

use std::io;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use serde::Serialize;
use whoson::config::{self, ClientConfig, ServerCtlConfig, CLIENT_CONFIG, SERVER_CTL_CONFIG};
use whoson::{logger, Result, ServerCtl, WhosonClient, WhosonError};

fn main() {
    let mode = Arg::with_name("mode")
        .long("mode")
        .value_name("tcp|udp")
        .env("GOWHOSON_CLIENT_MODE")
        .help("sets the protocol used to talk to the server");
    let server = Arg::with_name("server")
        .long("server")
        .value_name("IP_ADDR:PORT")
        .env("GOWHOSON_CLIENT_SERVER")
        .help("sets the IP_ADDR:PORT of the server to connect to");

    let matches = App::new("whoson-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("whoson client and server control")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("config")
            .long("config")
            .value_name("FILE")
            .env("GOWHOSON_CONFIG")
            .global(true)
            .help("config file path"))
        .subcommands(vec![
            SubCommand::with_name("login")
                .about("whoson command \"LOGIN\"")
                .arg(Arg::with_name("IP").required(true).index(1))
                .arg(Arg::with_name("DATA").required(true).index(2))
                .arg(mode.clone())
                .arg(server.clone()),
            SubCommand::with_name("query")
                .about("whoson command \"QUERY\"")
                .arg(Arg::with_name("IP").required(true).index(1))
                .arg(mode.clone())
                .arg(server.clone()),
            SubCommand::with_name("logout")
                .about("whoson command \"LOGOUT\"")
                .arg(Arg::with_name("IP").required(true).index(1))
                .arg(mode)
                .arg(server),
            SubCommand::with_name("dump")
                .about("print every record of a server")
                .arg(Arg::with_name("server")
                    .long("server")
                    .value_name("IP_ADDR:PORT")
                    .env("GOWHOSON_SERVERCTL_DUMP_SERVER")
                    .help("sets the IP_ADDR:PORT of the server control port"))
                .arg(Arg::with_name("json")
                    .long("json")
                    .help("prints JSON instead of a table")),
            SubCommand::with_name("config")
                .about("print the effective configuration")
                .arg(Arg::with_name("KIND")
                    .required(true)
                    .index(1)
                    .possible_values(&["client", "dump"]))
                .arg(Arg::with_name("save")
                    .long("save")
                    .help("writes the configuration to its file")),
        ])
        .get_matches();

    if let Err(e) = logger::init("stderr", "warn").and_then(|_| run(&matches)) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// runs the subcommand given on the command line
fn run(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("login", Some(args)) => {
            let config = client_config(args)?;
            let mut client = WhosonClient::dial(&config.mode, config.server.as_str())?;
            let resp = client.login(required(args, "IP")?, required(args, "DATA")?)?;
            let _ = client.quit();
            println!("{}", resp);
        }
        ("query", Some(args)) => {
            let config = client_config(args)?;
            let mut client = WhosonClient::dial(&config.mode, config.server.as_str())?;
            let resp = client.query(required(args, "IP")?)?;
            let _ = client.quit();
            println!("{}", resp);
        }
        ("logout", Some(args)) => {
            let config = client_config(args)?;
            let mut client = WhosonClient::dial(&config.mode, config.server.as_str())?;
            let resp = client.logout(required(args, "IP")?)?;
            let _ = client.quit();
            println!("{}", resp);
        }
        ("dump", Some(args)) => {
            let config = ctl_config(args)?;
            let mut ctl = ServerCtl::new(config.server.as_str());
            ctl.dump()?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if config.json {
                ctl.write_json(&mut out)?;
            } else {
                ctl.write_table(&mut out)?;
            }
        }
        ("config", Some(args)) => match required(args, "KIND")? {
            "client" => show_config(&client_config(args)?, &config_path(args, CLIENT_CONFIG)?, args)?,
            _ => show_config(&ctl_config(args)?, &config_path(args, SERVER_CTL_CONFIG)?, args)?,
        },
        _ => return Err(WhosonError::Parsing("unknown command received".to_string())),
    }
    Ok(())
}

/// the client configuration file overridden by `--mode` and `--server`
fn client_config(args: &ArgMatches) -> Result<ClientConfig> {
    let mut config: ClientConfig = config::load(&config_path(args, CLIENT_CONFIG)?)?;
    if let Some(mode) = args.value_of("mode") {
        config.mode = mode.to_string();
    }
    if let Some(server) = args.value_of("server") {
        config.server = server.to_string();
    }
    Ok(config)
}

/// the server control configuration file overridden by `--server` and `--json`
fn ctl_config(args: &ArgMatches) -> Result<ServerCtlConfig> {
    let mut config: ServerCtlConfig = config::load(&config_path(args, SERVER_CTL_CONFIG)?)?;
    if let Some(server) = args.value_of("server") {
        config.server = server.to_string();
    }
    if args.is_present("json") {
        config.json = true;
    }
    Ok(config)
}

fn config_path(args: &ArgMatches, file: &str) -> Result<PathBuf> {
    match args.value_of("config") {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config::config_dir()?.join(file)),
    }
}

fn show_config<T: Serialize>(config: &T, path: &Path, args: &ArgMatches) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if args.is_present("save") {
        config::save(config, path)?;
        println!("saved to {}", path.display());
    }
    Ok(())
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.value_of(name)
        .ok_or_else(|| WhosonError::Parsing(format!("missing argument {}", name)))
}
