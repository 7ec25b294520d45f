use std::{
    error::Error,
    io,
    net::{SocketAddr, ToSocketAddrs},
};

use clap::Parser;
use docwire::{
    Arguments, KeyValue, LogStore, Settings,
    command::SERVER_KEYS,
    protocol::{Shutdown, StorageServer},
};
use log::info;

#[derive(Debug, Parser)]
#[command(version, about = "Serve a docwire database", long_about = None)]
struct Cli {
    /// Settings as key=value pairs: host, port, db, dir
    arguments: Vec<KeyValue>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::from_arguments(&Arguments::new(cli.arguments, SERVER_KEYS))?;
    let address = resolve(&settings.host, settings.port)?;

    let store = LogStore::open(settings.database_dir())?;
    let server = StorageServer::bind(address, store)?;

    let shutdown = Shutdown::new();
    let handler = shutdown.clone();
    ctrlc::set_handler(move || handler.trigger())?;

    server.listen(&shutdown)?;
    info!("server stopped");
    Ok(())
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address for {host}:{port}"),
        )
    })
}
