use std::error::Error;

use clap::Parser;
use docwire::{
    Arguments, KeyValue, Settings,
    command::CLIENT_KEYS,
    protocol::{Client, Payload, Shutdown},
};

#[derive(Debug, Parser)]
#[command(version, about = "Send one query to a docwire server", long_about = None)]
struct Cli {
    /// Request as key=value pairs: host, port, db, action, key, value, collection, data, params
    arguments: Vec<KeyValue>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let arguments = Arguments::new(cli.arguments, CLIENT_KEYS);
    let settings = Settings::from_arguments(&arguments)?;
    let request = arguments.request()?;

    let shutdown = Shutdown::new();
    let handler = shutdown.clone();
    ctrlc::set_handler(move || handler.trigger())?;

    let client = Client::resolve(&settings.host, settings.port)?.with_shutdown(shutdown);
    match client.send(request)? {
        Payload::Json(response) => println!("{}", serde_json::to_string_pretty(&response)?),
        Payload::Binary(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
    }
    Ok(())
}
