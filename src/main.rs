#[macro_use]
extern crate log;

mod codec;
mod config;
mod corpus;
mod error;
mod files;
mod membership;
mod neighbor;
mod node;
mod protocol;
mod query;
mod registrar;
mod stats;
mod transport;

use std::sync::Arc;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use config::{Config, Files, General, Registrar};
use node::Node;

#[derive(Parser, Debug)]
#[clap(name = "overlay-search", about = "Unstructured P2P content-search overlay node")]
struct Cli {
    /// path to a TOML config file ([General]/[Registrar]/[Files] tables);
    /// when given, every other flag below is ignored
    #[clap(long)]
    config: Option<String>,

    #[clap(long, default_value = "127.0.0.1", required_unless_present = "config")]
    listen_ip: String,

    #[clap(long, required_unless_present = "config")]
    listen_port: Option<u16>,

    #[clap(long, required_unless_present = "config")]
    username: Option<String>,

    /// registrar host:port, e.g. 127.0.0.1:9000
    #[clap(long, required_unless_present = "config")]
    registrar_addr: Option<String>,

    /// newline-delimited file of candidate filenames this node may draw
    /// its local index from
    #[clap(long, required_unless_present = "config")]
    corpus: Option<String>,

    #[clap(long)]
    auto_register: bool,

    #[clap(long, default_value = "logs")]
    stats_dir: String,
}

/// Build the node's [`Config`] either by parsing `--config <path>` as TOML
/// or, failing that, from the individual CLI flags.
fn build_config(cli: Cli) -> Result<Config, Box<dyn std::error::Error>> {
    if let Some(path) = cli.config {
        let raw = std::fs::read_to_string(&path)?;
        return Ok(Config::from_str(&raw)?);
    }

    let listen_port = cli.listen_port.ok_or("--listen-port is required without --config")?;
    let username = cli.username.ok_or("--username is required without --config")?;
    let registrar_addr = cli
        .registrar_addr
        .ok_or("--registrar-addr is required without --config")?;
    let corpus = cli.corpus.ok_or("--corpus is required without --config")?;

    let (registrar_host, registrar_port) = registrar_addr
        .rsplit_once(':')
        .ok_or("registrar-addr must be host:port")?;
    let registrar_port: u16 = registrar_port.parse()?;

    Ok(Config {
        general: General {
            bind_ip: cli.listen_ip,
            bind_port: listen_port,
            username,
            auto_register: cli.auto_register,
            stats_dir: cli.stats_dir,
        },
        registrar: Registrar {
            address: registrar_host.to_string(),
            port: registrar_port,
            timeout_secs: 7,
        },
        files: Files {
            corpus_path: corpus,
        },
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = build_config(cli)?;

    let whole_corpus = corpus::load(&config.files.corpus_path)?;
    let mut rng = StdRng::from_entropy();
    let local_index = corpus::sample_index(&whole_corpus, &mut rng);
    info!("local index: {:?}", local_index);

    let bind_ip = config.general.bind_ip.clone();
    let bind_port = config.general.bind_port;

    let node = Arc::new(Node::bind(config, local_index.clone()).await?);

    if node.auto_register() {
        if let Err(e) = node.register().await {
            warn!("registration failed: {}", e);
        }
    }

    let file_server = Arc::new(node.file_server(Arc::new(local_index)));
    let file_server_addr = format!("{}:{}", bind_ip, bind_port + 1);
    {
        let file_server = file_server.clone();
        tokio::spawn(async move {
            if let Err(e) = file_server.serve(&file_server_addr).await {
                warn!("file server exited: {}", e);
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let shutdown_rx: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
        Box::pin(async move {
            let _ = shutdown_rx.await;
        });

    let run_handle = tokio::spawn({
        let node = node.clone();
        async move {
            if let Err(e) = node.run(shutdown_rx).await {
                warn!("node run loop exited with error: {}", e);
            }
        }
    });

    run_repl(node.clone(), shutdown_tx).await;
    run_handle.await?;

    Ok(())
}

async fn run_repl(node: Arc<Node>, shutdown_tx: oneshot::Sender<()>) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut shutdown_tx = Some(shutdown_tx);

    println!("commands: search <name>, neighbors, leave, exit");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line == "exit" || line == "leave" {
                            break;
                        } else if let Some(filename) = line.strip_prefix("search ") {
                            match node.search(filename).await {
                                Ok(id) => println!("search issued: {}", id),
                                Err(e) => println!("search failed: {}", e),
                            }
                        } else if line == "neighbors" {
                            println!("{} neighbor(s)", node.neighbor_count().await);
                        } else if !line.is_empty() {
                            println!("unrecognized command: {}", line);
                        }
                    }
                    _ => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    if let Some(tx) = shutdown_tx.take() {
        let _ = tx.send(());
    }
}
