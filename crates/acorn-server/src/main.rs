//! Single-client TCP front-end for the AcornDB key store.
//!
//! One request per connection: the first line is parsed as an HTTP-style
//! request line and the reply is a small HTML page. The store is opened at
//! startup (bootstrapping from a word list when no header sidecar exists
//! yet) and reopened on the first request after a close command.

mod config;
mod request;

use acorn_btree::BTree;
use acorn_common::{Result, TreeConfig};
use config::ServerConfig;
use request::{parse_request_line, Command};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ORDER: usize = 8;
const NODE_SIZE: usize = 256;
const CACHE_SIZE: usize = 4;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acorn_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        "configuration: data_dir={}, listen_port={}",
        config.data_dir.display(),
        config.listen_port
    );

    if let Err(e) = run(&config) {
        tracing::error!("server failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;

    let listener = TcpListener::bind(("0.0.0.0", config.listen_port))?;
    tracing::info!("listening on port {}", config.listen_port);

    let mut tree = Some(load_tree(config)?);
    tracing::info!("service is ready");

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("failed to accept connection: {e}");
                continue;
            }
        };
        if let Err(e) = handle_connection(stream, &mut tree, config) {
            tracing::warn!("request failed: {e}");
        }
    }
    Ok(())
}

fn handle_connection(
    stream: TcpStream,
    tree: &mut Option<BTree>,
    config: &ServerConfig,
) -> Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.trim_end();

    let message = match execute(parse_request_line(line), tree, config) {
        Ok(message) => message,
        Err(e) => format!("request failed: {e}"),
    };

    let body = format!(
        "<html>\n<head><title>Persistent B-Tree</title></head>\n\
         Got request: {line} <br><br>\n{message}\n</html>\n"
    );
    let mut stream = reader.into_inner();
    write!(
        stream,
        "HTTP/1.0 200 OK\r\nContent-Length: {}\r\nContent-Type: text/html\r\n\r\n{body}",
        body.len()
    )?;
    Ok(())
}

fn execute(command: Command, tree: &mut Option<BTree>, config: &ServerConfig) -> Result<String> {
    match command {
        Command::Close => {
            if let Some(mut open) = tree.take() {
                open.close()?;
            }
            tracing::info!("store closed");
            Ok("the store was closed".to_string())
        }
        Command::Empty => Ok("please enter a command".to_string()),
        Command::Add(key) => {
            let open = reopened(tree, config)?;
            if open.add(&key)? {
                Ok(format!("'{key}' was ADDED to the dictionary"))
            } else {
                Ok(format!("'{key}' was FOUND in the dictionary"))
            }
        }
        Command::Remove(key) => {
            let open = reopened(tree, config)?;
            if open.remove(&key)? {
                Ok(format!("'{key}' was REMOVED from the dictionary"))
            } else {
                Ok(format!(
                    "'{key}' was NOT FOUND in the dictionary and could not be removed"
                ))
            }
        }
    }
}

/// Returns the open store, reopening it after a close command.
fn reopened<'a>(tree: &'a mut Option<BTree>, config: &ServerConfig) -> Result<&'a mut BTree> {
    match tree {
        Some(open) => Ok(open),
        None => {
            let open = load_tree(config)?;
            Ok(tree.insert(open))
        }
    }
}

/// Opens the store from its header sidecar, or creates it and loads the
/// bootstrap word list when no sidecar exists yet.
fn load_tree(config: &ServerConfig) -> Result<BTree> {
    let header = config.header_path();
    if header.is_file() {
        tracing::info!("opening existing store from {}", header.display());
        return BTree::open(&header, CACHE_SIZE);
    }

    tracing::info!("creating new store at {}", config.block_file_path().display());
    let mut tree = BTree::create(TreeConfig {
        order: ORDER,
        node_size: NODE_SIZE,
        cache_capacity: CACHE_SIZE,
        path: config.block_file_path(),
    })?;

    if config.words_file.is_file() {
        let reader = BufReader::new(File::open(&config.words_file)?);
        let mut count = 0u64;
        for line in reader.lines() {
            let word = line?;
            let word = word.trim();
            if word.is_empty() {
                continue;
            }
            tree.add(word)?;
            count += 1;
            if count % 1000 == 0 {
                tracing::info!("loaded {count} words");
            }
        }
        tracing::info!("loaded {count} words from {}", config.words_file.display());
    }

    Ok(tree)
}
