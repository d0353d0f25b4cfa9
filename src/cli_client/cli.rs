use bytes::Bytes;
use clap::Parser;
use clap::Subcommand;

use crate::common::codec::{Condition, Expiry, Request, SetOptions};

/// ttlkv one-shot client
#[derive(Parser, Debug)]
#[clap(version)]
pub struct Args {
    /// Host of the server
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the server
    #[clap(long, default_value_t = 7379)]
    pub port: u16,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the server is alive
    Ping,

    /// Set a key to a value
    Set {
        key: String,
        value: String,
        /// Only set the key if it does not exist
        #[clap(long, conflicts_with = "xx")]
        nx: bool,
        /// Only set the key if it already exists
        #[clap(long)]
        xx: bool,
        /// Expire after this many seconds
        #[clap(long, conflicts_with_all = ["px", "exat", "pxat", "keepttl"])]
        ex: Option<u64>,
        /// Expire after this many milliseconds
        #[clap(long, conflicts_with_all = ["exat", "pxat", "keepttl"])]
        px: Option<u64>,
        /// Expire at this unix time in seconds
        #[clap(long, conflicts_with_all = ["pxat", "keepttl"])]
        exat: Option<u64>,
        /// Expire at this unix time in milliseconds
        #[clap(long, conflicts_with = "keepttl")]
        pxat: Option<u64>,
        /// Keep the expiry of the value being replaced
        #[clap(long)]
        keepttl: bool,
    },

    /// Get the value of a key
    Get { key: String },

    /// Delete one or more keys
    Del {
        #[clap(required = true)]
        keys: Vec<String>,
    },

    /// Make the server wait before replying
    Sleep { seconds: u64 },

    /// Number of stored keys, including expired ones not yet reclaimed
    Dbsize,
}

impl Commands {
    pub fn into_request(self) -> Request {
        match self {
            Commands::Ping => Request::Ping(None),
            Commands::Set {
                key,
                value,
                nx,
                xx,
                ex,
                px,
                exat,
                pxat,
                keepttl,
            } => {
                let condition = match (nx, xx) {
                    (true, _) => Some(Condition::Nx),
                    (_, true) => Some(Condition::Xx),
                    _ => None,
                };
                let expiry = ex
                    .map(Expiry::Ex)
                    .or(px.map(Expiry::Px))
                    .or(exat.map(Expiry::ExAt))
                    .or(pxat.map(Expiry::PxAt))
                    .or(keepttl.then_some(Expiry::KeepTtl));

                Request::Set {
                    key: Bytes::from(key),
                    value: Bytes::from(value),
                    options: SetOptions { condition, expiry },
                }
            }
            Commands::Get { key } => Request::Get(Bytes::from(key)),
            Commands::Del { keys } => Request::Del(keys.into_iter().map(Bytes::from).collect()),
            Commands::Sleep { seconds } => Request::Sleep(seconds),
            Commands::Dbsize => Request::DbSize,
        }
    }
}
