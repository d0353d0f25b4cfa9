use clap::Parser;

/// ttlkv interactive client
#[derive(Parser, Debug)]
#[clap(version)]
pub struct Args {
    /// Host of the server
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the server
    #[clap(long, default_value_t = 7379)]
    pub port: u16,
}
