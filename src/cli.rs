//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和选项
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "authrix")]
#[command(version)]
#[command(
    about = "Multi-tenant credential issuance and revocation service with tenant key custody"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, default_value = "config.toml")]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },

    /// Seal a PEM private key with the configured master secret and print the envelope
    Seal {
        /// PEM file to seal
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Seal and store an RSA key pair as the active signing key of a tenant
    ImportKey {
        /// Tenant (project) ID
        #[arg(long)]
        tenant: String,

        /// Key ID written to the JWT `kid` header
        #[arg(long)]
        kid: String,

        /// Public key PEM file (SPKI or PKCS#1)
        #[arg(long)]
        public: PathBuf,

        /// Private key PEM file (PKCS#1 or PKCS#8)
        #[arg(long)]
        private: PathBuf,
    },
}
