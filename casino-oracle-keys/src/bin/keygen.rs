// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

// Casino Oracle Key Generation Tool
// Generates chain signing keys (K1) and the signidice RSA key

use anyhow::Result;
use casino_oracle_keys::keygen::DEFAULT_RSA_BITS;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keygen")]
#[command(about = "Generate keys for the casino oracle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a K1 chain key (deposit, signidice or bonus admin role)
    Eos {
        /// Output file path for the generated key
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Generate the RSA key used for signidice counter-signatures
    Rsa {
        /// Output file path for the generated key
        #[arg(short, long)]
        output: PathBuf,

        /// Key size in bits
        #[arg(long, default_value_t = DEFAULT_RSA_BITS)]
        bits: usize,
    },
    /// Print the public key of an existing K1 key file
    Examine {
        /// Path to the key file to examine
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Eos { output } => {
            println!("Generating K1 key...");
            let public =
                casino_oracle_keys::keygen::generate_eos_key_and_write_to_file(&output)?;
            println!("\n✓ Key generated successfully!");
            println!("  File: {:?}", output);
            println!("  Public key: {}", public);
            println!("  Public key (K1): {}", public.to_k1_string());
            println!("\nIMPORTANT: keep this key file secure and backed up");
        }
        Commands::Rsa { output, bits } => {
            println!("Generating RSA-{} key...", bits);
            casino_oracle_keys::keygen::generate_rsa_key_and_write_to_file(&output, bits)?;
            println!("\n✓ RSA key generated successfully!");
            println!("  File: {:?}", output);
            println!(
                "\nUpdate 'rsa-key-path' in the oracle config to point to this file"
            );
        }
        Commands::Examine { path } => {
            let key = casino_oracle_keys::keypair_file::read_eos_key(&path)?;
            let public = key.public_key();
            println!("Key file: {:?}", path);
            println!("Public key: {}", public);
            println!("Public key (K1): {}", public.to_k1_string());
        }
    }

    Ok(())
}
