//! CLI module - Command-line interface for Gatehouse
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// Gatehouse - Authentication and session service
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    #[command(alias = "-d", alias = "--daemon", alias = "daemon")]
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Provision an account and print its first-login link
    CreateUser {
        /// Username for the new account
        username: String,
        /// Email address the first-login link is sent to
        email: String,
        /// Role granted to the account
        #[arg(long, default_value = "USER")]
        role: String,
    },

    /// Clear the lock on an account
    Unlock {
        /// Username of the locked account
        username: String,
    },

    /// Show account details including lockout state
    #[command(alias = "i")]
    Info {
        /// Username to look up
        username: String,
    },
}

pub use commands::*;
