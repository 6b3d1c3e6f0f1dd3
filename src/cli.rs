use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser)]
#[command(name = "vnstock-agent")]
#[command(about = "Vietnamese stock trading assistant backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat API server
    Serve {
        /// Port to listen on (defaults to PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List every tool the assistant can call
    Tools,
    /// Send a single message to the assistant and print the reply
    Ask {
        /// Message text
        message: String,
        /// User id passed to account tools
        #[arg(long)]
        user_id: Option<String>,
        /// Conversation session id (random when omitted)
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Check configuration and upstream connectivity
    Doctor,
}

pub async fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            commands::serve::run(port).await;
        }
        Commands::Tools => {
            commands::tools::run().await;
        }
        Commands::Ask { message, user_id, session_id } => {
            commands::ask::run(message, user_id, session_id).await;
        }
        Commands::Doctor => {
            commands::doctor::run().await;
        }
    }
}
