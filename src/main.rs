use anyhow::{Context, Result};
use clap::Parser;
use sql_chatbot::config::Config;
use sql_chatbot::{build_pipeline, server};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-chatbot")]
#[command(about = "Answers natural-language questions by generating and running SQL")]
#[command(version)]
struct Args {
    /// Address to bind (or set HOST env var)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (or set PORT env var, default: 3001)
    #[arg(short, long)]
    port: Option<u16>,

    /// Chat model (or set OPENAI_MODEL env var)
    #[arg(long)]
    model: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long)]
    database_url: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }
        if let Some(api_key) = self.api_key {
            config.llm.api_key = api_key;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env().context("invalid configuration")?;
    args.apply(&mut config);

    info!("Starting SQL chatbot (model: {})", config.llm.model);

    let pipeline = build_pipeline(&config).context("failed to build query pipeline")?;

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    server::serve(listener, pipeline).await?;
    Ok(())
}
