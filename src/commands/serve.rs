use crate::commands::build_app_state;
use crate::config::Settings;
use crate::server;
use crate::services::is_trading_hours;

pub async fn run(port: Option<u16>) {
    server::init_tracing();

    let settings = Settings::from_env();
    let port = port.unwrap_or(settings.port);

    println!("🚀 Starting {} on port {}", settings.project_name, port);
    println!("🔌 MCP server: {}", settings.mcp.server_url);
    match &settings.backend.base_url {
        Some(url) => println!("🏦 Trading backend: {}", url),
        None => println!("⚠️  BE_API not set, backend tools will report an error"),
    }

    let state = match build_app_state(settings).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("❌ Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "🧰 Tools ready: {} total ({} from MCP)",
        state.tools.len(),
        state.tools.mcp_tool_count()
    );
    println!("🤖 Model: {} ({})", state.agent.model_name(), state.agent.provider());
    if is_trading_hours() {
        println!("📈 Market is open");
    } else {
        println!("🌙 Market is closed, intraday quotes fall back to closing prices");
    }

    if let Err(e) = server::serve(state, port).await {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}
