use crate::commands::build_tools;
use crate::config::Settings;
use crate::models::ToolSource;
use crate::server;

pub async fn run() {
    server::init_tracing();

    let settings = Settings::from_env();
    println!("🔍 Collecting tools (MCP: {})...\n", settings.mcp.server_url);

    let tools = match build_tools(&settings).await {
        Ok(tools) => tools,
        Err(e) => {
            eprintln!("❌ Failed to collect tools: {}", e);
            std::process::exit(1);
        }
    };

    for source in [ToolSource::Mcp, ToolSource::Fallback, ToolSource::Backend, ToolSource::Custom] {
        let specs = tools.by_source(&[source]);
        if specs.is_empty() {
            continue;
        }
        println!("📦 {} ({})", source.as_str(), specs.len());
        for spec in specs {
            let summary = spec.description.lines().next().unwrap_or_default();
            println!("   • {:<32} {}", spec.name, summary);
        }
        println!();
    }

    println!("✅ {} tools total", tools.len());
    if tools.mcp_tool_count() == 0 {
        println!("⚠️  No MCP tools loaded, market data answers will use placeholders");
    }
}
